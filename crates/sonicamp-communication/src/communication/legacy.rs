//! Line based communicator for firmware that predates framing
//!
//! Lines carry no correlation id, so answers are matched in FIFO order: the
//! first non-blank line after a write is the answer. Multi-line answers
//! collect further lines until the stream stays quiet for a short gap.

use async_trait::async_trait;
use parking_lot::Mutex;
use sonicamp_core::{ConnectionError, DisconnectReason, Error, EventBus, ProtocolKind, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::encoding::ChannelEncoding;
use super::fetcher::RAW_BUFFER_CAPACITY;
use super::{
    BoxedReader, BoxedWriter, Communicator, ConnectionFactory, Link, Transport, LEGACY_BAUD_RATE,
};

/// Configuration for the line based communicator
#[derive(Debug, Clone)]
pub struct LegacyCommunicatorConfig {
    /// Time to wait for the first answer line per attempt.
    pub timeout: Duration,
    /// Extra attempts after a timeout; 0 surfaces the timeout immediately.
    pub max_retries: u32,
    /// How long the banner is read after opening.
    pub handshake_duration: Duration,
    /// Quiet time that ends a multi-line answer.
    pub multiline_gap: Duration,
    /// Channel encoding.
    pub encoding: ChannelEncoding,
    /// Baud rate used when opening serial ports.
    pub baud_rate: u32,
    /// Requests that may wait behind the one in flight.
    pub queue_capacity: usize,
}

impl Default for LegacyCommunicatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            handshake_duration: Duration::from_secs(6),
            multiline_gap: Duration::from_millis(100),
            encoding: ChannelEncoding::platform_default(),
            baud_rate: LEGACY_BAUD_RATE,
            queue_capacity: 32,
        }
    }
}

struct Request {
    message: String,
    multiline: bool,
    reply: oneshot::Sender<Result<String>>,
}

type Monitor = Arc<Mutex<VecDeque<String>>>;

fn push_monitor(monitor: &Monitor, line: String) {
    let mut lines = monitor.lock();
    if lines.len() == RAW_BUFFER_CAPACITY {
        lines.pop_front();
    }
    lines.push_back(line);
}

/// Communicator for the legacy line protocol
pub struct LegacyCommunicator {
    link: Arc<Link>,
    requests: mpsc::Sender<Request>,
    monitor: Monitor,
    banner: Option<String>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LegacyCommunicator {
    /// Open a transport, read the banner and start the reader and writer tasks
    pub async fn open(
        factory: &dyn ConnectionFactory,
        config: LegacyCommunicatorConfig,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        let transport = factory.open(config.baud_rate).await?;
        Ok(Self::start(transport, config, bus).await)
    }

    /// Read the banner from an open transport and start the tasks
    pub async fn start(
        transport: Transport,
        config: LegacyCommunicatorConfig,
        bus: Arc<EventBus>,
    ) -> Self {
        let Transport {
            reader,
            writer,
            name,
            child,
        } = transport;

        let link = Link::new(name, bus);
        let (line_tx, mut lines) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_lines(
            reader,
            config.encoding,
            line_tx,
            link.clone(),
        ));

        let banner = read_banner(&mut lines, config.handshake_duration).await;
        if let Some(banner) = &banner {
            tracing::debug!(port = %link.port(), lines = banner.lines().count(), "Banner received");
        }

        let monitor: Monitor = Arc::new(Mutex::new(VecDeque::with_capacity(RAW_BUFFER_CAPACITY)));
        let (requests, queue) = mpsc::channel(config.queue_capacity.max(1));
        let writer_task = tokio::spawn(
            Writer {
                writer,
                lines,
                monitor: monitor.clone(),
                link: link.clone(),
                config,
                _child: child,
            }
            .run(queue),
        );

        link.opened(ProtocolKind::Legacy);
        Self {
            link,
            requests,
            monitor,
            banner,
            tasks: Mutex::new(vec![reader_task, writer_task]),
        }
    }

    /// Close without announcing a disconnect, for abandoned probes
    pub fn abandon(&self) {
        self.link.discard();
    }
}

/// Collect lines for the handshake window; blank lines are kept
async fn read_banner(
    lines: &mut mpsc::UnboundedReceiver<String>,
    window: Duration,
) -> Option<String> {
    let deadline = Instant::now() + window;
    let mut banner = Vec::new();
    while let Ok(Some(line)) = tokio::time::timeout_at(deadline, lines.recv()).await {
        banner.push(line);
    }
    if banner.iter().all(|line| line.trim().is_empty()) {
        None
    } else {
        Some(banner.join("\n"))
    }
}

async fn read_lines(
    reader: BoxedReader,
    encoding: ChannelEncoding,
    lines: mpsc::UnboundedSender<String>,
    link: Arc<Link>,
) {
    let cancel = link.cancel_token();
    let mut reader = BufReader::new(reader);
    let reason = loop {
        let mut buf = Vec::new();
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => break "end of stream".to_string(),
            Ok(_) => {
                let line = encoding.decode(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                tracing::trace!(%line, "Line received");
                if lines.send(line).is_err() {
                    return;
                }
            }
            Err(e) => break e.to_string(),
        }
    };
    link.shutdown(DisconnectReason::ConnectionLost(reason));
}

#[async_trait]
impl Communicator for LegacyCommunicator {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Legacy
    }

    fn port(&self) -> &str {
        self.link.port()
    }

    fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    async fn transceive(&self, message: &str, multiline: bool) -> Result<String> {
        if !self.link.is_open() {
            return Err(ConnectionError::Closed.into());
        }
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(Request {
                message: message.to_string(),
                multiline,
                reply,
            })
            .await
            .map_err(|_| ConnectionError::Closed)?;

        answer.await.map_err(|_| ConnectionError::Closed)?
    }

    fn read_message(&self) -> Option<String> {
        self.monitor.lock().pop_front()
    }

    fn handshake_banner(&self) -> Option<String> {
        self.banner.clone()
    }

    async fn close(&self) {
        self.link.shutdown(DisconnectReason::UserRequested);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

impl Drop for LegacyCommunicator {
    fn drop(&mut self) {
        self.link.shutdown(DisconnectReason::UserRequested);
    }
}

struct Writer {
    writer: BoxedWriter,
    lines: mpsc::UnboundedReceiver<String>,
    monitor: Monitor,
    link: Arc<Link>,
    config: LegacyCommunicatorConfig,
    _child: Option<tokio::process::Child>,
}

impl Writer {
    async fn run(mut self, mut queue: mpsc::Receiver<Request>) {
        let cancel = self.link.cancel_token();
        loop {
            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                request = queue.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ConnectionError::Closed.into()),
                result = self.exchange(&request.message, request.multiline) => result,
            };

            let lost = match &result {
                Err(Error::Connection(ConnectionError::ConnectionLost { reason })) => {
                    Some(reason.clone())
                }
                _ => None,
            };
            let _ = request.reply.send(result);
            if let Some(reason) = lost {
                self.link.shutdown(DisconnectReason::ConnectionLost(reason));
                break;
            }
        }
        queue.close();
        let _ = self.writer.shutdown().await;
    }

    /// Move lines nobody asked for to the monitor buffer
    fn drain_stale(&mut self) {
        while let Ok(line) = self.lines.try_recv() {
            if !line.trim().is_empty() {
                tracing::debug!(%line, "Unsolicited line");
                push_monitor(&self.monitor, line);
            }
        }
    }

    async fn exchange(&mut self, message: &str, multiline: bool) -> Result<String> {
        let attempts = self.config.max_retries + 1;
        for attempt in 1..=attempts {
            self.drain_stale();
            self.write(message).await?;
            tracing::debug!(attempt, message, "Line sent");

            let first = match tokio::time::timeout(self.config.timeout, self.first_line()).await {
                Ok(line) => line?,
                Err(_) => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        message,
                        "No answer within {:?}",
                        self.config.timeout
                    );
                    continue;
                }
            };

            let mut answer = vec![first];
            if multiline {
                while let Ok(Some(line)) =
                    tokio::time::timeout(self.config.multiline_gap, self.lines.recv()).await
                {
                    answer.push(line);
                }
                while answer.last().is_some_and(|line| line.trim().is_empty()) {
                    answer.pop();
                }
            }
            return Ok(answer.join("\n"));
        }

        Err(ConnectionError::Timeout {
            timeout_ms: self.config.timeout.as_millis() as u64,
        }
        .into())
    }

    async fn first_line(&mut self) -> Result<String> {
        loop {
            match self.lines.recv().await {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(line),
                None => {
                    return Err(ConnectionError::ConnectionLost {
                        reason: "end of stream".to_string(),
                    }
                    .into())
                }
            }
        }
    }

    async fn write(&mut self, message: &str) -> Result<()> {
        let mut bytes = self.config.encoding.encode(message);
        bytes.push(b'\n');
        let lost = |e: std::io::Error| ConnectionError::ConnectionLost {
            reason: e.to_string(),
        };
        self.writer.write_all(&bytes).await.map_err(lost)?;
        self.writer.flush().await.map_err(lost)?;
        Ok(())
    }
}
