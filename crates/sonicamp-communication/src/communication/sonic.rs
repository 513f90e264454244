//! Framed communicator
//!
//! A single writer task owns the write half and serves requests one at a
//! time: it stamps a fresh id, writes the frame, and waits for the fetcher
//! to deliver the answer with that id. Attempts that time out are retried
//! with a new id; when all attempts fail the connection is closed.

use async_trait::async_trait;
use parking_lot::Mutex;
use sonicamp_core::{
    ConnectionError, DisconnectReason, Error, EventBus, ProtocolKind, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::encoding::ChannelEncoding;
use super::fetcher::{DeviceLogSink, PackageFetcher, TracingLogSink};
use super::package::PackageParser;
use super::{BoxedWriter, Communicator, ConnectionFactory, Link, Transport, SONIC_BAUD_RATE};

/// Configuration for the framed communicator
#[derive(Debug, Clone)]
pub struct SonicCommunicatorConfig {
    /// Time to wait for an answer per attempt.
    pub timeout: Duration,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Destination id written into every frame.
    pub destination: u32,
    /// Source id written into every frame.
    pub source: u32,
    /// Id of the first frame.
    pub first_id: u16,
    /// Channel encoding.
    pub encoding: ChannelEncoding,
    /// Baud rate used when opening serial ports.
    pub baud_rate: u32,
    /// Requests that may wait behind the one in flight.
    pub queue_capacity: usize,
}

impl Default for SonicCommunicatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            max_attempts: 3,
            destination: 0,
            source: 0,
            first_id: 0,
            encoding: ChannelEncoding::platform_default(),
            baud_rate: SONIC_BAUD_RATE,
            queue_capacity: 32,
        }
    }
}

struct Request {
    message: String,
    reply: oneshot::Sender<Result<String>>,
}

/// Communicator for the framed protocol
pub struct SonicCommunicator {
    link: Arc<Link>,
    requests: mpsc::Sender<Request>,
    fetcher: Arc<PackageFetcher>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SonicCommunicator {
    /// Open a transport and start the reader and writer tasks
    pub async fn open(
        factory: &dyn ConnectionFactory,
        config: SonicCommunicatorConfig,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        let transport = factory.open(config.baud_rate).await?;
        Ok(Self::start(transport, config, bus, Arc::new(TracingLogSink)))
    }

    /// Start the reader and writer tasks on an open transport
    pub fn start(
        transport: Transport,
        config: SonicCommunicatorConfig,
        bus: Arc<EventBus>,
        log_sink: Arc<dyn DeviceLogSink>,
    ) -> Self {
        let Transport {
            reader,
            writer,
            name,
            child,
        } = transport;

        let link = Link::new(name, bus);
        let parser = PackageParser::new(config.encoding);
        let fetcher = Arc::new(PackageFetcher::new(parser, log_sink));
        let (requests, queue) = mpsc::channel(config.queue_capacity.max(1));

        let reader_task = {
            let link = link.clone();
            let fetcher = fetcher.clone();
            let cancel = link.cancel_token();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => fetcher.close(),
                    err = fetcher.run(reader) => {
                        link.shutdown(DisconnectReason::ConnectionLost(err.to_string()));
                    }
                }
            })
        };

        let writer_task = {
            let worker = Writer {
                writer,
                parser,
                fetcher: fetcher.clone(),
                link: link.clone(),
                next_id: config.first_id,
                config,
                _child: child,
            };
            tokio::spawn(worker.run(queue))
        };

        link.opened(ProtocolKind::Sonic);
        Self {
            link,
            requests,
            fetcher,
            tasks: Mutex::new(vec![reader_task, writer_task]),
        }
    }
}

#[async_trait]
impl Communicator for SonicCommunicator {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Sonic
    }

    fn port(&self) -> &str {
        self.link.port()
    }

    fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    async fn transceive(&self, message: &str, _multiline: bool) -> Result<String> {
        if !self.link.is_open() {
            return Err(ConnectionError::Closed.into());
        }
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(Request {
                message: message.to_string(),
                reply,
            })
            .await
            .map_err(|_| ConnectionError::Closed)?;

        answer.await.map_err(|_| ConnectionError::Closed)?
    }

    fn read_message(&self) -> Option<String> {
        self.fetcher.pop_message()
    }

    async fn close(&self) {
        self.link.shutdown(DisconnectReason::UserRequested);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

impl SonicCommunicator {
    /// Close without announcing a disconnect, for abandoned probes
    pub fn abandon(&self) {
        self.link.discard();
    }
}

impl Drop for SonicCommunicator {
    fn drop(&mut self) {
        self.link.shutdown(DisconnectReason::UserRequested);
    }
}

struct Writer {
    writer: BoxedWriter,
    parser: PackageParser,
    fetcher: Arc<PackageFetcher>,
    link: Arc<Link>,
    next_id: u16,
    config: SonicCommunicatorConfig,
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
                result = self.exchange(&request.message) => result,
            };

            let fatal = match &result {
                Err(Error::Connection(ConnectionError::ConnectionLost { reason })) => {
                    Some(DisconnectReason::ConnectionLost(reason.clone()))
                }
                _ => None,
            };
            let _ = request.reply.send(result);
            if let Some(reason) = fatal {
                self.link.shutdown(reason);
                break;
            }
        }
        // fail everything still queued
        queue.close();
        let _ = self.writer.shutdown().await;
    }

    async fn exchange(&mut self, message: &str) -> Result<String> {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);

            let package =
                self.parser
                    .package(self.config.destination, self.config.source, id, message);
            let bytes = self.parser.write(&package);
            self.write(&bytes).await?;
            tracing::debug!(id, attempt, message, "Package sent");

            match tokio::time::timeout(self.config.timeout, self.fetcher.get_answer_of_package(id))
                .await
            {
                Ok(answer) => return answer,
                Err(_) => {
                    self.fetcher.forget(id);
                    tracing::warn!(
                        id,
                        attempt,
                        attempts,
                        message,
                        "No answer within {:?}",
                        self.config.timeout
                    );
                }
            }
        }

        Err(ConnectionError::ConnectionLost {
            reason: format!("no answer to {:?} after {} attempts", message, attempts),
        }
        .into())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let lost = |e: std::io::Error| ConnectionError::ConnectionLost {
            reason: e.to_string(),
        };
        self.writer.write_all(bytes).await.map_err(lost)?;
        self.writer.flush().await.map_err(lost)?;
        Ok(())
    }
}
