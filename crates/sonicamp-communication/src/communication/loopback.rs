//! In-memory transport with a scripted device
//!
//! Every `open` creates a fresh duplex pipe and spawns a task playing the
//! device: it reads each line the host writes, records it, and answers
//! with whatever the responder returns. Useful for simulation and as the
//! device stub in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use sonicamp_core::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio_util::sync::CancellationToken;

use super::encoding::ChannelEncoding;
use super::package::PackageParser;
use super::{ConnectionFactory, Transport};

/// Answers one request body; `None` stays silent
pub type Responder = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Which protocol the simulated device speaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopbackMode {
    /// Framed packages; answers echo the request id.
    Sonic,
    /// Plain lines, preceded by a banner written right after opening.
    Legacy {
        /// Banner text; may span several lines.
        banner: String,
    },
}

/// Connection factory backed by a scripted in-memory device
#[derive(Clone)]
pub struct LoopbackConnectionFactory {
    mode: LoopbackMode,
    responder: Responder,
    written: Arc<Mutex<Vec<String>>>,
    baud_rates: Arc<Mutex<Vec<u32>>>,
    hangup: CancellationToken,
}

impl LoopbackConnectionFactory {
    /// Create a factory for the given mode and responder
    pub fn new<F>(mode: LoopbackMode, responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            mode,
            responder: Arc::new(responder),
            written: Arc::new(Mutex::new(Vec::new())),
            baud_rates: Arc::new(Mutex::new(Vec::new())),
            hangup: CancellationToken::new(),
        }
    }

    /// A framed device
    pub fn sonic<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::new(LoopbackMode::Sonic, responder)
    }

    /// A legacy device that greets with `banner`
    pub fn legacy<F>(banner: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::new(
            LoopbackMode::Legacy {
                banner: banner.into(),
            },
            responder,
        )
    }

    /// Use `token` to hang up; lets a responder drop the line itself
    pub fn with_hangup(mut self, token: CancellationToken) -> Self {
        self.hangup = token;
        self
    }

    /// Drop the device end of every open pipe
    pub fn hangup(&self) {
        self.hangup.cancel();
    }

    /// Request bodies received so far, in order
    ///
    /// For framed devices this is the package content, for legacy devices
    /// the raw line. Lines that are not valid frames are recorded verbatim.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    /// Baud rates requested by each `open`
    pub fn baud_rates(&self) -> Vec<u32> {
        self.baud_rates.lock().clone()
    }
}

impl std::fmt::Debug for LoopbackConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackConnectionFactory")
            .field("mode", &self.mode)
            .field("written", &self.written.lock().len())
            .finish()
    }
}

#[async_trait]
impl ConnectionFactory for LoopbackConnectionFactory {
    async fn open(&self, baud_rate: u32) -> Result<Transport> {
        self.baud_rates.lock().push(baud_rate);
        let (host, device) = tokio::io::duplex(PIPE_CAPACITY);
        tokio::spawn(simulate(
            device,
            self.mode.clone(),
            self.responder.clone(),
            self.written.clone(),
            self.hangup.clone(),
        ));

        let (reader, writer) = tokio::io::split(host);
        Ok(Transport {
            reader: Box::new(reader),
            writer: Box::new(writer),
            name: self.name(),
            child: None,
        })
    }

    fn name(&self) -> String {
        "loopback".to_string()
    }
}

async fn simulate(
    device: DuplexStream,
    mode: LoopbackMode,
    responder: Responder,
    written: Arc<Mutex<Vec<String>>>,
    hangup: CancellationToken,
) {
    let parser = PackageParser::new(ChannelEncoding::Utf8);
    let (reader, mut writer) = tokio::io::split(device);
    let mut reader = BufReader::new(reader);

    if let LoopbackMode::Legacy { banner } = &mode {
        if !banner.is_empty() && writer.write_all(format!("{banner}\n").as_bytes()).await.is_err()
        {
            return;
        }
    }

    loop {
        let mut line = String::new();
        let read = tokio::select! {
            _ = hangup.cancelled() => break,
            read = reader.read_line(&mut line) => read,
        };
        match read {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end_matches(['\r', '\n']);

        let reply = match &mode {
            LoopbackMode::Legacy { .. } => {
                written.lock().push(line.to_string());
                responder(line).map(|body| format!("{}\n", body.trim_end_matches('\n')))
            }
            LoopbackMode::Sonic => match parser.parse(line) {
                Ok(request) => {
                    written.lock().push(request.content.clone());
                    responder(&request.content).map(|body| {
                        let answer =
                            parser.package(request.source, request.destination, request.id, &body);
                        answer.to_string() + "\n"
                    })
                }
                Err(_) => {
                    // framed firmware rejects plain lines with a framed error
                    written.lock().push(line.to_string());
                    Some(parser.package(0, 0, 0, "20006#").to_string() + "\n")
                }
            },
        };

        if hangup.is_cancelled() {
            break;
        }
        if let Some(reply) = reply {
            if writer.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    }
    tracing::debug!("Loopback device hung up");
}
