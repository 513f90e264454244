//! Package fetcher
//!
//! Reads frames from the transport, routes device log lines, and keeps
//! answer bodies by correlation id until a request collects them.

use parking_lot::Mutex;
use sonicamp_core::{ConnectionError, Result};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Notify;

use super::package::{Package, PackageParser, END_SYMBOL, START_SYMBOL};

/// Raw frames kept for a monitor
pub const RAW_BUFFER_CAPACITY: usize = 100;

const LOG_PREFIX: &str = "LOG=";

/// Severity of a device side log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLogLevel {
    /// ERROR
    Error,
    /// WARN
    Warn,
    /// INFO
    Info,
    /// DEBUG
    Debug,
}

impl FromStr for DeviceLogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "ERROR" => Ok(Self::Error),
            "WARN" => Ok(Self::Warn),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            other => Err(format!("Unknown log level: {}", other)),
        }
    }
}

/// Destination of log lines emitted by the firmware
pub trait DeviceLogSink: Send + Sync {
    /// Record one device log line
    fn log(&self, level: DeviceLogLevel, message: &str);
}

/// Forwards device logs to `tracing` under the `device_log` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl DeviceLogSink for TracingLogSink {
    fn log(&self, level: DeviceLogLevel, message: &str) {
        match level {
            DeviceLogLevel::Error => tracing::error!(target: "device_log", "{}", message),
            DeviceLogLevel::Warn => tracing::warn!(target: "device_log", "{}", message),
            DeviceLogLevel::Info => tracing::info!(target: "device_log", "{}", message),
            DeviceLogLevel::Debug => tracing::debug!(target: "device_log", "{}", message),
        }
    }
}

/// Split a `LOG=<LEVEL>: <msg>` line; unknown levels are logged as info
fn parse_log_line(line: &str) -> Option<(DeviceLogLevel, &str)> {
    let rest = line.strip_prefix(LOG_PREFIX)?;
    let (tag, message) = rest.split_once(':').unwrap_or((rest, ""));
    match tag.parse() {
        Ok(level) => Some((level, message.trim())),
        Err(_) => Some((DeviceLogLevel::Info, rest.trim())),
    }
}

/// Demultiplexes frames by correlation id
pub struct PackageFetcher {
    parser: PackageParser,
    answers: Mutex<HashMap<u16, String>>,
    raw_frames: Mutex<VecDeque<String>>,
    answer_available: Notify,
    closed: AtomicBool,
    log_sink: Arc<dyn DeviceLogSink>,
}

impl PackageFetcher {
    /// Create a fetcher
    pub fn new(parser: PackageParser, log_sink: Arc<dyn DeviceLogSink>) -> Self {
        Self {
            parser,
            answers: Mutex::new(HashMap::new()),
            raw_frames: Mutex::new(VecDeque::with_capacity(RAW_BUFFER_CAPACITY)),
            answer_available: Notify::new(),
            closed: AtomicBool::new(false),
            log_sink,
        }
    }

    /// Read frames until the stream ends
    ///
    /// Returns the reason the stream ended. Malformed frames are logged and
    /// skipped; the reader resynchronizes on the next start symbol.
    pub async fn run<R>(&self, reader: R) -> ConnectionError
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let reason = loop {
            let mut skipped = Vec::new();
            match reader.read_until(START_SYMBOL, &mut skipped).await {
                Ok(0) => break "end of stream".to_string(),
                Ok(_) if skipped.last() != Some(&START_SYMBOL) => {
                    break "end of stream".to_string()
                }
                Ok(_) => {}
                Err(e) => break e.to_string(),
            }
            skipped.pop();
            if skipped.iter().any(|b| !b.is_ascii_whitespace()) {
                tracing::error!(
                    garbage = %self.parser.encoding().decode(&skipped),
                    "Framing error: bytes outside of a package"
                );
            }

            let mut frame = vec![START_SYMBOL];
            match reader.read_until(END_SYMBOL, &mut frame).await {
                Ok(_) if frame.last() == Some(&END_SYMBOL) => {}
                Ok(_) => break "end of stream inside a package".to_string(),
                Err(e) => break e.to_string(),
            }

            match self.parser.parse_bytes(&frame) {
                Ok(package) => self.deliver(package),
                Err(e) => tracing::error!("Malformed package skipped: {}", e),
            }
        };

        tracing::debug!("Package fetcher stopped: {}", reason);
        self.close();
        ConnectionError::ConnectionLost { reason }
    }

    fn deliver(&self, package: Package) {
        let raw = package.to_string();
        {
            let mut raw_frames = self.raw_frames.lock();
            if raw_frames.len() == RAW_BUFFER_CAPACITY {
                raw_frames.pop_front();
            }
            raw_frames.push_back(raw);
        }

        let mut had_logs = false;
        let mut body = Vec::new();
        for line in package.content.lines() {
            if let Some((level, message)) = parse_log_line(line) {
                had_logs = true;
                self.log_sink.log(level, message);
            } else if !line.trim().is_empty() {
                body.push(line);
            }
        }

        // a frame made only of log lines is not an answer
        if had_logs && body.is_empty() {
            return;
        }

        tracing::trace!(id = package.id, "Answer arrived");
        self.answers.lock().insert(package.id, body.join("\n"));
        self.answer_available.notify_waiters();
    }

    /// Wait for the answer with the given id and take it
    pub async fn get_answer_of_package(&self, id: u16) -> Result<String> {
        loop {
            let notified = self.answer_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(body) = self.answers.lock().remove(&id) {
                return Ok(body);
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(ConnectionError::Closed.into());
            }
            notified.await;
        }
    }

    /// Drop a stored answer, e.g. a late reply to an abandoned attempt
    pub fn forget(&self, id: u16) {
        self.answers.lock().remove(&id);
    }

    /// Pop the oldest buffered raw frame
    pub fn pop_message(&self) -> Option<String> {
        self.raw_frames.lock().pop_front()
    }

    /// Wake all waiters with a closed error
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.answer_available.notify_waiters();
    }
}
