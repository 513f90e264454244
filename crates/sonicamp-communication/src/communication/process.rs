//! Child process transport
//!
//! Runs an executable that speaks the device protocol on its standard
//! streams, e.g. a firmware simulator. The child is killed when the
//! transport is dropped.

use async_trait::async_trait;
use sonicamp_core::{ConnectionError, Result};
use std::process::Stdio;
use tokio::process::Command;

use super::{ConnectionFactory, Transport};

/// Spawns a child process per connection
#[derive(Debug, Clone)]
pub struct ProcessConnectionFactory {
    program: String,
    args: Vec<String>,
}

impl ProcessConnectionFactory {
    /// Create a factory for the given executable
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn failed(&self, reason: impl Into<String>) -> ConnectionError {
        ConnectionError::FailedToOpen {
            port: self.program.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for ProcessConnectionFactory {
    async fn open(&self, _baud_rate: u32) -> Result<Transport> {
        tracing::debug!(program = %self.program, args = ?self.args, "Spawning device process");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.failed("stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.failed("stdout not captured"))?;

        Ok(Transport {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            name: self.program.clone(),
            child: Some(child),
        })
    }

    fn name(&self) -> String {
        self.program.clone()
    }
}
