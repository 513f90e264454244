//! The procedure seam and what a running procedure may use

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sonicamp_communication::SonicAmp;
use sonicamp_core::{HoldTime, ProcedureKind, Result};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::updater::Updater;

/// Timing of remote procedures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcedureConfig {
    /// Pause between status polls while waiting for a remote procedure.
    pub poll_interval_ms: u64,
    /// Upper bound for a remote procedure to finish; `None` waits forever.
    pub finish_timeout_ms: Option<u64>,
    /// How long a stopped remote procedure may take to report completion.
    pub stop_timeout_ms: u64,
}

impl Default for ProcedureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            finish_timeout_ms: None,
            stop_timeout_ms: 10_000,
        }
    }
}

impl ProcedureConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Finish timeout as a duration
    pub fn finish_timeout(&self) -> Option<Duration> {
        self.finish_timeout_ms.map(Duration::from_millis)
    }

    /// Stop timeout as a duration
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Handles a procedure works with
#[derive(Clone)]
pub struct ProcedureContext {
    /// The device to drive.
    pub device: Arc<SonicAmp>,
    /// Status poller, used for measurements; paused while the procedure runs.
    pub updater: Option<Arc<Updater>>,
    /// Cancelled when the procedure should stop.
    pub cancel: CancellationToken,
    /// Timing settings.
    pub config: ProcedureConfig,
}

impl ProcedureContext {
    /// Context without an updater and with default timing
    pub fn new(device: Arc<SonicAmp>, cancel: CancellationToken) -> Self {
        Self {
            device,
            updater: None,
            cancel,
            config: ProcedureConfig::default(),
        }
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for `time`; returns `false` if cancelled first
    pub async fn hold(&self, time: HoldTime) -> bool {
        self.sleep(time.to_duration()).await
    }

    /// Sleep for `duration`; returns `false` if cancelled first
    pub async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

impl std::fmt::Debug for ProcedureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureContext")
            .field("port", &self.device.communicator().port())
            .field("updater", &self.updater.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A unit of long-running device work
///
/// `execute` returns once the work completed or, after cancellation, once
/// the cleanup ran. Cancellation is not an error.
#[async_trait]
pub trait Procedure: Send + Sync {
    /// Which procedure this is
    fn kind(&self) -> ProcedureKind;

    /// Run to completion or cancellation
    async fn execute(&self, ctx: &ProcedureContext) -> Result<()>;
}
