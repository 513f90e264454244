//! Status polling loop
//!
//! The updater sends `-` back to back and publishes every merged status as an
//! `update` event. It has no interval of its own; the device's answer latency
//! paces it. Malformed answers and device errors keep the last good status
//! and delay the next poll by [`ERROR_BACKOFF`]; losing the connection ends
//! the loop.

use parking_lot::Mutex;
use sonicamp_communication::SonicAmp;
use sonicamp_core::{DeviceEvent, Result, SonicEvent, Status};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::time_series::{Sample, TimeSeries};

/// Pause after a failed poll
pub const ERROR_BACKOFF: Duration = Duration::from_millis(100);

struct UpdaterTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Polls the device status in a background task
pub struct Updater {
    device: Arc<SonicAmp>,
    history: Arc<Mutex<TimeSeries<Status>>>,
    task: Mutex<Option<UpdaterTask>>,
}

impl Updater {
    /// Create a stopped updater for `device`
    pub fn new(device: Arc<SonicAmp>) -> Self {
        Self {
            device,
            history: Arc::new(Mutex::new(TimeSeries::default())),
            task: Mutex::new(None),
        }
    }

    /// The polled device
    pub fn device(&self) -> &Arc<SonicAmp> {
        &self.device
    }

    /// Poll once, outside of the loop
    pub async fn update(&self) -> Result<Status> {
        poll(&self.device, &self.history).await
    }

    /// Start the loop; returns `false` if it is already running
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            self.device.clone(),
            self.history.clone(),
            cancel.clone(),
        ));
        *task = Some(UpdaterTask { cancel, handle });
        true
    }

    /// Stop the loop and wait for the request in flight
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                tracing::warn!(error = %e, "Updater task failed");
            }
        }
    }

    /// Whether the loop is running
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Recent status snapshots, oldest first
    pub fn history(&self) -> Vec<Sample<Status>> {
        self.history.lock().to_vec()
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("running", &self.is_running())
            .field("history", &self.history.lock().len())
            .finish()
    }
}

async fn poll(device: &SonicAmp, history: &Mutex<TimeSeries<Status>>) -> Result<Status> {
    let status = device.get_status().await?;
    history.lock().push(status.clone());
    device
        .bus()
        .emit(SonicEvent::Device(DeviceEvent::Update(status.clone())));
    Ok(status)
}

async fn run(
    device: Arc<SonicAmp>,
    history: Arc<Mutex<TimeSeries<Status>>>,
    cancel: CancellationToken,
) {
    tracing::debug!("Updater started");
    while !cancel.is_cancelled() {
        match poll(&device, &history).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() || !device.is_connected() => {
                tracing::info!(error = %e, "Updater stopped: connection lost");
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Status poll failed; keeping last status");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
                continue;
            }
        }
        tokio::task::yield_now().await;
    }
    tracing::debug!("Updater stopped");
}
