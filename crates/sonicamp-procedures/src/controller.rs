//! Procedure controller
//!
//! Runs at most one procedure at a time. Starting publishes
//! `ProcedureRunning`; a supervisor task runs the procedure, restores the
//! updater and publishes exactly one `ProcedureStopped`, also when the
//! procedure failed or panicked.

use parking_lot::Mutex;
use sonicamp_communication::{CommandCode, SonicAmp};
use sonicamp_core::{
    Error, HoldTime, ProcedureError, ProcedureEvent, ProcedureKind, Result, SonicEvent,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::args::{ArgSchema, ProcedureArgs, RampArgs};
use crate::procedure::{Procedure, ProcedureConfig, ProcedureContext};
use crate::ramp::LocalRamp;
use crate::remote::RemoteProcedure;
use crate::spectrum::{SpectrumMeasure, SpectrumPoint};
use crate::time_series::{Sample, TimeSeries};
use crate::updater::Updater;

type Outcome = Option<Result<()>>;

/// How a device runs ramps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampBinding {
    /// The host sets every frequency.
    Local,
    /// The firmware runs the ramp (`!ramp`).
    Remote,
}

impl RampBinding {
    /// Ramp variant for a device, `None` if it cannot ramp
    ///
    /// Devices with a switching frequency cannot ramp. Devices that advertise
    /// `!ramp` ramp remotely; anything else ramps locally.
    pub fn for_device(device: &SonicAmp) -> Option<Self> {
        if device.has_command(CommandCode::SetSwitchingFrequency) {
            None
        } else if device.has_command(CommandCode::StartRamp) {
            Some(Self::Remote)
        } else if device.has_command(CommandCode::SetFrequency)
            && device.has_command(CommandCode::SetOff)
        {
            Some(Self::Local)
        } else {
            None
        }
    }
}

/// Handle to a started procedure
#[derive(Debug, Clone)]
pub struct ProcedureHandle {
    kind: ProcedureKind,
    cancel: CancellationToken,
    done: watch::Receiver<Outcome>,
}

impl ProcedureHandle {
    /// Which procedure runs
    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    /// Request cancellation; the procedure's cleanup still runs
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the procedure has stopped
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait until the procedure stopped and return its result
    pub async fn wait(&self) -> Result<()> {
        let mut done = self.done.clone();
        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Ok(())),
            Err(_) => Err(Error::other(format!(
                "{} ended without reporting a result",
                self.kind
            ))),
        };
        outcome
    }
}

struct Running {
    id: u64,
    handle: ProcedureHandle,
}

/// Starts, supervises and stops procedures on one device
pub struct ProcedureController {
    device: Arc<SonicAmp>,
    config: ProcedureConfig,
    updater: Mutex<Option<Arc<Updater>>>,
    running: Arc<Mutex<Option<Running>>>,
    spectrum: Arc<Mutex<TimeSeries<SpectrumPoint>>>,
    next_id: AtomicU64,
}

impl ProcedureController {
    /// Controller with default timing
    pub fn new(device: Arc<SonicAmp>) -> Self {
        Self::with_config(device, ProcedureConfig::default())
    }

    /// Controller with the given timing
    pub fn with_config(device: Arc<SonicAmp>, config: ProcedureConfig) -> Self {
        Self {
            device,
            config,
            updater: Mutex::new(None),
            running: Arc::new(Mutex::new(None)),
            spectrum: Arc::new(Mutex::new(TimeSeries::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Pause `updater` while procedures run
    pub fn set_updater(&self, updater: Arc<Updater>) {
        *self.updater.lock() = Some(updater);
    }

    /// The controlled device
    pub fn device(&self) -> &Arc<SonicAmp> {
        &self.device
    }

    /// Whether a procedure is running
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Kind of the running procedure
    pub fn running_procedure(&self) -> Option<ProcedureKind> {
        self.running.lock().as_ref().map(|r| r.handle.kind)
    }

    /// Whether the device can run `kind`
    pub fn is_available(&self, kind: ProcedureKind) -> bool {
        let device = &self.device;
        match kind {
            ProcedureKind::Ramp => RampBinding::for_device(device).is_some(),
            ProcedureKind::Scan => device.has_command(CommandCode::StartScan),
            ProcedureKind::Tune => device.has_command(CommandCode::StartTune),
            ProcedureKind::Wipe => device.has_command(CommandCode::StartWipe),
            ProcedureKind::Auto => device.has_command(CommandCode::StartAuto),
            ProcedureKind::SpectrumMeasure => {
                device.has_command(CommandCode::SetFrequency)
                    && device.has_command(CommandCode::Dash)
            }
        }
    }

    /// Procedures the device can run
    pub fn available_procedures(&self) -> Vec<ProcedureKind> {
        ProcedureKind::ALL
            .into_iter()
            .filter(|kind| self.is_available(*kind))
            .collect()
    }

    /// Argument schemas of the available procedures
    pub fn schemas(&self) -> Vec<ArgSchema> {
        self.available_procedures()
            .into_iter()
            .map(ArgSchema::for_kind)
            .collect()
    }

    /// Last spectrum measurement, oldest point first
    pub fn spectrum(&self) -> Vec<Sample<SpectrumPoint>> {
        self.spectrum.lock().to_vec()
    }

    /// Validate arguments and pick the procedure implementation
    pub fn bind(&self, args: &ProcedureArgs) -> Result<Box<dyn Procedure>> {
        args.validate()?;
        let kind = args.kind();
        if !self.is_available(kind) {
            return Err(ProcedureError::NotAvailable {
                procedure: kind.to_string(),
            }
            .into());
        }

        let procedure: Box<dyn Procedure> = match args {
            ProcedureArgs::Ramp(ramp) => match RampBinding::for_device(&self.device) {
                Some(RampBinding::Remote) => Box::new(RemoteProcedure::ramp(ramp)),
                _ => Box::new(LocalRamp::new(ramp.clone())),
            },
            ProcedureArgs::Scan(scan) => Box::new(RemoteProcedure::scan(scan)),
            ProcedureArgs::Tune(tune) => Box::new(RemoteProcedure::tune(tune)),
            ProcedureArgs::Wipe(wipe) => Box::new(RemoteProcedure::wipe(wipe)),
            ProcedureArgs::Auto(auto) => Box::new(RemoteProcedure::auto(auto)),
            ProcedureArgs::SpectrumMeasure(spectrum) => Box::new(SpectrumMeasure::new(
                spectrum.clone(),
                self.spectrum.clone(),
            )),
        };
        Ok(procedure)
    }

    /// Start a procedure from its arguments
    pub fn start(&self, args: ProcedureArgs) -> Result<ProcedureHandle> {
        self.ensure_idle()?;
        let procedure = self.bind(&args)?;
        self.start_procedure(procedure)
    }

    /// Start a procedure from JSON arguments
    pub fn start_json(&self, kind: ProcedureKind, args: serde_json::Value) -> Result<ProcedureHandle> {
        self.start(ProcedureArgs::from_json(kind, args)?)
    }

    /// Start any procedure under this controller's supervision
    pub fn start_procedure(&self, procedure: Box<dyn Procedure>) -> Result<ProcedureHandle> {
        let kind = procedure.kind();
        let (done_tx, done_rx) = watch::channel(None);
        let handle = ProcedureHandle {
            kind,
            cancel: CancellationToken::new(),
            done: done_rx,
        };
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut running = self.running.lock();
            if let Some(current) = running.as_ref() {
                return Err(ProcedureError::Busy {
                    running: current.handle.kind.to_string(),
                }
                .into());
            }
            *running = Some(Running {
                id,
                handle: handle.clone(),
            });
        }

        tracing::info!(procedure = %kind, "Procedure running");
        self.device
            .bus()
            .emit(SonicEvent::Procedure(ProcedureEvent::Running { procedure: kind }));

        let ctx = ProcedureContext {
            device: self.device.clone(),
            updater: self.updater.lock().clone(),
            cancel: handle.cancel.clone(),
            config: self.config.clone(),
        };
        tokio::spawn(supervise(procedure, ctx, self.running.clone(), id, done_tx));
        Ok(handle)
    }

    /// Start a procedure and wait for it to stop
    pub async fn run(&self, args: ProcedureArgs) -> Result<()> {
        self.start(args)?.wait().await
    }

    /// Cancel the running procedure and wait for its cleanup
    pub async fn stop(&self) {
        let handle = self.running.lock().as_ref().map(|r| r.handle.clone());
        if let Some(handle) = handle {
            tracing::info!(procedure = %handle.kind, "Stopping procedure");
            handle.cancel();
            if let Err(e) = handle.wait().await {
                tracing::debug!(error = %e, "Stopped procedure reported an error");
            }
        }
    }

    /// Ramp around `center` and wait for it
    pub async fn ramp_freq(
        &self,
        center: u32,
        half_range: u32,
        step: u32,
        hold_on: HoldTime,
        hold_off: HoldTime,
    ) -> Result<()> {
        let args = RampArgs::centered(center, half_range, step, hold_on, hold_off);
        self.run(ProcedureArgs::Ramp(args)).await
    }

    /// Ramp from `start` to `stop` and wait for it
    pub async fn ramp_freq_range(
        &self,
        start: u32,
        stop: u32,
        step: u32,
        hold_on: HoldTime,
        hold_off: HoldTime,
    ) -> Result<()> {
        let args = RampArgs {
            start,
            stop,
            step,
            hold_on,
            hold_off,
        };
        self.run(ProcedureArgs::Ramp(args)).await
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.running.lock().as_ref() {
            Some(current) => Err(ProcedureError::Busy {
                running: current.handle.kind.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ProcedureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureController")
            .field("running", &self.running_procedure())
            .field("config", &self.config)
            .finish()
    }
}

async fn supervise(
    procedure: Box<dyn Procedure>,
    ctx: ProcedureContext,
    running: Arc<Mutex<Option<Running>>>,
    id: u64,
    done: watch::Sender<Outcome>,
) {
    let kind = procedure.kind();
    let device = ctx.device.clone();

    let paused = match &ctx.updater {
        Some(updater) if updater.is_running() => {
            updater.stop().await;
            Some(updater.clone())
        }
        _ => None,
    };

    let result = match tokio::spawn(async move { procedure.execute(&ctx).await }).await {
        Ok(result) => result,
        Err(e) => Err(Error::other(format!("{kind} task failed: {e}"))),
    };

    if let Some(updater) = paused {
        if device.is_connected() {
            updater.start();
        }
    }

    {
        let mut running = running.lock();
        if running.as_ref().is_some_and(|r| r.id == id) {
            *running = None;
        }
    }

    match &result {
        Ok(()) => tracing::info!(procedure = %kind, "Procedure stopped"),
        Err(e) => tracing::warn!(procedure = %kind, error = %e, "Procedure failed"),
    }
    device.bus().emit(SonicEvent::Procedure(ProcedureEvent::Stopped {
        procedure: kind,
        error: result.as_ref().err().map(ToString::to_string),
    }));
    done.send_replace(Some(result));
}
