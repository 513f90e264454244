//! Spectrum measurement
//!
//! Sweeps the frequency locally with the signal on and records the status at
//! every step. Measurements go through the updater when one is registered so
//! its history and `update` events see them too.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sonicamp_core::{ProcedureKind, Result, Status};
use std::sync::Arc;

use crate::args::SpectrumArgs;
use crate::procedure::{Procedure, ProcedureContext};
use crate::time_series::TimeSeries;

/// One measured point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPoint {
    /// Frequency that was set, in Hz.
    pub frequency: u32,
    /// Gain reported by the device.
    pub gain: u32,
    /// RMS voltage.
    pub urms: f64,
    /// RMS current.
    pub irms: f64,
    /// Phase.
    pub phase: f64,
    /// Temperature in degree Celsius.
    pub temperature: f64,
}

impl SpectrumPoint {
    fn measured(frequency: u32, status: &Status) -> Self {
        Self {
            frequency,
            gain: status.gain,
            urms: status.urms,
            irms: status.irms,
            phase: status.phase,
            temperature: status.temperature,
        }
    }
}

/// Local sweep that fills a shared time series
#[derive(Debug, Clone)]
pub struct SpectrumMeasure {
    args: SpectrumArgs,
    spectrum: Arc<Mutex<TimeSeries<SpectrumPoint>>>,
}

impl SpectrumMeasure {
    /// Create a measurement writing into `spectrum`
    pub fn new(args: SpectrumArgs, spectrum: Arc<Mutex<TimeSeries<SpectrumPoint>>>) -> Self {
        Self { args, spectrum }
    }

    async fn measure(&self, ctx: &ProcedureContext, frequency: u32) -> Result<Status> {
        let status = match &ctx.updater {
            Some(updater) => updater.update().await?,
            None => ctx.device.get_status().await?,
        };
        self.spectrum
            .lock()
            .push(SpectrumPoint::measured(frequency, &status));
        Ok(status)
    }

    async fn sweep(&self, ctx: &ProcedureContext) -> Result<()> {
        if let Some(gain) = self.args.gain {
            ctx.device.set_gain(gain).await?;
        }
        ctx.device.set_signal_on().await?;
        for frequency in self.args.values() {
            if ctx.is_cancelled() {
                break;
            }
            ctx.device.set_frequency(frequency).await?;
            if !ctx.hold(self.args.hold).await {
                break;
            }
            self.measure(ctx, frequency).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Procedure for SpectrumMeasure {
    fn kind(&self) -> ProcedureKind {
        ProcedureKind::SpectrumMeasure
    }

    async fn execute(&self, ctx: &ProcedureContext) -> Result<()> {
        self.spectrum.lock().clear();
        let swept = self.sweep(ctx).await;
        let off = ctx.device.set_signal_off().await;
        tracing::info!(points = self.spectrum.lock().len(), "Spectrum measured");
        swept?;
        off.map(|_| ())
    }
}
