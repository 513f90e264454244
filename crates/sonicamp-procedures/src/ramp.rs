//! Frequency ramp driven from the host

use async_trait::async_trait;
use sonicamp_core::{ProcedureKind, Result};

use crate::args::RampArgs;
use crate::procedure::{Procedure, ProcedureContext};

/// Ramp that sets every frequency itself
///
/// With a non-zero `hold_off` each frequency is pulsed: signal on for
/// `hold_on`, then off for `hold_off`. Otherwise the signal is left as it is
/// and the ramp only waits `hold_on`. The signal is switched off when the
/// ramp ends, whether it completed, failed or was cancelled.
#[derive(Debug, Clone)]
pub struct LocalRamp {
    args: RampArgs,
}

impl LocalRamp {
    /// Create a ramp
    pub fn new(args: RampArgs) -> Self {
        Self { args }
    }

    /// The ramp's arguments
    pub fn args(&self) -> &RampArgs {
        &self.args
    }

    async fn sweep(&self, ctx: &ProcedureContext) -> Result<()> {
        let pulsed = !self.args.hold_off.is_zero();
        for frequency in self.args.values() {
            if ctx.is_cancelled() {
                return Ok(());
            }
            tracing::debug!(frequency, "Ramp step");
            ctx.device.set_frequency(frequency).await?;
            if pulsed {
                ctx.device.set_signal_on().await?;
            }
            if !ctx.hold(self.args.hold_on).await {
                return Ok(());
            }
            if pulsed {
                ctx.device.set_signal_off().await?;
                if !ctx.hold(self.args.hold_off).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Procedure for LocalRamp {
    fn kind(&self) -> ProcedureKind {
        ProcedureKind::Ramp
    }

    async fn execute(&self, ctx: &ProcedureContext) -> Result<()> {
        tracing::info!(
            start = self.args.start,
            stop = self.args.stop,
            step = self.args.step,
            "Starting local ramp"
        );
        let swept = self.sweep(ctx).await;
        let off = ctx.device.set_signal_off().await;
        swept?;
        off.map(|_| ())
    }
}
