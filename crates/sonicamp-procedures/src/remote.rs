//! Procedures the firmware runs on its own
//!
//! The host writes the scoped parameters (`!ramp_*`, `!scan_*`, ...), issues
//! the launcher and polls the status line until `remote_proc_finished` rises
//! from false to true. A flag still raised by an earlier run does not count.
//! A cancelled procedure is stopped with `!stop` and still awaited, bounded
//! by the stop timeout.

use async_trait::async_trait;
use sonicamp_communication::{CommandArgs, CommandCode};
use sonicamp_core::{
    Error, FieldValue, HoldTime, ProcedureError, ProcedureKind, ProtocolError, Result,
};
use tokio::time::Duration;

use crate::args::{AutoArgs, RampArgs, ScanArgs, TuneArgs, WipeArgs};
use crate::procedure::{Procedure, ProcedureContext};

fn millis(time: &HoldTime) -> FieldValue {
    FieldValue::Int(time.as_millis().round() as i64)
}

/// A parameterised procedure delegated to the device
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProcedure {
    kind: ProcedureKind,
    parameters: Vec<(CommandCode, FieldValue)>,
    launch: CommandCode,
}

impl RemoteProcedure {
    /// Ramp run by the firmware
    pub fn ramp(args: &RampArgs) -> Self {
        Self {
            kind: ProcedureKind::Ramp,
            parameters: vec![
                (CommandCode::SetRampStartFreq, args.start.into()),
                (CommandCode::SetRampStopFreq, args.stop.into()),
                (CommandCode::SetRampStep, args.step.into()),
                (CommandCode::SetRampTon, millis(&args.hold_on)),
                (CommandCode::SetRampToff, millis(&args.hold_off)),
            ],
            launch: CommandCode::StartRamp,
        }
    }

    /// Frequency scan
    pub fn scan(args: &ScanArgs) -> Self {
        Self {
            kind: ProcedureKind::Scan,
            parameters: vec![
                (CommandCode::SetScanFCenter, args.center.into()),
                (CommandCode::SetScanFRange, args.range.into()),
                (CommandCode::SetScanFStep, args.step.into()),
                (CommandCode::SetScanTStep, millis(&args.hold)),
            ],
            launch: CommandCode::StartScan,
        }
    }

    /// Resonance tracking
    pub fn tune(args: &TuneArgs) -> Self {
        Self {
            kind: ProcedureKind::Tune,
            parameters: vec![
                (CommandCode::SetTuneFStep, args.step.into()),
                (CommandCode::SetTuneTTime, millis(&args.time)),
                (CommandCode::SetTuneTStep, millis(&args.hold)),
            ],
            launch: CommandCode::StartTune,
        }
    }

    /// Wipe cycle
    pub fn wipe(args: &WipeArgs) -> Self {
        Self {
            kind: ProcedureKind::Wipe,
            parameters: vec![
                (CommandCode::SetWipeFRange, args.range.into()),
                (CommandCode::SetWipeFStep, args.step.into()),
                (CommandCode::SetWipeTOn, millis(&args.hold_on)),
                (CommandCode::SetWipeTOff, millis(&args.hold_off)),
                (CommandCode::SetWipeTPause, millis(&args.pause)),
            ],
            launch: CommandCode::StartWipe,
        }
    }

    /// Automatic tuning
    pub fn auto(_args: &AutoArgs) -> Self {
        Self {
            kind: ProcedureKind::Auto,
            parameters: Vec::new(),
            launch: CommandCode::StartAuto,
        }
    }

    /// Parameters written before launching, in order
    pub fn parameters(&self) -> &[(CommandCode, FieldValue)] {
        &self.parameters
    }

    /// Command that starts the procedure
    pub fn launch(&self) -> CommandCode {
        self.launch
    }

    /// Poll the status line until the device reports completion
    ///
    /// Completion is a raised finished flag seen while `running` is set;
    /// a lowered flag sets it. Returns `false` if `watch_cancel` is set and
    /// cancellation came first.
    async fn await_finished(
        &self,
        ctx: &ProcedureContext,
        watch_cancel: bool,
        mut running: bool,
    ) -> Result<bool> {
        loop {
            if watch_cancel && ctx.is_cancelled() {
                return Ok(false);
            }
            match ctx.device.get_status().await {
                Ok(status) if !status.remote_proc_finished => running = true,
                Ok(_) if running => return Ok(true),
                Ok(_) => tracing::trace!(procedure = %self.kind, "Finished flag not yet lowered"),
                Err(Error::Protocol(ProtocolError::AnswerInvalid { answer, .. })) => {
                    tracing::debug!(%answer, "Ignoring malformed status line");
                }
                Err(e) => return Err(e),
            }

            let interval = ctx.config.poll_interval();
            if watch_cancel {
                if !ctx.sleep(interval).await {
                    return Ok(false);
                }
            } else {
                tokio::time::sleep(interval).await;
            }
        }
    }

    async fn bounded_wait(
        &self,
        ctx: &ProcedureContext,
        watch_cancel: bool,
        running: bool,
        limit: Option<Duration>,
    ) -> Result<bool> {
        let wait = self.await_finished(ctx, watch_cancel, running);
        match limit {
            None => wait.await,
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| {
                    Error::from(ProcedureError::FinishTimeout {
                        procedure: self.kind.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    })
                })
                .and_then(|finished| finished),
        }
    }
}

#[async_trait]
impl Procedure for RemoteProcedure {
    fn kind(&self) -> ProcedureKind {
        self.kind
    }

    async fn execute(&self, ctx: &ProcedureContext) -> Result<()> {
        for (code, value) in &self.parameters {
            if ctx.is_cancelled() {
                return Ok(());
            }
            ctx.device
                .execute(*code, CommandArgs::value(value.clone()))
                .await?;
        }
        if ctx.is_cancelled() {
            return Ok(());
        }

        tracing::info!(procedure = %self.kind, "Launching remote procedure");
        ctx.device.execute(self.launch, CommandArgs::none()).await?;

        if self
            .bounded_wait(ctx, true, false, ctx.config.finish_timeout())
            .await?
        {
            tracing::info!(procedure = %self.kind, "Remote procedure finished");
            return Ok(());
        }

        tracing::info!(procedure = %self.kind, "Stopping remote procedure");
        ctx.device
            .execute(CommandCode::StopProcedure, CommandArgs::none())
            .await?;
        // The next raised flag acknowledges the stop.
        self.bounded_wait(ctx, false, true, Some(ctx.config.stop_timeout()))
            .await
            .map(|_| ())
    }
}
