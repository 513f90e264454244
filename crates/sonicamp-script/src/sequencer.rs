//! Script sequencer
//!
//! Executes a parsed [`Script`] against a device, one instruction at a
//! time. Ramps run through the procedure controller and block the script
//! until they stop. The sequencer yields between instructions, so even an
//! empty infinite loop can be cancelled.

use parking_lot::Mutex;
use sonicamp_communication::SonicAmp;
use sonicamp_core::{
    ConnectionError, ConnectionEvent, Error, EventKind, Result, ScriptError, ScriptEvent,
    SonicEvent, SubscriptionId,
};
use sonicamp_procedures::{ProcedureArgs, ProcedureController, RampArgs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::parser::{Instruction, LoopCount, Script, ScriptLine};

const IDLE: &str = "idle";

type Outcome = Option<Result<()>>;

/// Where the sequencer is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Source line of the current instruction, `None` when idle.
    pub line: Option<usize>,
    /// The current instruction as text.
    pub task: String,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            line: None,
            task: IDLE.to_string(),
        }
    }
}

/// Handle to a running script
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    cancel: CancellationToken,
    done: watch::Receiver<Outcome>,
}

impl ScriptHandle {
    /// Request cancellation; the signal is switched off afterwards
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the script has ended
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait for the script to end and return its result
    pub async fn wait(&self) -> Result<()> {
        let mut done = self.done.clone();
        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Ok(())),
            Err(_) => Err(Error::other("script ended without reporting a result")),
        };
        outcome
    }
}

struct Running {
    id: u64,
    handle: ScriptHandle,
}

/// Runs scripts on one device, one at a time
pub struct Sequencer {
    device: Arc<SonicAmp>,
    controller: Arc<ProcedureController>,
    progress: Arc<watch::Sender<Progress>>,
    running: Arc<Mutex<Option<Running>>>,
    next_id: AtomicU64,
}

impl Sequencer {
    /// Sequencer for `device`; ramps go through `controller`
    pub fn new(device: Arc<SonicAmp>, controller: Arc<ProcedureController>) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            device,
            controller,
            progress: Arc::new(progress),
            running: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether a script is executing
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Source line being executed
    pub fn current_line(&self) -> Option<usize> {
        self.progress.borrow().line
    }

    /// Instruction being executed, `idle` otherwise
    pub fn current_task(&self) -> String {
        self.progress.borrow().task.clone()
    }

    /// Watch line and task changes
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Parse `source` and start it
    pub fn start_source(&self, source: &str) -> Result<ScriptHandle> {
        self.start(Script::parse(source)?)
    }

    /// Start executing `script`
    pub fn start(&self, script: Script) -> Result<ScriptHandle> {
        let (done_tx, done_rx) = watch::channel(None);
        let handle = ScriptHandle {
            cancel: CancellationToken::new(),
            done: done_rx,
        };
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut running = self.running.lock();
            if running.is_some() {
                return Err(ScriptError::AlreadyRunning.into());
            }
            *running = Some(Running {
                id,
                handle: handle.clone(),
            });
        }

        let bus = self.device.bus();
        let disconnected = Arc::new(AtomicBool::new(false));
        let subscription = {
            let disconnected = disconnected.clone();
            let cancel = handle.cancel.clone();
            let port = self.device.communicator().port().to_string();
            bus.subscribe(EventKind::Disconnected, move |event| {
                if let SonicEvent::Connection(ConnectionEvent::Disconnected { port: lost, .. }) =
                    event
                {
                    if *lost == port {
                        disconnected.store(true, Ordering::SeqCst);
                        cancel.cancel();
                    }
                }
            })
        };

        tracing::info!(instructions = script.len(), "Script started");
        bus.emit(SonicEvent::Script(ScriptEvent::Started {
            instructions: script.len(),
        }));

        let runner = Runner {
            device: self.device.clone(),
            controller: self.controller.clone(),
            cancel: handle.cancel.clone(),
            progress: self.progress.clone(),
            disconnected,
        };
        tokio::spawn(supervise(
            runner,
            script,
            subscription,
            self.running.clone(),
            id,
            done_tx,
        ));
        Ok(handle)
    }

    /// Execute `script` and wait for it to end
    pub async fn run(&self, script: Script) -> Result<()> {
        self.start(script)?.wait().await
    }

    /// Cancel the running script and wait until the signal is off
    pub async fn cancel(&self) {
        let handle = self.running.lock().as_ref().map(|r| r.handle.clone());
        if let Some(handle) = handle {
            tracing::info!("Cancelling script");
            handle.cancel();
            if let Err(e) = handle.wait().await {
                tracing::debug!(error = %e, "Cancelled script reported an error");
            }
        }
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("running", &self.is_running())
            .field("progress", &*self.progress.borrow())
            .finish()
    }
}

struct Runner {
    device: Arc<SonicAmp>,
    controller: Arc<ProcedureController>,
    cancel: CancellationToken,
    progress: Arc<watch::Sender<Progress>>,
    disconnected: Arc<AtomicBool>,
}

impl Runner {
    async fn execute(&self, script: &Script) -> Result<()> {
        // remaining passes, indexed like the script; set at every startloop
        let mut remaining: Vec<Option<LoopCount>> = (0..script.len())
            .map(|index| {
                script
                    .loop_at(index)
                    .filter(|span| span.begin == index)
                    .map(|span| span.count)
            })
            .collect();

        let mut pc = 0;
        while let Some(line) = script.get(pc) {
            if self.cancel.is_cancelled() {
                break;
            }
            self.advance(line);

            pc = match &line.instruction {
                Instruction::LoopBegin(_) => {
                    let span = script
                        .loop_at(pc)
                        .ok_or_else(|| Error::other(format!("unpaired loop at line {}", line.line)))?;
                    match remaining[pc] {
                        Some(LoopCount::Times(0)) => span.end + 1,
                        Some(LoopCount::Times(n)) => {
                            remaining[pc] = Some(LoopCount::Times(n - 1));
                            pc + 1
                        }
                        _ => pc + 1,
                    }
                }
                Instruction::LoopEnd => {
                    let span = script
                        .loop_at(pc)
                        .ok_or_else(|| Error::other(format!("unpaired loop at line {}", line.line)))?;
                    for inner in script
                        .loops()
                        .filter(|inner| inner.begin > span.begin && inner.end < span.end)
                    {
                        remaining[inner.begin] = Some(inner.count);
                    }
                    span.begin
                }
                instruction => {
                    self.dispatch(instruction).await?;
                    pc + 1
                }
            };
            tokio::task::yield_now().await;
        }

        if self.disconnected.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionLost {
                reason: format!("{} disconnected during script", self.device.communicator().port()),
            }
            .into());
        }
        Ok(())
    }

    fn advance(&self, line: &ScriptLine) {
        let task = line.instruction.to_string();
        tracing::debug!(line = line.line, %task, "Script line");
        self.progress.send_replace(Progress {
            line: Some(line.line),
            task: task.clone(),
        });
        self.device
            .bus()
            .emit(SonicEvent::Script(ScriptEvent::LineAdvanced {
                line: line.line,
                task,
            }));
    }

    async fn dispatch(&self, instruction: &Instruction) -> Result<()> {
        let device = &self.device;
        match instruction {
            Instruction::SetFrequency(frequency) => {
                device.set_frequency(*frequency).await?;
            }
            Instruction::SetGain(gain) => {
                device.set_gain(*gain).await?;
            }
            Instruction::SignalOn => {
                device.set_signal_on().await?;
            }
            Instruction::SignalOff => {
                device.set_signal_off().await?;
            }
            Instruction::SignalAuto => {
                device.set_signal_auto().await?;
            }
            Instruction::Hold(time) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(time.to_duration()) => {}
                }
            }
            Instruction::RampFreq { .. } | Instruction::RampFreqRange(_) => {
                if let Some(args) = instruction.ramp_args() {
                    self.ramp(args).await?;
                }
            }
            Instruction::Raw(text) => {
                let answer = device.execute_raw(text).await?;
                tracing::info!(command = %text, %answer, "Script command answered");
            }
            Instruction::LoopBegin(_) | Instruction::LoopEnd => {}
        }
        Ok(())
    }

    async fn ramp(&self, args: RampArgs) -> Result<()> {
        let handle = self.controller.start(ProcedureArgs::Ramp(args))?;
        tokio::select! {
            result = handle.wait() => result,
            _ = self.cancel.cancelled() => {
                handle.cancel();
                handle.wait().await
            }
        }
    }

    async fn switch_off(&self) {
        if !self.device.is_connected() {
            return;
        }
        if let Err(e) = self.device.set_signal_off().await {
            tracing::warn!(error = %e, "Could not switch the signal off after the script");
        }
    }
}

async fn supervise(
    runner: Runner,
    script: Script,
    subscription: SubscriptionId,
    running: Arc<Mutex<Option<Running>>>,
    id: u64,
    done: watch::Sender<Outcome>,
) {
    let result = runner.execute(&script).await;
    if result.is_err() || runner.cancel.is_cancelled() {
        runner.switch_off().await;
    }

    let bus = runner.device.bus();
    bus.unsubscribe(subscription);
    {
        let mut running = running.lock();
        if running.as_ref().is_some_and(|r| r.id == id) {
            *running = None;
        }
    }
    runner.progress.send_replace(Progress::default());

    match &result {
        Ok(()) if runner.cancel.is_cancelled() => tracing::info!("Script cancelled"),
        Ok(()) => tracing::info!("Script finished"),
        Err(e) => tracing::warn!(error = %e, "Script failed"),
    }
    bus.emit(SonicEvent::Script(ScriptEvent::Finished {
        error: result.as_ref().err().map(ToString::to_string),
    }));
    done.send_replace(Some(result));
}
