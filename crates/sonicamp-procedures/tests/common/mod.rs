#![allow(dead_code)]

use parking_lot::Mutex;
use sonicamp_communication::{
    CommandCode, Info, LoopbackConnectionFactory, ProtocolBuilder, SonicAmp, SonicCommunicator,
    SonicCommunicatorConfig,
};
use sonicamp_core::{EventBus, ProcedureEvent, ProtocolKind, SonicEvent};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Commands of a worker that ramps on the host
pub const LOCAL_WORKER: &[CommandCode] = &[
    CommandCode::GetInfo,
    CommandCode::Dash,
    CommandCode::SetFrequency,
    CommandCode::SetGain,
    CommandCode::SetOn,
    CommandCode::SetOff,
];

/// Commands of a worker with firmware procedures
pub const REMOTE_WORKER: &[CommandCode] = &[
    CommandCode::GetInfo,
    CommandCode::Dash,
    CommandCode::SetFrequency,
    CommandCode::SetGain,
    CommandCode::SetOn,
    CommandCode::SetOff,
    CommandCode::SetRampStartFreq,
    CommandCode::SetRampStopFreq,
    CommandCode::SetRampStep,
    CommandCode::SetRampTon,
    CommandCode::SetRampToff,
    CommandCode::SetScanFCenter,
    CommandCode::SetScanFRange,
    CommandCode::SetScanFStep,
    CommandCode::SetScanTStep,
    CommandCode::StartRamp,
    CommandCode::StartScan,
    CommandCode::StopProcedure,
];

/// Status line with the given frequency, signal and finished flag
pub fn dash(frequency: u32, signal: bool, finished: bool) -> String {
    format!(
        "23#{frequency}#50#{}#0#25.5#1.2#0.3#45.0#{}",
        u8::from(signal),
        u8::from(finished)
    )
}

/// Answers setters by echoing their value
pub fn echo_setter(body: &str) -> Option<String> {
    let (name, value) = body.split_once('=')?;
    let code = match name {
        "!freq" | "!f" => 1050,
        "!g" => 1051,
        "!ramp_start_freq" => 1100,
        "!ramp_stop_freq" => 1101,
        "!ramp_step" => 1102,
        "!ramp_ton" => 1103,
        "!ramp_toff" => 1104,
        "!scan_f_center" => 1110,
        "!scan_f_range" => 1111,
        "!scan_f_step" => 1112,
        "!scan_t_step" => 1113,
        _ => return None,
    };
    Some(format!("{code}#{value}"))
}

/// Answers actions with their code
pub fn echo_action(body: &str) -> Option<String> {
    let answer = match body {
        "!ON" => "1060#1",
        "!OFF" => "1061#0",
        "!ramp" => "1200",
        "!scan" => "1201",
        "!stop" => "1210",
        _ => return None,
    };
    Some(answer.to_string())
}

/// Framed mvp_worker restricted to `commands`, connected without a handshake
pub async fn worker(
    factory: &LoopbackConnectionFactory,
    commands: &[CommandCode],
) -> Arc<SonicAmp> {
    let bus = Arc::new(EventBus::new());
    let communicator =
        SonicCommunicator::open(factory, SonicCommunicatorConfig::default(), bus.clone())
            .await
            .unwrap();
    let mut info = Info::from_banner("mvp_worker v1.0.0", ProtocolKind::Sonic);
    let supported: BTreeSet<CommandCode> = commands.iter().copied().collect();
    let table = ProtocolBuilder::default()
        .build(info.device_type, info.firmware_version, true)
        .restricted_to(&supported);
    info.supported_commands = table.codes().into_iter().collect();
    Arc::new(SonicAmp::new(Arc::new(communicator), info, table, bus))
}

/// Records procedure events as short strings
pub fn record_procedures(bus: &EventBus) -> Arc<Mutex<Vec<String>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    bus.subscribe_all(move |event| {
        if let SonicEvent::Procedure(procedure) = event {
            let text = match procedure {
                ProcedureEvent::Running { procedure } => format!("running {procedure}"),
                ProcedureEvent::Stopped {
                    procedure,
                    error: None,
                } => format!("stopped {procedure}"),
                ProcedureEvent::Stopped {
                    procedure,
                    error: Some(error),
                } => format!("failed {procedure}: {error}"),
            };
            sink.lock().push(text);
        }
    });
    events
}
