#![allow(dead_code)]

use parking_lot::Mutex;
use sonicamp_communication::{
    CommandCode, Info, LoopbackConnectionFactory, ProtocolBuilder, SonicAmp, SonicCommunicator,
    SonicCommunicatorConfig,
};
use sonicamp_core::{EventBus, ProtocolKind, ScriptEvent, SonicEvent};
use sonicamp_procedures::ProcedureController;
use sonicamp_script::Sequencer;
use std::collections::BTreeSet;
use std::sync::Arc;

const COMMANDS: &[CommandCode] = &[
    CommandCode::GetInfo,
    CommandCode::Dash,
    CommandCode::SetFrequency,
    CommandCode::SetGain,
    CommandCode::SetOn,
    CommandCode::SetOff,
    CommandCode::SetAuto,
];

/// Framed worker answering every setter with its value
pub fn respond(body: &str) -> Option<String> {
    if let Some((name, value)) = body.split_once('=') {
        let code = match name {
            "!freq" | "!f" => 1050,
            "!g" => 1051,
            _ => return Some("20001#".to_string()),
        };
        return Some(format!("{code}#{value}"));
    }
    let answer = match body {
        "!ON" => "1060#1",
        "!OFF" => "1061#0",
        "!AUTO" => "1062",
        "-" => "23#1000000#50#0#0#25.5#1.2#0.3#45.0#0",
        other => return Some(format!("echo {other}")),
    };
    Some(answer.to_string())
}

/// Framed mvp_worker with local ramps, connected without a handshake
pub async fn worker(factory: &LoopbackConnectionFactory) -> Arc<SonicAmp> {
    let bus = Arc::new(EventBus::new());
    let communicator =
        SonicCommunicator::open(factory, SonicCommunicatorConfig::default(), bus.clone())
            .await
            .unwrap();
    let mut info = Info::from_banner("mvp_worker v1.0.0", ProtocolKind::Sonic);
    let supported: BTreeSet<CommandCode> = COMMANDS.iter().copied().collect();
    let table = ProtocolBuilder::default()
        .build(info.device_type, info.firmware_version, true)
        .restricted_to(&supported);
    info.supported_commands = table.codes().into_iter().collect();
    Arc::new(SonicAmp::new(Arc::new(communicator), info, table, bus))
}

/// Sequencer and controller sharing `device`
pub fn sequencer(device: &Arc<SonicAmp>) -> (Sequencer, Arc<ProcedureController>) {
    let controller = Arc::new(ProcedureController::new(device.clone()));
    (Sequencer::new(device.clone(), controller.clone()), controller)
}

/// Records script events as short strings
pub fn record_script(bus: &EventBus) -> Arc<Mutex<Vec<String>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    bus.subscribe_all(move |event| {
        if let SonicEvent::Script(script) = event {
            let text = match script {
                ScriptEvent::Started { instructions } => format!("started {instructions}"),
                ScriptEvent::LineAdvanced { line, .. } => format!("line {line}"),
                ScriptEvent::Finished { error: None } => "finished".to_string(),
                ScriptEvent::Finished { error: Some(error) } => format!("failed: {error}"),
            };
            sink.lock().push(text);
        }
    });
    events
}

/// How often `body` was written
pub fn count(factory: &LoopbackConnectionFactory, body: &str) -> usize {
    factory.written().iter().filter(|w| *w == body).count()
}
