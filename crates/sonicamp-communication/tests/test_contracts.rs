use sonicamp_communication::{CommandArgs, CommandCode, Protocol, ProtocolBuilder};
use sonicamp_core::{DeviceType, FieldValue, Version};

const DEVICE_TYPES: [DeviceType; 5] = [
    DeviceType::Unknown,
    DeviceType::Descale,
    DeviceType::Catch,
    DeviceType::Wipe,
    DeviceType::MvpWorker,
];

fn versions() -> [Version; 5] {
    [
        Version::new(0, 3, 0),
        Version::new(0, 4, 0),
        Version::new(0, 5, 0),
        Version::new(1, 0, 0),
        Version::new(1, 2, 0),
    ]
}

#[test]
fn test_every_admitted_contract_binds() {
    let protocol = Protocol::standard();
    let builder = ProtocolBuilder::new(protocol.clone());

    for device_type in DEVICE_TYPES {
        for version in versions() {
            for release in [true, false] {
                let table = builder.build(device_type, version, release);
                for group in &protocol.exports {
                    if !group.admits(device_type, version, release) {
                        continue;
                    }
                    for contract in &group.exports {
                        let admitted = contract
                            .command_defs
                            .iter()
                            .any(|def| def.admits(device_type, version, release));
                        assert_eq!(
                            table.contains(contract.code),
                            admitted,
                            "{} for {device_type} {version} release={release}",
                            contract.code
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn test_protocol_generations_do_not_mix() {
    let builder = ProtocolBuilder::default();
    let legacy = builder.build(DeviceType::Catch, Version::new(0, 5, 0), true);
    let sonic = builder.build(DeviceType::MvpWorker, Version::new(1, 0, 0), true);

    assert!(legacy.contains(CommandCode::SetKhzMode));
    assert!(!legacy.contains(CommandCode::StartRamp));
    assert!(!legacy.contains(CommandCode::ListAvailableCommands));
    assert!(sonic.contains(CommandCode::StartRamp));
    assert!(sonic.contains(CommandCode::ListAvailableCommands));
    assert!(!sonic.contains(CommandCode::SetKhzMode));
}

#[test]
fn test_debug_commands_need_a_debug_build() {
    let builder = ProtocolBuilder::default();
    let version = Version::new(1, 0, 0);
    assert!(!builder
        .build(DeviceType::MvpWorker, version, true)
        .contains(CommandCode::GetPval));
    assert!(builder
        .build(DeviceType::MvpWorker, version, false)
        .contains(CommandCode::GetPval));
}

#[test]
fn test_sonic_status_line() {
    let table = ProtocolBuilder::default().build(DeviceType::MvpWorker, Version::new(1, 0, 0), true);
    let dash = table.get(CommandCode::Dash).unwrap();

    let answer = dash.interpret("23#1000000#50#1#0#25.5#1.2#0.3#45.0#0", &CommandArgs::none());
    assert!(answer.valid, "{:?}", answer.invalid_reason);
    assert_eq!(answer.command_code, Some(23));
    assert_eq!(answer.field("frequency"), Some(&FieldValue::Int(1_000_000)));
    assert_eq!(answer.field("gain"), Some(&FieldValue::Int(50)));
    assert_eq!(answer.field("signal"), Some(&FieldValue::Bool(true)));
    assert_eq!(answer.field("urms"), Some(&FieldValue::Float(1.2)));

    let answer = dash.interpret("23#fast#50#1#0#25.5#1.2#0.3#45.0#0", &CommandArgs::none());
    assert!(!answer.valid);

    // an answer echoing another command is not accepted
    let answer = dash.interpret("1050#1000000", &CommandArgs::none());
    assert!(!answer.valid);
    assert_eq!(answer.command_code, Some(1050));
}

#[test]
fn test_legacy_status_line() {
    let table = ProtocolBuilder::default().build(DeviceType::Catch, Version::new(0, 5, 0), true);
    let dash = table.get(CommandCode::Dash).unwrap();

    let answer = dash.interpret("0#1000000#50#0#0#25.5#1", &CommandArgs::none());
    assert!(answer.valid, "{:?}", answer.invalid_reason);
    assert_eq!(answer.command_code, None);
    assert_eq!(answer.field("error"), Some(&FieldValue::Int(0)));
    assert_eq!(answer.field("wipe_mode"), Some(&FieldValue::Bool(false)));
    assert_eq!(answer.field("signal"), Some(&FieldValue::Bool(true)));
}

#[test]
fn test_transducer_answers_land_under_their_index() {
    let table = ProtocolBuilder::default().build(DeviceType::MvpWorker, Version::new(1, 0, 0), true);
    let get_atf = table.get(CommandCode::GetAtf).unwrap();

    let answer = get_atf.interpret("40#400000", &CommandArgs::index(2_i64));
    assert!(answer.valid, "{:?}", answer.invalid_reason);
    assert_eq!(answer.field("atf.2"), Some(&FieldValue::Int(400_000)));
}

#[test]
fn test_error_answers_are_flagged() {
    let table = ProtocolBuilder::default().build(DeviceType::MvpWorker, Version::new(1, 0, 0), true);
    let set_gain = table.get(CommandCode::SetGain).unwrap();

    let answer = set_gain.interpret("20005#-3", &CommandArgs::value(50_i64));
    assert!(!answer.valid);
    assert!(answer.is_error());
    assert!(answer.device_error().is_some());
}
