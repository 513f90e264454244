use sonicamp_communication::{
    CommandArgs, CommandCode, DeviceBuilder, LoopbackConnectionFactory, SonicAmp,
};
use sonicamp_core::{
    ConnectionError, DeviceType, Error, EventBus, EventKind, ProtocolError, ProtocolKind,
    SonicEvent, Version,
};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::time::Duration;

const WORKER_COMMANDS: &str = "1#20#21#23#30#1050#1051#1060#1061";

fn worker(body: &str) -> Option<String> {
    let answer = match body {
        "?info" => "mvp_worker v1.0.0 (build 42)",
        "?list_commands" => WORKER_COMMANDS,
        "!ON" => "1060#1",
        "-" => "23#1000000#50#1#0#25.5#1.2#0.3#45.0#0",
        b if b.starts_with("!freq=") => "1050#1000 kHz",
        _ => "20003#10",
    };
    Some(answer.to_string())
}

async fn connect(factory: &LoopbackConnectionFactory) -> (SonicAmp, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new());
    let amp = DeviceBuilder::default()
        .connect(factory, bus.clone())
        .await
        .unwrap();
    (amp, bus)
}

#[tokio::test(start_paused = true)]
async fn test_framed_device_is_detected() {
    let factory = LoopbackConnectionFactory::sonic(worker);
    let (amp, _bus) = connect(&factory).await;

    let info = amp.info();
    assert_eq!(info.protocol, ProtocolKind::Sonic);
    assert_eq!(info.device_type, DeviceType::MvpWorker);
    assert_eq!(info.firmware_version, Version::new(1, 0, 0));
    assert!(info.supports(CommandCode::SetFrequency));
    assert!(info.supports(CommandCode::Dash));
    assert!(!info.supports(CommandCode::SetAtf));

    assert_eq!(factory.baud_rates(), vec![115_200, 9600]);
    assert_eq!(factory.written(), vec!["?info", "?info", "?list_commands"]);
    amp.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_set_frequency_updates_status() {
    let factory = LoopbackConnectionFactory::sonic(worker);
    let (amp, bus) = connect(&factory).await;

    let changes = Arc::new(Mutex::new(Vec::new()));
    {
        let changes = changes.clone();
        bus.subscribe_property("frequency", move |event| {
            if let Some(name) = event.property() {
                changes.lock().push(name.to_string());
            }
        });
    }

    let body = amp
        .execute_command(
            CommandCode::SetFrequency,
            CommandArgs::value(1_000_000_i64),
        )
        .await
        .unwrap();
    assert_eq!(body, "1050#1000 kHz");
    assert_eq!(amp.status().frequency, 1_000_000);
    assert_eq!(changes.lock().as_slice(), ["frequency"]);
    assert_eq!(factory.written().last().map(String::as_str), Some("!freq=1000000"));

    // the same command written as text takes the same path
    let body = amp.execute_raw("!f=1000000").await.unwrap();
    assert_eq!(body, "1050#1000 kHz");
    assert_eq!(changes.lock().len(), 1);
    amp.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_status_line_is_merged() {
    let factory = LoopbackConnectionFactory::sonic(worker);
    let (amp, _bus) = connect(&factory).await;

    let status = amp.get_status().await.unwrap();
    assert_eq!(status.frequency, 1_000_000);
    assert_eq!(status.gain, 50);
    assert!(status.signal);
    assert!((status.temperature - 25.5).abs() < 1e-9);
    assert!((status.phase - 45.0).abs() < 1e-9);
    assert!(!status.remote_proc_finished);
    amp.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_command_fails_before_io() {
    let factory = LoopbackConnectionFactory::sonic(worker);
    let (amp, _bus) = connect(&factory).await;
    let sent = factory.written().len();

    let err = amp.set_switching_frequency(20_000).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::CommandNotSupported { .. })
    ));
    let err = amp.set_atf(1, 400_000).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::CommandNotSupported { .. })
    ));
    assert_eq!(factory.written().len(), sent);
    amp.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_error_answer_becomes_device_error() {
    let factory = LoopbackConnectionFactory::sonic(worker);
    let (amp, _bus) = connect(&factory).await;

    let err = amp.get_frequency().await.unwrap_err();
    match err {
        Error::Protocol(ProtocolError::DeviceError { code, value, .. }) => {
            assert_eq!(code, 20003);
            assert_eq!(value.as_deref(), Some("10"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(amp.is_connected());
    amp.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_legacy_device_is_detected() {
    let factory = LoopbackConnectionFactory::legacy("Welcome\n\ncatch v0.4.1", |line| {
        match line {
            "?info" => Some("catch v0.4.1".to_string()),
            l if l.starts_with("!f=") => Some(l.trim_start_matches("!f=").to_string()),
            _ => None,
        }
    });
    let (amp, _bus) = connect(&factory).await;

    let info = amp.info().clone();
    assert_eq!(info.protocol, ProtocolKind::Legacy);
    assert_eq!(info.device_type, DeviceType::Catch);
    assert_eq!(info.firmware_version, Version::new(0, 4, 1));
    assert_eq!(info.firmware_info, "Welcome\n\ncatch v0.4.1");
    assert!(info.supports(CommandCode::SetKhzMode));
    assert!(!info.supports(CommandCode::GetSensors));
    assert_eq!(factory.baud_rates(), vec![115_200]);

    amp.set_frequency(500_000).await.unwrap();
    assert_eq!(amp.status().frequency, 500_000);
    assert_eq!(factory.written(), vec!["?info", "!f=500000"]);
    amp.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_hangup_disconnects_device() {
    let factory = LoopbackConnectionFactory::sonic(worker);
    let (amp, bus) = connect(&factory).await;

    let lost = Arc::new(Mutex::new(Vec::new()));
    {
        let lost = lost.clone();
        bus.subscribe(EventKind::Disconnected, move |event| {
            if let SonicEvent::Connection(connection) = event {
                lost.lock().push(connection.clone());
            }
        });
    }

    factory.hangup();
    tokio::time::timeout(Duration::from_secs(5), async {
        while amp.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(lost.lock().len(), 1);

    let err = amp.set_signal_on().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::ConnectionLost { .. })
    ));
    amp.close().await;
    assert_eq!(lost.lock().len(), 1);
}
