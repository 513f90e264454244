mod common;

use common::{count, record_script, respond, sequencer, worker};
use parking_lot::Mutex;
use sonicamp_communication::{DeviceBuilder, LoopbackConnectionFactory};
use sonicamp_core::{
    ConnectionError, ConnectionEvent, DisconnectReason, Error, EventBus, EventKind,
    ProcedureEvent, ScriptError, SonicEvent,
};
use sonicamp_procedures::ProcedureController;
use sonicamp_script::{Script, Sequencer};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const NESTED: &str = "\
startloop 2
  frequency 500000
  startloop 3
    on
    hold 5ms
    off
  endloop
endloop
";

#[tokio::test(start_paused = true)]
async fn test_nested_loops_on_framed_device() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let events = record_script(device.bus());
    let (sequencer, _controller) = sequencer(&device);

    let started = Instant::now();
    sequencer.run(Script::parse(NESTED).unwrap()).await.unwrap();

    let pass = ["!ON", "!OFF", "!ON", "!OFF", "!ON", "!OFF"];
    let mut expected = vec!["!freq=500000"];
    expected.extend(pass);
    expected.push("!freq=500000");
    expected.extend(pass);
    assert_eq!(factory.written(), expected);
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(!device.status().signal);

    let events = events.lock();
    assert_eq!(events.first().map(String::as_str), Some("started 8"));
    assert_eq!(events.last().map(String::as_str), Some("finished"));
    assert!(!sequencer.is_running());
    assert_eq!(sequencer.current_line(), None);
    assert_eq!(sequencer.current_task(), "idle");
}

#[tokio::test(start_paused = true)]
async fn test_nested_loops_on_legacy_device() {
    let factory = LoopbackConnectionFactory::legacy("catch v0.4.1", |line| match line {
        "?info" => Some("catch v0.4.1".to_string()),
        "!ON" => Some("ON".to_string()),
        "!OFF" => Some("OFF".to_string()),
        l if l.starts_with("!f=") => Some(l.trim_start_matches("!f=").to_string()),
        _ => None,
    });
    let bus = Arc::new(EventBus::new());
    let device = Arc::new(
        DeviceBuilder::default()
            .connect(&factory, bus)
            .await
            .unwrap(),
    );
    let controller = Arc::new(ProcedureController::new(device.clone()));
    let sequencer = Sequencer::new(device.clone(), controller);

    sequencer.run(Script::parse(NESTED).unwrap()).await.unwrap();

    assert_eq!(count(&factory, "!f=500000"), 2);
    assert_eq!(count(&factory, "!ON"), 6);
    assert_eq!(count(&factory, "!OFF"), 6);
    assert_eq!(factory.written().last().map(String::as_str), Some("!OFF"));
    assert!(!device.status().signal);
    device.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_inner_loop_counts_are_reset() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let (sequencer, _controller) = sequencer(&device);

    let script = "\
startloop 3
  gain 1
  startloop 2
    gain 2
  endloop
  startloop 0
    on
  endloop
endloop
";
    sequencer.run(Script::parse(script).unwrap()).await.unwrap();

    let pass = ["!g=1", "!g=2", "!g=2"];
    assert_eq!(factory.written(), pass.repeat(3));
}

#[tokio::test]
async fn test_infinite_loop_is_cancellable() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let (sequencer, _controller) = sequencer(&device);

    let handle = sequencer
        .start(Script::parse("startloop inf\nendloop").unwrap())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sequencer.is_running());
    assert!(!handle.is_finished());

    tokio::time::timeout(Duration::from_secs(5), sequencer.cancel())
        .await
        .unwrap();
    assert!(handle.is_finished());
    handle.wait().await.unwrap();
    assert!(!sequencer.is_running());
    assert_eq!(factory.written(), ["!OFF"]);
}

#[tokio::test(start_paused = true)]
async fn test_second_script_is_rejected() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let (sequencer, _controller) = sequencer(&device);

    let handle = sequencer.start_source("on\nhold 10s\noff").unwrap();
    let err = sequencer.start_source("off").unwrap_err();
    assert!(matches!(err, Error::Script(ScriptError::AlreadyRunning)));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sequencer.current_line(), Some(2));
    assert_eq!(sequencer.current_task(), "hold 10s");

    let cancelled_at = Instant::now();
    sequencer.cancel().await;
    assert!(cancelled_at.elapsed() < Duration::from_secs(1));
    handle.wait().await.unwrap();
    assert_eq!(factory.written(), ["!ON", "!OFF"]);
    assert!(!device.status().signal);
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_published() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let events = record_script(device.bus());
    let (sequencer, _controller) = sequencer(&device);
    let mut progress = sequencer.progress();

    let handle = sequencer
        .start_source("# setup\nfrequency 1000\n\nhold 1s\noff")
        .unwrap();
    progress
        .wait_for(|p| p.task == "hold 1s")
        .await
        .unwrap();
    assert_eq!(progress.borrow().line, Some(4));
    handle.wait().await.unwrap();

    assert_eq!(
        events.lock().as_slice(),
        ["started 3", "line 2", "line 4", "line 5", "finished"]
    );
    assert_eq!(sequencer.current_task(), "idle");
}

#[tokio::test(start_paused = true)]
async fn test_ramp_runs_through_controller() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let procedures = Arc::new(Mutex::new(Vec::new()));
    {
        let procedures = procedures.clone();
        device.bus().subscribe_all(move |event| {
            if let SonicEvent::Procedure(event) = event {
                procedures.lock().push(match event {
                    ProcedureEvent::Running { .. } => "running",
                    ProcedureEvent::Stopped { .. } => "stopped",
                });
            }
        });
    }
    let (sequencer, controller) = sequencer(&device);

    sequencer
        .run(Script::parse("ramp_freq 1000000 1000 1000 5ms\ngain 20").unwrap())
        .await
        .unwrap();

    assert_eq!(
        factory.written(),
        [
            "!freq=999000",
            "!freq=1000000",
            "!freq=1001000",
            "!OFF",
            "!g=20"
        ]
    );
    assert_eq!(procedures.lock().as_slice(), ["running", "stopped"]);
    assert!(!controller.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_running_ramp() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let (sequencer, controller) = sequencer(&device);

    let handle = sequencer
        .start_source("ramp_freq_range 100000 110000 1000 10s\ngain 20")
        .unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(controller.is_running());

    sequencer.cancel().await;
    handle.wait().await.unwrap();
    assert!(!controller.is_running());
    assert_eq!(
        factory.written(),
        ["!freq=100000", "!freq=101000", "!OFF", "!OFF"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_raw_lines_are_passed_through() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let (sequencer, _controller) = sequencer(&device);

    sequencer
        .run(Script::parse("!freq=1000\n?unknown").unwrap())
        .await
        .unwrap();

    assert_eq!(factory.written(), ["!freq=1000", "?unknown"]);
    assert_eq!(device.status().frequency, 1000);
}

#[tokio::test(start_paused = true)]
async fn test_failing_instruction_ends_script() {
    let factory = LoopbackConnectionFactory::sonic(|body| {
        if body == "!g=90" {
            Some("20005#90".to_string())
        } else {
            respond(body)
        }
    });
    let device = worker(&factory).await;
    let events = record_script(device.bus());
    let (sequencer, _controller) = sequencer(&device);

    let err = sequencer
        .run(Script::parse("on\ngain 90\nfrequency 1000").unwrap())
        .await
        .unwrap_err();
    assert!(err.is_device_error());
    assert_eq!(factory.written(), ["!ON", "!g=90", "!OFF"]);
    let last = events.lock().last().cloned().unwrap();
    assert!(last.starts_with("failed: Device error 20005"), "{last}");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_script() {
    let hangup = CancellationToken::new();
    let line = hangup.clone();
    let factory = LoopbackConnectionFactory::sonic(move |body| {
        if body == "!ON" {
            line.cancel();
            return None;
        }
        respond(body)
    })
    .with_hangup(hangup);
    let device = worker(&factory).await;
    let events = record_script(device.bus());
    let lost = Arc::new(Mutex::new(0));
    {
        let lost = lost.clone();
        device
            .bus()
            .subscribe(EventKind::Disconnected, move |_| *lost.lock() += 1);
    }
    let (sequencer, controller) = sequencer(&device);

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        sequencer.run(Script::parse(NESTED).unwrap()),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(err.is_connection_error(), "{err}");

    assert_eq!(*lost.lock(), 1);
    assert_eq!(factory.written(), ["!freq=500000", "!ON"]);
    assert!(!sequencer.is_running());
    assert!(!controller.is_running());
    assert_eq!(controller.running_procedure(), None);
    assert!(events.lock().last().unwrap().starts_with("failed: "));

    let err = device.set_signal_off().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::ConnectionLost { .. })
    ));
    device.close().await;
    assert_eq!(*lost.lock(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_other_port_disconnect_keeps_script_running() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let (sequencer, _controller) = sequencer(&device);
    assert_ne!(device.communicator().port(), "/dev/ttyUSB7");

    sequencer
        .start_source("startloop inf\n  hold 10ms\nendloop\n")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(25)).await;
    device
        .bus()
        .emit(SonicEvent::Connection(ConnectionEvent::Disconnected {
            port: "/dev/ttyUSB7".to_string(),
            reason: DisconnectReason::Timeout,
        }));
    tokio::time::sleep(Duration::from_millis(25)).await;
    assert!(sequencer.is_running());
    assert!(device.is_connected());

    sequencer.cancel().await;
    assert!(!sequencer.is_running());
    assert_eq!(factory.written(), ["!OFF"]);
}

#[tokio::test(start_paused = true)]
async fn test_syntax_error_starts_nothing() {
    let factory = LoopbackConnectionFactory::sonic(respond);
    let device = worker(&factory).await;
    let events = record_script(device.bus());
    let (sequencer, _controller) = sequencer(&device);

    let err = sequencer.start_source("on\nfrobnicate 3").unwrap_err();
    assert!(matches!(
        err,
        Error::Script(ScriptError::Syntax { line: 2, ref token, .. }) if token == "frobnicate"
    ));
    assert!(!sequencer.is_running());
    assert!(events.lock().is_empty());
    assert!(factory.written().is_empty());
}
