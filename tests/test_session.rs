use sonicamp::{Config, LoopbackConnectionFactory, Session, TransducerLibrary};
use sonicamp_core::ProtocolKind;
use sonicamp_settings::{AtConfig, TransducerConfig};
use tempfile::TempDir;
use tokio::time::Duration;

const COMMANDS: &str = "1#20#21#23#30#1050#1051#1060#1061#1080#1081#1082#1083";

fn worker(body: &str) -> Option<String> {
    if let Some((name, value)) = body.split_once('=') {
        let code = match name.trim_end_matches(|c: char| c.is_ascii_digit()) {
            "!freq" | "!f" => 1050,
            "!g" => 1051,
            "!atf" => 1080,
            "!atk" => 1081,
            "!att" => 1082,
            "!aton" => 1083,
            _ => return Some("20003#10".to_string()),
        };
        return Some(format!("{code}#{value}"));
    }
    let answer = match body {
        "?info" => "mvp_worker v1.0.0",
        "?list_commands" => COMMANDS,
        "!ON" => "1060#1",
        "!OFF" => "1061#0",
        "-" => "23#1000000#50#0#0#25.5#1.2#0.3#45.0#0",
        _ => "20003#10",
    };
    Some(answer.to_string())
}

fn offline_config() -> Config {
    let mut config = Config::default();
    config.autostart_updater = false;
    config
}

/// Everything written after the handshake
fn after_handshake(factory: &LoopbackConnectionFactory) -> Vec<String> {
    let written = factory.written();
    let start = written
        .iter()
        .position(|w| w == "?list_commands")
        .map_or(0, |i| i + 1);
    written[start..].to_vec()
}

fn probe() -> TransducerConfig {
    TransducerConfig::new(
        "probe",
        vec![
            AtConfig {
                atk: 1.5,
                atf: 1_000_000,
                att: 20.0,
                aton: 100,
            },
            AtConfig {
                atk: 0.0,
                atf: 2_000_000,
                att: 30.5,
                aton: 0,
            },
        ],
    )
}

#[tokio::test(start_paused = true)]
async fn test_transducer_is_applied_with_init_script() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("init.txt");
    std::fs::write(&script, "# warm up\ngain 20\non\n").unwrap();

    let factory = LoopbackConnectionFactory::sonic(worker);
    let session = Session::open(&factory, &offline_config()).await.unwrap();
    assert_eq!(session.device().info().protocol, ProtocolKind::Sonic);

    let mut transducer = probe();
    transducer.init_script_path = Some(script);
    session.apply_transducer(&transducer).await.unwrap();

    let written = after_handshake(&factory);
    let names: Vec<&str> = written
        .iter()
        .map(|w| w.split_once('=').map_or(w.as_str(), |(name, _)| name))
        .collect();
    assert_eq!(
        names,
        [
            "!atf1", "!atk1", "!att1", "!aton1", "!atf2", "!atk2", "!att2", "!aton2", "!g", "!ON"
        ]
    );
    assert_eq!(written[0], "!atf1=1000000");
    assert_eq!(written[3], "!aton1=100");
    assert_eq!(written[4], "!atf2=2000000");
    assert!(session.device().status().signal);

    session.close().await;
    assert!(!session.device().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_configured_transducer_comes_from_library() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("transducers.json");
    let mut library = TransducerLibrary::new();
    library.upsert(probe()).unwrap();
    library.save_to_file(&path).unwrap();

    let factory = LoopbackConnectionFactory::sonic(worker);
    let mut config = offline_config();
    let session = Session::open(&factory, &config).await.unwrap();

    // nothing configured
    session.apply_configured_transducer(&config).await.unwrap();
    assert!(after_handshake(&factory).is_empty());

    config.transducer_library = Some(path);
    config.transducer = Some("bath".to_string());
    let err = session
        .apply_configured_transducer(&config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown transducer 'bath'"), "{err}");

    config.transducer = Some("probe".to_string());
    session.apply_configured_transducer(&config).await.unwrap();
    assert_eq!(after_handshake(&factory).len(), 8);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_legacy_transducer_skips_missing_setters() {
    let factory = LoopbackConnectionFactory::legacy("catch v0.4.1", |line| match line {
        "?info" => Some("catch v0.4.1".to_string()),
        l if l.starts_with("!at") => l.split_once('=').map(|(_, v)| v.to_string()),
        _ => None,
    });
    let session = Session::open(&factory, &offline_config()).await.unwrap();
    assert_eq!(session.device().info().protocol, ProtocolKind::Legacy);

    let transducer = TransducerConfig::new(
        "catch",
        vec![AtConfig {
            atk: 2.0,
            atf: 500_000,
            att: 25.0,
            aton: 300,
        }],
    );
    session.apply_transducer(&transducer).await.unwrap();

    let written: Vec<String> = factory
        .written()
        .into_iter()
        .filter(|w| w.starts_with("!at"))
        .collect();
    assert_eq!(written, ["!atf1=500000", "!atk1=2", "!att1=25"]);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_updater_starts_and_stops_with_session() {
    let factory = LoopbackConnectionFactory::sonic(worker);
    let session = Session::open(&factory, &Config::default()).await.unwrap();
    assert!(session.updater().is_running());

    tokio::time::timeout(Duration::from_secs(5), async {
        while session.updater().history().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(session.device().status().frequency, 1_000_000);

    session.close().await;
    assert!(!session.updater().is_running());
    assert!(!session.device().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_run_script_file() {
    let dir = TempDir::new().unwrap();
    let factory = LoopbackConnectionFactory::sonic(worker);
    let session = Session::open(&factory, &offline_config()).await.unwrap();

    let missing = session.run_script(&dir.path().join("none.txt")).await;
    assert!(missing.is_err());

    let path = dir.path().join("pulse.txt");
    std::fs::write(&path, "startloop 2\n  on\n  hold 10ms\n  off\nendloop\n").unwrap();
    session.run_script(&path).await.unwrap();
    assert_eq!(after_handshake(&factory), ["!ON", "!OFF", "!ON", "!OFF"]);
    session.close().await;
}

#[tokio::test]
async fn test_connect_needs_url() {
    let err = Session::connect(&Config::default()).await.unwrap_err();
    assert!(err.to_string().contains("no connection url"), "{err}");
}
