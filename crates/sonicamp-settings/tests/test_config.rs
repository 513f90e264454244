use sonicamp_settings::{
    AtConfig, Config, Encoding, SettingsError, TransducerConfig, TransducerLibrary,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn sample_config() -> Config {
    let mut config = Config::new();
    config.release = false;
    config.transducer_library = Some(PathBuf::from("transducers.json"));
    config.transducer = Some("probe".to_string());
    config.connection.url = "/dev/ttyUSB0".to_string();
    config.connection.max_attempts = 5;
    config.connection.encoding = Encoding::Utf8;
    config.logging.level = "sonicamp=debug".to_string();
    config.logging.directory = Some(PathBuf::from("logs"));
    config.procedures.finish_timeout_ms = Some(60_000);
    config
}

#[test]
fn test_toml_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let config = sample_config();
    config.save_to_file(&path).unwrap();
    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_json_round_trip_in_new_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = sample_config();
    config.save_to_file(&path).unwrap();
    assert!(path.exists());
    assert_eq!(Config::load_or_default(&path).unwrap(), config);
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");

    let err = Config::default().save_to_file(&path).unwrap_err();
    assert!(matches!(err, SettingsError::UnsupportedFormat { .. }));
    assert!(!path.exists());
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "release = false\n\n[connection]\nurl = \"COM3\"\ntimeout_ms = 500\n",
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert!(!config.release);
    assert!(config.autostart_updater);
    assert_eq!(config.connection.url, "COM3");
    assert_eq!(config.connection.timeout_ms, 500);
    assert_eq!(config.connection.max_attempts, 3);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.procedures.poll_interval_ms, 100);

    let builder = config.device_builder_config();
    assert!(!builder.release);
    assert_eq!(builder.sonic.timeout.as_millis(), 500);
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_or_default(&dir.path().join("config.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[connection]\nmax_attempts = 0\n").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::InvalidSetting { .. })
    ));

    let mut config = Config::default();
    config.procedures.poll_interval_ms = 0;
    assert!(config.save_to_file(&dir.path().join("other.toml")).is_err());

    std::fs::write(&path, "release = \"yes\"\n").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::TomlError(_))
    ));
}

#[test]
fn test_transducer_library_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("transducers.json");

    let mut library = TransducerLibrary::new();
    let mut probe = TransducerConfig::new(
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
    );
    probe.init_script_path = Some(dir.path().join("init.txt"));
    library.upsert(probe.clone()).unwrap();
    library
        .upsert(TransducerConfig::new("bath", Vec::new()))
        .unwrap();
    library.save_to_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.trim_start().starts_with('['));

    let loaded = TransducerLibrary::load_from_file(&path).unwrap();
    assert_eq!(loaded, library);
    assert_eq!(loaded.get("probe"), Some(&probe));
}

#[test]
fn test_transducer_library_rejects_duplicates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("transducers.json");
    std::fs::write(
        &path,
        r#"[{"name": "probe", "atconfigs": []}, {"name": "probe", "atconfigs": []}]"#,
    )
    .unwrap();

    assert!(matches!(
        TransducerLibrary::load_from_file(&path),
        Err(SettingsError::InvalidSetting { .. })
    ));
}

#[test]
fn test_missing_library_is_empty() {
    let dir = TempDir::new().unwrap();
    let library = TransducerLibrary::load_or_default(&dir.path().join("none.json")).unwrap();
    assert!(library.is_empty());
}
