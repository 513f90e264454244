use sonicamp::logging::{init_logging, LOG_FILE_PREFIX};
use sonicamp::LoggingSettings;
use tempfile::TempDir;

#[test]
fn test_log_file_is_written_once_installed() {
    let dir = TempDir::new().unwrap();
    let settings = LoggingSettings {
        level: "info".to_string(),
        directory: Some(dir.path().join("logs")),
        json: true,
    };

    let guard = init_logging(&settings).unwrap();
    assert!(guard.is_some());
    tracing::error!(check = 1, "written to the rolling file");
    assert!(init_logging(&settings).is_err());
    drop(guard);

    let files: Vec<String> = std::fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1, "{files:?}");
    assert!(files[0].starts_with(LOG_FILE_PREFIX));

    let content =
        std::fs::read_to_string(dir.path().join("logs").join(&files[0])).unwrap();
    assert!(content.contains("written to the rolling file"));
    assert!(content.trim_start().starts_with('{'));
}
