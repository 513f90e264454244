use std::path::PathBuf;

use anyhow::Context;
use sonicamp::{init_logging, Config, Session};
use tokio::signal;

/// Overrides the configuration file location
const CONFIG_ENV: &str = "SONICAMP_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = match std::env::var_os(CONFIG_ENV) {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("cannot load {}", config_path.display()))?;
    let _guard = init_logging(&config.logging)?;

    let session = Session::connect(&config)
        .await
        .with_context(|| format!("cannot connect to '{}'", config.connection.url))?;

    let outcome: anyhow::Result<()> = async {
        tokio::select! {
            applied = session.apply_configured_transducer(&config) => {
                applied?;
                tracing::info!("Ready; press Ctrl-C to disconnect");
                signal::ctrl_c().await?;
            }
            interrupted = signal::ctrl_c() => interrupted?,
        }
        Ok(())
    }
    .await;

    session.close().await;
    outcome
}
