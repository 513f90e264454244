//! Connected device with its updater, procedure controller and sequencer

use sonicamp_communication::{
    CommandCode, ConnectionFactory, ConnectionParams, DeviceBuilder, SonicAmp,
};
use sonicamp_core::{Error, EventBus, Result};
use sonicamp_procedures::{ProcedureController, Updater};
use sonicamp_script::{Script, Sequencer};
use sonicamp_settings::{Config, TransducerConfig, TransducerLibrary};
use std::path::Path;
use std::sync::Arc;

/// Everything that runs against one connected device
pub struct Session {
    device: Arc<SonicAmp>,
    updater: Arc<Updater>,
    controller: Arc<ProcedureController>,
    sequencer: Sequencer,
}

impl Session {
    /// Connect to the port or executable named by the configured URL
    pub async fn connect(config: &Config) -> Result<Self> {
        let url = config.connection.url.trim();
        if url.is_empty() {
            return Err(Error::other("no connection url configured"));
        }
        let factory = ConnectionParams::from_url(url).factory();
        Self::open(factory.as_ref(), config).await
    }

    /// Run the handshake on `factory` and assemble the session
    ///
    /// Starts the updater if configured and the device answers `-`.
    pub async fn open(factory: &dyn ConnectionFactory, config: &Config) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let device = Arc::new(
            DeviceBuilder::new(config.device_builder_config())
                .connect(factory, bus)
                .await?,
        );

        let info = device.info();
        tracing::info!(
            device_type = %info.device_type,
            firmware = %info.firmware_version,
            protocol = %info.protocol,
            commands = info.supported_commands.len(),
            "Connected"
        );

        let updater = Arc::new(Updater::new(device.clone()));
        let controller = Arc::new(ProcedureController::with_config(
            device.clone(),
            config.procedures.clone(),
        ));
        controller.set_updater(updater.clone());
        let sequencer = Sequencer::new(device.clone(), controller.clone());

        if config.autostart_updater && device.has_command(CommandCode::Dash) {
            updater.start();
        }

        Ok(Self {
            device,
            updater,
            controller,
            sequencer,
        })
    }

    /// The connected device
    pub fn device(&self) -> &Arc<SonicAmp> {
        &self.device
    }

    /// The status updater
    pub fn updater(&self) -> &Arc<Updater> {
        &self.updater
    }

    /// The procedure controller
    pub fn controller(&self) -> &Arc<ProcedureController> {
        &self.controller
    }

    /// The script sequencer
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Write the auto-tune slots of `transducer`, then run its init script
    ///
    /// Slot fields the firmware has no setter for are skipped.
    pub async fn apply_transducer(&self, transducer: &TransducerConfig) -> Result<()> {
        tracing::info!(
            transducer = %transducer.name,
            slots = transducer.atconfigs.len(),
            "Applying transducer"
        );
        for (index, slot) in transducer.slots() {
            self.device.set_atf(index, slot.atf).await?;
            if self.device.has_command(CommandCode::SetAtk) {
                self.device.set_atk(index, slot.atk).await?;
            }
            if self.device.has_command(CommandCode::SetAtt) {
                self.device.set_att(index, slot.att).await?;
            }
            if self.device.has_command(CommandCode::SetAton) {
                self.device.set_aton(index, slot.aton).await?;
            }
        }

        if let Some(path) = &transducer.init_script_path {
            self.run_script(path).await?;
        }
        Ok(())
    }

    /// Apply the transducer named in `config`, if any
    pub async fn apply_configured_transducer(&self, config: &Config) -> Result<()> {
        let (Some(name), Some(library)) = (&config.transducer, &config.transducer_library) else {
            return Ok(());
        };
        let library = TransducerLibrary::load_from_file(library)?;
        let transducer = library
            .get(name)
            .ok_or_else(|| Error::other(format!("unknown transducer '{name}'")))?;
        self.apply_transducer(transducer).await
    }

    /// Parse and run a script file to completion
    pub async fn run_script(&self, path: &Path) -> Result<()> {
        let script = Script::from_file(path)?;
        tracing::info!(path = %path.display(), instructions = script.len(), "Running script");
        self.sequencer.run(script).await
    }

    /// Cancel everything that runs and close the connection
    pub async fn close(&self) {
        self.sequencer.cancel().await;
        self.controller.stop().await;
        self.updater.stop().await;
        self.device.close().await;
        tracing::info!("Session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device.info().device_type)
            .field("connected", &self.device.is_connected())
            .field("updater", &self.updater.is_running())
            .field("procedure", &self.controller.running_procedure())
            .finish()
    }
}
