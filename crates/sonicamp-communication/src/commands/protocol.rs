//! The command contract table
//!
//! Legacy definitions are exported below protocol version 1.0.0, framed
//! definitions from 1.0.0 on. Contracts that only one generation knows live
//! in their own export group.

use sonicamp_core::{DeviceType, SiUnit, Version};

use super::codes::CommandCode;
use super::contract::{AnswerDef, CommandContract, CommandDef, MetaExport};
use super::fields::{AnswerField, FieldPath, FieldType, ParamRole};

/// First protocol version of framed firmware
pub const SONIC_MIN_VERSION: Version = Version::new(1, 0, 0);

/// Highest frequency accepted by setters, in Hz
pub const MAX_FREQUENCY: f64 = 10_000_000.0;

/// Highest gain accepted by setters, in percent
pub const MAX_GAIN: f64 = 150.0;

/// A versioned set of command contracts
#[derive(Debug, Clone)]
pub struct Protocol {
    /// Newest protocol version described.
    pub version: Version,
    /// Gated groups of contracts.
    pub exports: Vec<MetaExport<Vec<CommandContract>>>,
}

impl Protocol {
    /// The contracts of all SonicAmp firmware generations
    pub fn standard() -> Self {
        Self {
            version: SONIC_MIN_VERSION,
            exports: vec![
                MetaExport::new(shared_contracts()),
                MetaExport::new(legacy_only_contracts()).until(SONIC_MIN_VERSION),
                MetaExport::new(sonic_only_contracts()).since(SONIC_MIN_VERSION),
            ],
        }
    }

    /// Every contract regardless of gating
    pub fn contracts(&self) -> impl Iterator<Item = &CommandContract> {
        self.exports.iter().flat_map(|group| group.exports.iter())
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::standard()
    }
}

fn legacy<T>(exports: T) -> MetaExport<T> {
    MetaExport::new(exports).until(SONIC_MIN_VERSION)
}

fn sonic<T>(exports: T) -> MetaExport<T> {
    MetaExport::new(exports).since(SONIC_MIN_VERSION)
}

fn prefixed(fields: Vec<AnswerField>) -> AnswerDef {
    AnswerDef::new(fields).code_prefixed()
}

fn hertz() -> FieldType {
    FieldType::int().range(0.0, MAX_FREQUENCY)
}

fn millis() -> FieldType {
    FieldType::int().range(0.0, f64::from(u32::MAX))
}

fn index(values: &[i64]) -> FieldType {
    FieldType::int().allowed(values.iter().copied())
}

const LEGACY_AT_INDEX: [i64; 3] = [1, 2, 3];
const LEGACY_ATT_INDEX: [i64; 1] = [1];
const SONIC_AT_INDEX: [i64; 4] = [1, 2, 3, 4];

/// `name` read back as a plain value by legacy firmware and as
/// `<code>#value` by framed firmware
fn query(
    code: CommandCode,
    identifier: &str,
    description: &str,
    field: AnswerField,
) -> CommandContract {
    CommandContract::new(code, description)
        .command(MetaExport::new(CommandDef::new(identifier)))
        .answer(legacy(AnswerDef::new(vec![field.clone()])))
        .answer(sonic(prefixed(vec![field])))
}

/// Command without parameters whose answer is not interpreted
fn action(code: CommandCode, identifier: &str, description: &str) -> CommandContract {
    CommandContract::new(code, description)
        .command(MetaExport::new(CommandDef::new(identifier)))
        .answer(legacy(AnswerDef::empty()))
        .answer(sonic(prefixed(Vec::new())))
}

/// Framed-only setter storing its value under `name`
fn procedure_setter(code: CommandCode, name: &str, unit: FieldType) -> CommandContract {
    CommandContract::new(code, &format!("Set {}", name.replace('_', " ")))
        .command(MetaExport::new(
            CommandDef::new(&format!("!{name}")).setter(name, unit),
        ))
        .answer(MetaExport::new(prefixed(vec![AnswerField::new(name, FieldType::int())])))
}

/// Transducer table access `?<name><i>` / `!<name><i>=<v>`
fn transducer_table(
    get: CommandCode,
    set: CommandCode,
    name: &str,
    value: FieldType,
    legacy_index: Option<&[i64]>,
) -> [CommandContract; 2] {
    let path = FieldPath::derived(name, ParamRole::Index);
    let field = AnswerField::at(path, value.clone());

    let mut getter = CommandContract::new(get, &format!("Read transducer {name} entry"))
        .command(sonic(CommandDef::new(&format!("?{name}")).index("index", index(&SONIC_AT_INDEX))))
        .answer(sonic(prefixed(vec![field.clone()])));
    let mut setter = CommandContract::new(set, &format!("Write transducer {name} entry"))
        .command(sonic(
            CommandDef::new(&format!("!{name}"))
                .index("index", index(&SONIC_AT_INDEX))
                .setter(name, value.clone()),
        ))
        .answer(sonic(prefixed(vec![field.clone()])));

    if let Some(indices) = legacy_index {
        getter = getter
            .command(legacy(
                CommandDef::new(&format!("?{name}")).index("index", index(indices)),
            ))
            .answer(legacy(AnswerDef::new(vec![field.clone()])));
        setter = setter
            .command(legacy(
                CommandDef::new(&format!("!{name}"))
                    .index("index", index(indices))
                    .setter(name, value),
            ))
            .answer(legacy(AnswerDef::new(vec![field])));
    }
    [getter, setter]
}

fn shared_contracts() -> Vec<CommandContract> {
    let frequency = AnswerField::new("frequency", FieldType::int());
    let sonic_frequency =
        AnswerField::new("frequency", FieldType::float().with_unit(SiUnit::Hertz));
    let gain = AnswerField::new("gain", FieldType::int().with_unit(SiUnit::Percent));
    let temperature =
        AnswerField::new("temperature", FieldType::float().with_unit(SiUnit::Celsius));
    let signal = AnswerField::new("signal", FieldType::signal());

    let mut contracts = vec![
        CommandContract::new(CommandCode::GetInfo, "Firmware banner")
            .command(MetaExport::new(CommandDef::new("?info")))
            .answer(legacy(
                AnswerDef::new(vec![AnswerField::new("firmware_info", FieldType::string())])
                    .multiline(),
            ))
            .answer(sonic(AnswerDef::new(vec![AnswerField::new(
                "firmware_info",
                FieldType::string(),
            )]))),
        query(
            CommandCode::GetType,
            "?type",
            "Device type",
            AnswerField::new("device_type", FieldType::string()),
        ),
        CommandContract::new(CommandCode::GetOverview, "Human readable overview")
            .command(MetaExport::new(CommandDef::new("?")))
            .answer(legacy(
                AnswerDef::new(vec![AnswerField::new("overview", FieldType::string())])
                    .multiline(),
            ))
            .answer(sonic(
                prefixed(vec![AnswerField::new("overview", FieldType::string())]).multiline(),
            )),
        CommandContract::new(CommandCode::Dash, "Status line")
            .command(MetaExport::new(CommandDef::new("-")))
            .answer(legacy(AnswerDef::new(vec![
                AnswerField::new("error", FieldType::int()),
                frequency.clone(),
                AnswerField::new("gain", FieldType::int()),
                AnswerField::new("procedure", FieldType::int()),
                AnswerField::new("wipe_mode", FieldType::boolean()),
                AnswerField::new("temperature", FieldType::float()),
                signal.clone(),
            ])))
            .answer(sonic(prefixed(vec![
                AnswerField::new("frequency", FieldType::int()),
                AnswerField::new("gain", FieldType::int()),
                signal.clone(),
                AnswerField::new("procedure", FieldType::int()),
                AnswerField::new("temperature", FieldType::float()),
                AnswerField::new("urms", FieldType::float()),
                AnswerField::new("irms", FieldType::float()),
                AnswerField::new("phase", FieldType::float()),
                AnswerField::new("remote_proc_finished", FieldType::boolean()),
            ]))),
        CommandContract::new(CommandCode::GetFrequency, "Read the output frequency")
            .command(MetaExport::new(CommandDef::new("?freq")))
            .answer(legacy(AnswerDef::new(vec![frequency.clone()])))
            .answer(sonic(prefixed(vec![sonic_frequency.clone()]))),
        query(CommandCode::GetGain, "?gain", "Read the gain", gain.clone()),
        query(
            CommandCode::GetTemperature,
            "?temp",
            "Read the temperature",
            temperature,
        ),
        CommandContract::new(CommandCode::GetSensors, "Read the sensors")
            .command(MetaExport::new(CommandDef::new("?sens")))
            .answer(legacy(
                AnswerDef::new(vec![
                    frequency.clone(),
                    AnswerField::new("urms", FieldType::float()),
                    AnswerField::new("irms", FieldType::float()),
                    AnswerField::new("phase", FieldType::float()),
                ])
                .separated_by(" "),
            ))
            .answer(sonic(prefixed(vec![
                AnswerField::new("frequency", FieldType::int()),
                AnswerField::new("urms", FieldType::float()),
                AnswerField::new("irms", FieldType::float()),
                AnswerField::new("phase", FieldType::float()),
            ]))),
        CommandContract::new(CommandCode::SetFrequency, "Set the output frequency")
            .command(
                legacy(CommandDef::new("!f").setter("frequency", hertz()))
                    .except(&[DeviceType::Descale]),
            )
            .command(
                sonic(CommandDef::new("!freq").alias("!f").setter("frequency", hertz()))
                    .except(&[DeviceType::Descale]),
            )
            .answer(legacy(AnswerDef::new(vec![frequency])))
            .answer(sonic(prefixed(vec![sonic_frequency]))),
        CommandContract::new(CommandCode::SetGain, "Set the gain")
            .command(MetaExport::new(
                CommandDef::new("!g").setter("gain", FieldType::int().range(0.0, MAX_GAIN)),
            ))
            .answer(legacy(AnswerDef::new(vec![AnswerField::new(
                "gain",
                FieldType::int(),
            )])))
            .answer(sonic(prefixed(vec![gain]))),
        CommandContract::new(
            CommandCode::SetSwitchingFrequency,
            "Set the switching frequency",
        )
        .command(
            MetaExport::new(CommandDef::new("!swf").setter("switching_frequency", hertz()))
                .only_for(&[DeviceType::Descale]),
        )
        .answer(legacy(AnswerDef::new(vec![AnswerField::new(
            "switching_frequency",
            FieldType::int(),
        )])))
        .answer(sonic(prefixed(vec![AnswerField::new(
            "switching_frequency",
            FieldType::int().with_unit(SiUnit::Hertz),
        )]))),
        CommandContract::new(CommandCode::SetOn, "Switch the signal on")
            .command(MetaExport::new(CommandDef::new("!ON")))
            .answer(legacy(AnswerDef::new(vec![signal.clone()])))
            .answer(sonic(prefixed(vec![signal.clone()]))),
        CommandContract::new(CommandCode::SetOff, "Switch the signal off")
            .command(MetaExport::new(CommandDef::new("!OFF")))
            .answer(legacy(AnswerDef::new(vec![signal.clone()])))
            .answer(sonic(prefixed(vec![signal]))),
        action(CommandCode::SetAuto, "!AUTO", "Switch to auto mode"),
        action(
            CommandCode::SetSerialMode,
            "!SERIAL",
            "Control the device over the serial line",
        ),
        action(
            CommandCode::SetAnalogMode,
            "!ANALOG",
            "Control the device over the analog inputs",
        ),
    ];

    contracts.extend(transducer_table(
        CommandCode::GetAtf,
        CommandCode::SetAtf,
        "atf",
        hertz(),
        Some(&LEGACY_AT_INDEX[..]),
    ));
    contracts.extend(transducer_table(
        CommandCode::GetAtk,
        CommandCode::SetAtk,
        "atk",
        FieldType::float(),
        Some(&LEGACY_AT_INDEX[..]),
    ));
    contracts.extend(transducer_table(
        CommandCode::GetAtt,
        CommandCode::SetAtt,
        "att",
        FieldType::float(),
        Some(&LEGACY_ATT_INDEX[..]),
    ));
    contracts
}

fn legacy_only_contracts() -> Vec<CommandContract> {
    vec![
        CommandContract::new(CommandCode::SetKhzMode, "Switch the relay to kHz")
            .command(MetaExport::new(CommandDef::new("!KHZ")).only_for(&[DeviceType::Catch]))
            .answer(MetaExport::new(AnswerDef::empty())),
        CommandContract::new(CommandCode::SetMhzMode, "Switch the relay to MHz")
            .command(MetaExport::new(CommandDef::new("!MHZ")).only_for(&[DeviceType::Catch]))
            .answer(MetaExport::new(AnswerDef::empty())),
        CommandContract::new(CommandCode::GetModules, "List firmware modules")
            .command(MetaExport::new(CommandDef::new("=")))
            .answer(MetaExport::new(
                AnswerDef::new(vec![AnswerField::new("modules", FieldType::string())])
                    .multiline(),
            )),
    ]
}

fn sonic_only_contracts() -> Vec<CommandContract> {
    let mut contracts = vec![
        CommandContract::new(
            CommandCode::ListAvailableCommands,
            "List the supported command codes",
        )
        .command(MetaExport::new(
            CommandDef::new("?list_commands").alias("?list"),
        ))
        .answer(MetaExport::new(AnswerDef::new(vec![AnswerField::new(
            "available_commands",
            FieldType::string(),
        )]))),
        CommandContract::new(CommandCode::GetTpcb, "Read the board temperature")
            .command(MetaExport::new(CommandDef::new("?tpcb")))
            .answer(MetaExport::new(prefixed(vec![AnswerField::new(
                "tpcb",
                FieldType::float().with_unit(SiUnit::Celsius),
            )]))),
        CommandContract::new(CommandCode::GetProtocol, "Read the protocol description")
            .command(MetaExport::new(CommandDef::new("?prot")))
            .answer(MetaExport::new(prefixed(vec![AnswerField::new(
                "protocol",
                FieldType::string(),
            )]))),
        CommandContract::new(CommandCode::GetPval, "Read raw process values")
            .command(MetaExport::new(CommandDef::new("?pval")).debug_only())
            .answer(MetaExport::new(prefixed(vec![AnswerField::new(
                "pval",
                FieldType::string(),
            )]))),
        procedure_setter(CommandCode::SetRampStartFreq, "ramp_start_freq", hertz()),
        procedure_setter(CommandCode::SetRampStopFreq, "ramp_stop_freq", hertz()),
        procedure_setter(CommandCode::SetRampStep, "ramp_step", hertz()),
        procedure_setter(CommandCode::SetRampTon, "ramp_ton", millis()),
        procedure_setter(CommandCode::SetRampToff, "ramp_toff", millis()),
        procedure_setter(CommandCode::SetScanFCenter, "scan_f_center", hertz()),
        procedure_setter(CommandCode::SetScanFRange, "scan_f_range", hertz()),
        procedure_setter(CommandCode::SetScanFStep, "scan_f_step", hertz()),
        procedure_setter(CommandCode::SetScanTStep, "scan_t_step", millis()),
        procedure_setter(CommandCode::SetTuneFStep, "tune_f_step", hertz()),
        procedure_setter(CommandCode::SetTuneTTime, "tune_t_time", millis()),
        procedure_setter(CommandCode::SetTuneTStep, "tune_t_step", millis()),
        procedure_setter(CommandCode::SetWipeFRange, "wipe_f_range", hertz()),
        procedure_setter(CommandCode::SetWipeFStep, "wipe_f_step", hertz()),
        procedure_setter(CommandCode::SetWipeTOn, "wipe_t_on", millis()),
        procedure_setter(CommandCode::SetWipeTOff, "wipe_t_off", millis()),
        procedure_setter(CommandCode::SetWipeTPause, "wipe_t_pause", millis()),
        action(CommandCode::StartRamp, "!ramp", "Start the ramp procedure"),
        action(CommandCode::StartScan, "!scan", "Start the scan procedure"),
        action(CommandCode::StartTune, "!tune", "Start the tune procedure"),
        action(CommandCode::StartWipe, "!wipe", "Start the wipe procedure"),
        action(CommandCode::StartAuto, "!auto", "Start the auto procedure"),
        action(CommandCode::StopProcedure, "!stop", "Stop the running procedure"),
    ];
    contracts.extend(transducer_table(
        CommandCode::GetAton,
        CommandCode::SetAton,
        "aton",
        millis(),
        None,
    ));
    contracts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_code_has_a_contract() {
        let protocol = Protocol::standard();
        let codes: HashSet<CommandCode> = protocol.contracts().map(|c| c.code).collect();
        for code in CommandCode::ALL {
            assert!(codes.contains(code), "no contract for {code}");
        }
        assert_eq!(codes.len(), protocol.contracts().count());
    }
}
