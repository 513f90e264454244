//! Stable command codes
//!
//! The framed protocol echoes these numbers at the start of every answer.
//! Negative codes exist only on legacy firmware; codes from 20000 up are
//! error answers (see [`super::error_codes`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! command_codes {
    ($($(#[$doc:meta])* $variant:ident = $value:literal => $name:literal,)+) => {
        /// Identifies a command independent of its wire spelling
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum CommandCode {
            $($(#[$doc])* $variant,)+
        }

        impl CommandCode {
            /// Every known code in declaration order
            pub const ALL: &'static [CommandCode] = &[$(CommandCode::$variant,)+];

            /// Numeric value used on the wire
            pub const fn value(self) -> i32 {
                match self {
                    $(CommandCode::$variant => $value,)+
                }
            }

            /// Look a code up by its numeric value
            pub fn from_value(value: i32) -> Option<Self> {
                match value {
                    $($value => Some(CommandCode::$variant),)+
                    _ => None,
                }
            }

            /// Snake case name
            pub const fn name(self) -> &'static str {
                match self {
                    $(CommandCode::$variant => $name,)+
                }
            }
        }

        impl FromStr for CommandCode {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($name => Ok(CommandCode::$variant),)+
                    other => other
                        .parse::<i32>()
                        .ok()
                        .and_then(CommandCode::from_value)
                        .ok_or_else(|| format!("Unknown command code: {}", other)),
                }
            }
        }
    };
}

command_codes! {
    /// `!KHZ`, legacy relay mode
    SetKhzMode = -1 => "set_khz_mode",
    /// `!MHZ`, legacy relay mode
    SetMhzMode = -2 => "set_mhz_mode",
    /// `=`, legacy module list
    GetModules = -3 => "get_modules",

    /// `?list_commands`
    ListAvailableCommands = 1 => "list_available_commands",

    /// `?info`
    GetInfo = 20 => "get_info",
    /// `?type`
    GetType = 21 => "get_type",
    /// `?`
    GetOverview = 22 => "get_overview",
    /// `-`, status line
    Dash = 23 => "dash",

    /// `?freq`
    GetFrequency = 30 => "get_frequency",
    /// `?gain`
    GetGain = 31 => "get_gain",
    /// `?temp`
    GetTemperature = 32 => "get_temperature",
    /// `?tpcb`
    GetTpcb = 33 => "get_tpcb",
    /// `?sens`
    GetSensors = 34 => "get_sensors",
    /// `?prot`
    GetProtocol = 35 => "get_protocol",
    /// `?pval`
    GetPval = 36 => "get_pval",

    /// `?atf<i>`
    GetAtf = 40 => "get_atf",
    /// `?atk<i>`
    GetAtk = 41 => "get_atk",
    /// `?att<i>`
    GetAtt = 42 => "get_att",
    /// `?aton<i>`
    GetAton = 43 => "get_aton",

    /// `!freq=<hz>`
    SetFrequency = 1050 => "set_frequency",
    /// `!g=<percent>`
    SetGain = 1051 => "set_gain",
    /// `!swf=<hz>`
    SetSwitchingFrequency = 1052 => "set_switching_frequency",

    /// `!ON`
    SetOn = 1060 => "set_on",
    /// `!OFF`
    SetOff = 1061 => "set_off",
    /// `!AUTO`
    SetAuto = 1062 => "set_auto",

    /// `!SERIAL`
    SetSerialMode = 1070 => "set_serial_mode",
    /// `!ANALOG`
    SetAnalogMode = 1071 => "set_analog_mode",

    /// `!atf<i>=<hz>`
    SetAtf = 1080 => "set_atf",
    /// `!atk<i>=<coefficient>`
    SetAtk = 1081 => "set_atk",
    /// `!att<i>=<temperature>`
    SetAtt = 1082 => "set_att",
    /// `!aton<i>=<ms>`
    SetAton = 1083 => "set_aton",

    /// `!ramp_start_freq=<hz>`
    SetRampStartFreq = 1100 => "set_ramp_start_freq",
    /// `!ramp_stop_freq=<hz>`
    SetRampStopFreq = 1101 => "set_ramp_stop_freq",
    /// `!ramp_step=<hz>`
    SetRampStep = 1102 => "set_ramp_step",
    /// `!ramp_ton=<ms>`
    SetRampTon = 1103 => "set_ramp_ton",
    /// `!ramp_toff=<ms>`
    SetRampToff = 1104 => "set_ramp_toff",

    /// `!scan_f_center=<hz>`
    SetScanFCenter = 1110 => "set_scan_f_center",
    /// `!scan_f_range=<hz>`
    SetScanFRange = 1111 => "set_scan_f_range",
    /// `!scan_f_step=<hz>`
    SetScanFStep = 1112 => "set_scan_f_step",
    /// `!scan_t_step=<ms>`
    SetScanTStep = 1113 => "set_scan_t_step",

    /// `!tune_f_step=<hz>`
    SetTuneFStep = 1120 => "set_tune_f_step",
    /// `!tune_t_time=<ms>`
    SetTuneTTime = 1121 => "set_tune_t_time",
    /// `!tune_t_step=<ms>`
    SetTuneTStep = 1122 => "set_tune_t_step",

    /// `!wipe_f_range=<hz>`
    SetWipeFRange = 1130 => "set_wipe_f_range",
    /// `!wipe_f_step=<hz>`
    SetWipeFStep = 1131 => "set_wipe_f_step",
    /// `!wipe_t_on=<ms>`
    SetWipeTOn = 1132 => "set_wipe_t_on",
    /// `!wipe_t_off=<ms>`
    SetWipeTOff = 1133 => "set_wipe_t_off",
    /// `!wipe_t_pause=<ms>`
    SetWipeTPause = 1134 => "set_wipe_t_pause",

    /// `!ramp`
    StartRamp = 1200 => "start_ramp",
    /// `!scan`
    StartScan = 1201 => "start_scan",
    /// `!tune`
    StartTune = 1202 => "start_tune",
    /// `!wipe`
    StartWipe = 1203 => "start_wipe",
    /// `!auto`
    StartAuto = 1204 => "start_auto",
    /// `!stop`
    StopProcedure = 1210 => "stop_procedure",
}

impl CommandCode {
    /// Whether the code only exists on legacy firmware
    pub const fn is_legacy_only(self) -> bool {
        self.value() < 0
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
