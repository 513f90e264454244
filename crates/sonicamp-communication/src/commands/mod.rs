//! Command contracts, validation and command instances
//!
//! The [`Protocol`] holds every known contract. The [`ProtocolBuilder`]
//! narrows it to a [`CommandTable`] for one device, from which [`Command`]s
//! are created and sent through a communicator.

pub mod answer;
pub mod builder;
pub mod codes;
pub mod command;
pub mod contract;
pub mod error_codes;
pub mod fields;
pub mod protocol;
pub mod validator;

pub use answer::Answer;
pub use builder::{CommandTable, ProtocolBuilder};
pub use codes::CommandCode;
pub use command::{BoundCommand, Command, CommandArgs};
pub use contract::{AnswerDef, CommandContract, CommandDef, MetaExport, ParamDef};
pub use error_codes::{decode_error, format_error, parse_error_answer, DeviceErrorCode};
pub use fields::{AnswerField, FieldKind, FieldPath, FieldType, ParamRole, PathSegment};
pub use protocol::{Protocol, SONIC_MIN_VERSION};
pub use validator::AnswerValidator;
