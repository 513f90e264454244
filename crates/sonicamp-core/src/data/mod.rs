//! Data model shared across the control stack.

mod device;
mod procedure;
mod status;
mod value;

pub use device::{DeviceType, ProtocolKind};
pub use procedure::ProcedureKind;
pub use status::{PropertyChange, Status};
pub use value::{FieldValue, Version};
