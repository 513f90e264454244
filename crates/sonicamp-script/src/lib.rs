//! # SonicAmp Script
//!
//! A small imperative language for driving a SonicAmp: frequency and gain
//! setters, signal switching, holds, ramps and nested loops.
//!
//! ```text
//! startloop 2
//!   frequency 500000
//!   startloop 3
//!     on
//!     hold 5ms
//!     off
//!   endloop
//! endloop
//! ```

pub mod parser;
pub mod sequencer;

pub use parser::{Instruction, LoopCount, LoopSpan, Script, ScriptLine, DEFAULT_RAMP_HOLD_ON};
pub use sequencer::{Progress, ScriptHandle, Sequencer};
