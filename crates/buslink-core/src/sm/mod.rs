//! Programmable I/O state machines: bus programs, instruction memory,
//! register encoding and the channel configurator.

pub mod config;
pub mod configurator;
pub mod memory;
pub mod program;

pub use config::{ClockDivider, FifoJoin, ShiftConfig, ShiftDirection, SmConfig};
pub use configurator::{configure, ChannelSpec, ConfigureError, SmBinding};
pub use memory::{InstructionMemory, LoadError, LoadedProgram};
