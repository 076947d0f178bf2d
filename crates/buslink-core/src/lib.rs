//! Platform-agnostic parallel-bus bridge logic.
//!
//! The engines drive a programmable I/O block through
//! [`buslink_hal::PioHardware`] and the data lines through
//! [`buslink_hal::DataBus`], so the same code runs on the RP2350 firmware and
//! on the host digital twin.

#![no_std]

pub mod board;
pub mod error;
pub mod handoff;
pub mod master;
pub mod peripheral;
pub mod role;
pub mod sched;
pub mod sm;
pub mod source;

pub use error::{Channel, EngineError};
pub use handoff::{BusEvent, EventKind, IrqRoute};
pub use master::MasterEngine;
pub use peripheral::PeripheralEngine;
pub use role::{BusEngine, BusRole, EngineState};
