//! Cycle-level digital twin of the bus bridge board.
//!
//! Components:
//! - [`pio`]: one programmable I/O block (4 state machines, shared
//!   instruction memory, IRQ flags, pin latches)
//! - [`pads`]: GPIO pads with pulls, function select and contention count
//! - [`host`]: a host CPU running bus cycles against the peripheral role
//! - [`echo`]: a peripheral that echoes writes, for the master role
//! - [`world`]: the board tying these together, and the handles that
//!   implement the `buslink-hal` traits so the real engines run unmodified
//! - [`rig`] and [`scenario`]: interrupt controller, dispatch loop and the
//!   acceptance scenarios

pub mod echo;
pub mod error;
pub mod host;
pub mod pads;
pub mod pio;
pub mod rig;
pub mod scenario;
pub mod world;

pub use error::{Result, TwinError};
pub use host::{CycleRecord, HostOp};
pub use rig::{Dispatcher, MasterRig, PeripheralRig};
pub use scenario::{Scenario, ScenarioReport};
pub use world::{Twin, TwinDataBus, TwinPio, World};
