//! The single engine interface both bus roles implement.
//!
//! A build picks exactly one role; everything above the engine (start-up
//! orchestration, interrupt routing, dispatch) is written against
//! [`BusEngine`] only.

use crate::error::EngineError;
use crate::handoff::{BusEvent, IrqRoute};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusRole {
    /// Responds to cycles driven by the host.
    Peripheral,
    /// Drives cycles against a peripheral.
    Master,
}

impl BusRole {
    pub const fn name(&self) -> &'static str {
        match self {
            BusRole::Peripheral => "peripheral",
            BusRole::Master => "master",
        }
    }
}

/// Initialization state owned by each engine instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineState {
    Uninitialized,
    Running,
    /// Initialization failed; no channel was enabled.
    Failed(EngineError),
}

impl EngineState {
    pub const fn is_running(&self) -> bool {
        matches!(self, EngineState::Running)
    }

    /// Status as seen by the start-up orchestrator: 0 when running.
    pub const fn status(&self) -> i32 {
        match self {
            EngineState::Running => 0,
            EngineState::Uninitialized => EngineError::NotRunning.status(),
            EngineState::Failed(e) => e.status(),
        }
    }
}

pub trait BusEngine {
    fn role(&self) -> BusRole;

    /// One-time hardware bring-up. A second call panics.
    fn init(&mut self) -> Result<(), EngineError>;

    fn state(&self) -> EngineState;

    /// Request flags this engine raises and the processor lines they are
    /// routed to. Empty for roles that do not use interrupts.
    fn interrupt_routes(&self) -> &[IrqRoute];

    /// Deferred servicing of a posted event.
    fn handle_event(&mut self, event: BusEvent);
}

/// Panic for a second call to a one-time initializer.
pub(crate) fn already_initialized(module: &str) -> ! {
    panic!("{}: init called more than once", module)
}
