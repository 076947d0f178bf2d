//! Engine-level errors.

use core::fmt;

use crate::board::{PinGroupError, SmAssignmentError};
use crate::sm::ConfigureError;

/// The hardware channel an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    ReadWatcher,
    WriteWatcher,
    WaitEnforcer,
    MasterRead,
    MasterWrite,
}

impl Channel {
    pub const fn name(&self) -> &'static str {
        match self {
            Channel::ReadWatcher => "read watcher",
            Channel::WriteWatcher => "write watcher",
            Channel::WaitEnforcer => "wait enforcer",
            Channel::MasterRead => "master read driver",
            Channel::MasterWrite => "master write driver",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    /// A channel could not be configured; nothing was enabled.
    Configure {
        channel: Channel,
        cause: ConfigureError,
    },
    /// The board description does not give the groups the role needs.
    Pins(PinGroupError),
    /// The state-machine assignment does not fit the role.
    StateMachines(SmAssignmentError),
    /// Bus operation on an engine that is not running.
    NotRunning,
}

impl EngineError {
    /// Non-zero status for the start-up orchestrator.
    pub const fn status(&self) -> i32 {
        match self {
            EngineError::Configure { cause, .. } => cause.status(),
            EngineError::Pins(e) => ConfigureError::Pins(*e).status(),
            EngineError::StateMachines(_) => -6,
            EngineError::NotRunning => -16,
        }
    }
}

impl From<PinGroupError> for EngineError {
    fn from(e: PinGroupError) -> Self {
        EngineError::Pins(e)
    }
}

impl From<SmAssignmentError> for EngineError {
    fn from(e: SmAssignmentError) -> Self {
        EngineError::StateMachines(e)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Configure { channel, cause } => {
                write!(f, "{}: {}", channel.name(), cause)
            }
            EngineError::Pins(e) => write!(f, "board pins: {}", e),
            EngineError::StateMachines(e) => write!(f, "state machines: {}", e),
            EngineError::NotRunning => write!(f, "engine not running"),
        }
    }
}
