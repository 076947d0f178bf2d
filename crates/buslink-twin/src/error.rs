use buslink_core::sched::HandlerError;
use buslink_core::EngineError;
use thiserror::Error;

use crate::scenario::Scenario;

#[derive(Debug, Error)]
pub enum TwinError {
    #[error("engine start failed: {0}")]
    Engine(EngineError),

    #[error("engine call failed: {0}")]
    Call(EngineError),

    #[error("handler registration failed: {0}")]
    Handler(HandlerError),

    #[error("{what} did not finish within {budget} cycles")]
    Timeout { what: &'static str, budget: u64 },

    #[error("host is busy with another cycle")]
    HostBusy,

    #[error("no {0} attached to the twin")]
    NotAttached(&'static str),

    #[error("scenario {scenario}: {detail}")]
    Mismatch { scenario: Scenario, detail: String },
}

impl From<HandlerError> for TwinError {
    fn from(e: HandlerError) -> Self {
        TwinError::Handler(e)
    }
}

pub type Result<T> = std::result::Result<T, TwinError>;
