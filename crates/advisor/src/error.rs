//! Advisor error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("An engine session is already active")]
    SessionActive,
}
