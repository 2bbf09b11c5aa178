//! Call-related error types.

use thiserror::Error;

use crate::media::MediaError;
use crate::relay::RelayError;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("another call is already in progress")]
    Busy,

    #[error("no active call")]
    NoActiveCall,

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] crate::state::InvalidTransition),

    #[error("relay request failed: {0}")]
    Relay(#[from] RelayError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),
}
