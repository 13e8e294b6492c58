use thiserror::Error;

use crate::core::apdu::ApduError;
use crate::core::transport::TransportError;
use crate::emv::dol::DolError;
use crate::emv::status::StatusWord;
use crate::tlv::{RegistryError, TlvError};

/// Errors raised by EMV session operations
#[derive(Debug, Error)]
pub enum EmvError {
    #[error("Decode error: {0}")]
    Decode(#[from] TlvError),

    #[error("Card returned {0}: {}", .0.describe())]
    Status(StatusWord),

    #[error(transparent)]
    Dol(#[from] DolError),

    #[error("No PIN tries left")]
    PinBlocked,

    #[error("Invalid PIN: {0}")]
    InvalidPin(String),

    #[error(transparent)]
    Apdu(#[from] ApduError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl EmvError {
    /// The status word, when the card refused the command
    pub fn status(&self) -> Option<StatusWord> {
        match self {
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }

    pub fn is_status(&self, expected: StatusWord) -> bool {
        self.status() == Some(expected)
    }
}
