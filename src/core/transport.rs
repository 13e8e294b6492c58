//! The byte-level boundary between the protocol layer and a card.
//!
//! A transport sends one command and blocks until the card answers. It knows
//! nothing about instruction codes or status word meanings.

use thiserror::Error;

use crate::emv::status::StatusWord;

/// Faults raised below the protocol layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    #[error("No card connected")]
    NotConnected,

    #[error("Response of {0} bytes is too short to carry a status word")]
    ShortResponse(usize),

    #[error("{0}")]
    Other(String),
}

/// Response body plus trailing status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl RawResponse {
    pub fn new(data: impl Into<Vec<u8>>, sw1: u8, sw2: u8) -> Self {
        Self {
            data: data.into(),
            sw1,
            sw2,
        }
    }

    /// Split a raw card answer (`data || SW1 || SW2`)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        match bytes {
            [data @ .., sw1, sw2] => Ok(Self::new(data, *sw1, *sw2)),
            _ => Err(TransportError::ShortResponse(bytes.len())),
        }
    }

    pub fn status(&self) -> StatusWord {
        StatusWord::new(self.sw1, self.sw2)
    }
}

/// Synchronous, one-shot-per-call command exchange with a card.
///
/// Implementations must not retry on their own: a repeated command can have
/// side effects on the card (counters, PIN tries).
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    fn transmit(&mut self, command: &[u8]) -> Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transmit(&mut self, command: &[u8]) -> Result<RawResponse, TransportError> {
        (**self).transmit(command)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, command: &[u8]) -> Result<RawResponse, TransportError> {
        (**self).transmit(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_response_from_bytes() {
        let response = RawResponse::from_bytes(&[0x6F, 0x00, 0x90, 0x00]).unwrap();
        assert_eq!(response.data, vec![0x6F, 0x00]);
        assert_eq!((response.sw1, response.sw2), (0x90, 0x00));
        assert!(response.status().is_success());

        let bare = RawResponse::from_bytes(&[0x6A, 0x82]).unwrap();
        assert!(bare.data.is_empty());
        assert_eq!(bare.status(), StatusWord::FILE_NOT_FOUND);
    }

    #[test]
    fn test_raw_response_too_short() {
        assert!(matches!(
            RawResponse::from_bytes(&[0x90]),
            Err(TransportError::ShortResponse(1))
        ));
        assert!(matches!(
            RawResponse::from_bytes(&[]),
            Err(TransportError::ShortResponse(0))
        ));
    }

    #[test]
    fn test_mut_ref_forwards() {
        let mut mock = MockTransport::new();
        mock.expect_transmit()
            .times(1)
            .returning(|_| Ok(RawResponse::new(vec![0x01], 0x90, 0x00)));

        let mut borrowed = &mut mock;
        let response = borrowed.transmit(&[0x00, 0x84, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(response.data, vec![0x01]);
    }
}
