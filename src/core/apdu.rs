//! Command APDU construction

use std::borrow::Cow;

use thiserror::Error;

/// Largest encoded command (header + Lc + data) a short APDU may carry
pub const MAX_COMMAND_LEN: usize = 255;

/// Header plus the Lc byte
const HEADER_LEN: usize = 5;

/// Instruction codes used by the EMV layer
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const READ_RECORD: u8 = 0xB2;
    pub const GET_DATA: u8 = 0xCA;
    pub const GET_PROCESSING_OPTIONS: u8 = 0xA8;
    pub const GENERATE_AC: u8 = 0xAE;
    pub const VERIFY: u8 = 0x20;
    pub const GET_CHALLENGE: u8 = 0x84;
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
    pub const GET_RESPONSE: u8 = 0xC0;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApduError {
    #[error("APDU payload too long: {len} bytes of data exceeds the {max} byte command limit")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Short file identifier {0} is out of range (0-30)")]
    InvalidSfi(u8),

    #[error("Tag {0:#x} does not fit in P1/P2")]
    TagTooWide(u32),
}

/// APDU command builder
///
/// Encodes as `CLA INS P1 P2 Lc data..`. The length byte is always present
/// and defaults to the data length. Without data it is the Le of a case 2
/// command (`00` asks for everything available).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    lc: Option<u8>,
    data: Vec<u8>,
}

impl Apdu {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            lc: None,
            data: Vec::new(),
        }
    }

    /// Set command data
    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Override the length byte (an expected response length for case 2 commands)
    pub fn lc(mut self, lc: u8) -> Self {
        self.lc = Some(lc);
        self
    }

    /// Build the APDU command bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ApduError> {
        if HEADER_LEN + self.data.len() > MAX_COMMAND_LEN {
            return Err(ApduError::PayloadTooLong {
                len: self.data.len(),
                max: MAX_COMMAND_LEN - HEADER_LEN,
            });
        }

        // Bounded by the check above
        let lc = self.lc.unwrap_or(self.data.len() as u8);

        let mut apdu = Vec::with_capacity(HEADER_LEN + self.data.len());
        apdu.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2, lc]);
        apdu.extend_from_slice(&self.data);

        Ok(apdu)
    }
}

/// Command bytes fit for logs and transcripts: the PIN block carried by
/// VERIFY is overwritten with `FF`
pub fn redacted(command: &[u8]) -> Cow<'_, [u8]> {
    match command {
        [_, ins::VERIFY, _, _, _, data @ ..] if !data.is_empty() => {
            let mut masked = command.to_vec();
            masked[HEADER_LEN..].fill(0xFF);
            Cow::Owned(masked)
        }
        _ => Cow::Borrowed(command),
    }
}

/// Which of several matching applications a SELECT addresses (P2 low bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOccurrence {
    First,
    Last,
    Next,
    Previous,
}

impl SelectOccurrence {
    pub const fn p2(self) -> u8 {
        match self {
            Self::First => 0,
            Self::Last => 1,
            Self::Next => 2,
            Self::Previous => 3,
        }
    }
}

/// Record addressing mode for READ RECORD (P2 low three bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSelector {
    First,
    Last,
    Next,
    Previous,
    Index,
    IndexFrom,
    IndexTo,
}

impl RecordSelector {
    pub const fn bits(self) -> u8 {
        match self {
            Self::First => 0,
            Self::Last => 1,
            Self::Next => 2,
            Self::Previous => 3,
            Self::Index => 4,
            Self::IndexFrom => 5,
            Self::IndexTo => 6,
        }
    }
}

/// Common EMV APDU commands
pub mod commands {
    use super::{ins, Apdu, ApduError, RecordSelector, SelectOccurrence};

    /// SELECT by DF name (P1 = 04)
    pub fn select_by_name(pattern: &[u8], which: SelectOccurrence) -> Apdu {
        Apdu::new(0x00, ins::SELECT, 0x04, which.p2()).data(pattern)
    }

    /// READ RECORD with the SFI packed above the selector bits
    pub fn read_record(
        record_number: u8,
        sfi: u8,
        which: RecordSelector,
    ) -> Result<Apdu, ApduError> {
        if sfi > 30 {
            return Err(ApduError::InvalidSfi(sfi));
        }
        Ok(Apdu::new(
            0x00,
            ins::READ_RECORD,
            record_number,
            (sfi << 3) | which.bits(),
        ))
    }

    /// GET DATA for a one or two byte tag carried in P1/P2
    pub fn get_data(tag: u32) -> Result<Apdu, ApduError> {
        let [_, _, p1, p2] = tag.to_be_bytes();
        if tag > 0xFFFF {
            return Err(ApduError::TagTooWide(tag));
        }
        Ok(Apdu::new(0x80, ins::GET_DATA, p1, p2))
    }

    /// GET PROCESSING OPTIONS with an already templated PDOL answer
    pub fn get_processing_options(pdol_template: Vec<u8>) -> Apdu {
        Apdu::new(0x80, ins::GET_PROCESSING_OPTIONS, 0x00, 0x00).data(pdol_template)
    }

    /// GENERATE AC; `reference` is the cryptogram type already shifted into P1
    pub fn generate_ac(reference: u8, data: &[u8]) -> Apdu {
        Apdu::new(0x80, ins::GENERATE_AC, reference, 0x00).data(data)
    }

    /// VERIFY with a plaintext PIN block
    pub fn verify_plaintext(pin_block: [u8; 8]) -> Apdu {
        Apdu::new(0x00, ins::VERIFY, 0x00, 0x80).data(pin_block)
    }

    /// GET CHALLENGE for `length` random bytes (case 2, length as Le)
    pub fn get_challenge(length: u8) -> Apdu {
        Apdu::new(0x00, ins::GET_CHALLENGE, 0x00, 0x00).lc(length)
    }

    pub fn external_authenticate() -> Apdu {
        Apdu::new(0x00, ins::EXTERNAL_AUTHENTICATE, 0x00, 0x00)
    }

    /// Fetch `available` pending response bytes after a `61xx`
    pub fn get_response(available: u8) -> Apdu {
        Apdu::new(0x00, ins::GET_RESPONSE, 0x00, 0x00).lc(available)
    }
}
