//! EMV Tester - smart card protocol client
//!
//! BER-TLV decoding with named tags, and an EMV session driving application
//! selection, processing options and record reading over PC/SC.
pub mod cli;
pub mod core;
pub mod emv;
pub mod error;
pub mod tlv;

// Re-export commonly used types
pub use core::{
    apdu::{Apdu, ApduError, RecordSelector, SelectOccurrence},
    reader::{PcscReader, ReaderInfo},
    transcript::{ExchangeRecord, Recorder},
    transport::{RawResponse, Transport, TransportError},
    utils::{format_hex, parse_hex},
};
pub use emv::{
    dol::{DolResolver, TerminalConfig},
    session::{CryptogramKind, EmvSession, SelectedApplication},
    status::StatusWord,
};
pub use error::EmvError;
pub use tlv::{TagRegistry, TlvError, TlvNode};
