//! EMV application layer on top of the TLV codec

pub mod aids;
pub mod dol;
pub mod options;
pub mod session;
pub mod status;
pub mod tags;
