//! BER-TLV decoding with named tags.
//!
//! A [`TlvNode`] wraps a value buffer; its children are decoded lazily from
//! that buffer and looked up by numeric id or by the name a [`TagRegistry`]
//! assigns. Only definite lengths are accepted.

mod decode;
pub mod encode;
mod error;
mod node;
pub mod parser;
pub mod registry;

pub use error::TlvError;
pub use node::TlvNode;
pub use parser::{parse_dol, ApplicationEntry, DolEntry, ParsedValue, TagParser, Track2};
pub use registry::{universal, RegistryError, TagEntry, TagRegistry};
