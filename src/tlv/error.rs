use thiserror::Error;

/// Failures while decoding or interpreting TLV data.
///
/// `MalformedTag`, `Unsupported` and `Truncated` are decode errors: the node
/// that raised them has no usable children.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    #[error("Malformed tag at offset {offset}")]
    MalformedTag { offset: usize },

    #[error("Unsupported encoding at offset {offset}: {reason}")]
    Unsupported { offset: usize, reason: &'static str },

    #[error("Truncated record: {part} cut short at offset {offset}")]
    Truncated { offset: usize, part: &'static str },

    #[error("Unknown tag name '{0}'")]
    UnknownName(String),

    #[error("Tag {0} not present")]
    MissingTag(String),

    #[error("Integer of {0} significant bytes does not fit in 64 bits")]
    IntegerOverflow(usize),

    #[error("Invalid {kind} value: {reason}")]
    InvalidValue { kind: &'static str, reason: String },
}

impl TlvError {
    /// True for errors raised by the byte-level decoder
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedTag { .. } | Self::Unsupported { .. } | Self::Truncated { .. }
        )
    }
}
