//! Value parsers attached to registered tags

use std::fmt;

use super::decode::{read_tag, Cursor};
use super::node::TlvNode;
use super::TlvError;
use crate::core::utils::format_hex_spaced;

/// How a tag's value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagParser {
    /// Value bytes as-is
    Raw,
    /// One character per byte
    Text,
    /// Big-endian unsigned integer
    Integer,
    /// True if any byte is nonzero
    Boolean,
    /// Magnetic stripe track 2 equivalent data
    Track2,
    /// Hex when the first byte has its high bit set, text otherwise
    DfName,
    /// Directory entry: priority, label and AID
    Application,
    /// Data object list: tags with requested lengths
    DolRequest,
    /// Fixed-size groups of bytes
    Chunks(usize),
    /// No interpretation registered
    Unparsed,
}

impl TagParser {
    pub fn parse(self, node: &TlvNode) -> Result<ParsedValue, TlvError> {
        Ok(match self {
            Self::Raw => ParsedValue::Bytes(node.to_vec()),
            Self::Text => ParsedValue::Text(node.as_text()),
            Self::Integer => ParsedValue::Integer(node.as_uint()?),
            Self::Boolean => ParsedValue::Boolean(node.as_bool()),
            Self::Track2 => ParsedValue::Track2(Track2::from_bytes(node.data())?),
            Self::DfName => ParsedValue::DfName(df_name(node.data())),
            Self::Application => ParsedValue::Application(ApplicationEntry::from_node(node)?),
            Self::DolRequest => ParsedValue::DolRequest(parse_dol(node.data())?),
            Self::Chunks(0) => {
                return Err(TlvError::InvalidValue {
                    kind: "chunked",
                    reason: "chunk size must be nonzero".to_string(),
                })
            }
            Self::Chunks(size) => {
                ParsedValue::Chunks(node.data().chunks(size).map(<[u8]>::to_vec).collect())
            }
            Self::Unparsed => ParsedValue::Unparsed(node.to_vec()),
        })
    }
}

/// Result of running a [`TagParser`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedValue {
    Bytes(Vec<u8>),
    Text(String),
    Integer(u64),
    Boolean(bool),
    Track2(Track2),
    DfName(String),
    Application(ApplicationEntry),
    DolRequest(Vec<DolEntry>),
    Chunks(Vec<Vec<u8>>),
    Unparsed(Vec<u8>),
}

impl ParsedValue {
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::DfName(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) | Self::Unparsed(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_track2(&self) -> Option<&Track2> {
        match self {
            Self::Track2(track2) => Some(track2),
            _ => None,
        }
    }

    pub fn as_application(&self) -> Option<&ApplicationEntry> {
        match self {
            Self::Application(app) => Some(app),
            _ => None,
        }
    }

    pub fn as_dol(&self) -> Option<&[DolEntry]> {
        match self {
            Self::DolRequest(entries) => Some(entries),
            _ => None,
        }
    }
}

impl fmt::Display for ParsedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) | Self::Unparsed(bytes) => {
                if bytes.is_empty() {
                    write!(f, "(empty)")
                } else {
                    write!(f, "{}", format_hex_spaced(bytes))
                }
            }
            Self::Text(text) | Self::DfName(text) => write!(f, "{text}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Track2(track2) => write!(f, "{track2}"),
            Self::Application(app) => write!(f, "{app}"),
            Self::DolRequest(entries) => {
                let list = entries
                    .iter()
                    .map(|entry| format!("{:#x}/{}", entry.tag, entry.length))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{list}]")
            }
            Self::Chunks(chunks) => {
                let list = chunks
                    .iter()
                    .map(|chunk| format_hex_spaced(chunk))
                    .collect::<Vec<_>>()
                    .join(" | ");
                write!(f, "[{list}]")
            }
        }
    }
}

/// Track 2 equivalent data, split at the `D` separator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track2 {
    pub card_number: String,
    pub expiry: String,
    pub service_code: String,
    pub discretionary: String,
}

impl Track2 {
    /// Parse from the packed nibbles
    ///
    /// Fields after the separator are cut at fixed widths (4, 3, rest) and
    /// come out shorter or empty when the data runs out.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TlvError> {
        let digits = hex::encode_upper(data);
        let (card_number, rest) = digits.split_once('D').ok_or_else(|| TlvError::InvalidValue {
            kind: "track 2",
            reason: format!("no field separator in {digits}"),
        })?;

        let field = |from: usize, to: usize| {
            let end = to.min(rest.len());
            rest.get(from.min(end)..end).unwrap_or_default().to_string()
        };

        Ok(Self {
            card_number: card_number.to_string(),
            expiry: field(0, 4),
            service_code: field(4, 7),
            discretionary: field(7, rest.len()),
        })
    }
}

impl fmt::Display for Track2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "card {} expiry {} service {} extra {}",
            self.card_number, self.expiry, self.service_code, self.discretionary
        )
    }
}

/// A `61` directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationEntry {
    pub priority: Option<u64>,
    pub label: Option<String>,
    pub aid: Vec<u8>,
}

impl ApplicationEntry {
    fn from_node(node: &TlvNode) -> Result<Self, TlvError> {
        let priority = node
            .parsed_opt("PRIORITY")?
            .and_then(|value| value.as_integer());
        let label = node
            .parsed_opt("APP_LABEL")?
            .and_then(|value| value.as_text().map(str::to_string));
        let aid = node.get_by_name("AID")?.to_vec();

        Ok(Self {
            priority,
            label,
            aid,
        })
    }
}

impl fmt::Display for ApplicationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.aid))?;
        if let Some(label) = &self.label {
            write!(f, " '{label}'")?;
        }
        if let Some(priority) = self.priority {
            write!(f, " priority {priority}")?;
        }
        Ok(())
    }
}

/// One requested element of a data object list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DolEntry {
    pub tag: u32,
    pub length: usize,
}

impl DolEntry {
    pub const fn new(tag: u32, length: usize) -> Self {
        Self { tag, length }
    }
}

/// Parse a data object list: tag ids each followed by a one-byte length
pub fn parse_dol(data: &[u8]) -> Result<Vec<DolEntry>, TlvError> {
    let mut cursor = Cursor::new(data);
    let mut entries = Vec::new();
    while !cursor.is_empty() {
        let tag = read_tag(&mut cursor)?;
        let length = usize::from(cursor.next_byte("length")?);
        entries.push(DolEntry::new(tag, length));
    }
    Ok(entries)
}

fn df_name(data: &[u8]) -> String {
    match data.first() {
        Some(first) if first & 0x80 != 0 => format_hex_spaced(data),
        _ => data.iter().map(|&b| char::from(b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track2_split() {
        let track2 = Track2::from_bytes(&[
            0x47, 0x61, 0x73, 0x90, 0x01, 0x01, 0x00, 0x10, 0xD2, 0x51, 0x22, 0x01, 0x12, 0x34,
            0x5F,
        ])
        .unwrap();
        assert_eq!(track2.card_number, "4761739001010010");
        assert_eq!(track2.expiry, "2512");
        assert_eq!(track2.service_code, "201");
        assert_eq!(track2.discretionary, "12345F");
    }

    #[test]
    fn test_track2_short_tail() {
        let track2 = Track2::from_bytes(&[0x12, 0x34, 0xD2, 0x5F]).unwrap();
        assert_eq!(track2.card_number, "1234");
        assert_eq!(track2.expiry, "25F");
        assert_eq!(track2.service_code, "");
        assert_eq!(track2.discretionary, "");
    }

    #[test]
    fn test_track2_without_separator() {
        assert!(matches!(
            Track2::from_bytes(&[0x12, 0x34]),
            Err(TlvError::InvalidValue { kind: "track 2", .. })
        ));
    }

    #[test]
    fn test_parse_dol() {
        let entries = parse_dol(&[0x9F, 0x66, 0x04, 0x9F, 0x02, 0x06, 0x5F, 0x2A, 0x02]).unwrap();
        assert_eq!(
            entries,
            vec![
                DolEntry::new(0x9F66, 4),
                DolEntry::new(0x9F02, 6),
                DolEntry::new(0x5F2A, 2),
            ]
        );
        assert_eq!(parse_dol(&[]).unwrap(), Vec::new());
    }

    #[test]
    fn test_parse_dol_partial_entry() {
        assert!(matches!(
            parse_dol(&[0x9F, 0x66, 0x04, 0x9F, 0x37]),
            Err(TlvError::Truncated { part: "length", .. })
        ));
    }

    #[test]
    fn test_df_name_rendering() {
        assert_eq!(df_name(b"2PAY.SYS.DDF01"), "2PAY.SYS.DDF01");
        assert_eq!(df_name(&[0xA0, 0x00, 0x00, 0x00, 0x03]), "A0 00 00 00 03");
        assert_eq!(df_name(&[]), "");
    }

    #[test]
    fn test_display() {
        assert_eq!(ParsedValue::Integer(3).to_string(), "3");
        assert_eq!(ParsedValue::Bytes(vec![]).to_string(), "(empty)");
        assert_eq!(
            ParsedValue::Chunks(vec![vec![0x1E, 0x03], vec![0x02, 0x03]]).to_string(),
            "[1E 03 | 02 03]"
        );
        assert_eq!(
            ParsedValue::DolRequest(vec![DolEntry::new(0x9F66, 4)]).to_string(),
            "[0x9f66/4]"
        );
    }
}
