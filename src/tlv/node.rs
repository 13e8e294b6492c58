use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use super::decode::{read_length, read_tag, Cursor};
use super::parser::ParsedValue;
use super::registry::{universal, TagRegistry};
use super::TlvError;
use crate::core::utils::format_hex_spaced;

/// Largest integer value accepted by [`TlvNode::as_uint`]
const MAX_INTEGER_BYTES: usize = 8;

/// A TLV value together with the registry used to name its children.
///
/// Children are decoded on first access and cached; cloning a node shares
/// the underlying buffer.
#[derive(Clone)]
pub struct TlvNode {
    data: Bytes,
    registry: Arc<TagRegistry>,
    children: OnceLock<Result<Children, TlvError>>,
}

#[derive(Debug, Clone, Default)]
struct Children {
    entries: Vec<(u32, TlvNode)>,
    by_tag: HashMap<u32, Vec<usize>>,
}

impl TlvNode {
    pub fn new(data: impl Into<Bytes>, registry: Arc<TagRegistry>) -> Self {
        Self {
            data: data.into(),
            registry,
            children: OnceLock::new(),
        }
    }

    /// A node that only knows the universal tags
    pub fn universal(data: impl Into<Bytes>) -> Self {
        Self::new(data, TagRegistry::universal())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn registry(&self) -> &Arc<TagRegistry> {
        &self.registry
    }

    fn children(&self) -> Result<&Children, TlvError> {
        self.children
            .get_or_init(|| decode_children(&self.data, &self.registry))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Decoded children in order of appearance
    pub fn entries(&self) -> Result<&[(u32, TlvNode)], TlvError> {
        Ok(&self.children()?.entries)
    }

    /// Distinct child tags in order of first appearance
    pub fn tags(&self) -> Result<Vec<u32>, TlvError> {
        let mut tags: Vec<u32> = Vec::new();
        for (tag, _) in self.entries()? {
            if !tags.contains(tag) {
                tags.push(*tag);
            }
        }
        Ok(tags)
    }

    pub fn contains(&self, tag: u32) -> Result<bool, TlvError> {
        Ok(self.children()?.by_tag.contains_key(&tag))
    }

    pub fn contains_name(&self, name: &str) -> Result<bool, TlvError> {
        self.contains(self.tag_id(name)?)
    }

    /// First child with this tag, if any
    pub fn first(&self, tag: u32) -> Result<Option<&TlvNode>, TlvError> {
        let children = self.children()?;
        Ok(children
            .by_tag
            .get(&tag)
            .and_then(|indices| indices.first())
            .map(|&index| &children.entries[index].1))
    }

    /// First child with this tag
    pub fn get(&self, tag: u32) -> Result<&TlvNode, TlvError> {
        self.first(tag)?
            .ok_or_else(|| TlvError::MissingTag(self.registry.label(tag)))
    }

    /// Every child with this tag, in order; empty when there are none
    pub fn get_list(&self, tag: u32) -> Result<Vec<&TlvNode>, TlvError> {
        let children = self.children()?;
        Ok(children
            .by_tag
            .get(&tag)
            .map(|indices| indices.iter().map(|&i| &children.entries[i].1).collect())
            .unwrap_or_default())
    }

    pub fn first_by_name(&self, name: &str) -> Result<Option<&TlvNode>, TlvError> {
        self.first(self.tag_id(name)?)
    }

    pub fn get_by_name(&self, name: &str) -> Result<&TlvNode, TlvError> {
        self.get(self.tag_id(name)?)
    }

    pub fn get_list_by_name(&self, name: &str) -> Result<Vec<&TlvNode>, TlvError> {
        self.get_list(self.tag_id(name)?)
    }

    fn tag_id(&self, name: &str) -> Result<u32, TlvError> {
        self.registry
            .id_for(name)
            .ok_or_else(|| TlvError::UnknownName(name.to_string()))
    }

    /// Interpret this node's value with the parser registered for `tag`
    pub fn parse_as(&self, tag: u32) -> Result<ParsedValue, TlvError> {
        self.registry.parser_for(tag).parse(self)
    }

    /// Parsed value of the first child named `name`
    pub fn parsed(&self, name: &str) -> Result<ParsedValue, TlvError> {
        let tag = self.tag_id(name)?;
        self.get(tag)?.parse_as(tag)
    }

    /// Like [`parsed`](Self::parsed) but absent children give `None`
    pub fn parsed_opt(&self, name: &str) -> Result<Option<ParsedValue>, TlvError> {
        let tag = self.tag_id(name)?;
        self.first(tag)?.map(|node| node.parse_as(tag)).transpose()
    }

    pub fn parsed_list(&self, name: &str) -> Result<Vec<ParsedValue>, TlvError> {
        let tag = self.tag_id(name)?;
        self.get_list(tag)?
            .into_iter()
            .map(|node| node.parse_as(tag))
            .collect()
    }

    /// Big-endian unsigned value; empty data is zero
    pub fn as_uint(&self) -> Result<u64, TlvError> {
        let start = self
            .data
            .iter()
            .position(|&b| b != 0)
            .unwrap_or(self.data.len());
        let significant = &self.data[start..];
        if significant.len() > MAX_INTEGER_BYTES {
            return Err(TlvError::IntegerOverflow(significant.len()));
        }
        Ok(significant
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }

    pub fn as_bool(&self) -> bool {
        self.data.iter().any(|&b| b != 0)
    }

    /// One character per byte
    pub fn as_text(&self) -> String {
        self.data.iter().map(|&b| char::from(b)).collect()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    pub fn int_at(&self, index: usize) -> Result<u64, TlvError> {
        self.universal_at(universal::INTEGER, "INTEGER", index)?
            .as_uint()
    }

    pub fn bool_at(&self, index: usize) -> Result<bool, TlvError> {
        Ok(self
            .universal_at(universal::BOOLEAN, "BOOLEAN", index)?
            .as_bool())
    }

    pub fn text_at(&self, index: usize) -> Result<String, TlvError> {
        Ok(self
            .universal_at(universal::STRING, "STRING", index)?
            .as_text())
    }

    pub fn bytes_at(&self, index: usize) -> Result<Vec<u8>, TlvError> {
        Ok(self
            .universal_at(universal::BYTES, "BYTES", index)?
            .to_vec())
    }

    fn universal_at(&self, tag: u32, name: &str, index: usize) -> Result<&TlvNode, TlvError> {
        self.get_list(tag)?
            .get(index)
            .copied()
            .ok_or_else(|| TlvError::MissingTag(format!("{name}[{index}]")))
    }

    /// Indented tree of the decoded contents.
    ///
    /// Fails only when this node itself does not decode; nested values that
    /// do not decode are shown as raw bytes.
    pub fn dump(&self) -> Result<String, TlvError> {
        let mut out = String::new();
        self.dump_into(&mut out, 0)?;
        Ok(out)
    }

    fn dump_into(&self, out: &mut String, depth: usize) -> Result<(), TlvError> {
        for group in self.entries()?.chunk_by(|a, b| a.0 == b.0) {
            let tag = group[0].0;
            push_line(out, depth, self.registry.label(tag) + ":");
            for (_, node) in group {
                node.dump_value(out, tag, depth + 1);
            }
        }
        Ok(())
    }

    fn dump_value(&self, out: &mut String, tag: u32, depth: usize) {
        if let Some(parser) = self.registry.parser(tag) {
            let line = parser
                .parse(self)
                .map(|value| value.to_string())
                .unwrap_or_else(|_| raw_text(&self.data));
            push_line(out, depth, line);
            return;
        }

        match self.entries() {
            Ok(entries) if !entries.is_empty() => {
                // Entries decoded above, so this cannot fail
                let _ = self.dump_into(out, depth);
            }
            _ => push_line(out, depth, raw_text(&self.data)),
        }
    }
}

fn decode_children(data: &Bytes, registry: &Arc<TagRegistry>) -> Result<Children, TlvError> {
    let mut cursor = Cursor::new(data);
    let mut children = Children::default();

    while !cursor.is_empty() {
        let tag = read_tag(&mut cursor)?;
        let length = read_length(&mut cursor)?;
        let range = cursor.take(length, "value")?;

        children
            .by_tag
            .entry(tag)
            .or_default()
            .push(children.entries.len());
        children
            .entries
            .push((tag, TlvNode::new(data.slice(range), Arc::clone(registry))));
    }

    Ok(children)
}

fn raw_text(data: &[u8]) -> String {
    if data.is_empty() {
        "(empty)".to_string()
    } else {
        format_hex_spaced(data)
    }
}

fn push_line(out: &mut String, depth: usize, text: String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&text);
    out.push('\n');
}

impl fmt::Debug for TlvNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TLV {}>", format_hex_spaced(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::encode::encode;
    use crate::tlv::TagParser;

    fn sample_registry() -> Arc<TagRegistry> {
        Arc::new(
            TagRegistry::universal()
                .extend([
                    crate::tlv::TagEntry::new(0x9F38, "PDOL", Some(TagParser::DolRequest)),
                    crate::tlv::TagEntry::new(0x50, "APP_LABEL", Some(TagParser::Text)),
                ])
                .unwrap(),
        )
    }

    #[test]
    fn test_sequence_scenario() {
        let root = TlvNode::universal(vec![
            0x30, 0x0A, 0x02, 0x01, 0x1E, 0x02, 0x02, 0xC3, 0x50, 0x01, 0x01, 0x00,
        ]);
        let sequence = root.get_by_name("SEQUENCE").unwrap();
        assert_eq!(sequence.int_at(0).unwrap(), 30);
        assert_eq!(sequence.int_at(1).unwrap(), 50000);
        assert!(!sequence.bool_at(0).unwrap());
        assert_eq!(sequence.get_list(universal::INTEGER).unwrap().len(), 2);
        assert!(matches!(sequence.int_at(2), Err(TlvError::MissingTag(_))));
    }

    #[test]
    fn test_repeated_tags_keep_order() {
        let root = TlvNode::universal(vec![
            0x0C, 0x01, b'a', 0x02, 0x01, 0x07, 0x0C, 0x01, b'b', 0x0C, 0x01, b'c',
        ]);
        let texts: Vec<String> = root
            .get_list(universal::STRING)
            .unwrap()
            .into_iter()
            .map(TlvNode::as_text)
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(root.tags().unwrap(), vec![universal::STRING, universal::INTEGER]);
        assert_eq!(root.first(universal::STRING).unwrap().unwrap().as_text(), "a");
        assert_eq!(root.get_list(universal::BOOLEAN).unwrap().len(), 0);
    }

    #[test]
    fn test_round_trip_lengths_and_tags() {
        let tags: [&[u8]; 3] = [&[0x04], &[0x9F, 0x02], &[0xDF, 0x81, 0x01]];
        let ids = [0x04, 0x9F02, 0xDF0101];
        for (tag, id) in tags.iter().zip(ids) {
            for len in [0usize, 127, 128, 65535] {
                let value: Vec<u8> = (0..len).map(|i| i as u8).collect();
                let node = TlvNode::universal(encode(tag, &value));
                assert_eq!(node.get(id).unwrap().data(), value.as_slice());
            }
        }
    }

    #[test]
    fn test_truncated_value() {
        let node = TlvNode::universal(vec![0x04, 0x05, 0x01, 0x02]);
        assert_eq!(
            node.entries().unwrap_err(),
            TlvError::Truncated {
                offset: 2,
                part: "value"
            }
        );
        // Cached error comes back the same on every access
        assert!(node.get(0x04).is_err());
        assert!(node.dump().is_err());
    }

    #[test]
    fn test_indefinite_length() {
        let node = TlvNode::universal(vec![0x30, 0x80, 0x00, 0x00]);
        assert!(matches!(
            node.entries(),
            Err(TlvError::Unsupported { offset: 1, .. })
        ));
    }

    #[test]
    fn test_empty_node() {
        let node = TlvNode::universal(Vec::new());
        assert!(node.entries().unwrap().is_empty());
        assert_eq!(node.as_uint().unwrap(), 0);
        assert!(!node.as_bool());
        assert_eq!(node.dump().unwrap(), "");
    }

    #[test]
    fn test_unknown_name_and_missing_tag() {
        let node = TlvNode::universal(vec![0x02, 0x01, 0x05]);
        assert_eq!(
            node.get_by_name("PAN").unwrap_err(),
            TlvError::UnknownName("PAN".into())
        );
        assert!(matches!(
            node.get_by_name("BOOLEAN"),
            Err(TlvError::MissingTag(_))
        ));
        assert_eq!(node.parsed_opt("BOOLEAN").unwrap(), None);
        assert!(node.contains_name("INTEGER").unwrap());
    }

    #[test]
    fn test_integer_bounds() {
        let node = TlvNode::universal(vec![0x00, 0x00, 0x01, 0x02]);
        assert_eq!(node.as_uint().unwrap(), 0x0102);

        let wide = TlvNode::universal(vec![0xFF; 8]);
        assert_eq!(wide.as_uint().unwrap(), u64::MAX);

        let too_wide = TlvNode::universal(vec![0x01; 9]);
        assert_eq!(too_wide.as_uint(), Err(TlvError::IntegerOverflow(9)));
    }

    #[test]
    fn test_parsed_values() {
        let registry = sample_registry();
        let node = TlvNode::new(
            vec![0x9F, 0x38, 0x03, 0x9F, 0x66, 0x04, 0x50, 0x04, b'V', b'I', b'S', b'A'],
            registry,
        );
        let pdol = node.parsed("PDOL").unwrap();
        assert_eq!(pdol.as_dol().unwrap()[0].tag, 0x9F66);
        assert_eq!(node.parsed("APP_LABEL").unwrap().as_text(), Some("VISA"));
        assert_eq!(node.parsed_list("APP_LABEL").unwrap().len(), 1);
    }

    #[test]
    fn test_dump_layout() {
        let root = TlvNode::universal(vec![
            0x30, 0x0A, 0x02, 0x01, 0x1E, 0x02, 0x02, 0xC3, 0x50, 0x01, 0x01, 0x00,
        ]);
        let dump = root.dump().unwrap();
        assert_eq!(
            dump,
            "SEQUENCE (0x30):\n  INTEGER (0x2):\n    30\n    50000\n  BOOLEAN (0x1):\n    false\n"
        );
    }

    #[test]
    fn test_dump_unknown_and_undecodable() {
        // Unknown tag holding a non-TLV value
        let root = TlvNode::universal(vec![0x85, 0x02, 0x04, 0x05]);
        assert_eq!(root.dump().unwrap(), "0x85:\n  04 05\n");

        // Unknown constructed tag is expanded
        let root = TlvNode::universal(vec![0xA5, 0x03, 0x01, 0x01, 0xFF]);
        assert_eq!(root.dump().unwrap(), "0xa5:\n  BOOLEAN (0x1):\n    true\n");
    }

    #[test]
    fn test_dump_falls_back_when_parser_fails() {
        let registry = TagRegistry::new()
            .register(0x57, "TRACK2", Some(TagParser::Track2))
            .unwrap();
        // No 'D' separator in the track data
        let root = TlvNode::new(vec![0x57, 0x03, 0x41, 0x11, 0x11], Arc::new(registry));
        assert!(root.parsed("TRACK2").is_err());
        assert_eq!(root.dump().unwrap(), "TRACK2 (0x57):\n  41 11 11\n");
    }

    #[test]
    fn test_clone_shares_buffer() {
        let root = TlvNode::universal(vec![0x04, 0x02, 0xAA, 0xBB]);
        let child = root.get(0x04).unwrap().clone();
        assert_eq!(child.bytes(), Bytes::from_static(&[0xAA, 0xBB]));
        assert_eq!(format!("{child:?}"), "<TLV AA BB>");
    }
}
