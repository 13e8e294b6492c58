//! Tag registry: bidirectional id/name mapping with optional value parsers.
//!
//! Registries are immutable once built and shared behind an [`Arc`]; decoding
//! never mutates them. Extending one produces a new registry.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use thiserror::Error;

use super::parser::TagParser;

/// Ids of the universal tags every registry starts from
pub mod universal {
    pub const BOOLEAN: u32 = 0x01;
    pub const INTEGER: u32 = 0x02;
    pub const BYTES: u32 = 0x04;
    pub const FLOAT: u32 = 0x09;
    pub const STRING: u32 = 0x0C;
    pub const SEQUENCE: u32 = 0x30;
}

/// One registered tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub id: u32,
    pub name: Cow<'static, str>,
    pub parser: Option<TagParser>,
}

impl TagEntry {
    pub const fn new(id: u32, name: &'static str, parser: Option<TagParser>) -> Self {
        Self {
            id,
            name: Cow::Borrowed(name),
            parser,
        }
    }
}

const UNIVERSAL_TAGS: &[TagEntry] = &[
    TagEntry::new(universal::BOOLEAN, "BOOLEAN", Some(TagParser::Boolean)),
    TagEntry::new(universal::INTEGER, "INTEGER", Some(TagParser::Integer)),
    TagEntry::new(universal::BYTES, "BYTES", Some(TagParser::Raw)),
    TagEntry::new(universal::FLOAT, "FLOAT", None),
    TagEntry::new(universal::STRING, "STRING", Some(TagParser::Text)),
    TagEntry::new(universal::SEQUENCE, "SEQUENCE", None),
];

static UNIVERSAL: LazyLock<Arc<TagRegistry>> = LazyLock::new(|| {
    Arc::new(
        TagRegistry::from_entries(UNIVERSAL_TAGS.iter().cloned())
            .expect("universal tag table has unique ids and names"),
    )
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Tag id {id:#x} registered twice ('{existing}' and '{name}')")]
    DuplicateId {
        id: u32,
        existing: String,
        name: String,
    },

    #[error("Tag name '{name}' registered twice ({existing:#x} and {id:#x})")]
    DuplicateName { name: String, existing: u32, id: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    entries: Vec<TagEntry>,
    by_id: HashMap<u32, usize>,
    by_name: HashMap<Cow<'static, str>, u32>,
}

impl TagRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared universal registry
    pub fn universal() -> Arc<Self> {
        Arc::clone(&UNIVERSAL)
    }

    pub fn from_entries(entries: impl IntoIterator<Item = TagEntry>) -> Result<Self, RegistryError> {
        entries
            .into_iter()
            .try_fold(Self::new(), |registry, entry| registry.with_entry(entry))
    }

    /// Add one tag; ids and names must both be unused
    pub fn register(
        self,
        id: u32,
        name: impl Into<Cow<'static, str>>,
        parser: Option<TagParser>,
    ) -> Result<Self, RegistryError> {
        self.with_entry(TagEntry {
            id,
            name: name.into(),
            parser,
        })
    }

    /// A new registry holding this one's tags plus `entries`
    pub fn extend(&self, entries: impl IntoIterator<Item = TagEntry>) -> Result<Self, RegistryError> {
        entries
            .into_iter()
            .try_fold(self.clone(), |registry, entry| registry.with_entry(entry))
    }

    fn with_entry(mut self, entry: TagEntry) -> Result<Self, RegistryError> {
        if let Some(existing) = self.name(entry.id) {
            return Err(RegistryError::DuplicateId {
                id: entry.id,
                existing: existing.to_string(),
                name: entry.name.into_owned(),
            });
        }
        if let Some(&existing) = self.by_name.get(entry.name.as_ref()) {
            return Err(RegistryError::DuplicateName {
                name: entry.name.into_owned(),
                existing,
                id: entry.id,
            });
        }

        self.by_id.insert(entry.id, self.entries.len());
        self.by_name.insert(entry.name.clone(), entry.id);
        self.entries.push(entry);
        Ok(self)
    }

    pub fn entries(&self) -> &[TagEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&TagEntry> {
        self.by_id.get(&id).map(|&index| &self.entries[index])
    }

    pub fn id_for(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.get(id).map(|entry| entry.name.as_ref())
    }

    /// Registered name, or the id in hex
    pub fn name_for(&self, id: u32) -> Cow<'_, str> {
        match self.name(id) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("{id:#x}")),
        }
    }

    /// Name and id together, e.g. `PDOL (0x9f38)`
    pub fn label(&self, id: u32) -> String {
        match self.name(id) {
            Some(name) => format!("{name} ({id:#x})"),
            None => format!("{id:#x}"),
        }
    }

    pub fn parser(&self, id: u32) -> Option<TagParser> {
        self.get(id).and_then(|entry| entry.parser)
    }

    /// Registered parser, falling back to [`TagParser::Unparsed`]
    pub fn parser_for(&self, id: u32) -> TagParser {
        self.parser(id).unwrap_or(TagParser::Unparsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universal_table() {
        let registry = TagRegistry::universal();
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.id_for("SEQUENCE"), Some(0x30));
        assert_eq!(registry.name(0x02), Some("INTEGER"));
        assert_eq!(registry.parser(0x01), Some(TagParser::Boolean));
        assert_eq!(registry.parser(0x09), None);
        assert_eq!(registry.parser_for(0x09), TagParser::Unparsed);
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = TagRegistry::new()
            .register(0x9F17, "PIN_TRIES", Some(TagParser::Integer))
            .unwrap()
            .register(0x57, String::from("TRACK2"), Some(TagParser::Track2))
            .unwrap();

        assert_eq!(registry.id_for("PIN_TRIES"), Some(0x9F17));
        assert_eq!(registry.name_for(0x57), "TRACK2");
        assert_eq!(registry.name_for(0xDF01), "0xdf01");
        assert_eq!(registry.label(0x9F17), "PIN_TRIES (0x9f17)");
        assert_eq!(registry.label(0x42), "0x42");
        assert_eq!(registry.id_for("PAN"), None);
    }

    #[test]
    fn test_duplicate_id_fails() {
        let result = TagRegistry::new()
            .register(0x5A, "PAN", None)
            .unwrap()
            .register(0x5A, "ACCOUNT", None);
        assert_eq!(
            result.unwrap_err(),
            RegistryError::DuplicateId {
                id: 0x5A,
                existing: "PAN".into(),
                name: "ACCOUNT".into()
            }
        );
    }

    #[test]
    fn test_duplicate_name_fails() {
        let result = TagRegistry::universal().extend([TagEntry::new(0x99, "INTEGER", None)]);
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateName { existing: 0x02, id: 0x99, .. })
        ));
    }

    #[test]
    fn test_extend_leaves_base_untouched() {
        let base = TagRegistry::universal();
        let extended = base
            .extend([TagEntry::new(0x9F36, "ATC", Some(TagParser::Integer))])
            .unwrap();
        assert_eq!(extended.len(), base.len() + 1);
        assert_eq!(base.id_for("ATC"), None);
        assert_eq!(extended.id_for("BOOLEAN"), Some(0x01));
    }
}
