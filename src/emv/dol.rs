//! Answering card-issued data object lists (PDOL, CDOL)

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::tlv::DolEntry;

use super::tags;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DolError {
    #[error("Cannot satisfy DOL request for tag {tag:#x} with length {length}")]
    Unsupported { tag: u32, length: usize },

    #[error("DOL value for tag {tag:#x} is {actual} bytes, {expected} requested")]
    LengthMismatch {
        tag: u32,
        expected: usize,
        actual: usize,
    },
}

/// Terminal-side constants used to answer DOL requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Terminal transaction qualifiers
    #[serde(with = "hex::serde")]
    pub ttq: [u8; 4],
    /// ISO 4217 numeric currency
    #[serde(with = "hex::serde")]
    pub currency_code: [u8; 2],
    /// ISO 3166 numeric country
    #[serde(with = "hex::serde")]
    pub country_code: [u8; 2],
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            // MSD, qVSDC, VSDC contact, online PIN, signature; CVM required
            ttq: [0xA6, 0x20, 0xC0, 0x00],
            // EUR
            currency_code: [0x09, 0x78],
            // GB
            country_code: [0x08, 0x26],
        }
    }
}

impl TerminalConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read terminal config {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid terminal config {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write terminal config {}", path.display()))
    }
}

/// Where the bytes for one DOL element come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    Fixed(Vec<u8>),
    Zeros,
    Random,
}

#[derive(Debug, Clone)]
struct Rule {
    tag: u32,
    /// `None` matches any requested length
    length: Option<usize>,
    provider: Provider,
}

/// Resolves `(tag, length)` requests into terminal data.
///
/// Requests no rule covers are refused rather than zero-filled.
#[derive(Debug, Clone)]
pub struct DolResolver {
    rules: Vec<Rule>,
}

impl DolResolver {
    pub fn new(config: &TerminalConfig) -> Self {
        let rule = |tag, length, provider| Rule {
            tag,
            length,
            provider,
        };
        Self {
            rules: vec![
                rule(tags::TTQ, Some(4), Provider::Fixed(config.ttq.to_vec())),
                rule(tags::AMOUNT, Some(6), Provider::Zeros),
                rule(tags::UN, None, Provider::Random),
                rule(tags::UN_MC, None, Provider::Random),
                rule(tags::CURRENCY, Some(2), Provider::Fixed(config.currency_code.to_vec())),
                rule(
                    tags::TERMINAL_COUNTRY,
                    Some(2),
                    Provider::Fixed(config.country_code.to_vec()),
                ),
            ],
        }
    }

    /// Add a rule checked before the built-in ones
    pub fn with_rule(mut self, tag: u32, length: Option<usize>, provider: Provider) -> Self {
        self.rules.insert(
            0,
            Rule {
                tag,
                length,
                provider,
            },
        );
        self
    }

    /// Concatenated answers in request order
    pub fn resolve(&self, requests: &[DolEntry]) -> Result<Vec<u8>, DolError> {
        let mut out = Vec::with_capacity(requests.iter().map(|r| r.length).sum());
        for request in requests {
            out.extend(self.resolve_one(*request)?);
        }
        Ok(out)
    }

    fn resolve_one(&self, request: DolEntry) -> Result<Vec<u8>, DolError> {
        let DolEntry { tag, length } = request;
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.tag == tag && rule.length.map_or(true, |l| l == length))
            .ok_or(DolError::Unsupported { tag, length })?;

        let value = match &rule.provider {
            Provider::Fixed(value) => value.clone(),
            Provider::Zeros => vec![0; length],
            Provider::Random => {
                let mut value = vec![0; length];
                rand::rng().fill_bytes(&mut value);
                value
            }
        };

        if value.len() != length {
            return Err(DolError::LengthMismatch {
                tag,
                expected: length,
                actual: value.len(),
            });
        }
        log::debug!("DOL {tag:#x}/{length}: {}", hex::encode_upper(&value));
        Ok(value)
    }
}

impl Default for DolResolver {
    fn default() -> Self {
        Self::new(&TerminalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn visa_pdol() -> Vec<DolEntry> {
        vec![
            DolEntry::new(tags::TTQ, 4),
            DolEntry::new(tags::AMOUNT, 6),
            DolEntry::new(tags::UN, 4),
            DolEntry::new(tags::CURRENCY, 2),
        ]
    }

    #[test]
    fn test_resolve_layout() {
        let resolver = DolResolver::default();
        let answer = resolver.resolve(&visa_pdol()).unwrap();
        assert_eq!(answer.len(), 16);
        assert_eq!(&answer[..4], &[0xA6, 0x20, 0xC0, 0x00]);
        assert_eq!(&answer[4..10], &[0; 6]);
        assert_eq!(&answer[14..], &[0x09, 0x78]);
    }

    #[test]
    fn test_deterministic_except_random() {
        let resolver = DolResolver::default();
        let fixed = [
            DolEntry::new(tags::TTQ, 4),
            DolEntry::new(tags::TERMINAL_COUNTRY, 2),
        ];
        assert_eq!(resolver.resolve(&fixed).unwrap(), resolver.resolve(&fixed).unwrap());

        for length in [1, 4, 8, 32] {
            let random = [DolEntry::new(tags::UN_MC, length)];
            assert_eq!(resolver.resolve(&random).unwrap().len(), length);
        }
    }

    #[test]
    fn test_unknown_request_refused() {
        let resolver = DolResolver::default();
        assert_eq!(
            resolver.resolve(&[DolEntry::new(0x9F35, 1)]),
            Err(DolError::Unsupported {
                tag: 0x9F35,
                length: 1
            })
        );
        // Known tag, unexpected length
        assert_eq!(
            resolver.resolve(&[DolEntry::new(tags::TTQ, 3)]),
            Err(DolError::Unsupported {
                tag: tags::TTQ,
                length: 3
            })
        );
    }

    #[test]
    fn test_empty_request() {
        assert!(DolResolver::default().resolve(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_custom_rule() {
        let resolver = DolResolver::default()
            .with_rule(0x9F35, Some(1), Provider::Fixed(vec![0x22]))
            .with_rule(0x9F33, None, Provider::Fixed(vec![0xE0, 0x00]));
        assert_eq!(resolver.resolve(&[DolEntry::new(0x9F35, 1)]).unwrap(), vec![0x22]);
        assert_eq!(
            resolver.resolve(&[DolEntry::new(0x9F33, 3)]),
            Err(DolError::LengthMismatch {
                tag: 0x9F33,
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_config_from_json() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"ttq": "36000000", "currency_code": "0840"}"#).unwrap();

        let config = TerminalConfig::load(file.path()).unwrap();
        assert_eq!(config.ttq, [0x36, 0, 0, 0]);
        assert_eq!(config.currency_code, [0x08, 0x40]);
        assert_eq!(config.country_code, TerminalConfig::default().country_code);

        let answer = DolResolver::new(&config)
            .resolve(&[DolEntry::new(tags::CURRENCY, 2)])
            .unwrap();
        assert_eq!(answer, vec![0x08, 0x40]);
    }

    #[test]
    fn test_config_save_load() {
        let file = NamedTempFile::new().unwrap();
        let config = TerminalConfig {
            country_code: [0x08, 0x40],
            ..Default::default()
        };
        config.save(file.path()).unwrap();
        assert_eq!(TerminalConfig::load(file.path()).unwrap(), config);
    }

    #[test]
    fn test_config_rejects_bad_hex() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"ttq": "3600"}"#).unwrap();
        assert!(TerminalConfig::load(file.path()).is_err());
    }
}
