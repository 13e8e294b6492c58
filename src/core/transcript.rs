//! Recording of command exchanges

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::apdu::redacted;
use crate::core::transport::{RawResponse, Transport, TransportError};
use crate::emv::status::StatusWord;

/// One command and what came back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(with = "hex::serde")]
    pub command: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub response: Vec<u8>,
    /// Absent when the transport failed
    pub status: Option<StatusWord>,
    /// Card answered `90 00`
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_duration_ms: u64,
}

/// Transport wrapper keeping a history of every exchange
pub struct Recorder<T> {
    inner: T,
    history: Vec<ExchangeRecord>,
}

impl<T: Transport> Recorder<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            history: Vec::new(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn history(&self) -> &[ExchangeRecord] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn export_history(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.history).context("Failed to serialize exchange history")
    }

    /// Append records from an exported history
    pub fn import_history(&mut self, json: &str) -> Result<()> {
        let imported: Vec<ExchangeRecord> =
            serde_json::from_str(json).context("Failed to deserialize exchange history")?;
        self.history.extend(imported);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.export_history()?)
            .with_context(|| format!("Failed to write transcript {}", path.display()))
    }

    pub fn statistics(&self) -> ExchangeStatistics {
        let total = self.history.len();
        let successful = self.history.iter().filter(|r| r.success).count();
        let average_duration_ms = match total {
            0 => 0,
            n => self.history.iter().map(|r| r.duration_ms).sum::<u64>() / n as u64,
        };

        ExchangeStatistics {
            total,
            successful,
            failed: total - successful,
            average_duration_ms,
        }
    }
}

impl<T: Transport> Transport for Recorder<T> {
    fn transmit(&mut self, command: &[u8]) -> Result<RawResponse, TransportError> {
        let start = Instant::now();
        let timestamp = Utc::now();
        let result = self.inner.transmit(command);
        let duration_ms = start.elapsed().as_millis() as u64;
        let command = redacted(command).into_owned();

        let record = match &result {
            Ok(response) => ExchangeRecord {
                timestamp,
                command,
                response: response.data.clone(),
                status: Some(response.status()),
                success: response.status().is_success(),
                error: None,
                duration_ms,
            },
            Err(e) => {
                log::error!("Transmit failed: {e}");
                ExchangeRecord {
                    timestamp,
                    command,
                    response: Vec::new(),
                    status: None,
                    success: false,
                    error: Some(e.to_string()),
                    duration_ms,
                }
            }
        };
        self.history.push(record);

        result
    }
}
