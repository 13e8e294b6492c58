use std::ffi::CString;

use anyhow::{Context as AnyhowContext, Result};
use pcsc::{Card, Context, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};
use serde::{Deserialize, Serialize};

use crate::core::apdu::commands;
use crate::core::transport::{RawResponse, Transport, TransportError};
use crate::core::utils::format_hex;

/// Upper bound on GET RESPONSE rounds for one command
const MAX_CHAINED_RESPONSES: usize = 32;

/// Information about a PCSC reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderInfo {
    pub name: String,
    pub card_present: bool,
    pub atr: Option<Vec<u8>>,
}

/// PCSC reader binding
pub struct PcscReader {
    context: Context,
    current_reader: Option<String>,
    current_card: Option<Card>,
}

impl PcscReader {
    pub fn new() -> Result<Self> {
        let context =
            Context::establish(Scope::User).context("Failed to establish PCSC context")?;

        Ok(Self {
            context,
            current_reader: None,
            current_card: None,
        })
    }

    /// List all available readers with card presence
    pub fn list_readers(&self) -> Result<Vec<ReaderInfo>> {
        let mut readers_buf = vec![0; 2048];
        let readers = self
            .context
            .list_readers(&mut readers_buf)
            .context("Failed to list readers")?;

        Ok(readers
            .map(|reader| {
                let name = reader.to_string_lossy().to_string();
                let (card_present, atr) = self.inspect_reader(&name);
                ReaderInfo {
                    name,
                    card_present,
                    atr,
                }
            })
            .collect())
    }

    /// Briefly connect to see whether a card is present
    fn inspect_reader(&self, reader_name: &str) -> (bool, Option<Vec<u8>>) {
        let Ok(reader_cstr) = CString::new(reader_name) else {
            return (false, None);
        };
        match self
            .context
            .connect(&reader_cstr, ShareMode::Shared, Protocols::ANY)
        {
            Ok(card) => (true, card.status2_owned().ok().map(|s| s.atr().to_vec())),
            Err(_) => (false, None),
        }
    }

    pub fn connect(&mut self, reader_name: &str, share_mode: ShareMode) -> Result<()> {
        log::info!("Connecting to reader: {reader_name}");

        let reader_cstr = CString::new(reader_name).context("Invalid reader name")?;
        let card = self
            .context
            .connect(&reader_cstr, share_mode, Protocols::ANY)
            .with_context(|| format!("Failed to connect to reader: {reader_name}"))?;

        self.current_reader = Some(reader_name.to_string());
        self.current_card = Some(card);

        log::info!("Connected to reader: {reader_name}");
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(card) = self.current_card.take() {
            if card.disconnect(pcsc::Disposition::LeaveCard).is_err() {
                log::warn!("Failed to disconnect cleanly from card");
            }
            log::info!("Disconnected from reader");
        }
        self.current_reader = None;
    }

    pub fn current_reader(&self) -> Option<&str> {
        self.current_reader.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.current_card.is_some()
    }

    /// ATR of the connected card
    pub fn atr(&self) -> Option<Vec<u8>> {
        self.current_card
            .as_ref()
            .and_then(|card| card.status2_owned().ok())
            .map(|status| status.atr().to_vec())
    }
}

fn exchange(card: &Card, command: &[u8]) -> Result<RawResponse, TransportError> {
    let mut response_buf = [0; MAX_BUFFER_SIZE];
    let response = card.transmit(command, &mut response_buf)?;
    RawResponse::from_bytes(response)
}

impl Transport for PcscReader {
    /// Send one command, following `61xx` with GET RESPONSE until the card
    /// has nothing more pending
    fn transmit(&mut self, command: &[u8]) -> Result<RawResponse, TransportError> {
        let card = self
            .current_card
            .as_ref()
            .ok_or(TransportError::NotConnected)?;

        let mut response = exchange(card, command)?;
        let mut data = Vec::new();
        let mut rounds = 0;

        while let Some(available) = response.status().remaining_bytes() {
            rounds += 1;
            if rounds > MAX_CHAINED_RESPONSES {
                return Err(TransportError::Other(format!(
                    "Card still had data pending after {MAX_CHAINED_RESPONSES} GET RESPONSE rounds"
                )));
            }
            data.append(&mut response.data);
            log::debug!("{available:#04x} bytes pending, sending GET RESPONSE");

            let get_response = commands::get_response(available)
                .to_bytes()
                .map_err(|e| TransportError::Other(e.to_string()))?;
            response = exchange(card, &get_response)?;
        }

        if !data.is_empty() {
            data.append(&mut response.data);
            response.data = data;
            log::debug!("Chained response: {}", format_hex(&response.data));
        }
        Ok(response)
    }
}

impl Drop for PcscReader {
    fn drop(&mut self) {
        self.disconnect();
    }
}
