//! EMV protocol driver over a [`Transport`].
//!
//! The session keeps no card state beyond a cached PIN try counter: the
//! selected application lives on the card, so every operation takes the
//! SFI and record numbers it needs explicitly.

use std::sync::Arc;

use crate::core::apdu::{commands, redacted, Apdu, RecordSelector, SelectOccurrence};
use crate::core::transport::Transport;
use crate::core::utils::format_hex_spaced;
use crate::emv::dol::{DolEntry, DolResolver};
use crate::emv::options::{AflEntry, ProcessingOptions};
use crate::emv::status::StatusWord;
use crate::emv::tags;
use crate::error::EmvError;
use crate::tlv::{parse_dol, ApplicationEntry, ParsedValue, TagParser, TagRegistry, TlvNode, Track2};

/// Highest record number tried when reading a whole file
const MAX_RECORD: u8 = 0x7E;

/// Upper bound on SELECT NEXT iterations for one pattern
const MAX_SELECT_MATCHES: usize = 32;

/// Application Cryptogram type requested by GENERATE AC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptogramKind {
    /// Application Authentication Cryptogram (decline)
    Aac,
    /// Transaction Certificate (approve offline)
    Tc,
    /// Authorisation Request Cryptogram (go online)
    Arqc,
    Aar,
}

impl CryptogramKind {
    /// P1 reference control value
    pub const fn reference(self) -> u8 {
        match self {
            Self::Aac => 0x00,
            Self::Tc => 0x40,
            Self::Arqc => 0x80,
            Self::Aar => 0xC0,
        }
    }
}

/// What a successful SELECT returned
#[derive(Debug, Clone)]
pub struct SelectedApplication {
    /// DF name as sent by the card
    pub aid: Vec<u8>,
    /// DF name rendered as hex or text
    pub df_name: String,
    pub label: Option<String>,
    pub sfi: Option<u8>,
    pub pdol: Option<Vec<DolEntry>>,
    /// The FCI template (6F) contents
    pub fci: TlvNode,
}

impl SelectedApplication {
    fn from_fci(fci: TlvNode) -> Result<Self, EmvError> {
        let df_name_node = fci.get(tags::DFNAME)?;
        let aid = df_name_node.to_vec();
        let df_name = TagParser::DfName.parse(df_name_node)?.to_string();

        let (label, sfi, pdol) = match fci.first(tags::FCI_ISSUER)? {
            Some(issuer) => {
                let label = issuer.first(tags::APP_LABEL)?.map(TlvNode::as_text);
                let sfi = issuer
                    .first(tags::SFI)?
                    .map(|node| {
                        let value = node.as_uint()?;
                        u8::try_from(value)
                            .map_err(|_| EmvError::InvalidData(format!("SFI {value} out of range")))
                    })
                    .transpose()?;
                let pdol = issuer
                    .first(tags::PDOL)?
                    .map(|node| parse_dol(node.data()))
                    .transpose()?;
                (label, sfi, pdol)
            }
            None => (None, None, None),
        };

        Ok(Self {
            aid,
            df_name,
            label,
            sfi,
            pdol,
            fci,
        })
    }

    /// Directory entries of a PPSE answer
    pub fn ppse_applications(&self) -> Result<Vec<ApplicationEntry>, EmvError> {
        list_ppse_applications(&self.fci)
    }
}

/// Cardholder data from a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub name: Option<String>,
    pub track2: Option<Track2>,
}

impl CardDetails {
    pub fn from_record(record: &TlvNode) -> Result<Self, EmvError> {
        let name = record
            .first(tags::NAME)?
            .map(|node| node.as_text().trim_end().to_string());
        let track2 = record
            .first(tags::TRACK2)?
            .map(|node| Track2::from_bytes(node.data()))
            .transpose()?;
        Ok(Self { name, track2 })
    }
}

/// `APP` (61) entries of a PSE directory record
pub fn list_applications(record: &TlvNode) -> Result<Vec<ApplicationEntry>, EmvError> {
    record
        .get_list(tags::APP)?
        .into_iter()
        .map(|app| match TagParser::Application.parse(app)? {
            ParsedValue::Application(entry) => Ok(entry),
            other => Err(EmvError::InvalidData(format!("unexpected directory entry {other}"))),
        })
        .collect()
}

/// `APP` entries inside the issuer discretionary data of a PPSE FCI
pub fn list_ppse_applications(fci: &TlvNode) -> Result<Vec<ApplicationEntry>, EmvError> {
    let directory = fci
        .first(tags::FCI_ISSUER)?
        .and_then(|issuer| issuer.first(tags::FCI_EXTRA).transpose())
        .transpose()?
        .ok_or_else(|| EmvError::MissingData("PPSE directory (BF0C)".into()))?;
    list_applications(directory)
}

pub struct EmvSession<T: Transport> {
    transport: T,
    registry: Arc<TagRegistry>,
    pin_tries: Option<u64>,
}

impl<T: Transport> EmvSession<T> {
    /// A session decoding with the EMV tag table
    pub fn new(transport: T) -> Self {
        Self::with_registry(transport, tags::registry())
    }

    pub fn with_registry(transport: T, registry: Arc<TagRegistry>) -> Self {
        Self {
            transport,
            registry,
            pin_tries: None,
        }
    }

    pub fn registry(&self) -> &Arc<TagRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Decode a response body with this session's registry
    pub fn decode(&self, data: Vec<u8>) -> TlvNode {
        TlvNode::new(data, Arc::clone(&self.registry))
    }

    /// Send one command; anything but `90 00` is an error
    pub fn send(&mut self, apdu: &Apdu) -> Result<Vec<u8>, EmvError> {
        let command = apdu.to_bytes()?;
        log::debug!("> {}", format_hex_spaced(&redacted(&command)));

        let response = self.transport.transmit(&command)?;
        let status = response.status();
        log::debug!("< {} [{status}]", format_hex_spaced(&response.data));

        if status.is_success() {
            return Ok(response.data);
        }
        if status == StatusWord::FILE_NOT_FOUND || status == StatusWord::RECORD_NOT_FOUND {
            log::debug!("Card returned {status}: {}", status.describe());
        } else {
            log::warn!("Card returned {status}: {}", status.describe());
        }
        Err(EmvError::Status(status))
    }

    pub fn select_by_name(
        &mut self,
        pattern: &[u8],
        which: SelectOccurrence,
    ) -> Result<SelectedApplication, EmvError> {
        let response = self.send(&commands::select_by_name(pattern, which))?;
        let root = self.decode(response);
        let fci = root
            .first(tags::FCI)?
            .cloned()
            .ok_or_else(|| EmvError::MissingData("FCI template in SELECT response".into()))?;
        SelectedApplication::from_fci(fci)
    }

    /// Every application matching `pattern`, in card order
    pub fn select_all_by_name(&mut self, pattern: &[u8]) -> Result<Vec<SelectedApplication>, EmvError> {
        let mut selected = Vec::new();
        let mut which = SelectOccurrence::First;

        while selected.len() < MAX_SELECT_MATCHES {
            match self.select_by_name(pattern, which) {
                Ok(app) => selected.push(app),
                Err(e) if e.is_status(StatusWord::FILE_NOT_FOUND) => {
                    log::debug!("No more applications matching {}", format_hex_spaced(pattern));
                    return Ok(selected);
                }
                Err(e) => return Err(e),
            }
            which = SelectOccurrence::Next;
        }

        log::warn!("Stopped after {MAX_SELECT_MATCHES} matches for {}", format_hex_spaced(pattern));
        Ok(selected)
    }

    pub fn read_record_raw(
        &mut self,
        record: u8,
        sfi: u8,
        which: RecordSelector,
    ) -> Result<Vec<u8>, EmvError> {
        self.send(&commands::read_record(record, sfi, which)?)
    }

    /// Read a record and return its EMV template (70)
    pub fn read_record(
        &mut self,
        record: u8,
        sfi: u8,
        which: RecordSelector,
    ) -> Result<TlvNode, EmvError> {
        let response = self.read_record_raw(record, sfi, which)?;
        let root = self.decode(response);
        Ok(root.get(tags::EMV)?.clone())
    }

    /// Records 1, 2, ... of `sfi` until the card reports record not found
    pub fn read_all_records(&mut self, sfi: u8) -> Result<Vec<TlvNode>, EmvError> {
        let mut records = Vec::new();
        for number in 1..=MAX_RECORD {
            match self.read_record(number, sfi, RecordSelector::Index) {
                Ok(record) => records.push(record),
                Err(e) if e.is_status(StatusWord::RECORD_NOT_FOUND) => {
                    log::debug!("SFI {sfi} ends after {} records", records.len());
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    /// Every record an AFL lists, in order
    pub fn read_afl_records(&mut self, afl: &[AflEntry]) -> Result<Vec<TlvNode>, EmvError> {
        let mut records = Vec::new();
        for entry in afl {
            for number in entry.records() {
                records.push(self.read_record(number, entry.sfi, RecordSelector::Index)?);
            }
        }
        Ok(records)
    }

    /// Directory entries from every record of a PSE file
    pub fn read_directory(&mut self, sfi: u8) -> Result<Vec<ApplicationEntry>, EmvError> {
        let mut entries = Vec::new();
        for record in self.read_all_records(sfi)? {
            entries.extend(list_applications(&record)?);
        }
        Ok(entries)
    }

    pub fn read_card_details(&mut self, record: u8, sfi: u8) -> Result<CardDetails, EmvError> {
        let record = self.read_record(record, sfi, RecordSelector::Index)?;
        CardDetails::from_record(&record)
    }

    pub fn get_data(&mut self, tag: u32) -> Result<Vec<u8>, EmvError> {
        self.send(&commands::get_data(tag)?)
    }

    pub fn get_data_by_name(&mut self, name: &str) -> Result<Vec<u8>, EmvError> {
        let tag = self.tag_id(name)?;
        self.get_data(tag)
    }

    /// GET DATA, then apply the tag's parser to the returned element
    pub fn get_data_parsed(&mut self, tag: u32) -> Result<ParsedValue, EmvError> {
        let response = self.get_data(tag)?;
        let root = self.decode(response);
        Ok(root.get(tag)?.parse_as(tag)?)
    }

    pub fn get_data_parsed_by_name(&mut self, name: &str) -> Result<ParsedValue, EmvError> {
        let tag = self.tag_id(name)?;
        self.get_data_parsed(tag)
    }

    fn tag_id(&self, name: &str) -> Result<u32, EmvError> {
        self.registry
            .id_for(name)
            .ok_or_else(|| crate::tlv::TlvError::UnknownName(name.to_string()).into())
    }

    /// Fetch and cache the PIN try counter
    pub fn get_pin_tries(&mut self) -> Result<u64, EmvError> {
        let tries = self
            .get_data_parsed(tags::PIN_TRIES)?
            .as_integer()
            .ok_or_else(|| EmvError::InvalidData("PIN try counter is not an integer".into()))?;
        self.pin_tries = Some(tries);
        Ok(tries)
    }

    pub fn cached_pin_tries(&self) -> Option<u64> {
        self.pin_tries
    }

    /// VERIFY a plaintext offline PIN.
    ///
    /// The cached try counter is dropped after the attempt whatever its
    /// outcome.
    pub fn verify(&mut self, pin: &str) -> Result<(), EmvError> {
        let tries = match self.pin_tries {
            Some(tries) => tries,
            None => self.get_pin_tries()?,
        };
        log::info!("PIN tries left: {tries}");
        if tries == 0 {
            return Err(EmvError::PinBlocked);
        }

        let block = plaintext_pin_block(pin)?;
        let result = self.send(&commands::verify_plaintext(block));
        self.pin_tries = None;
        log::debug!("PIN try counter invalidated");

        result.map(|_| ())
    }

    /// Answer the PDOL and negotiate processing options
    pub fn get_processing_options(
        &mut self,
        pdol: &[DolEntry],
        resolver: &DolResolver,
    ) -> Result<ProcessingOptions, EmvError> {
        let answer = resolver.resolve(pdol)?;
        let length = u8::try_from(answer.len()).map_err(|_| {
            EmvError::InvalidData(format!("PDOL answer of {} bytes is too long", answer.len()))
        })?;

        let mut template = Vec::with_capacity(answer.len() + 2);
        template.push(tags::COMMAND_TEMPLATE);
        template.push(length);
        template.extend(answer);

        let response = self.send(&commands::get_processing_options(template))?;
        ProcessingOptions::from_response(self.decode(response))
    }

    pub fn generate_application_cryptogram(
        &mut self,
        kind: CryptogramKind,
        data: &[u8],
    ) -> Result<TlvNode, EmvError> {
        let response = self.send(&commands::generate_ac(kind.reference(), data))?;
        Ok(self.decode(response))
    }

    pub fn get_challenge(&mut self, length: u8) -> Result<TlvNode, EmvError> {
        let response = self.send(&commands::get_challenge(length))?;
        Ok(self.decode(response))
    }

    pub fn external_authenticate(&mut self) -> Result<TlvNode, EmvError> {
        let response = self.send(&commands::external_authenticate())?;
        Ok(self.decode(response))
    }
}

/// Format 2 plaintext PIN block: control nibble 2, PIN length, digits, F padding
fn plaintext_pin_block(pin: &str) -> Result<[u8; 8], EmvError> {
    if !(4..=12).contains(&pin.len()) || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EmvError::InvalidPin(format!(
            "expected 4 to 12 digits, got {} characters",
            pin.len()
        )));
    }

    let mut nibbles = vec![0x2, pin.len() as u8];
    nibbles.extend(pin.bytes().map(|b| b - b'0'));
    nibbles.resize(16, 0xF);

    let mut block = [0u8; 8];
    for (byte, pair) in block.iter_mut().zip(nibbles.chunks_exact(2)) {
        *byte = (pair[0] << 4) | pair[1];
    }
    Ok(block)
}
