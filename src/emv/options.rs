//! GET PROCESSING OPTIONS results: interchange profile and file locator

use std::fmt;
use std::ops::RangeInclusive;

use super::tags;
use crate::error::EmvError;
use crate::tlv::TlvNode;

/// One 4-byte Application File Locator group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AflEntry {
    pub sfi: u8,
    pub first_record: u8,
    pub last_record: u8,
    /// Records from `first_record` on that take part in offline authentication
    pub offline_auth_records: u8,
}

impl AflEntry {
    pub fn parse_list(data: &[u8]) -> Result<Vec<Self>, EmvError> {
        if data.len() % 4 != 0 {
            return Err(EmvError::InvalidData(format!(
                "AFL length {} is not a multiple of 4",
                data.len()
            )));
        }
        data.chunks_exact(4)
            .map(|group| {
                // Record numbers start at 1
                if group[1] == 0 {
                    return Err(EmvError::InvalidData(format!(
                        "AFL group {} starts at record 0",
                        hex::encode_upper(group)
                    )));
                }
                Ok(Self {
                    sfi: group[0] >> 3,
                    first_record: group[1],
                    last_record: group[2],
                    offline_auth_records: group[3],
                })
            })
            .collect()
    }

    /// Record numbers covered; empty when the range is inverted
    pub fn records(&self) -> RangeInclusive<u8> {
        self.first_record..=self.last_record
    }
}

impl fmt::Display for AflEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SFI {} records {}-{} ({} for offline auth)",
            self.sfi, self.first_record, self.last_record, self.offline_auth_records
        )
    }
}

const AIP_FLAGS: &[(usize, u8, &str)] = &[
    (0, 0x40, "SDA supported"),
    (0, 0x20, "DDA supported"),
    (0, 0x10, "cardholder verification supported"),
    (0, 0x08, "terminal risk management required"),
    (0, 0x04, "issuer authentication supported"),
    (0, 0x02, "on-device cardholder verification supported"),
    (0, 0x01, "CDA supported"),
    (1, 0x80, "EMV mode supported"),
];

/// Application Interchange Profile (tag 82)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationInterchangeProfile([u8; 2]);

impl ApplicationInterchangeProfile {
    pub fn from_bytes(data: &[u8]) -> Result<Self, EmvError> {
        let bytes = data
            .try_into()
            .map_err(|_| EmvError::InvalidData(format!("AIP must be 2 bytes, got {}", data.len())))?;
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> [u8; 2] {
        self.0
    }

    /// Names of the flags that are set
    pub fn capabilities(&self) -> Vec<&'static str> {
        AIP_FLAGS
            .iter()
            .filter(|(byte, mask, _)| self.0[*byte] & mask != 0)
            .map(|(_, _, name)| *name)
            .collect()
    }
}

/// Decoded GET PROCESSING OPTIONS response
#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    pub aip: ApplicationInterchangeProfile,
    pub afl: Vec<AflEntry>,
    pub response: TlvNode,
}

impl ProcessingOptions {
    /// Accepts flat AIP/AFL, a format 2 template (77), or format 1 (80)
    pub fn from_response(response: TlvNode) -> Result<Self, EmvError> {
        let (aip, afl) = if let (Some(aip), Some(afl)) =
            (response.first(tags::AIP)?, response.first(tags::AFL)?)
        {
            (aip.to_vec(), afl.to_vec())
        } else if let Some(template) = response.first(tags::RMTF2)? {
            let aip = template
                .first(tags::AIP)?
                .ok_or_else(|| EmvError::MissingData("AIP in response template".into()))?;
            let afl = template
                .first(tags::AFL)?
                .ok_or_else(|| EmvError::MissingData("AFL in response template".into()))?;
            (aip.to_vec(), afl.to_vec())
        } else if let Some(format1) = response.first(tags::RMTF1)? {
            let data = format1.data();
            if data.len() < 2 {
                return Err(EmvError::InvalidData(format!(
                    "format 1 response of {} bytes has no AIP",
                    data.len()
                )));
            }
            (data[..2].to_vec(), data[2..].to_vec())
        } else {
            return Err(EmvError::MissingData(
                "AIP/AFL in processing options response".into(),
            ));
        };

        Ok(Self {
            aip: ApplicationInterchangeProfile::from_bytes(&aip)?,
            afl: AflEntry::parse_list(&afl)?,
            response,
        })
    }
}
