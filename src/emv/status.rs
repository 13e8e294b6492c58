//! Status word classification
//!
//! Lookup goes from the exact `(SW1, SW2)` pair to the SW1 family to
//! "unknown". Descriptions are for diagnostics only; control flow compares
//! pairs (see [`StatusWord::FILE_NOT_FOUND`], [`StatusWord::RECORD_NOT_FOUND`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status Word (SW1-SW2) ending every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusWord {
    pub sw1: u8,
    pub sw2: u8,
}

/// Outcome of classifying a status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Error,
}

/// SW1 families
const FAMILIES: &[(u8, &str)] = &[
    (0x90, "OK"),
    (0x61, "More data"),
    (0x62, "No change"),
    (0x63, "Changed"),
    (0x64, "Error, no change"),
    (0x65, "Error, changed"),
    (0x66, "Security"),
    (0x67, "Wrong length"),
    (0x68, "Not supported"),
    (0x69, "Not allowed"),
    (0x6A, "Bad arguments"),
    (0x6B, "Wrong arguments"),
    (0x6C, "Wrong length"),
    (0x6D, "Invalid instruction"),
    (0x6E, "Class not supported"),
    (0x6F, "Unknown"),
];

/// Specific pairs
const DETAILS: &[((u8, u8), &str)] = &[
    ((0x62, 0x81), "returned data may be corrupted"),
    ((0x62, 0x82), "end of file reached"),
    ((0x62, 0x83), "selected file invalidated"),
    ((0x62, 0x84), "selected file incorrectly formatted"),
    ((0x62, 0x85), "selected file in termination state"),
    ((0x65, 0x81), "memory failure"),
    ((0x68, 0x81), "logical channel not supported"),
    ((0x68, 0x82), "secure messaging not supported"),
    ((0x69, 0x81), "incompatible with file structure"),
    ((0x69, 0x82), "security status not satisfied"),
    ((0x69, 0x83), "authentication method blocked"),
    ((0x69, 0x84), "referenced data invalidated"),
    ((0x69, 0x85), "conditions of use not satisfied"),
    ((0x69, 0x86), "command not allowed"),
    ((0x69, 0x87), "expected secure messaging data missing"),
    ((0x69, 0x88), "secure messaging data incorrect"),
    ((0x6A, 0x80), "incorrect data"),
    ((0x6A, 0x81), "function not supported"),
    ((0x6A, 0x82), "file not found"),
    ((0x6A, 0x83), "record not found"),
    ((0x6A, 0x84), "no space"),
    ((0x6A, 0x85), "Lc inconsistent with TLV structure"),
    ((0x6A, 0x86), "incorrect P1/P2"),
    ((0x6A, 0x87), "Lc inconsistent with P1/P2"),
    ((0x6A, 0x88), "referenced data not found"),
];

impl StatusWord {
    pub const SUCCESS: Self = Self::new(0x90, 0x00);
    /// Ends a select-next enumeration
    pub const FILE_NOT_FOUND: Self = Self::new(0x6A, 0x82);
    /// Ends a read-all-records enumeration
    pub const RECORD_NOT_FOUND: Self = Self::new(0x6A, 0x83);

    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    pub const fn to_u16(self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Only `90 00` is unconditional success
    pub const fn is_success(self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    pub const fn verdict(self) -> Verdict {
        if self.is_success() {
            Verdict::Success
        } else {
            Verdict::Error
        }
    }

    /// Number of pending response bytes for `61xx`
    pub const fn remaining_bytes(self) -> Option<u8> {
        if self.sw1 == 0x61 {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Retry counter carried by `63Cx` (e.g. after a failed VERIFY)
    pub const fn retries_remaining(self) -> Option<u8> {
        if self.sw1 == 0x63 && self.sw2 & 0xF0 == 0xC0 {
            Some(self.sw2 & 0x0F)
        } else {
            None
        }
    }

    /// Description of the SW1 family, if known
    pub fn family(self) -> Option<&'static str> {
        FAMILIES
            .iter()
            .find(|(sw1, _)| *sw1 == self.sw1)
            .map(|(_, text)| *text)
    }

    /// Description of the exact pair, if known
    pub fn detail(self) -> Option<&'static str> {
        DETAILS
            .iter()
            .find(|(pair, _)| *pair == (self.sw1, self.sw2))
            .map(|(_, text)| *text)
    }

    /// Human readable outcome: "family (detail)", either part alone, or "unknown"
    pub fn describe(self) -> String {
        match (self.family(), self.detail()) {
            (Some(family), Some(detail)) => format!("{family} ({detail})"),
            (None, Some(detail)) => detail.to_string(),
            (Some(family), None) => match (self.remaining_bytes(), self.retries_remaining()) {
                (Some(n), _) => format!("{family}, {n} bytes available"),
                (_, Some(n)) => format!("{family}, counter = {n}"),
                _ => family.to_string(),
            },
            (None, None) => "unknown".to_string(),
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from((sw1, sw2): (u8, u8)) -> Self {
        Self::new(sw1, sw2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_the_only_success() {
        assert_eq!(StatusWord::SUCCESS.verdict(), Verdict::Success);
        assert_eq!(StatusWord::new(0x61, 0x10).verdict(), Verdict::Error);
        assert_eq!(StatusWord::new(0x62, 0x83).verdict(), Verdict::Error);
        assert_eq!(StatusWord::new(0x90, 0x01).verdict(), Verdict::Error);
    }

    #[test]
    fn test_enumeration_terminators() {
        let not_found = StatusWord::from((0x6A, 0x82));
        assert_eq!(not_found, StatusWord::FILE_NOT_FOUND);
        assert_eq!(not_found.verdict(), Verdict::Error);
        assert_eq!(not_found.describe(), "Bad arguments (file not found)");

        let no_record = StatusWord::from((0x6A, 0x83));
        assert_eq!(no_record, StatusWord::RECORD_NOT_FOUND);
        assert_eq!(no_record.describe(), "Bad arguments (record not found)");
    }

    #[test]
    fn test_unmapped_pair_falls_back_to_family() {
        let status = StatusWord::new(0x6F, 0x00);
        assert_eq!(status.verdict(), Verdict::Error);
        assert_eq!(status.detail(), None);
        assert_eq!(status.describe(), "Unknown");
    }

    #[test]
    fn test_entirely_unknown_status() {
        let status = StatusWord::new(0x12, 0x34);
        assert_eq!(status.verdict(), Verdict::Error);
        assert_eq!(status.family(), None);
        assert_eq!(status.describe(), "unknown");
    }

    #[test]
    fn test_counters() {
        assert_eq!(StatusWord::new(0x63, 0xC2).retries_remaining(), Some(2));
        assert_eq!(StatusWord::new(0x63, 0xC2).describe(), "Changed, counter = 2");
        assert_eq!(StatusWord::new(0x63, 0x00).retries_remaining(), None);
        assert_eq!(StatusWord::new(0x61, 0x1C).remaining_bytes(), Some(0x1C));
        assert_eq!(
            StatusWord::new(0x61, 0x1C).describe(),
            "More data, 28 bytes available"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusWord::new(0x6A, 0x82).to_string(), "6A82");
        assert_eq!(StatusWord::SUCCESS.to_u16(), 0x9000);
    }
}
