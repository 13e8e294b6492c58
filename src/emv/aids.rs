//! Well-known application identifiers and directory names

/// Payment System Environment (contact directory)
pub const PSE: &[u8] = b"1PAY.SYS.DDF01";
/// Proximity Payment System Environment (contactless directory)
pub const PPSE: &[u8] = b"2PAY.SYS.DDF01";

pub const VISA: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10];
pub const VISA_ELECTRON: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x20, 0x10];
pub const VISA_CAP: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x80, 0x02];
pub const MAESTRO: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x04, 0x30, 0x60];
pub const MASTERCARD: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10];
pub const MASTERCARD_CAP: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x04, 0x80, 0x02];

const KNOWN: &[(&[u8], &str)] = &[
    (PSE, "PSE"),
    (PPSE, "PPSE"),
    (VISA, "Visa"),
    (VISA_ELECTRON, "Visa Electron"),
    (VISA_CAP, "Visa CAP"),
    (MAESTRO, "Maestro"),
    (MASTERCARD, "MasterCard"),
    (MASTERCARD_CAP, "MasterCard CAP"),
];

/// Friendly name of a known AID or directory
pub fn describe(aid: &[u8]) -> Option<&'static str> {
    KNOWN
        .iter()
        .find(|(known, _)| *known == aid)
        .map(|(_, name)| *name)
}

/// Look up a known AID by its friendly name, ignoring case
pub fn by_name(name: &str) -> Option<&'static [u8]> {
    KNOWN
        .iter()
        .find(|(_, known)| known.eq_ignore_ascii_case(name))
        .map(|(aid, _)| *aid)
}
