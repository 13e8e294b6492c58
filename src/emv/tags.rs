//! EMV tag table

use std::sync::{Arc, LazyLock};

use crate::tlv::{TagEntry, TagParser, TagRegistry};

pub const AID: u32 = 0x4F;
pub const APP_LABEL: u32 = 0x50;
pub const TRACK2: u32 = 0x57;
pub const PAN: u32 = 0x5A;
pub const NAME: u32 = 0x5F20;
pub const EXPIRY: u32 = 0x5F24;
pub const EFFECTIVE: u32 = 0x5F25;
pub const ISSUER_COUNTRY_CODE: u32 = 0x5F28;
pub const CURRENCY: u32 = 0x5F2A;
pub const LANG: u32 = 0x5F2D;
pub const PSN: u32 = 0x5F34;
pub const APP: u32 = 0x61;
pub const FCI: u32 = 0x6F;
pub const EMV: u32 = 0x70;
/// Response message template format 2
pub const RMTF2: u32 = 0x77;
/// Response message template format 1
pub const RMTF1: u32 = 0x80;
pub const AIP: u32 = 0x82;
/// Command template wrapping a PDOL answer
pub const COMMAND_TEMPLATE: u8 = 0x83;
pub const DFNAME: u32 = 0x84;
pub const PRIORITY: u32 = 0x87;
pub const SFI: u32 = 0x88;
pub const CDOL1: u32 = 0x8C;
pub const CDOL2: u32 = 0x8D;
pub const CA_PK_INDEX: u32 = 0x8F;
pub const ISSUER_PK_CERT: u32 = 0x90;
pub const AFL: u32 = 0x94;
pub const FCI_ISSUER: u32 = 0xA5;
pub const AMOUNT: u32 = 0x9F02;
pub const IAD: u32 = 0x9F10;
pub const PIN_TRIES: u32 = 0x9F17;
pub const TERMINAL_COUNTRY: u32 = 0x9F1A;
pub const AC: u32 = 0x9F26;
pub const CID: u32 = 0x9F27;
pub const ATC: u32 = 0x9F36;
pub const UN: u32 = 0x9F37;
pub const PDOL: u32 = 0x9F38;
pub const ICC_PK_CERT: u32 = 0x9F46;
pub const SDAD: u32 = 0x9F4B;
pub const DRDOL: u32 = 0x9F51;
pub const ODS: u32 = 0x9F54;
pub const ISSUER_INFO: u32 = 0x9F56;
pub const ISSUER_COUNTRY: u32 = 0x9F57;
pub const PROGRAM_ID: u32 = 0x9F5A;
pub const DS_ID: u32 = 0x9F5E;
pub const TTQ: u32 = 0x9F66;
pub const CVM: u32 = 0x9F68;
pub const UN_MC: u32 = 0x9F6A;
pub const CTQ: u32 = 0x9F6C;
pub const APPLET_DATA: u32 = 0x9F7D;
pub const CARD_UN: u32 = 0x9F7F;
pub const FCI_EXTRA: u32 = 0xBF0C;

const EMV_TAGS: &[TagEntry] = &[
    TagEntry::new(AID, "AID", Some(TagParser::Raw)),
    TagEntry::new(APP_LABEL, "APP_LABEL", Some(TagParser::Text)),
    TagEntry::new(TRACK2, "TRACK2", Some(TagParser::Track2)),
    TagEntry::new(PAN, "PAN", Some(TagParser::Raw)),
    TagEntry::new(NAME, "NAME", Some(TagParser::Text)),
    TagEntry::new(EXPIRY, "EXPIRY", Some(TagParser::Raw)),
    TagEntry::new(EFFECTIVE, "EFFECTIVE", Some(TagParser::Raw)),
    TagEntry::new(ISSUER_COUNTRY_CODE, "ISSUER_COUNTRY_CODE", Some(TagParser::Raw)),
    TagEntry::new(CURRENCY, "CURRENCY", Some(TagParser::Raw)),
    TagEntry::new(LANG, "LANG", Some(TagParser::Text)),
    TagEntry::new(PSN, "PSN", Some(TagParser::Integer)),
    TagEntry::new(APP, "APP", Some(TagParser::Application)),
    TagEntry::new(FCI, "FCI", None),
    TagEntry::new(EMV, "EMV", None),
    TagEntry::new(RMTF2, "RMTF2", None),
    TagEntry::new(RMTF1, "RMTF1", Some(TagParser::Raw)),
    TagEntry::new(AIP, "AIP", Some(TagParser::Raw)),
    TagEntry::new(DFNAME, "DFNAME", Some(TagParser::DfName)),
    TagEntry::new(PRIORITY, "PRIORITY", Some(TagParser::Integer)),
    TagEntry::new(SFI, "SFI", Some(TagParser::Integer)),
    TagEntry::new(CDOL1, "CDOL1", Some(TagParser::DolRequest)),
    TagEntry::new(CDOL2, "CDOL2", Some(TagParser::DolRequest)),
    TagEntry::new(CA_PK_INDEX, "CA_PK_INDEX", Some(TagParser::Integer)),
    TagEntry::new(ISSUER_PK_CERT, "ISSUER_PK_CERT", Some(TagParser::Raw)),
    TagEntry::new(AFL, "AFL", Some(TagParser::Raw)),
    TagEntry::new(FCI_ISSUER, "FCI_ISSUER", None),
    TagEntry::new(AMOUNT, "AMOUNT", Some(TagParser::Raw)),
    TagEntry::new(IAD, "IAD", Some(TagParser::Raw)),
    TagEntry::new(PIN_TRIES, "PIN_TRIES", Some(TagParser::Integer)),
    TagEntry::new(TERMINAL_COUNTRY, "TERMINAL_COUNTRY", Some(TagParser::Raw)),
    TagEntry::new(AC, "AC", Some(TagParser::Raw)),
    TagEntry::new(CID, "CID", Some(TagParser::Raw)),
    TagEntry::new(ATC, "ATC", Some(TagParser::Integer)),
    TagEntry::new(UN, "UN", Some(TagParser::Raw)),
    TagEntry::new(PDOL, "PDOL", Some(TagParser::DolRequest)),
    TagEntry::new(ICC_PK_CERT, "ICC_PK_CERT", Some(TagParser::Raw)),
    TagEntry::new(SDAD, "SDAD", Some(TagParser::Raw)),
    TagEntry::new(DRDOL, "DRDOL", Some(TagParser::Raw)),
    TagEntry::new(ODS, "ODS", Some(TagParser::Raw)),
    TagEntry::new(ISSUER_INFO, "ISSUER_INFO", Some(TagParser::Integer)),
    TagEntry::new(ISSUER_COUNTRY, "ISSUER_COUNTRY", Some(TagParser::Integer)),
    TagEntry::new(PROGRAM_ID, "PROGRAM_ID", None),
    TagEntry::new(DS_ID, "DS_ID", Some(TagParser::Integer)),
    TagEntry::new(TTQ, "TTQ", Some(TagParser::Raw)),
    TagEntry::new(CVM, "CVM", Some(TagParser::Chunks(2))),
    TagEntry::new(UN_MC, "UN_MC", Some(TagParser::Raw)),
    TagEntry::new(CTQ, "CTQ", Some(TagParser::Chunks(2))),
    TagEntry::new(APPLET_DATA, "APPLET_DATA", Some(TagParser::Text)),
    TagEntry::new(CARD_UN, "CARD_UN", Some(TagParser::Raw)),
    TagEntry::new(FCI_EXTRA, "FCI_EXTRA", None),
];

static REGISTRY: LazyLock<Arc<TagRegistry>> = LazyLock::new(|| {
    Arc::new(
        TagRegistry::universal()
            .extend(EMV_TAGS.iter().cloned())
            .expect("EMV tag table has unique ids and names"),
    )
});

/// Universal tags plus the EMV table
pub fn registry() -> Arc<TagRegistry> {
    Arc::clone(&REGISTRY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds() {
        let registry = registry();
        assert_eq!(registry.len(), TagRegistry::universal().len() + EMV_TAGS.len());
        assert_eq!(registry.id_for("PDOL"), Some(PDOL));
        assert_eq!(registry.id_for("SEQUENCE"), Some(0x30));
        assert_eq!(registry.parser(CVM), Some(TagParser::Chunks(2)));
        assert_eq!(registry.parser(FCI), None);
        assert_eq!(registry.name_for(PIN_TRIES), "PIN_TRIES");
    }
}
