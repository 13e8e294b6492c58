use anyhow::{bail, Context, Result};

/// Parse a hex string into bytes
/// Supports various formats:
/// - "A0000000031010" (pure hex)
/// - "A0 00 00 00 03 10 10" (space-separated)
/// - "0xA0,0x00,0x00" (0x prefix with commas)
/// - "A0:00:00" (colon-separated)
pub fn parse_hex(hex_str: &str) -> Result<Vec<u8>> {
    let cleaned = clean_hex_string(hex_str);

    if cleaned.is_empty() {
        return Ok(Vec::new());
    }

    if cleaned.len() % 2 != 0 {
        bail!(
            "Hex string must have even number of characters: '{}'",
            hex_str
        );
    }

    hex::decode(&cleaned).with_context(|| format!("Invalid hex string: '{hex_str}'"))
}

/// Strip separators, and a `0x` prefix at the start of each token, so only
/// hex digits remain
fn clean_hex_string(hex_str: &str) -> String {
    hex_str
        .split(|c: char| matches!(c, ' ' | ',' | ':' | '-' | '\t' | '\n' | '\r'))
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect::<String>()
        .to_uppercase()
}

/// Check if a string looks like a hex string
pub fn is_hex_like(s: &str) -> bool {
    let cleaned = clean_hex_string(s);
    !cleaned.is_empty() && cleaned.len() % 2 == 0 && cleaned.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse a DF name given either as hex (an AID) or as ASCII (e.g. "2PAY.SYS.DDF01")
pub fn parse_df_name(input: &str) -> Result<Vec<u8>> {
    if is_hex_like(input) {
        parse_hex(input)
    } else if input.is_ascii() && !input.trim().is_empty() {
        Ok(input.trim().as_bytes().to_vec())
    } else {
        bail!("DF name must be hex or printable ASCII: '{input}'")
    }
}

/// Parse a numeric tag id ("9F17", "0x9f17", "57")
pub fn parse_tag_id(tag_str: &str) -> Result<u32> {
    let cleaned = tag_str.trim();
    let digits = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(cleaned);

    if digits.is_empty() || digits.len() > 8 {
        bail!("Invalid tag id: '{tag_str}'");
    }

    u32::from_str_radix(digits, 16).with_context(|| format!("Invalid tag id: '{tag_str}'"))
}

/// Format bytes as a hex string
pub fn format_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Format bytes as a hex string with spaces
pub fn format_hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format bytes as ASCII, replacing non-printable chars with '.'
pub fn format_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}
