//! Definite-length TLV encoding

/// Encode a length in short form below 128, long form above
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let octets: Vec<u8> = len
        .to_be_bytes()
        .into_iter()
        .skip_while(|&b| b == 0)
        .collect();
    let mut out = Vec::with_capacity(octets.len() + 1);
    out.push(0x80 | octets.len() as u8);
    out.extend(octets);
    out
}

/// Encode one element from raw tag bytes and a value
pub fn encode(tag: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tag.len() + value.len() + 3);
    out.extend_from_slice(tag);
    out.extend(encode_length(value.len()));
    out.extend_from_slice(value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_length_forms() {
        assert_eq!(encode_length(0), vec![0x00]);
        assert_eq!(encode_length(127), vec![0x7F]);
        assert_eq!(encode_length(128), vec![0x81, 0x80]);
        assert_eq!(encode_length(256), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode_length(65535), vec![0x82, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_element() {
        assert_eq!(encode(&[0x9F, 0x17], &[0x03]), vec![0x9F, 0x17, 0x01, 0x03]);
    }
}
