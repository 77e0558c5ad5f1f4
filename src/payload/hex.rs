use crate::error::HexError;

/// Decodes a string of hex digit pairs (such as `"1B40"`) into bytes.
///
/// Surrounding whitespace is ignored. Odd length input and non hex digits are rejected instead of
/// being sent to the printer half decoded.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, HexError> {
    let input = input.trim();

    if input.is_empty() {
        return Err(HexError::Empty);
    }

    Ok(hex::decode(input)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{LINE_FEED, TAB};

    #[test]
    fn test_decode_control_bytes() {
        assert_eq!(decode_hex("0A").unwrap(), vec![LINE_FEED]);
        assert_eq!(decode_hex("09").unwrap(), vec![TAB]);
        assert_eq!(decode_hex(" 1b40\n").unwrap(), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert!(matches!(decode_hex("0A0"), Err(HexError::Decode { source: hex::FromHexError::OddLength })));
        assert!(matches!(decode_hex("0G"), Err(HexError::Decode { .. })));
        assert!(matches!(decode_hex(""), Err(HexError::Empty)));
    }
}
