//! Modified UTF-8 as stored in `CONSTANT_Utf8_info` (JVMS §4.4.7).
//!
//! NUL is encoded on two bytes and supplementary characters as a pair of three-byte surrogates.
//! Surrogates need not be paired, so the decoded text is a sequence of UTF-16 code units rather
//! than a `str`. Only the canonical encoding is accepted, which makes [`encode_units`] the exact
//! inverse of [`decode`].

use crate::constant_pool::Utf8Info;

/// Decodes modified UTF-8, returning `None` on any malformed or non-canonical sequence.
pub fn decode(bytes: &[u8]) -> Option<Utf8Info> {
    decode_units(bytes).map(Utf8Info::from_units)
}

/// Decodes modified UTF-8 into UTF-16 code units, unpaired surrogates included.
pub fn decode_units(bytes: &[u8]) -> Option<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x01..=0x7f => {
                units.push(b as u16);
                i += 1;
            }
            0xc0..=0xdf => {
                let b2 = continuation(bytes.get(i + 1))?;
                let c = (b as u16 & 0x1f) << 6 | b2;
                // Only NUL may use an overlong form.
                if c != 0 && c < 0x80 {
                    return None;
                }
                units.push(c);
                i += 2;
            }
            0xe0..=0xef => {
                let b2 = continuation(bytes.get(i + 1))?;
                let b3 = continuation(bytes.get(i + 2))?;
                let c = (b as u16 & 0x0f) << 12 | b2 << 6 | b3;
                if c < 0x800 {
                    return None;
                }
                units.push(c);
                i += 3;
            }
            _ => return None,
        }
    }

    Some(units)
}

pub fn encode(s: &str) -> Vec<u8> {
    encode_units(s.encode_utf16())
}

pub fn encode_units(units: impl IntoIterator<Item = u16>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for unit in units {
        match unit {
            0x0001..=0x007f => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                bytes.push(0xc0 | (unit >> 6) as u8);
                bytes.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                bytes.push(0xe0 | (unit >> 12) as u8);
                bytes.push(0x80 | (unit >> 6 & 0x3f) as u8);
                bytes.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    bytes
}

fn continuation(byte: Option<&u8>) -> Option<u16> {
    match byte {
        Some(&b) if b & 0xc0 == 0x80 => Some(b as u16 & 0x3f),
        _ => None,
    }
}

#[cfg(test)]
mod mutf8_tests {
    use super::*;

    fn decode_str(bytes: &[u8]) -> Option<String> {
        decode(bytes).and_then(|text| text.as_str().map(str::to_owned))
    }

    #[test]
    fn it_should_decode_ascii() {
        assert_eq!(decode_str(b"java/lang/Object").as_deref(), Some("java/lang/Object"));
    }

    #[test]
    fn it_should_use_two_bytes_for_nul() {
        assert_eq!(encode("a\0b"), vec![b'a', 0xc0, 0x80, b'b']);
        assert_eq!(decode_str(&[b'a', 0xc0, 0x80, b'b']).as_deref(), Some("a\0b"));
    }

    #[test]
    fn it_should_encode_supplementary_characters_as_surrogate_pairs() {
        let bytes = encode("\u{1F600}");
        assert_eq!(bytes, vec![0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80]);
        assert_eq!(decode_str(&bytes).as_deref(), Some("\u{1F600}"));
    }

    #[test]
    fn it_should_round_trip_bmp_characters() {
        let s = "é€λ";
        assert_eq!(decode_str(&encode(s)).as_deref(), Some(s));
    }

    #[test]
    fn it_should_reject_raw_nul_and_four_byte_forms() {
        assert_eq!(decode(&[0x00]), None);
        assert_eq!(decode(&[0xf0, 0x9f, 0x98, 0x80]), None);
    }

    #[test]
    fn it_should_reject_overlong_and_truncated_sequences() {
        assert_eq!(decode(&[0xc1, 0x81]), None);
        assert_eq!(decode(&[0xe0, 0x81, 0x81]), None);
        assert_eq!(decode(&[0xe2, 0x82]), None);
    }

    #[test]
    fn it_should_keep_lone_surrogates_as_code_units() {
        let bytes = [b'a', 0xed, 0xa0, 0x80];
        let text = decode(&bytes).unwrap();
        assert_eq!(text, Utf8Info::Units(vec![0x61, 0xd800]));
        assert_eq!(text.as_str(), None);
        assert_eq!(text.to_string_lossy(), "a\u{FFFD}");
        assert_eq!(encode_units(vec![0x61, 0xd800]), bytes);
    }

    #[test]
    fn it_should_keep_a_reversed_surrogate_pair() {
        let bytes = [0xed, 0xb8, 0x80, 0xed, 0xa0, 0xbd];
        assert_eq!(decode_units(&bytes), Some(vec![0xde00, 0xd83d]));
        assert!(decode(&bytes).unwrap().as_str().is_none());
    }
}
