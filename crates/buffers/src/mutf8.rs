//! Modified UTF-8, the JVM's string byte encoding.
//!
//! Strings are sequences of UTF-16 code units. Each unit is encoded on its
//! own (surrogate pairs become two 3-byte sequences):
//!
//! | code unit        | bytes |
//! |------------------|-------|
//! | `0x0001..=0x007F`| 1     |
//! | `0x0000`, `0x0080..=0x07FF` | 2 |
//! | `0x0800..=0xFFFF`| 3     |
//!
//! NUL is the one unit forced out of its natural 1-byte range, so an encoded
//! string never contains a zero byte.

use thiserror::Error;

/// Input-validation failures of the modified UTF-8 codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Mutf8Error {
    #[error("invalid modified UTF-8 byte 0x{byte:02x} at position {position}")]
    InvalidByte { position: usize, byte: u8 },
    #[error("truncated modified UTF-8 sequence at position {position}")]
    Truncated { position: usize },
    #[error("encoded string is {len} bytes, limit is {max}")]
    TooLong { len: u64, max: u64 },
    #[error("unpaired UTF-16 surrogate at character {position}")]
    UnpairedSurrogate { position: usize },
}

/// Number of bytes `units` occupies once encoded.
pub fn encoded_len(units: &[u16]) -> usize {
    units
        .iter()
        .map(|&unit| match unit {
            0x0001..=0x007f => 1,
            0x0000 | 0x0080..=0x07ff => 2,
            _ => 3,
        })
        .sum()
}

/// Encodes UTF-16 code units.
///
/// # Example
///
/// ```
/// use jser_buffers::mutf8;
///
/// assert_eq!(mutf8::encode(&[0x41, 0x0000]), vec![0x41, 0xc0, 0x80]);
/// assert_eq!(mutf8::encode(&[0x1234]), vec![0xe1, 0x88, 0xb4]);
/// ```
pub fn encode(units: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(units));
    for &unit in units {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

/// Encodes a Rust string, going through its UTF-16 form.
pub fn encode_str(s: &str) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().collect();
    encode(&units)
}

/// Decodes bytes into UTF-16 code units.
///
/// Rejects continuation bytes in lead position, 4-byte lead bytes, bad
/// continuation bytes and a multi-byte sequence cut short by the end of input.
/// Overlong 2-byte forms are rejected too, except `C0 80` for NUL.
pub fn decode(bytes: &[u8]) -> Result<Vec<u16>, Mutf8Error> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        match b0 >> 4 {
            0x0..=0x7 => {
                out.push(b0 as u16);
                i += 1;
            }
            0xc | 0xd => {
                let b1 = continuation(bytes, i, 1)?;
                if b0 < 0xc2 && (b0, b1) != (0xc0, 0x80) {
                    return Err(Mutf8Error::InvalidByte {
                        position: i,
                        byte: b0,
                    });
                }
                out.push((((b0 & 0x1f) as u16) << 6) | (b1 & 0x3f) as u16);
                i += 2;
            }
            0xe => {
                let b1 = continuation(bytes, i, 1)?;
                let b2 = continuation(bytes, i, 2)?;
                out.push(
                    (((b0 & 0x0f) as u16) << 12)
                        | (((b1 & 0x3f) as u16) << 6)
                        | (b2 & 0x3f) as u16,
                );
                i += 3;
            }
            _ => {
                return Err(Mutf8Error::InvalidByte {
                    position: i,
                    byte: b0,
                })
            }
        }
    }
    Ok(out)
}

fn continuation(bytes: &[u8], lead: usize, k: usize) -> Result<u8, Mutf8Error> {
    let position = lead + k;
    let Some(&byte) = bytes.get(position) else {
        return Err(Mutf8Error::Truncated { position: lead });
    };
    if byte & 0xc0 != 0x80 {
        return Err(Mutf8Error::InvalidByte { position, byte });
    }
    Ok(byte)
}

/// Decodes bytes into a Rust string; unpaired surrogates are an error.
pub fn decode_to_string(bytes: &[u8]) -> Result<String, Mutf8Error> {
    let units = decode(bytes)?;
    units_to_string(&units)
}

/// Converts UTF-16 code units into a Rust string.
pub fn units_to_string(units: &[u16]) -> Result<String, Mutf8Error> {
    let mut out = String::with_capacity(units.len());
    for (position, ch) in char::decode_utf16(units.iter().copied()).enumerate() {
        match ch {
            Ok(ch) => out.push(ch),
            Err(_) => return Err(Mutf8Error::UnpairedSurrogate { position }),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nul_uses_two_bytes() {
        assert_eq!(encode(&[0]), vec![0xc0, 0x80]);
        assert_eq!(decode(&[0xc0, 0x80]).unwrap(), vec![0]);
        assert_eq!(encoded_len(&[0]), 2);
    }

    #[test]
    fn test_three_byte_unit() {
        let bytes = encode(&[0x1234]);
        assert_eq!(bytes, vec![0xe1, 0x88, 0xb4]);
        assert_eq!(decode(&bytes).unwrap(), vec![0x1234]);
    }

    #[test]
    fn test_range_boundaries() {
        assert_eq!(encode(&[0x7f]), vec![0x7f]);
        assert_eq!(encode(&[0x80]), vec![0xc2, 0x80]);
        assert_eq!(encode(&[0x7ff]), vec![0xdf, 0xbf]);
        assert_eq!(encode(&[0x800]), vec![0xe0, 0xa0, 0x80]);
        assert_eq!(encode(&[0xffff]), vec![0xef, 0xbf, 0xbf]);
    }

    #[test]
    fn test_supplementary_plane_is_two_surrogates() {
        let bytes = encode_str("\u{1F600}");
        assert_eq!(bytes.len(), 6);
        assert_eq!(decode_to_string(&bytes).unwrap(), "\u{1F600}");
    }

    #[test]
    fn test_truncated_sequences() {
        assert_eq!(
            decode(&[0x41, 0xe1, 0x88]),
            Err(Mutf8Error::Truncated { position: 1 })
        );
        assert_eq!(decode(&[0xc0]), Err(Mutf8Error::Truncated { position: 0 }));
    }

    #[test]
    fn test_overlong_two_byte_forms() {
        assert_eq!(
            decode(&[0x41, 0xc1, 0x81]),
            Err(Mutf8Error::InvalidByte {
                position: 1,
                byte: 0xc1
            })
        );
        assert_eq!(
            decode(&[0xc0, 0x81]),
            Err(Mutf8Error::InvalidByte {
                position: 0,
                byte: 0xc0
            })
        );
        assert_eq!(decode(&[0xc2, 0x80]).unwrap(), vec![0x80]);
    }

    #[test]
    fn test_invalid_bytes() {
        assert_eq!(
            decode(&[0x80]),
            Err(Mutf8Error::InvalidByte {
                position: 0,
                byte: 0x80
            })
        );
        assert_eq!(
            decode(&[0xf0, 0x80, 0x80, 0x80]),
            Err(Mutf8Error::InvalidByte {
                position: 0,
                byte: 0xf0
            })
        );
        assert_eq!(
            decode(&[0xc2, 0x41]),
            Err(Mutf8Error::InvalidByte {
                position: 1,
                byte: 0x41
            })
        );
    }

    #[test]
    fn test_unpaired_surrogate() {
        let bytes = encode(&[0x41, 0xd800]);
        assert_eq!(decode(&bytes).unwrap(), vec![0x41, 0xd800]);
        assert_eq!(
            decode_to_string(&bytes),
            Err(Mutf8Error::UnpairedSurrogate { position: 1 })
        );
    }

    proptest! {
        #[test]
        fn units_roundtrip(units in proptest::collection::vec(any::<u16>(), 0..64)) {
            let bytes = encode(&units);
            prop_assert_eq!(bytes.len(), encoded_len(&units));
            prop_assert!(!bytes.contains(&0));
            prop_assert_eq!(decode(&bytes).unwrap(), units);
        }

        #[test]
        fn strings_roundtrip(s in ".*") {
            prop_assert_eq!(decode_to_string(&encode_str(&s)).unwrap(), s);
        }
    }
}
