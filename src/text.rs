//! Text encodings for string blocks.

use crate::error::{Error, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

/// The text encodings a string block can declare.
///
/// Every encoding converts to and from Rust's native UTF-8 `String`; the
/// encoded form is what lands on the wire. Lossy conversions are refused:
/// encoding a string with characters outside the target repertoire is an
/// error, not a substitution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrEncoding {
    Ascii,
    Latin1,
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
}

impl StrEncoding {
    /// Canonical encoding name, as stored in a schema's textual form.
    pub fn name(self) -> &'static str {
        match self {
            StrEncoding::Ascii => "Ascii",
            StrEncoding::Latin1 => "Latin1",
            StrEncoding::Utf8 => "Utf8",
            StrEncoding::Utf16Le => "Utf16Le",
            StrEncoding::Utf16Be => "Utf16Be",
            StrEncoding::Utf32Le => "Utf32Le",
        }
    }

    /// Look up an encoding from its canonical name.
    pub fn from_name(name: &str) -> Option<StrEncoding> {
        Some(match name {
            "Ascii" => StrEncoding::Ascii,
            "Latin1" => StrEncoding::Latin1,
            "Utf8" => StrEncoding::Utf8,
            "Utf16Le" => StrEncoding::Utf16Le,
            "Utf16Be" => StrEncoding::Utf16Be,
            "Utf32Le" => StrEncoding::Utf32Le,
            _ => return None,
        })
    }

    /// Encode `s` into this encoding's byte form.
    pub fn encode(self, s: &str) -> Result<Vec<u8>> {
        match self {
            StrEncoding::Ascii => {
                if !s.is_ascii() {
                    return Err(Error::BadEncode(format!(
                        "string {:?} contains non-ASCII characters",
                        s
                    )));
                }
                Ok(s.as_bytes().to_vec())
            }
            StrEncoding::Latin1 => {
                let mut out = Vec::with_capacity(s.len());
                for c in s.chars() {
                    let cp = c as u32;
                    if cp > 0xFF {
                        return Err(Error::BadEncode(format!(
                            "character {:?} is outside Latin-1",
                            c
                        )));
                    }
                    out.push(cp as u8);
                }
                Ok(out)
            }
            StrEncoding::Utf8 => Ok(s.as_bytes().to_vec()),
            StrEncoding::Utf16Le => {
                let mut out = Vec::with_capacity(s.len() * 2);
                for unit in s.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                Ok(out)
            }
            StrEncoding::Utf16Be => {
                let mut out = Vec::with_capacity(s.len() * 2);
                for unit in s.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
                Ok(out)
            }
            StrEncoding::Utf32Le => {
                let mut out = Vec::with_capacity(s.len() * 4);
                for c in s.chars() {
                    out.extend_from_slice(&(c as u32).to_le_bytes());
                }
                Ok(out)
            }
        }
    }

    /// Decode a byte payload in this encoding back into a `String`.
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            StrEncoding::Ascii => {
                if !bytes.is_ascii() {
                    return Err(Error::BadDecode(
                        "ASCII string contains bytes above 0x7F".into(),
                    ));
                }
                // All bytes below 0x80, so this is also valid UTF-8
                Ok(String::from_utf8(bytes.to_vec()).unwrap())
            }
            StrEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            StrEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::BadDecode("string wasn't valid UTF-8".into())),
            StrEncoding::Utf16Le => {
                let units = read_utf16_units::<LittleEndian>(bytes)?;
                String::from_utf16(&units)
                    .map_err(|_| Error::BadDecode("string wasn't valid UTF-16".into()))
            }
            StrEncoding::Utf16Be => {
                let units = read_utf16_units::<BigEndian>(bytes)?;
                String::from_utf16(&units)
                    .map_err(|_| Error::BadDecode("string wasn't valid UTF-16".into()))
            }
            StrEncoding::Utf32Le => {
                if bytes.len() % 4 != 0 {
                    return Err(Error::BadDecode(
                        "UTF-32 payload length isn't a multiple of 4".into(),
                    ));
                }
                let mut buf = bytes;
                let mut out = String::with_capacity(bytes.len() / 4);
                while !buf.is_empty() {
                    let cp = buf.read_u32::<LittleEndian>()?;
                    let c = char::from_u32(cp).ok_or_else(|| {
                        Error::BadDecode(format!("invalid UTF-32 code point {:#x}", cp))
                    })?;
                    out.push(c);
                }
                Ok(out)
            }
        }
    }
}

fn read_utf16_units<B: byteorder::ByteOrder>(bytes: &[u8]) -> Result<Vec<u16>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::BadDecode(
            "UTF-16 payload length isn't a multiple of 2".into(),
        ));
    }
    let mut buf = bytes;
    let mut units = Vec::with_capacity(bytes.len() / 2);
    while !buf.is_empty() {
        units.push(buf.read_u16::<B>()?);
    }
    Ok(units)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ascii() {
        let enc = StrEncoding::Ascii;
        assert_eq!(enc.encode("hi").unwrap(), b"hi");
        assert_eq!(enc.decode(b"hi").unwrap(), "hi");
        enc.encode("héllo").unwrap_err();
        enc.decode(&[0x80]).unwrap_err();
    }

    #[test]
    fn latin1() {
        let enc = StrEncoding::Latin1;
        assert_eq!(enc.encode("héllo").unwrap(), b"h\xE9llo");
        assert_eq!(enc.decode(b"h\xE9llo").unwrap(), "héllo");
        enc.encode("héllo\u{2603}").unwrap_err();
    }

    #[test]
    fn utf16_both_orders() {
        let s = "h\u{00E9}\u{1F600}";
        let le = StrEncoding::Utf16Le.encode(s).unwrap();
        let be = StrEncoding::Utf16Be.encode(s).unwrap();
        assert_eq!(le.len(), 8); // 2 BMP units + surrogate pair
        assert_eq!(StrEncoding::Utf16Le.decode(&le).unwrap(), s);
        assert_eq!(StrEncoding::Utf16Be.decode(&be).unwrap(), s);
        assert_ne!(le, be);
        StrEncoding::Utf16Le.decode(&le[..3]).unwrap_err();
    }

    #[test]
    fn utf32() {
        let s = "a\u{1F600}";
        let bytes = StrEncoding::Utf32Le.encode(s).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(StrEncoding::Utf32Le.decode(&bytes).unwrap(), s);
        // Lone surrogate code point is not a char
        StrEncoding::Utf32Le
            .decode(&0xD800u32.to_le_bytes())
            .unwrap_err();
    }

    #[test]
    fn utf8_rejects_bad_bytes() {
        StrEncoding::Utf8.decode(&[0xFF, 0xFE]).unwrap_err();
    }
}
