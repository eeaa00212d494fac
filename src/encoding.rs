//! Explicit text codecs.
//!
//! Every patch target declares the encoding its bytes are in. Nothing is
//! sniffed or guessed: content that does not decode under the declared
//! encoding is rejected before any transformation runs, and patched text that
//! cannot be represented in it is rejected before anything is written.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A declared text encoding for reading and writing a patch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    Utf16Le,
    Utf16Be,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("content is not valid {encoding} (invalid data at byte {offset})")]
    Decode {
        encoding: TextEncoding,
        offset: usize,
    },

    #[error("character {ch:?} at byte {offset} cannot be represented in {encoding}")]
    Encode {
        encoding: TextEncoding,
        ch: char,
        offset: usize,
    },

    #[error("unknown text encoding '{0}' (expected utf-8, ascii, latin-1, utf-16le or utf-16be)")]
    Unknown(String),
}

impl TextEncoding {
    /// Canonical lowercase name, as accepted in manifests.
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
        }
    }

    /// Decode raw file bytes into text.
    pub fn decode(self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| EncodingError::Decode {
                    encoding: self,
                    offset: e.valid_up_to(),
                }),
            TextEncoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(EncodingError::Decode {
                    encoding: self,
                    offset,
                }),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            TextEncoding::Utf16Le => decode_utf16(bytes, self, u16::from_le_bytes),
            TextEncoding::Utf16Be => decode_utf16(bytes, self, u16::from_be_bytes),
        }
    }

    /// Encode text back into bytes.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Ascii => encode_single_byte(text, self, 0x7F),
            TextEncoding::Latin1 => encode_single_byte(text, self, 0xFF),
            TextEncoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            TextEncoding::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
        }
    }
}

fn decode_utf16(
    bytes: &[u8],
    encoding: TextEncoding,
    unit: fn([u8; 2]) -> u16,
) -> Result<String, EncodingError> {
    if bytes.len() % 2 != 0 {
        return Err(EncodingError::Decode {
            encoding,
            offset: bytes.len() - 1,
        });
    }

    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    let mut out = String::with_capacity(bytes.len() / 2);
    let mut consumed = 0usize;

    for decoded in char::decode_utf16(units) {
        match decoded {
            Ok(ch) => {
                consumed += ch.len_utf16();
                out.push(ch);
            }
            Err(_) => {
                return Err(EncodingError::Decode {
                    encoding,
                    offset: consumed * 2,
                })
            }
        }
    }

    Ok(out)
}

fn encode_single_byte(
    text: &str,
    encoding: TextEncoding,
    max: u32,
) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::with_capacity(text.len());
    for (offset, ch) in text.char_indices() {
        let code = ch as u32;
        if code > max {
            return Err(EncodingError::Encode {
                encoding,
                ch,
                offset,
            });
        }
        out.push(code as u8);
    }
    Ok(out)
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            "utf-16le" | "utf16le" => Ok(TextEncoding::Utf16Le),
            "utf-16be" | "utf16be" => Ok(TextEncoding::Utf16Be),
            _ => Err(EncodingError::Unknown(s.to_string())),
        }
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = EncodingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
