//! String literals as stored in the `#US` heap.
//!
//! The heap holds raw UTF-16 code units and does not require them to form valid UTF-16:
//! unpaired surrogates are legal and show up in obfuscated binaries. [`UserString`] keeps the
//! code units as they are, so such a literal survives loading, the transform and writing.
//!
//! # Serialized form
//!
//! Valid UTF-16 is written as a plain JSON string. Anything else is written as an array of
//! code units. Reading accepts both, including strings carrying lone `\uXXXX` surrogate
//! escapes.
//!
//! ```rust
//! use dotstub::metadata::userstring::UserString;
//!
//! let plain: UserString = serde_json::from_str(r#""Hi""#)?;
//! assert_eq!(plain, "Hi");
//!
//! let lone: UserString = serde_json::from_str(r#""\ud800x""#)?;
//! assert_eq!(lone.units(), &[0xD800, u16::from(b'x')]);
//! assert_eq!(serde_json::to_string(&lone)?, "[55296,120]");
//! # Ok::<(), serde_json::Error>(())
//! ```
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::fmt;

use serde::{
    de::{self, SeqAccess, Visitor},
    ser::SerializeSeq,
    Deserialize, Deserializer, Serialize, Serializer,
};
use widestring::{U16Str, U16String};

/// A string literal as a sequence of UTF-16 code units.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct UserString(U16String);

impl UserString {
    /// Wraps raw code units without validating them
    #[must_use]
    pub fn from_units(units: Vec<u16>) -> Self {
        UserString(U16String::from_vec(units))
    }

    /// The code units
    #[must_use]
    pub fn units(&self) -> &[u16] {
        self.0.as_slice()
    }

    /// The code units as a `widestring` slice
    #[must_use]
    pub fn as_ustr(&self) -> &U16Str {
        self.0.as_ustr()
    }

    /// Number of UTF-16 code units, which is what .NET reports as `String.Length`
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for `""`
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if every code unit is in the 7-bit range
    #[must_use]
    pub fn is_ascii(&self) -> bool {
        self.units().iter().all(|unit| *unit < 0x80)
    }

    /// Returns true if the literal contains U+0000
    #[must_use]
    pub fn contains_nul(&self) -> bool {
        self.units().contains(&0)
    }

    /// Returns the content as a Rust string, `None` if it contains unpaired surrogates
    #[must_use]
    pub fn to_string_checked(&self) -> Option<String> {
        self.0.to_string().ok()
    }

    /// Returns the content as a Rust string with unpaired surrogates replaced by U+FFFD
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        self.0.to_string_lossy()
    }
}

impl From<&str> for UserString {
    fn from(value: &str) -> Self {
        UserString(U16String::from_str(value))
    }
}

impl From<String> for UserString {
    fn from(value: String) -> Self {
        UserString::from(value.as_str())
    }
}

impl PartialEq<str> for UserString {
    fn eq(&self, other: &str) -> bool {
        self.units().iter().copied().eq(other.encode_utf16())
    }
}

impl PartialEq<&str> for UserString {
    fn eq(&self, other: &&str) -> bool {
        *self == **other
    }
}

impl fmt::Display for UserString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for UserString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_string_checked() {
            Some(value) => write!(f, "{value:?}"),
            None => write!(f, "{:?}", self.units()),
        }
    }
}

impl Serialize for UserString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(value) = self.to_string_checked() {
            return serializer.serialize_str(&value);
        }

        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for unit in self.units() {
            seq.serialize_element(unit)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for UserString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // serde_json hands out strings with lone surrogate escapes only as (WTF-8) bytes
        deserializer.deserialize_byte_buf(UserStringVisitor)
    }
}

struct UserStringVisitor;

impl<'de> Visitor<'de> for UserStringVisitor {
    type Value = UserString;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or an array of UTF-16 code units")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<UserString, E> {
        Ok(UserString::from(value))
    }

    fn visit_bytes<E: de::Error>(self, value: &[u8]) -> Result<UserString, E> {
        decode_wtf8(value)
            .map(UserString::from_units)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Bytes(value), &self))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<UserString, A::Error> {
        let mut units = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(unit) = seq.next_element::<u16>()? {
            units.push(unit);
        }
        Ok(UserString::from_units(units))
    }
}

/// Decodes WTF-8 (UTF-8 that may also encode surrogate code points) into UTF-16 code units.
///
/// Returns `None` for bytes that are neither UTF-8 nor an encoded surrogate.
fn decode_wtf8(bytes: &[u8]) -> Option<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                units.extend(valid.encode_utf16());
                return Some(units);
            }
            Err(error) => {
                let (valid, tail) = rest.split_at(error.valid_up_to());
                units.extend(std::str::from_utf8(valid).ok()?.encode_utf16());

                // ED A0..BF 80..BF encodes U+D800..U+DFFF
                let [0xED, high @ 0xA0..=0xBF, low @ 0x80..=0xBF, ..] = tail else {
                    return None;
                };
                units.push(0xD000 | (u16::from(*high & 0x3F) << 6) | u16::from(*low & 0x3F));
                rest = &tail[3..];
            }
        }
    }
}
