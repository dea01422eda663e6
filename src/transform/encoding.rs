//! Per-string encoding decisions.
//!
//! [`select`] looks at a literal once and decides two independent things:
//!
//! - **width**: ASCII content is stored as single bytes and rebuilt with the `sbyte*`
//!   constructors; anything else is stored as UTF-16LE and rebuilt with the `char*` ones.
//! - **length**: content without U+0000 can rely on the trailing terminator; content with an
//!   embedded U+0000 must pass its length explicitly or it would be truncated.
//!
//! All three functions work on UTF-16 code units, so literals with unpaired surrogates take
//! the wide path and come back unchanged.
//!
//! ```rust
//! use dotstub::transform::encoding::{character_count, encode_payload, select};
//! use dotstub::metadata::userstring::UserString;
//!
//! let content = UserString::from("a\0b");
//! let plan = select(&content);
//! assert!(!plan.wide);
//! assert!(plan.explicit_length);
//! assert_eq!(encode_payload(&content, plan), b"a\0b\0");
//! assert_eq!(character_count(&content, plan), 3);
//! ```

use std::fmt;

use crate::metadata::userstring::UserString;

/// How a literal is stored in its stub and rebuilt at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodingPlan {
    /// UTF-16LE payload and `char*` constructors, else ASCII and `sbyte*`
    pub wide: bool,
    /// Rebuild with `(ptr, 0, count)`, else rely on the terminator
    pub explicit_length: bool,
}

impl fmt::Display for EncodingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = if self.wide { "wide" } else { "narrow" };
        let length = if self.explicit_length {
            "explicit length"
        } else {
            "terminated"
        };
        write!(f, "{width}, {length}")
    }
}

/// Chooses the encoding for `content`. Pure and total.
#[must_use]
pub fn select(content: &UserString) -> EncodingPlan {
    EncodingPlan {
        wide: !content.is_ascii(),
        explicit_length: content.contains_nul(),
    }
}

/// Bytes stored after the stub code: the encoded content plus one terminator unit.
///
/// The terminator is appended for explicit-length plans too. A narrow plan requires ASCII
/// content, as produced by [`select`].
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_payload(content: &UserString, plan: EncodingPlan) -> Vec<u8> {
    let units = content.units();
    if plan.wide {
        let mut payload = Vec::with_capacity((units.len() + 1) * 2);
        for unit in units {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
        payload.extend_from_slice(&[0, 0]);
        payload
    } else {
        let mut payload = Vec::with_capacity(units.len() + 1);
        payload.extend(units.iter().map(|unit| *unit as u8));
        payload.push(0);
        payload
    }
}

/// Number of characters the length-taking constructor must read: bytes for narrow plans,
/// UTF-16 code units for wide ones. Both equal the code unit count of the literal.
#[must_use]
pub fn character_count(content: &UserString, plan: EncodingPlan) -> usize {
    let width = if plan.wide { 2 } else { 1 };
    encoded_len(content, plan) / width
}

/// Payload length without the terminator
fn encoded_len(content: &UserString, plan: EncodingPlan) -> usize {
    if plan.wide {
        content.len() * 2
    } else {
        content.len()
    }
}
