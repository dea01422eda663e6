//! Exception handling clauses of CIL method bodies.
//!
//! Clause boundaries are stored as instruction indices into [`super::CilBody::instructions`]
//! rather than byte offsets, so they survive instruction insertion as long as the editor
//! remaps them (see [`ExceptionHandler::remap`]).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::metadata::token::Token;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// Exception handler defining a try/catch/finally block within a method.
///
/// ```text
/// try {
///     // instructions[try_start..try_end]
/// }
/// catch (ExceptionType) {
///     // instructions[handler_start..handler_end]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// Raw clause kind, see [`ExceptionHandlerFlags`]
    pub flags: u16,
    /// First instruction of the protected region
    pub try_start: usize,
    /// One past the last instruction of the protected region
    pub try_end: usize,
    /// First instruction of the handler
    pub handler_start: usize,
    /// One past the last instruction of the handler
    pub handler_end: usize,
    /// First instruction of the filter block (`FILTER` clauses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_start: Option<usize>,
    /// Caught exception type (`EXCEPTION` clauses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_token: Option<Token>,
}

impl ExceptionHandler {
    /// Typed view of the clause flags
    #[must_use]
    pub fn kind(&self) -> ExceptionHandlerFlags {
        ExceptionHandlerFlags::from_bits_truncate(self.flags)
    }

    /// Rewrites every boundary through `map`, which translates an old instruction index
    /// into the index of the same instruction after an edit.
    pub fn remap(&mut self, map: impl Fn(usize) -> usize) {
        self.try_start = map(self.try_start);
        self.try_end = map(self.try_end);
        self.handler_start = map(self.handler_start);
        self.handler_end = map(self.handler_end);
        self.filter_start = self.filter_start.map(&map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_shifts_all_boundaries() {
        let mut handler = ExceptionHandler {
            flags: ExceptionHandlerFlags::FILTER.bits(),
            try_start: 0,
            try_end: 4,
            handler_start: 6,
            handler_end: 9,
            filter_start: Some(4),
            class_token: None,
        };

        handler.remap(|index| if index > 2 { index + 3 } else { index });

        assert_eq!(handler.try_start, 0);
        assert_eq!(handler.try_end, 7);
        assert_eq!(handler.filter_start, Some(7));
        assert_eq!(handler.handler_start, 9);
        assert_eq!(handler.handler_end, 12);
        assert_eq!(handler.kind(), ExceptionHandlerFlags::FILTER);
    }
}
