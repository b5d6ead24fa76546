//! Source location tracking
//!
//! Script primitives report where they were called from so that recovered
//! diagnostics and fatal aborts can point at the offending line. Bodies
//! written in Rust get their location for free through `#[track_caller]`;
//! front ends compiling a script language construct spans explicitly.

use std::fmt;
use std::panic::Location;

/// Source position (line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
}

impl Position {
    /// Create a new position
    #[inline]
    pub fn new(
        line: u32,
        column: u32,
    ) -> Self {
        Self { line, column }
    }

    /// Create a dummy position
    #[inline]
    pub fn dummy() -> Self {
        Self { line: 0, column: 0 }
    }
}

impl fmt::Display for Position {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source span inside one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// File the span points into
    pub file: &'static str,
    /// Start position (inclusive)
    pub start: Position,
    /// End position (exclusive)
    pub end: Position,
}

impl Span {
    /// Create a new span
    #[inline]
    pub fn new(
        file: &'static str,
        start: Position,
        end: Position,
    ) -> Self {
        Self { file, start, end }
    }

    /// Create a zero-width span at a single position
    #[inline]
    pub fn point(
        file: &'static str,
        line: u32,
        column: u32,
    ) -> Self {
        let at = Position::new(line, column);
        Self::new(file, at, at)
    }

    /// Span of the code calling the current `#[track_caller]` function
    #[inline]
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }

    /// Create a dummy span
    #[inline]
    pub fn dummy() -> Self {
        Self {
            file: "<unknown>",
            start: Position::dummy(),
            end: Position::dummy(),
        }
    }

    /// Check if this is a dummy span
    #[inline]
    pub fn is_dummy(&self) -> bool {
        self.start.line == 0
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}

impl From<&'static Location<'static>> for Span {
    fn from(location: &'static Location<'static>) -> Self {
        Self::point(location.file(), location.line(), location.column())
    }
}

impl fmt::Display for Span {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.is_dummy() {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}:{}", self.file, self.start)
        }
    }
}

#[cfg(test)]
mod tests;
