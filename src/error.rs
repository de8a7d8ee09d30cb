//! Structured error types (spec §7 "Error Handling Design").
//!
//! Parse errors are synchronous `Result` errors (strict mode). Runtime reply
//! errors and engine-surfaced reply errors are *not* modeled as `Result`s:
//! per spec §7 they are returned as literal strings embedded in (or as) the
//! reply, since `reply()` always produces a `String`. `MatchError` exists
//! only to thread an early-exit signal through the matcher internals before
//! it is rendered to one of those literal strings.

use thiserror::Error;

/// A strict-mode parse failure (spec §4.1 "Strict-mode diagnostics",
/// "Version gate").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{file}:{line}: {message}")]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        ParseError { file: file.into(), line, message: message.into() }
    }
}

/// A non-fatal diagnostic surfaced in non-strict mode (spec §4.1: "the
/// offending construct is skipped with a warning"). Always also emitted via
/// `log::warn!` at the point of detection (spec §2.2 of `SPEC_FULL.md`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub file: String,
    pub line: usize,
    pub message: String,
}

/// Failure while merging a parsed `Root` into a `Brain` (spec §4.2). The
/// version-gate rejection (spec §4.1 "Version gate") is enforced by the
/// parser itself and surfaces here as `Parse`, not a separate variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Internal signal used by the matcher to short-circuit a reply in progress.
/// Converted to one of the literal engine-surfaced error strings (spec §7)
/// at the boundary of `RiveScript::reply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchError {
    NoReplyMatched,
    NoReplyFound,
    DeepRecursion,
}

/// Keys for the overridable literal error strings of spec §6 "Configuration
/// options" / §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoReplyMatched,
    NoReplyFound,
    DeepRecursion,
}

impl ErrorKind {
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::NoReplyMatched => "ERR: No Reply Matched",
            ErrorKind::NoReplyFound => "ERR: No Reply Found",
            ErrorKind::DeepRecursion => "ERR: Deep Recursion Detected!",
        }
    }
}

impl From<MatchError> for ErrorKind {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::NoReplyMatched => ErrorKind::NoReplyMatched,
            MatchError::NoReplyFound => ErrorKind::NoReplyFound,
            MatchError::DeepRecursion => ErrorKind::DeepRecursion,
        }
    }
}
