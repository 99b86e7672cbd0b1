//! Accumulated error state for snapshot writers and readers
//!
//! A snapshot operation can fail several layers deep: opening a file fails,
//! which makes reading the meta fail, which makes loading the snapshot fail.
//! `ErrorState` keeps the most recent status code and appends every message,
//! so the final text reads as a trail from the lowest layer upward.
//!
//! ```
//! use raftlog_core::ErrorState;
//!
//! let mut state = ErrorState::new();
//! state.set_error(2, format_args!("open {} failed; ", "data_1"));
//! state.set_error(22, format_args!("loading snapshot meta failed"));
//!
//! assert_eq!(state.error_code(), 22);
//! assert_eq!(state.error_text(), "open data_1 failed; loading snapshot meta failed");
//! ```
//!
//! There is no way to clear the state. A fresh operation gets a
//! fresh reader or writer, and with it a fresh `ErrorState`.

use std::fmt;
use std::io;

use crate::error::Error;

/// No such file or directory
pub const ENOENT: i32 = 2;
/// I/O error, used when the OS did not report an errno
pub const EIO: i32 = 5;
/// Invalid argument
pub const EINVAL: i32 = 22;
/// No space left (also used for a full registry)
pub const ENOSPC: i32 = 28;

/// Status code plus accumulated diagnostic text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorState {
    code: i32,
    text: String,
    entries: Vec<(i32, String)>,
}

impl ErrorState {
    /// Create an empty state (code 0, no text)
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `code` and append the formatted message to the trail
    ///
    /// The code is overwritten; the text is never overwritten.
    pub fn set_error(&mut self, code: i32, args: fmt::Arguments<'_>) {
        let message = fmt::format(args);
        self.code = code;
        self.text.push_str(&message);
        self.entries.push((code, message));
    }

    /// Record an I/O failure with its OS errno (or `EIO` when there is none)
    pub fn set_io_error(&mut self, context: impl fmt::Display, err: &io::Error) {
        let code = err.raw_os_error().unwrap_or(EIO);
        self.set_error(code, format_args!("{}: {}; ", context, err));
    }

    /// Most recently recorded code, 0 if nothing has been recorded
    pub fn error_code(&self) -> i32 {
        self.code
    }

    /// Full trail of every recorded message, in call order
    pub fn error_text(&self) -> &str {
        &self.text
    }

    /// Individual `(code, message)` pairs, in call order
    pub fn entries(&self) -> &[(i32, String)] {
        &self.entries
    }

    /// True once a non-zero code has been recorded
    pub fn has_error(&self) -> bool {
        self.code != 0
    }

    /// Snapshot of the current state as an [`Error::Snapshot`]
    pub fn to_error(&self) -> Error {
        Error::Snapshot {
            code: self.code,
            text: self.text.clone(),
        }
    }
}

/// Shared error contract of snapshot writers and readers
///
/// Implementors only hand out their `ErrorState`; the accessors come for free.
pub trait ErrorReporting {
    /// Borrow the error state
    fn error_state(&self) -> &ErrorState;

    /// Mutably borrow the error state
    fn error_state_mut(&mut self) -> &mut ErrorState;

    /// Record `code` and append a formatted message
    fn set_error(&mut self, code: i32, args: fmt::Arguments<'_>) {
        self.error_state_mut().set_error(code, args);
    }

    /// Most recently recorded code, 0 if none
    fn error_code(&self) -> i32 {
        self.error_state().error_code()
    }

    /// Accumulated diagnostic trail
    fn error_text(&self) -> &str {
        self.error_state().error_text()
    }

    /// True once a non-zero code has been recorded
    fn has_error(&self) -> bool {
        self.error_state().has_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        state: ErrorState,
    }

    impl ErrorReporting for Probe {
        fn error_state(&self) -> &ErrorState {
            &self.state
        }

        fn error_state_mut(&mut self) -> &mut ErrorState {
            &mut self.state
        }
    }

    #[test]
    fn test_fresh_state_is_clean() {
        let state = ErrorState::new();
        assert_eq!(state.error_code(), 0);
        assert_eq!(state.error_text(), "");
        assert!(!state.has_error());
    }

    #[test]
    fn test_code_overwritten_text_appended() {
        let mut state = ErrorState::new();
        state.set_error(5, format_args!("a"));
        state.set_error(7, format_args!("b"));

        assert_eq!(state.error_code(), 7);
        assert_eq!(state.error_text(), "ab");
        assert_eq!(state.entries(), &[(5, "a".to_string()), (7, "b".to_string())]);
    }

    #[test]
    fn test_formatted_arguments() {
        let mut state = ErrorState::new();
        state.set_error(EINVAL, format_args!("bad index {} in {}; ", 42, "snapshot_7"));
        assert_eq!(state.error_text(), "bad index 42 in snapshot_7; ");
    }

    #[test]
    fn test_set_io_error_uses_os_errno() {
        let mut state = ErrorState::new();
        let err = io::Error::from_raw_os_error(ENOENT);
        state.set_io_error("open meta", &err);

        assert_eq!(state.error_code(), ENOENT);
        assert!(state.error_text().starts_with("open meta: "));
    }

    #[test]
    fn test_set_io_error_without_errno_falls_back_to_eio() {
        let mut state = ErrorState::new();
        let err = io::Error::new(io::ErrorKind::Other, "synthetic");
        state.set_io_error("write", &err);

        assert_eq!(state.error_code(), EIO);
        assert!(state.error_text().contains("synthetic"));
    }

    #[test]
    fn test_to_error_carries_trail() {
        let mut state = ErrorState::new();
        state.set_error(EIO, format_args!("low; "));
        state.set_error(EINVAL, format_args!("high"));

        match state.to_error() {
            Error::Snapshot { code, text } => {
                assert_eq!(code, EINVAL);
                assert_eq!(text, "low; high");
            }
            other => panic!("expected snapshot error, got {:?}", other),
        }
    }

    #[test]
    fn test_reporting_trait_delegates() {
        let mut probe = Probe {
            state: ErrorState::new(),
        };
        assert!(!probe.has_error());

        probe.set_error(ENOSPC, format_args!("disk full"));
        assert_eq!(probe.error_code(), ENOSPC);
        assert_eq!(probe.error_text(), "disk full");
        assert!(probe.has_error());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn trail_is_concatenation_of_messages(
                calls in prop::collection::vec((1i32..200, "[a-z ]{0,12}"), 1..10)
            ) {
                let mut state = ErrorState::new();
                for (code, msg) in &calls {
                    state.set_error(*code, format_args!("{}", msg));
                }

                let expected: String = calls.iter().map(|(_, m)| m.as_str()).collect();
                prop_assert_eq!(state.error_text(), expected.as_str());
                prop_assert_eq!(state.error_code(), calls.last().unwrap().0);
                prop_assert_eq!(state.entries().len(), calls.len());
            }
        }
    }
}
