//! Error types for compilation and execution
//!
//! Runtime faults are plain enumerated values held in the machine's error
//! register, not panics. Compile errors carry the source location and an
//! excerpt of the offending text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime fault held in the machine's error register.
///
/// A fault is sticky: once set, `step`/`resume` keep returning it until the
/// machine is `reset` (or `begin` is called again).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Fault {
    /// `step` or `resume` was invoked before `begin`.
    #[error("not ready: call 'begin' before 'step' or 'resume'")]
    NotReady,
    /// The program already reached the end of its top-level segment.
    #[error("is done: reached the end of the program; call 'begin' to rerun")]
    IsDone,
    /// The program executed `halt`.
    #[error("user halt: user-defined error or stopping condition")]
    UserHalt,
    /// The call stack or do-loop stack would exceed its configured maximum.
    #[error("recursion depth exceeded: too many words calling words or a recursive word is looping endlessly")]
    RecursionDepthExceeded,
    /// A pop was attempted on an empty data stack.
    #[error("stack underflow: tried to pop from an empty stack")]
    StackUnderflow,
    /// A push would exceed the configured maximum data-stack depth.
    #[error("stack overflow: tried to push beyond the predefined maximum stack depth")]
    StackOverflow,
    /// A read was attempted past the end of an input.
    #[error("read beyond: tried to read beyond the end of an input")]
    ReadBeyond,
    /// A seek positioned an input outside of its bounds.
    #[error("seek beyond: tried to seek beyond the bounds of an input (0 or length)")]
    SeekBeyond,
    /// A skip positioned an input outside of its bounds.
    #[error("skip beyond: tried to skip beyond the bounds of an input (0 or length)")]
    SkipBeyond,
    /// A rewind shrank an output below zero length.
    #[error("rewind beyond: tried to rewind beyond the beginning of an output")]
    RewindBeyond,
    /// `/`, `mod`, or `/mod` with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,
}

/// Error returned by the machine's caller-facing operations.
///
/// Wraps a [`Fault`] from the error register, or reports an API-level
/// problem (a declared input that was not supplied, or a `call` target that
/// is not in the dictionary).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    /// The error register was set while executing.
    #[error(transparent)]
    Fault(#[from] Fault),
    /// A declared input was not supplied to `begin` or `run`.
    #[error("source code defines an input that was not provided: {name}")]
    MissingInput {
        /// The declared input name.
        name: String,
    },
    /// A `call` named a word that is not in the dictionary.
    #[error("unrecognized word: {name}")]
    UnknownWord {
        /// The requested word name.
        name: String,
    },
}

/// A fatal compile-time error with source location and excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("in source code, line {line} col {column}, {message}:\n\n    {snippet}")]
pub struct CompileError {
    /// Line of the offending token (1-based).
    pub line: usize,
    /// Column of the offending token (0-based).
    pub column: usize,
    /// What went wrong.
    pub message: String,
    /// The stretch of source text the error points at.
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display() {
        assert_eq!(Fault::DivisionByZero.to_string(), "division by zero");
        assert!(Fault::StackUnderflow.to_string().contains("underflow"));
    }

    #[test]
    fn test_machine_error_from_fault() {
        let err: MachineError = Fault::ReadBeyond.into();
        assert_eq!(err, MachineError::Fault(Fault::ReadBeyond));
    }

    #[test]
    fn test_compile_error_display() {
        let err = CompileError {
            line: 2,
            column: 4,
            message: "unrecognized word or wrong context for word".to_string(),
            snippet: "frobnicate".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("line 2 col 4"));
        assert!(text.contains("frobnicate"));
    }
}
