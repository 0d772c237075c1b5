//! Strata Forth - embedded decoder VM for columnar data
//!
//! A small stack-oriented virtual machine and compiler for a Forth dialect
//! specialized in parsing structured binary input streams and emitting
//! typed columnar output buffers. A host library compiles a textual
//! program once, then drives the machine over many byte streams:
//!
//! ```
//! use std::collections::HashMap;
//! use strata_forth::{InputStream, Machine32};
//!
//! let mut machine = Machine32::new(
//!     "input stream output col int32  0 10 do stream i-> col loop",
//! )
//! .unwrap();
//!
//! let mut bytes = Vec::new();
//! for value in 0i32..10 {
//!     bytes.extend_from_slice(&value.to_le_bytes());
//! }
//! let inputs = HashMap::from([("stream".to_string(), InputStream::new(bytes))]);
//! machine.run(inputs).unwrap();
//!
//! let col = machine.output_at("col").unwrap();
//! assert_eq!(col.as_i32().unwrap(), (0..10).collect::<Vec<_>>());
//! ```
//!
//! Programs are compiled into a segmented bytecode table: every control
//! block and word definition becomes its own segment, so the interpreter
//! needs no general jump. Execution is cooperative - `pause` in a program,
//! a fault, or single stepping suspends the machine with all state
//! inspectable, and `resume`/`step` continue exactly where it left off.

pub mod bytecode;
pub mod cell;
pub mod compiler;
pub mod dtype;
pub mod error;
pub mod input;
pub mod output;
pub mod token;
pub mod vm;

pub use bytecode::{Bytecode, DictionaryEntry, Opcode, OutputDecl, ReadSpec, DICTIONARY_BASE};
pub use cell::Cell;
pub use compiler::compile;
pub use dtype::Dtype;
pub use error::{CompileError, Fault, MachineError};
pub use input::InputStream;
pub use output::OutputBuffer;
pub use vm::{Counters, Machine, Machine32, Machine64, MachineConfig};
