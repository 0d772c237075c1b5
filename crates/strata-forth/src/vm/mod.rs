//! The virtual machine
//!
//! A [`Machine`] owns a compiled program plus all runtime state: the data
//! stack, the call stack, do-loop records, variable cells, bound inputs,
//! and allocated outputs. Execution is single-threaded and cooperative;
//! the only suspension points are `pause`, a fault, and single stepping.
//! State is fully inspectable whenever the machine is suspended.

mod dispatch;
mod frame;

use std::collections::HashMap;
use std::time::Instant;

use crate::bytecode::{disasm, Bytecode, DictionaryEntry};
use crate::cell::Cell;
use crate::compiler::compile;
use crate::error::{CompileError, Fault, MachineError};
use crate::input::InputStream;
use crate::output::OutputBuffer;
use frame::{DoFrame, Frame};

/// Machine with 32-bit stack cells.
pub type Machine32 = Machine<i32>;
/// Machine with 64-bit stack cells.
pub type Machine64 = Machine<i64>;

/// Construction parameters.
///
/// The stacks are allocated up front from these depths and never grow;
/// exceeding one raises a fault instead of reallocating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineConfig {
    /// Maximum data-stack depth.
    pub stack_max_depth: usize,
    /// Maximum call-stack depth, also used for the do-loop stack.
    pub recursion_max_depth: usize,
    /// Elements reserved in each output buffer at `begin`.
    pub output_initial_size: usize,
    /// Growth factor applied when an output buffer fills.
    pub output_resize_factor: f64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            stack_max_depth: 1024,
            recursion_max_depth: 1024,
            output_initial_size: 1024,
            output_resize_factor: 1.5,
        }
    }
}

/// Work counters, accumulated across runs until [`Machine::count_reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Instructions executed.
    pub instructions: u64,
    /// Typed reads that pushed onto the stack.
    pub reads: u64,
    /// Writes into output buffers.
    pub writes: u64,
    /// Time spent inside the dispatch loop.
    pub nanoseconds: u64,
}

/// A compiled program together with its runtime state.
pub struct Machine<T: Cell> {
    source: String,
    image: Bytecode,
    config: MachineConfig,

    stack: Vec<T>,
    variables: Vec<T>,
    frames: Vec<Frame>,
    do_stack: Vec<DoFrame>,
    /// Call depths to unwind to, one per outer `run`/`call`/`step` entry;
    /// lets a nested entry return without draining the outer one's frames.
    resume_targets: Vec<usize>,

    inputs: Vec<InputStream>,
    outputs: Vec<OutputBuffer>,
    is_ready: bool,
    fault: Option<Fault>,
    counts: Counters,
}

impl<T: Cell> Machine<T> {
    /// Compile `source` with default limits.
    pub fn new(source: impl Into<String>) -> Result<Self, CompileError> {
        Self::with_config(source, MachineConfig::default())
    }

    /// Compile `source` with explicit limits.
    pub fn with_config(
        source: impl Into<String>,
        config: MachineConfig,
    ) -> Result<Self, CompileError> {
        let source = source.into();
        let image = compile(&source)?;
        let variables = vec![T::ZERO; image.variables().len()];
        Ok(Self {
            source,
            image,
            config,
            stack: Vec::with_capacity(config.stack_max_depth),
            variables,
            frames: Vec::with_capacity(config.recursion_max_depth),
            do_stack: Vec::with_capacity(config.recursion_max_depth),
            resume_targets: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            is_ready: false,
            fault: None,
            counts: Counters::default(),
        })
    }

    // ===== Lifecycle =====

    /// Clear all runtime state: stack, variables, bound inputs, outputs,
    /// call and do stacks, and the error register. Counters survive.
    pub fn reset(&mut self) {
        self.stack.clear();
        for cell in &mut self.variables {
            *cell = T::ZERO;
        }
        self.frames.clear();
        self.do_stack.clear();
        self.resume_targets.clear();
        self.inputs.clear();
        self.outputs.clear();
        self.is_ready = false;
        self.fault = None;
    }

    /// Reset, bind one input stream per declared input name, allocate
    /// output buffers, and stand ready at the start of the program.
    pub fn begin(
        &mut self,
        mut inputs: HashMap<String, InputStream>,
    ) -> Result<(), MachineError> {
        self.reset();

        let mut bound = Vec::with_capacity(self.image.inputs().len());
        for name in self.image.inputs() {
            match inputs.remove(name) {
                Some(stream) => bound.push(stream),
                None => {
                    return Err(MachineError::MissingInput { name: name.clone() });
                }
            }
        }
        self.inputs = bound;
        let initial = self.config.output_initial_size;
        let factor = self.config.output_resize_factor;
        self.outputs = self
            .image
            .outputs()
            .iter()
            .map(|decl| OutputBuffer::new(decl.dtype, initial, factor))
            .collect();

        self.resume_targets.push(0);
        self.frames.push(Frame { segment: 0, pc: 0 });
        self.is_ready = true;
        Ok(())
    }

    /// `begin` with the given inputs, then execute to completion.
    pub fn run(&mut self, inputs: HashMap<String, InputStream>) -> Result<(), MachineError> {
        self.begin(inputs)?;
        self.dispatch(false)
    }

    /// Continue a begun or paused program to completion.
    pub fn resume(&mut self) -> Result<(), MachineError> {
        self.check_runnable()?;
        self.dispatch(false)
    }

    /// Execute exactly one instruction, including any segment-pop and
    /// loop-index bookkeeping it completes.
    pub fn step(&mut self) -> Result<(), MachineError> {
        self.check_runnable()?;
        self.dispatch(true)
    }

    /// Enter a dictionary word as a subroutine, keeping ambient state
    /// (stack, variables, inputs, outputs) from the current program.
    pub fn call(&mut self, name: &str) -> Result<(), MachineError> {
        let Some(index) = self.image.dictionary_index(name) else {
            return Err(MachineError::UnknownWord {
                name: name.to_string(),
            });
        };
        self.call_index(index)
    }

    /// As [`call`](Self::call), by dictionary position.
    pub fn call_index(&mut self, index: usize) -> Result<(), MachineError> {
        if !self.is_ready {
            self.fault = Some(Fault::NotReady);
            return Err(Fault::NotReady.into());
        }
        if let Some(fault) = self.fault {
            return Err(fault.into());
        }
        let Some(entry) = self.image.dictionary().get(index) else {
            return Err(MachineError::UnknownWord {
                name: format!("{index}"),
            });
        };
        if self.frames.len() >= self.config.recursion_max_depth {
            self.fault = Some(Fault::RecursionDepthExceeded);
            return Err(Fault::RecursionDepthExceeded.into());
        }
        let segment = entry.segment();
        self.resume_targets.push(self.frames.len());
        self.frames.push(Frame { segment, pc: 0 });
        self.dispatch(false)
    }

    fn check_runnable(&mut self) -> Result<(), MachineError> {
        if !self.is_ready {
            self.fault = Some(Fault::NotReady);
            return Err(Fault::NotReady.into());
        }
        if self.is_done() {
            self.fault = Some(Fault::IsDone);
            return Err(Fault::IsDone.into());
        }
        if let Some(fault) = self.fault {
            return Err(fault.into());
        }
        Ok(())
    }

    fn dispatch(&mut self, single_step: bool) -> Result<(), MachineError> {
        let target = self.resume_targets.last().copied().unwrap_or(0);
        let started = Instant::now();
        self.run_loop(single_step, target);
        self.counts.nanoseconds += started.elapsed().as_nanos() as u64;

        if self.resume_targets.last() == Some(&self.frames.len()) {
            self.resume_targets.pop();
        }
        match self.fault {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    /// Convert the error register into a `Result`, treating faults in
    /// `ignore` as success.
    pub fn check(&self, ignore: &[Fault]) -> Result<(), Fault> {
        match self.fault {
            Some(fault) if !ignore.contains(&fault) => Err(fault),
            _ => Ok(()),
        }
    }

    // ===== Introspection =====

    /// The source text the machine was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The compiled program image.
    pub fn bytecode(&self) -> &Bytecode {
        &self.image
    }

    /// Render the program back to source form.
    pub fn decompiled(&self) -> String {
        disasm::decompile(&self.image)
    }

    /// User-defined words in definition order.
    pub fn dictionary(&self) -> &[DictionaryEntry] {
        self.image.dictionary()
    }

    /// Whether `begin` has run and the program can execute.
    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    /// Whether the program has unwound past the end of its top segment.
    pub fn is_done(&self) -> bool {
        self.frames.is_empty()
    }

    /// The error register.
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    // ===== Data stack =====

    /// The data stack, bottom first.
    pub fn stack(&self) -> &[T] {
        &self.stack
    }

    /// The cell `from_top` positions below the top (0 is the top).
    pub fn stack_at(&self, from_top: usize) -> Option<T> {
        self.stack
            .len()
            .checked_sub(1 + from_top)
            .and_then(|index| self.stack.get(index))
            .copied()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn stack_clear(&mut self) {
        self.stack.clear();
    }

    // ===== Variables =====

    /// Variable names and current values, in declaration order.
    pub fn variables(&self) -> Vec<(&str, T)> {
        self.image
            .variables()
            .iter()
            .map(|name| name.as_str())
            .zip(self.variables.iter().copied())
            .collect()
    }

    /// A variable's value by name.
    pub fn variable_at(&self, name: &str) -> Option<T> {
        let index = self.image.variables().iter().position(|n| n == name)?;
        self.variables.get(index).copied()
    }

    /// A variable's value by declaration index.
    pub fn variable_at_index(&self, index: usize) -> Option<T> {
        self.variables.get(index).copied()
    }

    // ===== Inputs and outputs =====

    /// The current position of a bound input; `None` before `begin` or for
    /// an unknown name.
    pub fn input_position_at(&self, name: &str) -> Option<usize> {
        let index = self.image.inputs().iter().position(|n| n == name)?;
        self.inputs.get(index).map(|stream| stream.pos())
    }

    /// Output names and buffers, in declaration order; empty before
    /// `begin`.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &OutputBuffer)> {
        self.image
            .outputs()
            .iter()
            .map(|decl| decl.name.as_str())
            .zip(self.outputs.iter())
    }

    /// An output buffer by name.
    pub fn output_at(&self, name: &str) -> Option<&OutputBuffer> {
        let index = self.image.outputs().iter().position(|o| o.name == name)?;
        self.outputs.get(index)
    }

    /// An output buffer by declaration index.
    pub fn output_at_index(&self, index: usize) -> Option<&OutputBuffer> {
        self.outputs.get(index)
    }

    // ===== Execution position =====

    /// Absolute bytecode position of the next instruction, if the machine
    /// is inside a segment.
    pub fn current_bytecode_position(&self) -> Option<usize> {
        let frame = self.frames.last()?;
        if frame.pc < self.image.segment_len(frame.segment) {
            Some(self.image.offsets()[frame.segment] + frame.pc)
        } else {
            None
        }
    }

    /// Call depth relative to the innermost `run`/`call`/`step` entry.
    pub fn current_recursion_depth(&self) -> Option<usize> {
        let target = self.resume_targets.last()?;
        Some(self.frames.len().saturating_sub(*target))
    }

    /// Source form of the next instruction to execute.
    pub fn current_instruction(&self) -> Option<String> {
        self.current_bytecode_position()
            .map(|position| disasm::decompile_at(&self.image, position, ""))
    }

    // ===== Counters and limits =====

    pub fn count_instructions(&self) -> u64 {
        self.counts.instructions
    }

    pub fn count_reads(&self) -> u64 {
        self.counts.reads
    }

    pub fn count_writes(&self) -> u64 {
        self.counts.writes
    }

    pub fn count_nanoseconds(&self) -> u64 {
        self.counts.nanoseconds
    }

    pub fn count_reset(&mut self) {
        self.counts = Counters::default();
    }

    pub fn stack_max_depth(&self) -> usize {
        self.config.stack_max_depth
    }

    pub fn recursion_max_depth(&self) -> usize {
        self.config.recursion_max_depth
    }

    pub fn output_initial_size(&self) -> usize {
        self.config.output_initial_size
    }

    pub fn output_resize_factor(&self) -> f64 {
        self.config.output_resize_factor
    }
}

impl<T: Cell> std::fmt::Debug for Machine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("stack", &self.stack)
            .field("frames", &self.frames)
            .field("is_ready", &self.is_ready)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}
