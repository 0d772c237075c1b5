//! Call-stack and do-loop records

/// One call-stack entry: a segment and the program counter within it.
///
/// `pc == segment length` means the segment just completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    pub segment: usize,
    pub pc: usize,
}

/// One counted-loop record.
///
/// `call_depth` is the call-stack depth of the frame the loop was opened
/// in; the interpreter compares it against the current depth to decide
/// whether the innermost loop belongs to the running frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DoFrame {
    /// Opened by `do ... +loop`: each pass pops its increment.
    pub is_step: bool,
    pub call_depth: usize,
    /// Current index, read by `i`/`j`/`k`.
    pub i: i64,
    /// The loop continues while `i < stop`.
    pub stop: i64,
}
