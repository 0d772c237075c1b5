//! The dispatch loop
//!
//! Walks the bytecode of the topmost call-stack frame. The PC advances past
//! each instruction before its semantics run, with one exception: while the
//! innermost do-record belongs to the current frame and its index has not
//! reached the stop value, the PC stays parked on the loop-body segment
//! reference, which re-executes on every pass. Segment completion pops the
//! call stack and performs the loop-index bookkeeping.

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};

use super::frame::{DoFrame, Frame};
use super::Machine;
use crate::bytecode::{Opcode, ReadSpec, DICTIONARY_BASE};
use crate::cell::Cell;
use crate::dtype::Dtype;
use crate::error::Fault;

impl<T: Cell> Machine<T> {
    /// Execute until the call stack unwinds to `target_depth`, a fault is
    /// raised, `halt`/`pause` runs, or (in single-step mode) one
    /// instruction completes.
    pub(super) fn run_loop(&mut self, single_step: bool, target_depth: usize) {
        while self.frames.len() != target_depth {
            'segment: loop {
                let depth = self.frames.len();
                let frame = self.frames[depth - 1];
                if frame.pc >= self.image.segment_len(frame.segment) {
                    break 'segment;
                }
                let word = self.image.word(frame.segment, frame.pc);

                let parked = self
                    .do_stack
                    .last()
                    .is_some_and(|record| record.call_depth == depth);
                if !parked {
                    self.frames[depth - 1].pc += 1;
                } else {
                    let record = self.do_stack[self.do_stack.len() - 1];
                    if record.i >= record.stop {
                        // The counted loop is finished: drop its record and
                        // step over the body reference.
                        self.do_stack.pop();
                        self.frames[depth - 1].pc += 1;
                        continue 'segment;
                    }
                    // Leave the PC on the body reference for the next pass.
                }

                if let Some(spec) = ReadSpec::decode(word) {
                    self.execute_read(spec);
                    if self.fault.is_some() {
                        return;
                    }
                } else if word >= DICTIONARY_BASE {
                    if self.frames.len() == self.config.recursion_max_depth {
                        self.fault = Some(Fault::RecursionDepthExceeded);
                        return;
                    }
                    self.frames.push(Frame {
                        segment: (word - DICTIONARY_BASE) as usize,
                        pc: 0,
                    });
                } else {
                    let Ok(opcode) = Opcode::try_from(word) else {
                        return;
                    };
                    match opcode {
                        Opcode::Literal => {
                            let value = self.operand();
                            self.try_push(T::from_i32(value));
                        }

                        Opcode::Halt => {
                            self.is_ready = false;
                            self.frames.clear();
                            self.resume_targets.truncate(1);
                            self.do_stack.clear();
                            self.fault = Some(Fault::UserHalt);
                            self.counts.instructions += 1;
                            return;
                        }

                        Opcode::Pause => {
                            // A pause that ends its segment still performs
                            // the frame-pop and loop bookkeeping so resuming
                            // continues cleanly.
                            if self.segment_done() {
                                self.frames.pop();
                                self.bump_innermost_loop();
                                if self.fault.is_some() {
                                    return;
                                }
                            }
                            self.counts.instructions += 1;
                            return;
                        }

                        // ===== Conditionals =====
                        Opcode::If => {
                            let Some(predicate) = self.try_pop() else { return };
                            if predicate == T::ZERO {
                                // Skip the consequent; otherwise fall through
                                // onto it as a plain segment reference.
                                self.top_pc_add(1);
                            }
                        }
                        Opcode::IfElse => {
                            let Some(predicate) = self.try_pop() else { return };
                            if predicate == T::ZERO {
                                // Skip the consequent and fall through onto
                                // the alternate.
                                self.top_pc_add(1);
                            } else {
                                let consequent = self.peek_operand();
                                self.top_pc_add(2);
                                if self.frames.len() == self.config.recursion_max_depth {
                                    self.fault = Some(Fault::RecursionDepthExceeded);
                                    return;
                                }
                                self.frames.push(Frame {
                                    segment: (consequent - DICTIONARY_BASE) as usize,
                                    pc: 0,
                                });
                                // The implied segment call counts as one.
                                self.counts.instructions += 1;
                            }
                        }

                        // ===== Counted loops =====
                        Opcode::Do | Opcode::DoStep => {
                            if self.stack.len() < 2 {
                                self.fault = Some(Fault::StackUnderflow);
                                return;
                            }
                            let n = self.stack.len();
                            let stop = self.stack[n - 1];
                            let start = self.stack[n - 2];
                            self.stack.truncate(n - 2);
                            if self.do_stack.len() == self.config.recursion_max_depth {
                                self.fault = Some(Fault::RecursionDepthExceeded);
                                return;
                            }
                            self.do_stack.push(DoFrame {
                                is_step: opcode == Opcode::DoStep,
                                call_depth: self.frames.len(),
                                i: start.to_i64(),
                                stop: stop.to_i64(),
                            });
                        }

                        // ===== Uncounted loops =====
                        Opcode::Again => {
                            self.top_pc_back(2);
                        }
                        Opcode::Until => {
                            let Some(predicate) = self.try_pop() else { return };
                            if predicate == T::ZERO {
                                self.top_pc_back(2);
                            }
                        }
                        Opcode::While => {
                            let Some(predicate) = self.try_pop() else { return };
                            if predicate == T::ZERO {
                                // Skip the post-condition body; the loop ends.
                                self.top_pc_add(1);
                            } else {
                                let postcondition = self.peek_operand();
                                self.top_pc_back(2);
                                if self.frames.len() == self.config.recursion_max_depth {
                                    self.fault = Some(Fault::RecursionDepthExceeded);
                                    return;
                                }
                                self.frames.push(Frame {
                                    segment: (postcondition - DICTIONARY_BASE) as usize,
                                    pc: 0,
                                });
                                self.counts.instructions += 1;
                            }
                        }

                        Opcode::Exit => {
                            let block_depth = self.operand() as usize;
                            let keep = self.frames.len().saturating_sub(block_depth);
                            self.frames.truncate(keep);
                            // Records opened in abandoned frames (and in the
                            // one completing now) die with them; loops in
                            // callers survive.
                            while self
                                .do_stack
                                .last()
                                .is_some_and(|r| r.call_depth >= self.frames.len())
                            {
                                self.do_stack.pop();
                            }
                            self.counts.instructions += 1;
                            break 'segment;
                        }

                        // ===== Variables =====
                        Opcode::Put => {
                            let index = self.operand() as usize;
                            let Some(value) = self.try_pop() else { return };
                            self.variables[index] = value;
                        }
                        Opcode::Inc => {
                            let index = self.operand() as usize;
                            let Some(value) = self.try_pop() else { return };
                            self.variables[index] = self.variables[index].wrapping_add(value);
                        }
                        Opcode::Get => {
                            let index = self.operand() as usize;
                            let value = self.variables[index];
                            self.try_push(value);
                        }

                        // ===== Input positioning =====
                        Opcode::LenInput => {
                            let index = self.operand() as usize;
                            let value = T::from_i64(self.inputs[index].len() as i64);
                            self.try_push(value);
                        }
                        Opcode::Pos => {
                            let index = self.operand() as usize;
                            let value = T::from_i64(self.inputs[index].pos() as i64);
                            self.try_push(value);
                        }
                        Opcode::End => {
                            let index = self.operand() as usize;
                            let value = T::from_bool(self.inputs[index].end());
                            self.try_push(value);
                        }
                        Opcode::Seek => {
                            let index = self.operand() as usize;
                            let Some(to) = self.try_pop() else { return };
                            if let Err(fault) = self.inputs[index].seek(to.to_i64()) {
                                self.fault = Some(fault);
                                return;
                            }
                        }
                        Opcode::Skip => {
                            let index = self.operand() as usize;
                            let Some(delta) = self.try_pop() else { return };
                            if let Err(fault) = self.inputs[index].skip(delta.to_i64()) {
                                self.fault = Some(fault);
                                return;
                            }
                        }

                        // ===== Output actions =====
                        Opcode::Write => {
                            let index = self.operand() as usize;
                            let Some(value) = self.try_pop() else { return };
                            value.append_to(&mut self.outputs[index]);
                            self.counts.writes += 1;
                        }
                        Opcode::LenOutput => {
                            let index = self.operand() as usize;
                            let value = T::from_i64(self.outputs[index].len() as i64);
                            self.try_push(value);
                        }
                        Opcode::Rewind => {
                            let index = self.operand() as usize;
                            let Some(count) = self.try_pop() else { return };
                            if let Err(fault) = self.outputs[index].rewind(count.to_i64()) {
                                self.fault = Some(fault);
                                return;
                            }
                        }

                        // ===== Loop indices =====
                        Opcode::I => {
                            let value = self.loop_index(0);
                            self.try_push(value);
                        }
                        Opcode::J => {
                            let value = self.loop_index(1);
                            self.try_push(value);
                        }
                        Opcode::K => {
                            let value = self.loop_index(2);
                            self.try_push(value);
                        }

                        // ===== Stack manipulation =====
                        Opcode::Dup => {
                            let Some(&top) = self.stack.last() else {
                                self.fault = Some(Fault::StackUnderflow);
                                return;
                            };
                            self.try_push(top);
                        }
                        Opcode::Drop => {
                            self.try_pop();
                        }
                        Opcode::Swap => {
                            let n = self.stack.len();
                            if n < 2 {
                                self.fault = Some(Fault::StackUnderflow);
                                return;
                            }
                            self.stack.swap(n - 2, n - 1);
                        }
                        Opcode::Over => {
                            let n = self.stack.len();
                            if n < 2 {
                                self.fault = Some(Fault::StackUnderflow);
                                return;
                            }
                            let value = self.stack[n - 2];
                            self.try_push(value);
                        }
                        Opcode::Rot => {
                            let n = self.stack.len();
                            if n < 3 {
                                self.fault = Some(Fault::StackUnderflow);
                                return;
                            }
                            self.stack[n - 3..].rotate_left(1);
                        }
                        Opcode::Nip => {
                            let n = self.stack.len();
                            if n < 2 {
                                self.fault = Some(Fault::StackUnderflow);
                                return;
                            }
                            self.stack[n - 2] = self.stack[n - 1];
                            self.stack.truncate(n - 1);
                        }
                        Opcode::Tuck => {
                            let n = self.stack.len();
                            if n < 2 {
                                self.fault = Some(Fault::StackUnderflow);
                                return;
                            }
                            let top = self.stack[n - 1];
                            self.stack[n - 1] = self.stack[n - 2];
                            self.stack[n - 2] = top;
                            self.try_push(top);
                        }

                        // ===== Arithmetic =====
                        Opcode::Add => self.binary(|a, b| a.wrapping_add(b)),
                        Opcode::Sub => self.binary(|a, b| a.wrapping_sub(b)),
                        Opcode::Mul => self.binary(|a, b| a.wrapping_mul(b)),
                        Opcode::Div => {
                            let Some((a, b)) = self.pop_pair_nonzero() else { return };
                            self.stack.push(a.floored_div(b));
                        }
                        Opcode::Mod => {
                            let Some((a, b)) = self.pop_pair_nonzero() else { return };
                            self.stack.push(a.floored_rem(b));
                        }
                        Opcode::DivMod => {
                            let Some((a, b)) = self.pop_pair_nonzero() else { return };
                            self.stack.push(a.floored_rem(b));
                            self.stack.push(a.floored_div(b));
                        }
                        Opcode::Negate => self.unary(|v| v.wrapping_neg()),
                        Opcode::Add1 => self.unary(|v| v.wrapping_add(T::ONE)),
                        Opcode::Sub1 => self.unary(|v| v.wrapping_sub(T::ONE)),
                        Opcode::Abs => self.unary(|v| v.wrapping_abs()),
                        Opcode::Min => self.binary(|a, b| a.min(b)),
                        Opcode::Max => self.binary(|a, b| a.max(b)),

                        // ===== Comparisons =====
                        Opcode::Eq => self.binary(|a, b| T::from_bool(a == b)),
                        Opcode::Ne => self.binary(|a, b| T::from_bool(a != b)),
                        Opcode::Gt => self.binary(|a, b| T::from_bool(a > b)),
                        Opcode::Ge => self.binary(|a, b| T::from_bool(a >= b)),
                        Opcode::Lt => self.binary(|a, b| T::from_bool(a < b)),
                        Opcode::Le => self.binary(|a, b| T::from_bool(a <= b)),
                        Opcode::EqZero => self.unary(|v| T::from_bool(v == T::ZERO)),

                        // ===== Bitwise =====
                        Opcode::Invert => self.unary(|v| !v),
                        Opcode::And => self.binary(|a, b| a & b),
                        Opcode::Or => self.binary(|a, b| a | b),
                        Opcode::Xor => self.binary(|a, b| a ^ b),
                        Opcode::Lshift => self.binary(|a, b| a.shl(b)),
                        Opcode::Rshift => self.binary(|a, b| a.shr(b)),

                        // ===== Constants =====
                        Opcode::False => {
                            self.try_push(T::ZERO);
                        }
                        Opcode::True => {
                            self.try_push(T::TRUE);
                        }
                    }
                }

                if self.fault.is_some() {
                    return;
                }
                self.counts.instructions += 1;
                if single_step {
                    if self.segment_done() {
                        self.frames.pop();
                        self.bump_innermost_loop();
                    }
                    return;
                }
            }

            // End of segment: return to the caller and, if the innermost
            // do-record belongs to the frame we return into, advance it.
            self.frames.pop();
            self.bump_innermost_loop();
            if self.fault.is_some() {
                return;
            }
            if single_step {
                return;
            }
        }
    }

    /// One step of a finished `do` body: bump the index by one, or by a
    /// popped increment for `+loop`.
    fn bump_innermost_loop(&mut self) {
        let depth = self.frames.len();
        let Some(record) = self.do_stack.last_mut() else {
            return;
        };
        if record.call_depth != depth {
            return;
        }
        if record.is_step {
            match self.stack.pop() {
                Some(step) => record.i = record.i.wrapping_add(step.to_i64()),
                None => self.fault = Some(Fault::StackUnderflow),
            }
        } else {
            record.i = record.i.wrapping_add(1);
        }
    }

    /// Decode one packed read instruction and perform it.
    fn execute_read(&mut self, spec: ReadSpec) {
        let input_index = self.operand() as usize;
        let count = if spec.repeated {
            match self.try_pop() {
                Some(value) => value.to_i64(),
                None => return,
            }
        } else {
            1
        };
        let output_index = if spec.direct {
            Some(self.operand() as usize)
        } else {
            None
        };

        if count < 0 {
            self.fault = Some(Fault::ReadBeyond);
            return;
        }
        let size = spec.dtype.size_in_bytes();
        let Some(nbytes) = (count as usize).checked_mul(size) else {
            self.fault = Some(Fault::ReadBeyond);
            return;
        };
        let bytes = match self.inputs[input_index].read(nbytes) {
            Ok(bytes) => bytes,
            Err(fault) => {
                self.fault = Some(fault);
                return;
            }
        };

        match output_index {
            Some(out) => {
                // Values are loaded as-is; the output buffer byte-swaps
                // before converting to its element type.
                let byteswap = spec.big_endian != cfg!(target_endian = "big");
                macro_rules! forward {
                    ($read:expr, $write_one:ident, $write_many:ident) => {{
                        let values: Vec<_> = bytes.chunks_exact(size).map($read).collect();
                        if count == 1 {
                            self.outputs[out].$write_one(values[0], byteswap);
                        } else {
                            self.outputs[out].$write_many(&values, byteswap);
                        }
                    }};
                }
                match spec.dtype {
                    Dtype::Bool => forward!(|c: &[u8]| c[0] != 0, write_one_bool, write_bool),
                    Dtype::Int8 => forward!(|c: &[u8]| c[0] as i8, write_one_i8, write_i8),
                    Dtype::Int16 => {
                        forward!(|c: &[u8]| NativeEndian::read_i16(c), write_one_i16, write_i16)
                    }
                    Dtype::Int32 => {
                        forward!(|c: &[u8]| NativeEndian::read_i32(c), write_one_i32, write_i32)
                    }
                    Dtype::Int64 => {
                        forward!(|c: &[u8]| NativeEndian::read_i64(c), write_one_i64, write_i64)
                    }
                    Dtype::IntP => {
                        if cfg!(target_pointer_width = "64") {
                            forward!(
                                |c: &[u8]| NativeEndian::read_i64(c) as isize,
                                write_one_isize,
                                write_isize
                            )
                        } else {
                            forward!(
                                |c: &[u8]| NativeEndian::read_i32(c) as isize,
                                write_one_isize,
                                write_isize
                            )
                        }
                    }
                    Dtype::Uint8 => forward!(|c: &[u8]| c[0], write_one_u8, write_u8),
                    Dtype::Uint16 => {
                        forward!(|c: &[u8]| NativeEndian::read_u16(c), write_one_u16, write_u16)
                    }
                    Dtype::Uint32 => {
                        forward!(|c: &[u8]| NativeEndian::read_u32(c), write_one_u32, write_u32)
                    }
                    Dtype::Uint64 => {
                        forward!(|c: &[u8]| NativeEndian::read_u64(c), write_one_u64, write_u64)
                    }
                    Dtype::UintP => {
                        if cfg!(target_pointer_width = "64") {
                            forward!(
                                |c: &[u8]| NativeEndian::read_u64(c) as usize,
                                write_one_usize,
                                write_usize
                            )
                        } else {
                            forward!(
                                |c: &[u8]| NativeEndian::read_u32(c) as usize,
                                write_one_usize,
                                write_usize
                            )
                        }
                    }
                    Dtype::Float32 => {
                        forward!(|c: &[u8]| NativeEndian::read_f32(c), write_one_f32, write_f32)
                    }
                    Dtype::Float64 => {
                        forward!(|c: &[u8]| NativeEndian::read_f64(c), write_one_f64, write_f64)
                    }
                }
                self.counts.writes += 1;
            }
            None => {
                for chunk in bytes.chunks_exact(size) {
                    let value = decode_i64(spec.dtype, chunk, spec.big_endian);
                    if self.stack.len() == self.config.stack_max_depth {
                        self.fault = Some(Fault::StackOverflow);
                        return;
                    }
                    self.stack.push(T::from_i64(value));
                }
                self.counts.reads += 1;
            }
        }
    }

    /// Read the operand at the current PC and advance past it.
    fn operand(&mut self) -> i32 {
        let depth = self.frames.len();
        let frame = self.frames[depth - 1];
        let value = self.image.word(frame.segment, frame.pc);
        self.frames[depth - 1].pc += 1;
        value
    }

    /// Read the word at the current PC without advancing.
    fn peek_operand(&self) -> i32 {
        let frame = self.frames[self.frames.len() - 1];
        self.image.word(frame.segment, frame.pc)
    }

    fn top_pc_add(&mut self, n: usize) {
        let depth = self.frames.len();
        self.frames[depth - 1].pc += n;
    }

    fn top_pc_back(&mut self, n: usize) {
        let depth = self.frames.len();
        self.frames[depth - 1].pc -= n;
    }

    fn segment_done(&self) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| frame.pc >= self.image.segment_len(frame.segment))
    }

    /// Pop a value, faulting on an empty stack.
    fn try_pop(&mut self) -> Option<T> {
        let value = self.stack.pop();
        if value.is_none() {
            self.fault = Some(Fault::StackUnderflow);
        }
        value
    }

    /// Push a value, faulting when the stack is at capacity.
    fn try_push(&mut self, value: T) -> bool {
        if self.stack.len() >= self.config.stack_max_depth {
            self.fault = Some(Fault::StackOverflow);
            false
        } else {
            self.stack.push(value);
            true
        }
    }

    /// Replace the top two cells by `op(second, top)`.
    fn binary(&mut self, op: impl FnOnce(T, T) -> T) {
        let n = self.stack.len();
        if n < 2 {
            self.fault = Some(Fault::StackUnderflow);
            return;
        }
        let a = self.stack[n - 2];
        let b = self.stack[n - 1];
        self.stack.truncate(n - 1);
        self.stack[n - 2] = op(a, b);
    }

    /// Replace the top cell by `op(top)`.
    fn unary(&mut self, op: impl FnOnce(T) -> T) {
        match self.stack.last_mut() {
            Some(top) => *top = op(*top),
            None => self.fault = Some(Fault::StackUnderflow),
        }
    }

    /// Pop `(second, top)` for a division, faulting on underflow or a zero
    /// divisor.
    fn pop_pair_nonzero(&mut self) -> Option<(T, T)> {
        let n = self.stack.len();
        if n < 2 {
            self.fault = Some(Fault::StackUnderflow);
            return None;
        }
        let divisor = self.stack[n - 1];
        if divisor == T::ZERO {
            self.fault = Some(Fault::DivisionByZero);
            return None;
        }
        let a = self.stack[n - 2];
        self.stack.truncate(n - 2);
        Some((a, divisor))
    }

    /// Index of the loop `back` levels out from the innermost do-record;
    /// zero when no such record exists.
    fn loop_index(&self, back: usize) -> T {
        let value = self
            .do_stack
            .len()
            .checked_sub(1 + back)
            .and_then(|index| self.do_stack.get(index))
            .map_or(0, |record| record.i);
        T::from_i64(value)
    }
}

/// Decode one element from raw input bytes; little-endian unless the read
/// was marked big-endian. One-byte kinds never swap.
fn decode_i64(dtype: Dtype, bytes: &[u8], big_endian: bool) -> i64 {
    macro_rules! ordered {
        ($read:ident) => {
            if big_endian {
                BigEndian::$read(bytes)
            } else {
                LittleEndian::$read(bytes)
            }
        };
    }
    match dtype {
        Dtype::Bool => (bytes[0] != 0) as i64,
        Dtype::Int8 => bytes[0] as i8 as i64,
        Dtype::Uint8 => bytes[0] as i64,
        Dtype::Int16 => ordered!(read_i16) as i64,
        Dtype::Int32 => ordered!(read_i32) as i64,
        Dtype::Int64 => ordered!(read_i64),
        Dtype::IntP => {
            if cfg!(target_pointer_width = "64") {
                ordered!(read_i64)
            } else {
                ordered!(read_i32) as i64
            }
        }
        Dtype::Uint16 => ordered!(read_u16) as i64,
        Dtype::Uint32 => ordered!(read_u32) as i64,
        Dtype::Uint64 => ordered!(read_u64) as i64,
        Dtype::UintP => {
            if cfg!(target_pointer_width = "64") {
                ordered!(read_u64) as i64
            } else {
                ordered!(read_u32) as i64
            }
        }
        Dtype::Float32 => ordered!(read_f32) as i64,
        Dtype::Float64 => ordered!(read_f64) as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_endianness() {
        assert_eq!(decode_i64(Dtype::Int16, &[0x01, 0x02], false), 0x0201);
        assert_eq!(decode_i64(Dtype::Int16, &[0x01, 0x02], true), 0x0102);
        assert_eq!(decode_i64(Dtype::Uint32, &[0xff, 0, 0, 0], false), 0xff);
        assert_eq!(decode_i64(Dtype::Int8, &[0xff], false), -1);
        assert_eq!(decode_i64(Dtype::Uint8, &[0xff], true), 255);
        assert_eq!(decode_i64(Dtype::Bool, &[7], false), 1);
    }

    #[test]
    fn test_decode_floats_truncate() {
        let bytes = 2.75f64.to_le_bytes();
        assert_eq!(decode_i64(Dtype::Float64, &bytes, false), 2);
        let bytes = (-1.5f32).to_be_bytes();
        assert_eq!(decode_i64(Dtype::Float32, &bytes, true), -1);
    }
}
