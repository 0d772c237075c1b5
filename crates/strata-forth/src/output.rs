//! Growable typed output buffers
//!
//! One buffer is allocated per declared output when a program begins, typed
//! by the declared dtype. Writers accept every source primitive: the value
//! is byte-swapped first if requested, then converted to the buffer's
//! element type. Buffers are append-only apart from `rewind`.

use crate::dtype::Dtype;
use crate::error::Fault;

/// A growable columnar buffer of one primitive element type.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBuffer {
    values: TypedVec,
    resize_factor: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum TypedVec {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    IntP(Vec<isize>),
    Uint8(Vec<u8>),
    Uint16(Vec<u16>),
    Uint32(Vec<u32>),
    Uint64(Vec<u64>),
    UintP(Vec<usize>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! for_each_variant {
    ($self:expr, $vec:ident => $body:expr) => {
        match $self {
            TypedVec::Bool($vec) => $body,
            TypedVec::Int8($vec) => $body,
            TypedVec::Int16($vec) => $body,
            TypedVec::Int32($vec) => $body,
            TypedVec::Int64($vec) => $body,
            TypedVec::IntP($vec) => $body,
            TypedVec::Uint8($vec) => $body,
            TypedVec::Uint16($vec) => $body,
            TypedVec::Uint32($vec) => $body,
            TypedVec::Uint64($vec) => $body,
            TypedVec::UintP($vec) => $body,
            TypedVec::Float32($vec) => $body,
            TypedVec::Float64($vec) => $body,
        }
    };
}

/// Write methods for one source primitive: swap bytes if asked, then
/// convert to the element type and append.
macro_rules! write_methods {
    ($one:ident, $many:ident, $ty:ty, $inter:ty, $push:ident, $swap:expr) => {
        pub fn $one(&mut self, value: $ty, byteswap: bool) {
            self.reserve(1);
            let value = if byteswap { $swap(value) } else { value };
            self.$push(value as $inter);
        }

        pub fn $many(&mut self, values: &[$ty], byteswap: bool) {
            self.reserve(values.len());
            for &value in values {
                let value = if byteswap { $swap(value) } else { value };
                self.$push(value as $inter);
            }
        }
    };
}

macro_rules! typed_view {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// Borrow the elements if this buffer has the matching dtype.
        pub fn $name(&self) -> Option<&[$ty]> {
            if let TypedVec::$variant(values) = &self.values {
                Some(values)
            } else {
                None
            }
        }
    };
}

impl OutputBuffer {
    /// Allocate an empty buffer for `dtype`, reserving `initial_size`
    /// elements up front and growing by `resize_factor` thereafter.
    pub fn new(dtype: Dtype, initial_size: usize, resize_factor: f64) -> Self {
        let values = match dtype {
            Dtype::Bool => TypedVec::Bool(Vec::with_capacity(initial_size)),
            Dtype::Int8 => TypedVec::Int8(Vec::with_capacity(initial_size)),
            Dtype::Int16 => TypedVec::Int16(Vec::with_capacity(initial_size)),
            Dtype::Int32 => TypedVec::Int32(Vec::with_capacity(initial_size)),
            Dtype::Int64 => TypedVec::Int64(Vec::with_capacity(initial_size)),
            Dtype::IntP => TypedVec::IntP(Vec::with_capacity(initial_size)),
            Dtype::Uint8 => TypedVec::Uint8(Vec::with_capacity(initial_size)),
            Dtype::Uint16 => TypedVec::Uint16(Vec::with_capacity(initial_size)),
            Dtype::Uint32 => TypedVec::Uint32(Vec::with_capacity(initial_size)),
            Dtype::Uint64 => TypedVec::Uint64(Vec::with_capacity(initial_size)),
            Dtype::UintP => TypedVec::UintP(Vec::with_capacity(initial_size)),
            Dtype::Float32 => TypedVec::Float32(Vec::with_capacity(initial_size)),
            Dtype::Float64 => TypedVec::Float64(Vec::with_capacity(initial_size)),
        };
        Self {
            values,
            resize_factor,
        }
    }

    /// The element type this buffer was declared with.
    pub fn dtype(&self) -> Dtype {
        match &self.values {
            TypedVec::Bool(_) => Dtype::Bool,
            TypedVec::Int8(_) => Dtype::Int8,
            TypedVec::Int16(_) => Dtype::Int16,
            TypedVec::Int32(_) => Dtype::Int32,
            TypedVec::Int64(_) => Dtype::Int64,
            TypedVec::IntP(_) => Dtype::IntP,
            TypedVec::Uint8(_) => Dtype::Uint8,
            TypedVec::Uint16(_) => Dtype::Uint16,
            TypedVec::Uint32(_) => Dtype::Uint32,
            TypedVec::Uint64(_) => Dtype::Uint64,
            TypedVec::UintP(_) => Dtype::UintP,
            TypedVec::Float32(_) => Dtype::Float32,
            TypedVec::Float64(_) => Dtype::Float64,
        }
    }

    /// Number of elements written so far.
    pub fn len(&self) -> usize {
        for_each_variant!(&self.values, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the last `count` elements; faults below zero length.
    pub fn rewind(&mut self, count: i64) -> Result<(), Fault> {
        let len = self.len();
        if count < 0 || count as u64 > len as u64 {
            return Err(Fault::RewindBeyond);
        }
        let keep = len - count as usize;
        for_each_variant!(&mut self.values, v => v.truncate(keep));
        Ok(())
    }

    fn capacity(&self) -> usize {
        for_each_variant!(&self.values, v => v.capacity())
    }

    /// Grow by the resize factor when `additional` elements would not fit.
    fn reserve(&mut self, additional: usize) {
        let len = self.len();
        if len + additional <= self.capacity() {
            return;
        }
        let grown = (self.capacity() as f64 * self.resize_factor).ceil() as usize;
        let target = grown.max(len + additional);
        for_each_variant!(&mut self.values, v => v.reserve_exact(target - v.len()));
    }

    fn push_i64(&mut self, value: i64) {
        match &mut self.values {
            TypedVec::Bool(v) => v.push(value != 0),
            TypedVec::Int8(v) => v.push(value as i8),
            TypedVec::Int16(v) => v.push(value as i16),
            TypedVec::Int32(v) => v.push(value as i32),
            TypedVec::Int64(v) => v.push(value),
            TypedVec::IntP(v) => v.push(value as isize),
            TypedVec::Uint8(v) => v.push(value as u8),
            TypedVec::Uint16(v) => v.push(value as u16),
            TypedVec::Uint32(v) => v.push(value as u32),
            TypedVec::Uint64(v) => v.push(value as u64),
            TypedVec::UintP(v) => v.push(value as usize),
            TypedVec::Float32(v) => v.push(value as f32),
            TypedVec::Float64(v) => v.push(value as f64),
        }
    }

    fn push_u64(&mut self, value: u64) {
        match &mut self.values {
            TypedVec::Bool(v) => v.push(value != 0),
            TypedVec::Int8(v) => v.push(value as i8),
            TypedVec::Int16(v) => v.push(value as i16),
            TypedVec::Int32(v) => v.push(value as i32),
            TypedVec::Int64(v) => v.push(value as i64),
            TypedVec::IntP(v) => v.push(value as isize),
            TypedVec::Uint8(v) => v.push(value as u8),
            TypedVec::Uint16(v) => v.push(value as u16),
            TypedVec::Uint32(v) => v.push(value as u32),
            TypedVec::Uint64(v) => v.push(value),
            TypedVec::UintP(v) => v.push(value as usize),
            TypedVec::Float32(v) => v.push(value as f32),
            TypedVec::Float64(v) => v.push(value as f64),
        }
    }

    fn push_f64(&mut self, value: f64) {
        match &mut self.values {
            TypedVec::Bool(v) => v.push(value != 0.0),
            TypedVec::Int8(v) => v.push(value as i8),
            TypedVec::Int16(v) => v.push(value as i16),
            TypedVec::Int32(v) => v.push(value as i32),
            TypedVec::Int64(v) => v.push(value as i64),
            TypedVec::IntP(v) => v.push(value as isize),
            TypedVec::Uint8(v) => v.push(value as u8),
            TypedVec::Uint16(v) => v.push(value as u16),
            TypedVec::Uint32(v) => v.push(value as u32),
            TypedVec::Uint64(v) => v.push(value as u64),
            TypedVec::UintP(v) => v.push(value as usize),
            TypedVec::Float32(v) => v.push(value as f32),
            TypedVec::Float64(v) => v.push(value),
        }
    }

    write_methods!(write_one_bool, write_bool, bool, i64, push_i64, (|v: bool| v));
    write_methods!(write_one_i8, write_i8, i8, i64, push_i64, (|v: i8| v));
    write_methods!(write_one_i16, write_i16, i16, i64, push_i64, i16::swap_bytes);
    write_methods!(write_one_i32, write_i32, i32, i64, push_i64, i32::swap_bytes);
    write_methods!(write_one_i64, write_i64, i64, i64, push_i64, i64::swap_bytes);
    write_methods!(write_one_isize, write_isize, isize, i64, push_i64, isize::swap_bytes);
    write_methods!(write_one_u8, write_u8, u8, u64, push_u64, (|v: u8| v));
    write_methods!(write_one_u16, write_u16, u16, u64, push_u64, u16::swap_bytes);
    write_methods!(write_one_u32, write_u32, u32, u64, push_u64, u32::swap_bytes);
    write_methods!(write_one_u64, write_u64, u64, u64, push_u64, u64::swap_bytes);
    write_methods!(write_one_usize, write_usize, usize, u64, push_u64, usize::swap_bytes);
    write_methods!(write_one_f32, write_f32, f32, f64, push_f64, (|v: f32| f32::from_bits(
        v.to_bits().swap_bytes()
    )));
    write_methods!(write_one_f64, write_f64, f64, f64, push_f64, (|v: f64| f64::from_bits(
        v.to_bits().swap_bytes()
    )));

    typed_view!(as_bool, Bool, bool);
    typed_view!(as_i8, Int8, i8);
    typed_view!(as_i16, Int16, i16);
    typed_view!(as_i32, Int32, i32);
    typed_view!(as_i64, Int64, i64);
    typed_view!(as_isize, IntP, isize);
    typed_view!(as_u8, Uint8, u8);
    typed_view!(as_u16, Uint16, u16);
    typed_view!(as_u32, Uint32, u32);
    typed_view!(as_u64, Uint64, u64);
    typed_view!(as_usize, UintP, usize);
    typed_view!(as_f32, Float32, f32);
    typed_view!(as_f64, Float64, f64);
}
