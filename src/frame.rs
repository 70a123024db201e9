//! Frames, typed element buffers and the synthetic frame generator.
//!
//! A [`Frame`] is a two-dimensional array flattened row-major over `(width, height)`:
//! element `(x, y)` lives at index `y * width + x`. The element storage is an
//! [`ElementBuffer`], one variant per [`DataType`], so a frame always knows the
//! type it was generated for and the oracle can compare under that type.

use crate::params::DataType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Homogeneous array of one numeric element type
#[derive(Debug, Clone, PartialEq)]
pub enum ElementBuffer {
    /// Signed 8-bit elements
    Int8(Vec<i8>),
    /// Unsigned 8-bit elements
    UInt8(Vec<u8>),
    /// Signed 16-bit elements
    Int16(Vec<i16>),
    /// Unsigned 16-bit elements
    UInt16(Vec<u16>),
    /// Signed 32-bit elements
    Int32(Vec<i32>),
    /// Unsigned 32-bit elements
    UInt32(Vec<u32>),
    /// Single precision elements
    Float32(Vec<f32>),
    /// Double precision elements
    Float64(Vec<f64>),
}

/// Evaluate `$body` with `$v` bound to the inner vector, whatever the variant.
macro_rules! with_vec {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            ElementBuffer::Int8($v) => $body,
            ElementBuffer::UInt8($v) => $body,
            ElementBuffer::Int16($v) => $body,
            ElementBuffer::UInt16($v) => $body,
            ElementBuffer::Int32($v) => $body,
            ElementBuffer::UInt32($v) => $body,
            ElementBuffer::Float32($v) => $body,
            ElementBuffer::Float64($v) => $body,
        }
    };
}

/// Like `with_vec!`, but rewraps the result in the same variant.
macro_rules! map_vec {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            ElementBuffer::Int8($v) => ElementBuffer::Int8($body),
            ElementBuffer::UInt8($v) => ElementBuffer::UInt8($body),
            ElementBuffer::Int16($v) => ElementBuffer::Int16($body),
            ElementBuffer::UInt16($v) => ElementBuffer::UInt16($body),
            ElementBuffer::Int32($v) => ElementBuffer::Int32($body),
            ElementBuffer::UInt32($v) => ElementBuffer::UInt32($body),
            ElementBuffer::Float32($v) => ElementBuffer::Float32($body),
            ElementBuffer::Float64($v) => ElementBuffer::Float64($body),
        }
    };
}

impl ElementBuffer {
    /// Zero-filled buffer of `len` elements
    pub fn zeros(data_type: DataType, len: usize) -> Self {
        Self::from_f64(data_type, std::iter::repeat(0.0).take(len))
    }

    /// Build a buffer by casting each value to `data_type`.
    ///
    /// Integer targets truncate toward zero and saturate at the type bounds, so
    /// the same input always yields the same element.
    pub fn from_f64<I>(data_type: DataType, values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let values = values.into_iter();
        match data_type {
            DataType::Int8 => ElementBuffer::Int8(values.map(|v| v as i8).collect()),
            DataType::UInt8 => ElementBuffer::UInt8(values.map(|v| v as u8).collect()),
            DataType::Int16 => ElementBuffer::Int16(values.map(|v| v as i16).collect()),
            DataType::UInt16 => ElementBuffer::UInt16(values.map(|v| v as u16).collect()),
            DataType::Int32 => ElementBuffer::Int32(values.map(|v| v as i32).collect()),
            DataType::UInt32 => ElementBuffer::UInt32(values.map(|v| v as u32).collect()),
            DataType::Float32 => ElementBuffer::Float32(values.map(|v| v as f32).collect()),
            DataType::Float64 => ElementBuffer::Float64(values.collect()),
        }
    }

    /// Build a buffer by casting each value to `data_type`, wrapping integers.
    ///
    /// Integer targets truncate toward zero and then wrap modulo the type width,
    /// so `200.0` becomes `-56_i8`. Float targets cast as in [`from_f64`](Self::from_f64).
    pub fn from_f64_wrapping<I>(data_type: DataType, values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let values = values.into_iter();
        match data_type {
            DataType::Int8 => ElementBuffer::Int8(values.map(|v| v as i64 as i8).collect()),
            DataType::UInt8 => ElementBuffer::UInt8(values.map(|v| v as i64 as u8).collect()),
            DataType::Int16 => ElementBuffer::Int16(values.map(|v| v as i64 as i16).collect()),
            DataType::UInt16 => ElementBuffer::UInt16(values.map(|v| v as i64 as u16).collect()),
            DataType::Int32 => ElementBuffer::Int32(values.map(|v| v as i64 as i32).collect()),
            DataType::UInt32 => ElementBuffer::UInt32(values.map(|v| v as i64 as u32).collect()),
            DataType::Float32 | DataType::Float64 => Self::from_f64(data_type, values),
        }
    }

    /// Element type of the buffer
    pub fn data_type(&self) -> DataType {
        match self {
            ElementBuffer::Int8(_) => DataType::Int8,
            ElementBuffer::UInt8(_) => DataType::UInt8,
            ElementBuffer::Int16(_) => DataType::Int16,
            ElementBuffer::UInt16(_) => DataType::UInt16,
            ElementBuffer::Int32(_) => DataType::Int32,
            ElementBuffer::UInt32(_) => DataType::UInt32,
            ElementBuffer::Float32(_) => DataType::Float32,
            ElementBuffer::Float64(_) => DataType::Float64,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        with_vec!(self, v => v.len())
    }

    /// Whether the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, if in bounds
    pub fn sample(&self, index: usize) -> Option<Sample> {
        match self {
            ElementBuffer::Int8(v) => v.get(index).map(|&x| Sample::Int(x as i64)),
            ElementBuffer::UInt8(v) => v.get(index).map(|&x| Sample::Int(x as i64)),
            ElementBuffer::Int16(v) => v.get(index).map(|&x| Sample::Int(x as i64)),
            ElementBuffer::UInt16(v) => v.get(index).map(|&x| Sample::Int(x as i64)),
            ElementBuffer::Int32(v) => v.get(index).map(|&x| Sample::Int(x as i64)),
            ElementBuffer::UInt32(v) => v.get(index).map(|&x| Sample::Int(x as i64)),
            ElementBuffer::Float32(v) => v.get(index).map(|&x| Sample::Float32(x)),
            ElementBuffer::Float64(v) => v.get(index).map(|&x| Sample::Float64(x)),
        }
    }

    /// Iterate the elements widened to `f64` (lossless for every supported type)
    pub fn iter_f64(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match self {
            ElementBuffer::Int8(v) => Box::new(v.iter().map(|&x| x as f64)),
            ElementBuffer::UInt8(v) => Box::new(v.iter().map(|&x| x as f64)),
            ElementBuffer::Int16(v) => Box::new(v.iter().map(|&x| x as f64)),
            ElementBuffer::UInt16(v) => Box::new(v.iter().map(|&x| x as f64)),
            ElementBuffer::Int32(v) => Box::new(v.iter().map(|&x| x as f64)),
            ElementBuffer::UInt32(v) => Box::new(v.iter().map(|&x| x as f64)),
            ElementBuffer::Float32(v) => Box::new(v.iter().map(|&x| x as f64)),
            ElementBuffer::Float64(v) => Box::new(v.iter().copied()),
        }
    }

    /// Convert to another element type with the same casting rules as [`from_f64`](Self::from_f64)
    pub fn cast_to(&self, data_type: DataType) -> Self {
        if data_type == self.data_type() {
            return self.clone();
        }
        Self::from_f64(data_type, self.iter_f64())
    }

    /// Copy of the first `len` elements (or all of them if shorter)
    pub fn truncated(&self, len: usize) -> Self {
        map_vec!(self, v => v[..len.min(v.len())].to_vec())
    }

    /// Copy of `len` elements starting at `start`, clipped to the buffer
    pub fn slice(&self, start: usize, len: usize) -> Self {
        map_vec!(self, v => {
            let start = start.min(v.len());
            let end = start.saturating_add(len).min(v.len());
            v[start..end].to_vec()
        })
    }

    /// Overwrite elements starting at `offset` with `src`, cast to this buffer's type.
    ///
    /// Elements that would land past the end are dropped. Returns the number copied.
    pub fn write_at(&mut self, offset: usize, src: &ElementBuffer) -> usize {
        let src = src.cast_to(self.data_type());
        let available = self.len().saturating_sub(offset);
        let count = src.len().min(available);
        if count == 0 {
            return 0;
        }
        match (self, &src) {
            (ElementBuffer::Int8(d), ElementBuffer::Int8(s)) => {
                d[offset..offset + count].copy_from_slice(&s[..count])
            }
            (ElementBuffer::UInt8(d), ElementBuffer::UInt8(s)) => {
                d[offset..offset + count].copy_from_slice(&s[..count])
            }
            (ElementBuffer::Int16(d), ElementBuffer::Int16(s)) => {
                d[offset..offset + count].copy_from_slice(&s[..count])
            }
            (ElementBuffer::UInt16(d), ElementBuffer::UInt16(s)) => {
                d[offset..offset + count].copy_from_slice(&s[..count])
            }
            (ElementBuffer::Int32(d), ElementBuffer::Int32(s)) => {
                d[offset..offset + count].copy_from_slice(&s[..count])
            }
            (ElementBuffer::UInt32(d), ElementBuffer::UInt32(s)) => {
                d[offset..offset + count].copy_from_slice(&s[..count])
            }
            (ElementBuffer::Float32(d), ElementBuffer::Float32(s)) => {
                d[offset..offset + count].copy_from_slice(&s[..count])
            }
            (ElementBuffer::Float64(d), ElementBuffer::Float64(s)) => {
                d[offset..offset + count].copy_from_slice(&s[..count])
            }
            // cast_to guarantees matching variants
            _ => return 0,
        }
        count
    }

    /// Change the element at `index` to a different value of the same type.
    ///
    /// Integers are incremented with wrap-around; floats have their lowest
    /// mantissa bit flipped. Out-of-range indices are ignored.
    pub fn perturb(&mut self, index: usize) {
        match self {
            ElementBuffer::Int8(v) => v.get_mut(index).into_iter().for_each(|x| *x = x.wrapping_add(1)),
            ElementBuffer::UInt8(v) => v.get_mut(index).into_iter().for_each(|x| *x = x.wrapping_add(1)),
            ElementBuffer::Int16(v) => v.get_mut(index).into_iter().for_each(|x| *x = x.wrapping_add(1)),
            ElementBuffer::UInt16(v) => v.get_mut(index).into_iter().for_each(|x| *x = x.wrapping_add(1)),
            ElementBuffer::Int32(v) => v.get_mut(index).into_iter().for_each(|x| *x = x.wrapping_add(1)),
            ElementBuffer::UInt32(v) => v.get_mut(index).into_iter().for_each(|x| *x = x.wrapping_add(1)),
            ElementBuffer::Float32(v) => v
                .get_mut(index)
                .into_iter()
                .for_each(|x| *x = f32::from_bits(x.to_bits() ^ 1)),
            ElementBuffer::Float64(v) => v
                .get_mut(index)
                .into_iter()
                .for_each(|x| *x = f64::from_bits(x.to_bits() ^ 1)),
        }
    }
}

/// One element lifted out of a buffer, keeping its numeric family
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Sample {
    /// Any integer element
    Int(i64),
    /// Single precision element
    Float32(f32),
    /// Double precision element
    Float64(f64),
}

impl Sample {
    /// Value widened to `f64`
    pub fn as_f64(self) -> f64 {
        match self {
            Sample::Int(v) => v as f64,
            Sample::Float32(v) => v as f64,
            Sample::Float64(v) => v,
        }
    }

    /// Exact equality: integers by value, floats bit for bit.
    ///
    /// `-0.0` and `0.0` differ; a NaN equals a NaN with the same payload.
    /// Samples of different families are never equal.
    pub fn exact_eq(self, other: Sample) -> bool {
        match (self, other) {
            (Sample::Int(a), Sample::Int(b)) => a == b,
            (Sample::Float32(a), Sample::Float32(b)) => a.to_bits() == b.to_bits(),
            (Sample::Float64(a), Sample::Float64(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.exact_eq(*other)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sample::Int(v) => write!(f, "{v}"),
            Sample::Float32(v) => write!(f, "{v:?}"),
            Sample::Float64(v) => write!(f, "{v:?}"),
        }
    }
}

/// Frame geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    /// Fastest-varying dimension
    pub width: usize,
    /// Slowest-varying dimension
    pub height: usize,
}

impl Shape {
    /// Create a shape
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// `width * height`
    pub fn element_count(&self) -> usize {
        self.width * self.height
    }

    /// Dimension count written to `NDimensions`
    pub fn ndimensions(&self) -> i32 {
        2
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Element count does not match the expected geometry
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("read back {actual} elements, expected {expected} for {shape}")]
pub struct ShapeMismatch {
    /// Geometry the elements were supposed to fill
    pub shape: Shape,
    /// `shape.element_count()`
    pub expected: usize,
    /// Elements actually received
    pub actual: usize,
}

/// Two-dimensional array of one element type
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    shape: Shape,
    data: ElementBuffer,
}

impl Frame {
    /// Wrap flat row-major data in `shape`, failing if the element count differs
    pub fn reshape(shape: Shape, data: ElementBuffer) -> Result<Self, ShapeMismatch> {
        if data.len() != shape.element_count() {
            return Err(ShapeMismatch {
                shape,
                expected: shape.element_count(),
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Frame geometry
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Element type
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// Flat row-major elements
    pub fn data(&self) -> &ElementBuffer {
        &self.data
    }

    /// Consume the frame, returning the flat elements
    pub fn into_data(self) -> ElementBuffer {
        self.data
    }

    /// Element at column `x`, row `y`
    pub fn get(&self, x: usize, y: usize) -> Option<Sample> {
        if x >= self.shape.width || y >= self.shape.height {
            return None;
        }
        self.data.sample(y * self.shape.width + x)
    }
}

/// Inclusive range synthetic values are drawn from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

impl Default for ValueRange {
    fn default() -> Self {
        Self { min: 0.0, max: 255.0 }
    }
}

impl ValueRange {
    /// Bounds values are drawn from before casting to `data_type`.
    ///
    /// Float targets are clamped to what the type can represent. Integer targets
    /// keep the configured range; out-of-range draws wrap when cast.
    pub fn bounds_for(&self, data_type: DataType) -> (f64, f64) {
        let (min, max) = (self.min.min(self.max), self.max.max(self.min));
        if !data_type.is_float() {
            return (min, max);
        }
        let (lo, hi) = data_type.representable_range();
        (min.clamp(lo, hi), max.clamp(lo, hi))
    }
}

/// Produces frames of uniformly distributed values
pub struct FrameGenerator {
    rng: StdRng,
    range: ValueRange,
}

impl FrameGenerator {
    /// Generator seeded from OS entropy
    pub fn new(range: ValueRange) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            range,
        }
    }

    /// Generator with a fixed seed, for reproducible runs
    pub fn seeded(range: ValueRange, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            range,
        }
    }

    /// Value range in use
    pub fn range(&self) -> ValueRange {
        self.range
    }

    /// Fresh frame of `shape` with independent values cast once to `data_type`.
    ///
    /// With the default `[0, 255]` range a signed 8-bit frame covers `-128..=127`.
    pub fn generate(&mut self, shape: Shape, data_type: DataType) -> Frame {
        let (lo, hi) = self.range.bounds_for(data_type);
        let rng = &mut self.rng;
        let values = (0..shape.element_count()).map(|_| rng.gen_range(lo..=hi));
        Frame {
            shape,
            data: ElementBuffer::from_f64_wrapping(data_type, values),
        }
    }
}
