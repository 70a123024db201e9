//! Equality oracle.
//!
//! The round trip is a lossless array copy, so the only acceptable outcome is
//! exact equality under the injected element type: the read-back array must carry
//! the same type, integers must match by value and floating-point elements bit for
//! bit. There is no tolerance parameter.

use crate::error::CaseFailure;
use crate::frame::{ElementBuffer, Frame, Sample, ShapeMismatch};
use serde::{Deserialize, Serialize};
use std::fmt;

/// First position where the read-back frame differs from the injected one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Flat row-major index
    pub index: usize,
    /// Value that was injected
    pub expected: Sample,
    /// Value that was read back
    pub actual: Sample,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "first mismatch at index {}: expected {}, got {}",
            self.index, self.expected, self.actual
        )
    }
}

/// Per-case verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "failure", rename_all = "snake_case")]
pub enum Verdict {
    /// Read-back matched the injected frame exactly
    Pass,
    /// The case failed
    Fail(CaseFailure),
}

impl Verdict {
    /// Whether the case passed
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// Failure detail, if any
    pub fn failure(&self) -> Option<&CaseFailure> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail(f) => Some(f),
        }
    }
}

impl From<CaseFailure> for Verdict {
    fn from(failure: CaseFailure) -> Self {
        Verdict::Fail(failure)
    }
}

/// Compare the injected frame against the read-back frame.
///
/// Checks run in order: geometry, element type, then element values.
pub fn compare(sent: &Frame, received: &Frame) -> Verdict {
    if sent.shape() != received.shape() {
        return Verdict::Fail(
            ShapeMismatch {
                shape: sent.shape(),
                expected: sent.shape().element_count(),
                actual: received.shape().element_count(),
            }
            .into(),
        );
    }
    if sent.data_type() != received.data_type() {
        return Verdict::Fail(CaseFailure::TypeMismatch {
            expected: sent.data_type(),
            actual: received.data_type(),
        });
    }
    match first_mismatch(sent.data(), received.data()) {
        None => Verdict::Pass,
        Some(m) => Verdict::Fail(m.into()),
    }
}

/// Index and values of the first differing element, `None` if the buffers are identical.
///
/// Buffers of different length differ at the first index past the shorter one; that
/// case is reported by [`compare`] as a shape mismatch before this runs. Elements
/// of different numeric families never match.
pub fn first_mismatch(expected: &ElementBuffer, actual: &ElementBuffer) -> Option<Mismatch> {
    if let Some(index) = same_type_mismatch(expected, actual) {
        return index.and_then(|i| mismatch_at(expected, actual, i));
    }
    (0..expected.len().max(actual.len())).find_map(|i| mismatch_at(expected, actual, i))
}

/// Fast path for identically typed buffers. `None` when the types differ.
fn same_type_mismatch(expected: &ElementBuffer, actual: &ElementBuffer) -> Option<Option<usize>> {
    fn position<T: Copy>(a: &[T], b: &[T], eq: impl Fn(T, T) -> bool) -> Option<usize> {
        a.iter()
            .zip(b)
            .position(|(&x, &y)| !eq(x, y))
            .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
    }

    let found = match (expected, actual) {
        (ElementBuffer::Int8(a), ElementBuffer::Int8(b)) => position(a, b, |x, y| x == y),
        (ElementBuffer::UInt8(a), ElementBuffer::UInt8(b)) => position(a, b, |x, y| x == y),
        (ElementBuffer::Int16(a), ElementBuffer::Int16(b)) => position(a, b, |x, y| x == y),
        (ElementBuffer::UInt16(a), ElementBuffer::UInt16(b)) => position(a, b, |x, y| x == y),
        (ElementBuffer::Int32(a), ElementBuffer::Int32(b)) => position(a, b, |x, y| x == y),
        (ElementBuffer::UInt32(a), ElementBuffer::UInt32(b)) => position(a, b, |x, y| x == y),
        (ElementBuffer::Float32(a), ElementBuffer::Float32(b)) => {
            position(a, b, |x, y| x.to_bits() == y.to_bits())
        }
        (ElementBuffer::Float64(a), ElementBuffer::Float64(b)) => {
            position(a, b, |x, y| x.to_bits() == y.to_bits())
        }
        _ => return None,
    };
    Some(found)
}

fn mismatch_at(expected: &ElementBuffer, actual: &ElementBuffer, index: usize) -> Option<Mismatch> {
    match (expected.sample(index), actual.sample(index)) {
        (Some(e), Some(a)) if e.exact_eq(a) => None,
        (Some(e), Some(a)) => Some(Mismatch {
            index,
            expected: e,
            actual: a,
        }),
        // Past the end of exactly one buffer; report the missing side as NaN.
        (Some(e), None) => Some(Mismatch {
            index,
            expected: e,
            actual: Sample::Float64(f64::NAN),
        }),
        (None, Some(a)) => Some(Mismatch {
            index,
            expected: Sample::Float64(f64::NAN),
            actual: a,
        }),
        (None, None) => None,
    }
}
