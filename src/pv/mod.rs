//! Process-variable naming, values and the control-plane seam.
//!
//! Endpoints are addressed as `<device-prefix><unit-prefix><leaf>`, e.g.
//! `13NDSA1:cam1:Acquire`. The detector unit (`cam1:`) carries acquisition
//! parameters and the `ArrayIn` input; the plugin unit (`image1:`) carries the
//! republished `ArrayData` and its `EnableCallbacks` switch.
//!
//! The harness never talks to a transport directly. Everything goes through
//! [`ControlPlane`], so a Channel Access or pvAccess client and the in-process
//! [`SimulatedIoc`](simulated::SimulatedIoc) are interchangeable.

use crate::error::TransportError;
use crate::frame::ElementBuffer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod simulated;

pub use simulated::{Fault, ObservableState, SimulatedIoc};

/// Which record set a leaf belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    /// Detector driver (`cam1:`)
    Detector,
    /// Downstream image plugin (`image1:`)
    Plugin,
}

/// Stable leaf names understood by the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leaf {
    /// Start / stop acquisition
    Acquire,
    /// Plugin output array
    ArrayData,
    /// Plugin callback enable
    EnableCallbacks,
    /// Number of array dimensions
    NDimensions,
    /// Array dimensions
    Dimensions,
    /// Element data type
    DataType,
    /// Color mode
    ColorMode,
    /// Images per acquisition in multiple mode
    NumImages,
    /// Overwrite / append
    ArrayMode,
    /// Elements per append chunk
    NumElements,
    /// Single / multiple / continuous
    ImageMode,
    /// Internal / external
    TriggerMode,
    /// Detector status readback
    DetectorState,
    /// Detector array callback enable
    ArrayCallbacks,
    /// Array injection input
    ArrayIn,
    /// Restart an append-mode array
    NewArray,
    /// Complete an append-mode array
    ArrayComplete,
}

impl Leaf {
    /// Every leaf
    pub const ALL: &'static [Leaf] = &[
        Leaf::Acquire,
        Leaf::ArrayData,
        Leaf::EnableCallbacks,
        Leaf::NDimensions,
        Leaf::Dimensions,
        Leaf::DataType,
        Leaf::ColorMode,
        Leaf::NumImages,
        Leaf::ArrayMode,
        Leaf::NumElements,
        Leaf::ImageMode,
        Leaf::TriggerMode,
        Leaf::DetectorState,
        Leaf::ArrayCallbacks,
        Leaf::ArrayIn,
        Leaf::NewArray,
        Leaf::ArrayComplete,
    ];

    /// Record name suffix
    pub fn as_str(self) -> &'static str {
        match self {
            Leaf::Acquire => "Acquire",
            Leaf::ArrayData => "ArrayData",
            Leaf::EnableCallbacks => "EnableCallbacks",
            Leaf::NDimensions => "NDimensions",
            Leaf::Dimensions => "Dimensions",
            Leaf::DataType => "DataType",
            Leaf::ColorMode => "ColorMode",
            Leaf::NumImages => "NumImages",
            Leaf::ArrayMode => "ArrayMode",
            Leaf::NumElements => "NumElements",
            Leaf::ImageMode => "ImageMode",
            Leaf::TriggerMode => "TriggerMode",
            Leaf::DetectorState => "DetectorState_RBV",
            Leaf::ArrayCallbacks => "ArrayCallbacks",
            Leaf::ArrayIn => "ArrayIn",
            Leaf::NewArray => "NewArray",
            Leaf::ArrayComplete => "ArrayComplete",
        }
    }

    /// Record set the leaf lives in
    pub fn unit(self) -> Unit {
        match self {
            Leaf::ArrayData | Leaf::EnableCallbacks => Unit::Plugin,
            _ => Unit::Detector,
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified endpoint name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PvName(String);

impl PvName {
    /// Wrap a raw name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prefixes used to build endpoint names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvNames {
    /// Device prefix, e.g. `13NDSA1:`
    pub prefix: String,
    /// Detector unit prefix, e.g. `cam1:`
    pub detector_unit: String,
    /// Plugin unit prefix, e.g. `image1:`
    pub plugin_unit: String,
}

impl Default for PvNames {
    fn default() -> Self {
        Self {
            prefix: "13NDSA1:".to_string(),
            detector_unit: "cam1:".to_string(),
            plugin_unit: "image1:".to_string(),
        }
    }
}

impl PvNames {
    /// Endpoint name for `leaf`
    pub fn name(&self, leaf: Leaf) -> PvName {
        let unit = match leaf.unit() {
            Unit::Detector => &self.detector_unit,
            Unit::Plugin => &self.plugin_unit,
        };
        PvName(format!("{}{}{}", self.prefix, unit, leaf.as_str()))
    }
}

/// Value carried by an endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum PvValue {
    /// Scalar integer or enumeration code
    Int(i32),
    /// Homogeneous numeric array
    Array(ElementBuffer),
}

impl PvValue {
    /// Scalar value, if this is one
    pub fn as_int(&self) -> Option<i32> {
        match self {
            PvValue::Int(v) => Some(*v),
            PvValue::Array(_) => None,
        }
    }

    /// Array value, if this is one
    pub fn into_array(self) -> Option<ElementBuffer> {
        match self {
            PvValue::Int(_) => None,
            PvValue::Array(buf) => Some(buf),
        }
    }

    /// Short description used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            PvValue::Int(_) => "scalar",
            PvValue::Array(_) => "array",
        }
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvValue::Int(v) => write!(f, "{v}"),
            PvValue::Array(buf) => write!(f, "[{} x {}]", buf.len(), buf.data_type()),
        }
    }
}

/// Read/write access to the detector and plugin endpoints
///
/// ## Completion
/// `write` with `wait = true` is a put-with-completion: the future must not
/// resolve until the external system has finished processing *that* write,
/// including any downstream plugin callbacks it triggers. With `wait = false`
/// the future resolves once the request has been accepted.
///
/// Implementations do not time out on their own; callers bound waits with
/// `tokio::time::timeout`.
///
/// ## Errors
/// - `TransportError::Unreachable` if the endpoint cannot be reached
/// - `TransportError::Rejected` if the endpoint refuses the value or request
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Write `value` to `pv`
    async fn write(&self, pv: &PvName, value: PvValue, wait: bool) -> Result<(), TransportError>;

    /// Read `pv`; for arrays, `count` limits the number of elements returned
    async fn read(&self, pv: &PvName, count: Option<usize>) -> Result<PvValue, TransportError>;
}

#[async_trait]
impl<T: ControlPlane + ?Sized> ControlPlane for Arc<T> {
    async fn write(&self, pv: &PvName, value: PvValue, wait: bool) -> Result<(), TransportError> {
        (**self).write(pv, value, wait).await
    }

    async fn read(&self, pv: &PvName, count: Option<usize>) -> Result<PvValue, TransportError> {
        (**self).read(pv, count).await
    }
}
