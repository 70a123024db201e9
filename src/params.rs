//! Closed enumerations for detector and plugin parameters.
//!
//! Every enumeration carries the integer code the IOC expects on the wire and a
//! stable lowercase label used in configuration files, logs and reports. Codes
//! match the areaDetector `ADDriver.h` / `NDArray.h` definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a label or integer code does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    /// Enumeration name
    pub kind: &'static str,
    /// Offending label or code
    pub value: String,
}

macro_rules! pv_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant = $code ),+
        }

        impl $name {
            /// All variants, in code order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Integer code written to / read from the IOC
            pub fn code(self) -> i32 {
                self as i32
            }

            /// Decode an integer code
            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $( $code => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Stable lowercase label
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| UnknownVariant {
                        kind: stringify!($name),
                        value: s.to_string(),
                    })
            }
        }
    };
}

pv_enum! {
    /// Value written to `Acquire`
    AcquireState {
        /// Stop / done
        Idle = 0 => "idle",
        /// Start acquiring
        Acquire = 1 => "acquire",
    }
}

pv_enum! {
    /// Detector status as reported by `DetectorState_RBV`
    DetectorState {
        /// Detector is idle
        Idle = 0 => "idle",
        /// Detector is acquiring
        Acquire = 1 => "acquire",
        /// Detector is reading out
        Readout = 2 => "readout",
        /// Detector is correcting data
        Correct = 3 => "correct",
        /// Detector is saving data
        Saving = 4 => "saving",
        /// Detector is aborting
        Aborting = 5 => "aborting",
        /// Detector reported an error
        Error = 6 => "error",
        /// Detector is waiting, typically for the acquire period to elapse
        Waiting = 7 => "waiting",
        /// Detector is initializing
        Initializing = 8 => "initializing",
        /// Detector is not connected
        Disconnected = 9 => "disconnected",
        /// Acquisition was aborted
        Aborted = 10 => "aborted",
    }
}

pv_enum! {
    /// NDArray element type
    DataType {
        /// Signed 8-bit
        Int8 = 0 => "int8",
        /// Unsigned 8-bit
        UInt8 = 1 => "uint8",
        /// Signed 16-bit
        Int16 = 2 => "int16",
        /// Unsigned 16-bit
        UInt16 = 3 => "uint16",
        /// Signed 32-bit
        Int32 = 4 => "int32",
        /// Unsigned 32-bit
        UInt32 = 5 => "uint32",
        /// IEEE-754 single precision
        Float32 = 6 => "float32",
        /// IEEE-754 double precision
        Float64 = 7 => "float64",
    }
}

pv_enum! {
    /// NDArray color mode
    ColorMode {
        /// Monochrome
        Mono = 0 => "mono",
        /// Bayer mosaic
        Bayer = 1 => "bayer",
        /// RGB, pixel interleave
        Rgb1 = 2 => "rgb1",
        /// RGB, row interleave
        Rgb2 = 3 => "rgb2",
        /// RGB, planar
        Rgb3 = 4 => "rgb3",
        /// YUV 4:4:4
        Yuv444 = 5 => "yuv444",
        /// YUV 4:2:2
        Yuv422 = 6 => "yuv422",
        /// YUV 4:2:1
        Yuv421 = 7 => "yuv421",
    }
}

pv_enum! {
    /// How successive `ArrayIn` writes populate the array
    ArrayMode {
        /// Each write replaces the whole array
        Overwrite = 0 => "overwrite",
        /// Writes append until `ArrayComplete`
        Append = 1 => "append",
    }
}

pv_enum! {
    /// Number of images collected per `Acquire` command
    ImageMode {
        /// One image
        Single = 0 => "single",
        /// `NumImages` images
        Multiple = 1 => "multiple",
        /// Until `Acquire` is set to 0
        Continuous = 2 => "continuous",
    }
}

pv_enum! {
    /// Trigger source
    TriggerMode {
        /// Internal trigger
        Internal = 0 => "internal",
        /// External trigger input
        External = 1 => "external",
    }
}

pv_enum! {
    /// Callback enablement for `ArrayCallbacks` and plugin `EnableCallbacks`
    CallbackState {
        /// Callbacks off
        Disable = 0 => "disable",
        /// Callbacks on
        Enable = 1 => "enable",
    }
}

impl DataType {
    /// Size in bytes of one element
    pub fn element_size(self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    /// Whether the type is a floating-point type
    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Inclusive range of values representable by the type
    pub fn representable_range(self) -> (f64, f64) {
        match self {
            DataType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            DataType::UInt8 => (0.0, u8::MAX as f64),
            DataType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            DataType::UInt16 => (0.0, u16::MAX as f64),
            DataType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::UInt32 => (0.0, u32::MAX as f64),
            DataType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            DataType::Float64 => (f64::MIN, f64::MAX),
        }
    }
}

impl CallbackState {
    /// Whether callbacks are enabled
    pub fn is_enabled(self) -> bool {
        matches!(self, CallbackState::Enable)
    }
}
