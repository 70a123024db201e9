//! Acquisition configuration and the ordered writes that apply it.

use super::Endpoints;
use crate::config::ScenarioConfig;
use crate::error::CycleError;
use crate::frame::{ElementBuffer, Shape};
use crate::params::{ArrayMode, CallbackState, ColorMode, DataType, ImageMode, TriggerMode};
use crate::pv::{Leaf, PvValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Settings that must be active before an acquisition cycle starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Frame geometry, written to `NDimensions` and `Dimensions`
    pub shape: Shape,
    /// Element type of the injected array
    pub data_type: DataType,
    /// Colour layout of the frame
    pub color_mode: ColorMode,
    /// Single, multiple or continuous
    pub image_mode: ImageMode,
    /// Overwrite or append
    pub array_mode: ArrayMode,
    /// Internal or external trigger
    pub trigger_mode: TriggerMode,
    /// Images per acquisition in multiple mode
    pub num_images: i32,
    /// Elements per `ArrayIn` write in append mode
    pub num_elements: i32,
    /// Detector `ArrayCallbacks`
    pub array_callbacks: CallbackState,
    /// Plugin `EnableCallbacks`
    pub plugin_callbacks: CallbackState,
}

impl AcquisitionConfig {
    /// Configuration for `scenario` at `shape`, starting with `data_type`
    pub fn from_scenario(scenario: &ScenarioConfig, shape: Shape, data_type: DataType) -> Self {
        Self {
            shape,
            data_type,
            color_mode: scenario.color_mode,
            image_mode: scenario.image_mode,
            array_mode: scenario.array_mode,
            trigger_mode: scenario.trigger_mode,
            num_images: scenario.num_images,
            num_elements: scenario.num_elements,
            array_callbacks: scenario.array_callbacks,
            plugin_callbacks: scenario.plugin_callbacks,
        }
    }

    /// Same configuration with another element type
    pub fn with_data_type(&self, data_type: DataType) -> Self {
        Self {
            data_type,
            ..self.clone()
        }
    }

    /// Writes that establish this configuration, in application order.
    ///
    /// Geometry and element type come first, then modes, and callback enables
    /// last so the plugin only sees arrays produced under the full setup.
    pub fn writes(&self) -> Vec<(Leaf, PvValue)> {
        let dims = vec![
            i32::try_from(self.shape.width).unwrap_or(i32::MAX),
            i32::try_from(self.shape.height).unwrap_or(i32::MAX),
        ];
        vec![
            (Leaf::NDimensions, PvValue::Int(self.shape.ndimensions())),
            (Leaf::Dimensions, PvValue::Array(ElementBuffer::Int32(dims))),
            (Leaf::DataType, PvValue::Int(self.data_type.code())),
            (Leaf::ColorMode, PvValue::Int(self.color_mode.code())),
            (Leaf::ArrayMode, PvValue::Int(self.array_mode.code())),
            (Leaf::NumElements, PvValue::Int(self.num_elements)),
            (Leaf::ImageMode, PvValue::Int(self.image_mode.code())),
            (Leaf::NumImages, PvValue::Int(self.num_images)),
            (Leaf::TriggerMode, PvValue::Int(self.trigger_mode.code())),
            (Leaf::ArrayCallbacks, PvValue::Int(self.array_callbacks.code())),
            (Leaf::EnableCallbacks, PvValue::Int(self.plugin_callbacks.code())),
        ]
    }
}

/// Puts the detector and plugin into a known configuration
pub struct ConfigurationApplier {
    endpoints: Endpoints,
}

impl ConfigurationApplier {
    /// Applier writing through `endpoints`
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }

    /// Write every setting of `config`.
    ///
    /// All writes but the last are fire-and-forget. The last one waits for
    /// completion; since the IOC processes writes in order, its acknowledgement
    /// means the whole batch is active. A failed write aborts immediately and
    /// is not retried.
    pub async fn apply(&self, config: &AcquisitionConfig) -> Result<(), CycleError> {
        let writes = config.writes();
        let Some(((last_leaf, last_value), rest)) = writes.split_last() else {
            return Ok(());
        };

        for (leaf, value) in rest {
            self.endpoints.put(*leaf, value.clone()).await?;
        }
        self.endpoints
            .put_wait(*last_leaf, last_value.clone())
            .await?;

        debug!(
            shape = %config.shape,
            data_type = %config.data_type,
            image_mode = %config.image_mode,
            array_mode = %config.array_mode,
            "configuration applied"
        );
        Ok(())
    }

    /// Switch the element type only, waiting for completion
    pub async fn apply_data_type(&self, data_type: DataType) -> Result<(), CycleError> {
        self.endpoints
            .put_wait(Leaf::DataType, PvValue::Int(data_type.code()))
            .await?;
        debug!(%data_type, "data type applied");
        Ok(())
    }
}
