//! Harness configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/harness.toml` (or a path given on the command line)
//! 2. Environment variables prefixed with `AD_ROUNDTRIP_`
//!
//! Nested keys are separated by a double underscore so that field names
//! containing underscores survive:
//!
//! ```text
//! AD_ROUNDTRIP_APPLICATION__LOG_LEVEL=debug
//! AD_ROUNDTRIP_CONTROL_PLANE__PREFIX=13SIM1:
//! AD_ROUNDTRIP_TIMING__ACK_TIMEOUT=10s
//! ```

use crate::frame::{Shape, ValueRange};
use crate::params::{ArrayMode, CallbackState, ColorMode, DataType, ImageMode, TriggerMode};
use crate::pv::PvNames;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be read or parsed
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// Parsed values are out of range or inconsistent
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Endpoint naming
    #[serde(default)]
    pub control_plane: PvNames,
    /// Completion and arming timeouts
    #[serde(default)]
    pub timing: TimingConfig,
    /// Synthetic frame geometry and values
    #[serde(default)]
    pub frame: FrameConfig,
    /// Configurations-of-the-day, run in order
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<ScenarioConfig>,
    /// Simulated IOC timing
    #[serde(default)]
    pub simulator: SimulatorConfig,
    /// Report output
    #[serde(default)]
    pub report: ReportConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Name recorded in reports
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Completion and arming timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Upper bound on every put-with-completion
    #[serde(default = "default_ack_timeout", with = "humantime_serde")]
    pub ack_timeout: Duration,
    /// How to wait for the detector to arm
    #[serde(default)]
    pub arm: ArmStrategy,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ack_timeout: default_ack_timeout(),
            arm: ArmStrategy::default(),
        }
    }
}

/// Wait between `Acquire=1` and the first `ArrayIn` write
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ArmStrategy {
    /// Poll `DetectorState_RBV` until it leaves idle
    Poll {
        /// Time between state reads
        #[serde(default = "default_poll_interval", with = "humantime_serde")]
        interval: Duration,
        /// Give up after this long
        #[serde(default = "default_arm_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    /// Sleep for a fixed time. Races a slow detector.
    FixedDelay {
        /// Time to sleep
        #[serde(default = "default_fixed_delay", with = "humantime_serde")]
        delay: Duration,
    },
}

impl Default for ArmStrategy {
    fn default() -> Self {
        ArmStrategy::Poll {
            interval: default_poll_interval(),
            timeout: default_arm_timeout(),
        }
    }
}

/// Synthetic frame geometry and value range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Elements per row
    #[serde(default = "default_width")]
    pub width: usize,
    /// Rows
    #[serde(default = "default_height")]
    pub height: usize,
    /// Lower bound of generated values
    #[serde(default)]
    pub min_value: f64,
    /// Upper bound of generated values
    #[serde(default = "default_max_value")]
    pub max_value: f64,
    /// Fixed RNG seed; entropy-seeded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            min_value: 0.0,
            max_value: default_max_value(),
            seed: None,
        }
    }
}

impl FrameConfig {
    /// Frame geometry
    pub fn shape(&self) -> Shape {
        Shape::new(self.width, self.height)
    }

    /// Value range for the generator
    pub fn value_range(&self) -> ValueRange {
        ValueRange {
            min: self.min_value,
            max: self.max_value,
        }
    }
}

/// One named configuration-of-the-day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Unique scenario name
    pub name: String,
    /// Detector `ImageMode`
    #[serde(default = "default_image_mode")]
    pub image_mode: ImageMode,
    /// Detector `ArrayMode`
    #[serde(default = "default_array_mode")]
    pub array_mode: ArrayMode,
    /// Detector `ColorMode`
    #[serde(default = "default_color_mode")]
    pub color_mode: ColorMode,
    /// Detector `TriggerMode`
    #[serde(default = "default_trigger_mode")]
    pub trigger_mode: TriggerMode,
    /// Images per acquisition in multiple mode
    #[serde(default = "default_num_images")]
    pub num_images: i32,
    /// Chunk size in append mode
    #[serde(default = "default_num_elements")]
    pub num_elements: i32,
    /// Detector `ArrayCallbacks`
    #[serde(default = "default_enabled")]
    pub array_callbacks: CallbackState,
    /// Plugin `EnableCallbacks`
    #[serde(default = "default_enabled")]
    pub plugin_callbacks: CallbackState,
    /// Data types to run, in order
    #[serde(default = "default_data_types")]
    pub data_types: Vec<DataType>,
}

impl ScenarioConfig {
    /// Scenario with default settings apart from the name and image mode
    pub fn new(name: impl Into<String>, image_mode: ImageMode) -> Self {
        Self {
            name: name.into(),
            image_mode,
            array_mode: default_array_mode(),
            color_mode: default_color_mode(),
            trigger_mode: default_trigger_mode(),
            num_images: default_num_images(),
            num_elements: default_num_elements(),
            array_callbacks: default_enabled(),
            plugin_callbacks: default_enabled(),
            data_types: default_data_types(),
        }
    }
}

/// Simulated IOC timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Delay between `Acquire=1` and the detector accepting arrays
    #[serde(default = "default_arm_latency", with = "humantime_serde")]
    pub arm_latency: Duration,
    /// Delay between array completion and the plugin publishing it
    #[serde(default = "default_plugin_latency", with = "humantime_serde")]
    pub plugin_latency: Duration,
    /// Bound on queued writes
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            arm_latency: default_arm_latency(),
            plugin_latency: default_plugin_latency(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown tables
    #[default]
    Markdown,
    /// Pretty-printed JSON
    Json,
    /// One row per case
    Csv,
}

/// Report output
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format
    #[serde(default)]
    pub format: ReportFormat,
    /// Write here instead of stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

fn default_app_name() -> String {
    "ad_roundtrip".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_ack_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_arm_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_fixed_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_width() -> usize {
    256
}

fn default_height() -> usize {
    768
}

fn default_max_value() -> f64 {
    255.0
}

fn default_image_mode() -> ImageMode {
    ImageMode::Single
}

fn default_array_mode() -> ArrayMode {
    ArrayMode::Overwrite
}

fn default_color_mode() -> ColorMode {
    ColorMode::Mono
}

fn default_trigger_mode() -> TriggerMode {
    TriggerMode::Internal
}

fn default_num_images() -> i32 {
    5
}

fn default_num_elements() -> i32 {
    100
}

fn default_enabled() -> CallbackState {
    CallbackState::Enable
}

fn default_data_types() -> Vec<DataType> {
    DataType::ALL.to_vec()
}

fn default_scenarios() -> Vec<ScenarioConfig> {
    vec![
        ScenarioConfig::new("single_acquisition", ImageMode::Single),
        ScenarioConfig::new("multiple_acquisition", ImageMode::Multiple),
    ]
}

fn default_arm_latency() -> Duration {
    Duration::from_millis(20)
}

fn default_plugin_latency() -> Duration {
    Duration::from_millis(2)
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            control_plane: PvNames::default(),
            timing: TimingConfig::default(),
            frame: FrameConfig::default(),
            scenarios: default_scenarios(),
            simulator: SimulatorConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from the default location (`config/harness.toml`)
    ///
    /// A missing file is not an error; defaults and environment overrides apply.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/harness.toml")
    }

    /// Load configuration from a specific file path, then validate it
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed or fails validation.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("AD_ROUNDTRIP_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level and format are known
    /// - Frame geometry is non-empty and fits an `i32` dimension
    /// - Value range is finite and ordered
    /// - `ack_timeout` is non-zero
    /// - Scenario names are non-empty and unique, each with at least one data type
    /// - Append scenarios have a chunk size, multiple scenarios an image count
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let frame = &self.frame;
        if frame.width == 0 || frame.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Frame geometry {}x{} must be non-empty",
                frame.width, frame.height
            )));
        }
        let fits = i32::try_from(frame.width).is_ok()
            && i32::try_from(frame.height).is_ok()
            && frame
                .width
                .checked_mul(frame.height)
                .map_or(false, |n| i32::try_from(n).is_ok());
        if !fits {
            return Err(ConfigError::ValidationError(format!(
                "Frame geometry {}x{} is too large",
                frame.width, frame.height
            )));
        }
        if !(frame.max_value - frame.min_value).is_finite() {
            return Err(ConfigError::ValidationError(
                "Frame value range must be finite".to_string(),
            ));
        }
        if frame.min_value > frame.max_value {
            return Err(ConfigError::ValidationError(format!(
                "Frame min_value {} exceeds max_value {}",
                frame.min_value, frame.max_value
            )));
        }

        if self.timing.ack_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timing.ack_timeout must be > 0".to_string(),
            ));
        }
        if let ArmStrategy::Poll { interval, timeout } = self.timing.arm {
            if interval.is_zero() || timeout.is_zero() {
                return Err(ConfigError::ValidationError(
                    "timing.arm poll interval and timeout must be > 0".to_string(),
                ));
            }
        }

        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            self.validate_scenario(scenario)?;
            if !names.insert(scenario.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate scenario name: '{}'",
                    scenario.name
                )));
            }
        }

        Ok(())
    }

    fn validate_scenario(&self, scenario: &ScenarioConfig) -> Result<(), ConfigError> {
        if scenario.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Scenario name cannot be empty".to_string(),
            ));
        }
        if scenario.data_types.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Scenario '{}': 'data_types' cannot be empty",
                scenario.name
            )));
        }
        if scenario.array_mode == ArrayMode::Append && scenario.num_elements <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "Scenario '{}': 'num_elements' must be > 0 in append mode",
                scenario.name
            )));
        }
        if scenario.image_mode == ImageMode::Multiple && scenario.num_images <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "Scenario '{}': 'num_images' must be > 0 in multiple mode",
                scenario.name
            )));
        }
        Ok(())
    }

    /// Scenario by name
    pub fn scenario(&self, name: &str) -> Option<&ScenarioConfig> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}
