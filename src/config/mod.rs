//! Harness configuration
//!
//! # Configuration Sources
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables prefixed with `AD_ROUNDTRIP_`
//! 2. TOML configuration file (default: `config/harness.toml`)
//! 3. Built-in defaults
//!
//! # Example
//!
//! ```no_run
//! use ad_roundtrip::config::HarnessConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarnessConfig::load_from("config/harness.toml")?;
//!     println!("Prefix: {}", config.control_plane.prefix);
//!     println!("Scenarios: {}", config.scenarios.len());
//!     Ok(())
//! }
//! ```

pub mod harness_config;

pub use harness_config::{
    ApplicationConfig, ArmStrategy, ConfigError, FrameConfig, HarnessConfig, ReportConfig,
    ReportFormat, ScenarioConfig, SimulatorConfig, TimingConfig,
};
