//! Round-trip verification harness for areaDetector array injection.
//!
//! The harness configures a standard-arrays detector, injects a synthetic
//! frame through `ArrayIn`, and checks that the image plugin republishes it
//! unchanged in `ArrayData`, for every element data type and each configured
//! acquisition scenario.
//!
//! ```no_run
//! use ad_roundtrip::config::HarnessConfig;
//! use ad_roundtrip::pv::SimulatedIoc;
//! use ad_roundtrip::runner::MatrixRunner;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), ad_roundtrip::error::HarnessError> {
//! let config = HarnessConfig::load()?;
//! let ioc = Arc::new(SimulatedIoc::spawn(config.control_plane.clone(), &config.simulator));
//! let report = MatrixRunner::new(ioc, &config).run_all(&config.scenarios).await?;
//! println!("{}", report.to_markdown());
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod oracle;
pub mod params;
pub mod pv;
pub mod report;
pub mod runner;

pub use error::{CaseFailure, HarnessError, HarnessResult, TransportError};
