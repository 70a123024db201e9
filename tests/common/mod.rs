//! Shared fixtures for integration tests.
#![allow(dead_code)]

use ad_roundtrip::config::{ArmStrategy, HarnessConfig, ScenarioConfig, SimulatorConfig};
use ad_roundtrip::params::{DataType, ImageMode};
use ad_roundtrip::pv::{PvNames, SimulatedIoc};
use ad_roundtrip::report::ScenarioReport;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Simulator with short latencies so the full matrix runs quickly.
pub fn fast_simulator() -> SimulatorConfig {
    SimulatorConfig {
        arm_latency: Duration::from_millis(2),
        plugin_latency: Duration::from_millis(1),
        queue_capacity: 64,
    }
}

pub fn spawn_ioc(settings: &SimulatorConfig) -> Arc<SimulatedIoc> {
    Arc::new(SimulatedIoc::spawn(PvNames::default(), settings))
}

/// Seeded harness config at `width` x `height` with a short ack timeout.
pub fn harness(width: usize, height: usize) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.frame.width = width;
    config.frame.height = height;
    config.frame.seed = Some(0x5eed);
    config.timing.ack_timeout = Duration::from_millis(300);
    config.timing.arm = ArmStrategy::Poll {
        interval: Duration::from_millis(1),
        timeout: Duration::from_secs(2),
    };
    config.simulator = fast_simulator();
    config
}

pub fn scenario(name: &str, image_mode: ImageMode, data_types: &[DataType]) -> ScenarioConfig {
    let mut scenario = ScenarioConfig::new(name, image_mode);
    scenario.data_types = data_types.to_vec();
    scenario
}

/// Status per data type, e.g. `uint8 -> PASS`.
pub fn statuses(report: &ScenarioReport) -> BTreeMap<String, &'static str> {
    report
        .cases
        .iter()
        .map(|c| (c.data_type.to_string(), c.status()))
        .collect()
}
