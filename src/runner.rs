//! Test matrix runner.
//!
//! For each scenario the base configuration is applied once, then every data
//! type runs through `Configuring -> Acquiring -> Validating` and back to idle.
//! A failed case never stops the matrix; only fatal errors do.

use crate::acquisition::{AcquisitionConfig, AcquisitionDriver, ConfigurationApplier, Endpoints};
use crate::config::{HarnessConfig, ScenarioConfig};
use crate::error::{CycleError, HarnessError};
use crate::frame::{FrameGenerator, Shape};
use crate::oracle::{self, Verdict};
use crate::params::{DataType, ImageMode};
use crate::pv::ControlPlane;
use crate::report::{CaseResult, RunReport, ScenarioReport};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Per-case state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    /// Between cases
    Idle,
    /// Writing the data type
    Configuring,
    /// Injecting and reading back
    Acquiring,
    /// Comparing frames
    Validating,
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaseState::Idle => "idle",
            CaseState::Configuring => "configuring",
            CaseState::Acquiring => "acquiring",
            CaseState::Validating => "validating",
        })
    }
}

/// Runs scenarios across the data-type matrix, strictly sequentially
pub struct MatrixRunner {
    applier: ConfigurationApplier,
    driver: AcquisitionDriver,
    generator: FrameGenerator,
    shape: Shape,
    system_id: String,
}

impl MatrixRunner {
    /// Runner talking to `plane` with the timing, naming and frame settings of `config`
    pub fn new(plane: Arc<dyn ControlPlane>, config: &HarnessConfig) -> Self {
        let endpoints = Endpoints::new(
            plane,
            config.control_plane.clone(),
            config.timing.ack_timeout,
        );
        let range = config.frame.value_range();
        let generator = match config.frame.seed {
            Some(seed) => FrameGenerator::seeded(range, seed),
            None => FrameGenerator::new(range),
        };
        Self {
            applier: ConfigurationApplier::new(endpoints.clone()),
            driver: AcquisitionDriver::new(endpoints, config.timing.arm),
            generator,
            shape: config.frame.shape(),
            system_id: format!("{} @ {}", config.application.name, config.control_plane.prefix),
        }
    }

    /// Run every scenario in order
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; case failures are recorded in the report.
    pub async fn run_all(&mut self, scenarios: &[ScenarioConfig]) -> Result<RunReport, HarnessError> {
        let mut report = RunReport::new(self.system_id.clone());
        for scenario in scenarios {
            let result = self
                .run_scenario(scenario)
                .instrument(info_span!("scenario", name = %scenario.name))
                .await?;
            report.add_scenario(result);
        }
        info!(
            cases = report.total_cases(),
            failed = report.total_failed(),
            "run complete"
        );
        Ok(report)
    }

    /// Apply `scenario` once and run its data types.
    ///
    /// If the setup writes fail at case level, every data type of the scenario
    /// is recorded with that failure.
    pub async fn run_scenario(&mut self, scenario: &ScenarioConfig) -> Result<ScenarioReport, HarnessError> {
        let first = scenario.data_types.first().copied().unwrap_or(DataType::UInt8);
        let base = AcquisitionConfig::from_scenario(scenario, self.shape, first);
        let mut report = ScenarioReport::new(scenario.name.clone(), base.clone());

        let setup_failure = match self.applier.apply(&base).await {
            Ok(()) => None,
            Err(CycleError::Fatal(err)) => {
                error!(error = %err, "scenario setup failed");
                return Err(err);
            }
            Err(CycleError::Case(failure)) => {
                warn!(%failure, "scenario setup failed, marking all cases failed");
                Some(failure)
            }
        };

        for &data_type in &scenario.data_types {
            let started_at = Utc::now();
            let start = Instant::now();
            let verdict = match &setup_failure {
                Some(failure) => Verdict::Fail(failure.clone()),
                None => {
                    self.run_case(&base, data_type)
                        .instrument(info_span!("case", scenario = %scenario.name, %data_type))
                        .await?
                }
            };
            match verdict.failure() {
                None => info!(%data_type, "case passed"),
                Some(failure) => warn!(%data_type, category = failure.category(), %failure, "case failed"),
            }
            report.add_case(CaseResult::new(data_type, verdict, started_at, start.elapsed()));
        }

        if scenario.image_mode != ImageMode::Single {
            match self.driver.stop().await {
                Ok(()) => debug!("acquisition stopped"),
                Err(CycleError::Fatal(err)) => {
                    error!(error = %err, "teardown failed");
                    return Err(err);
                }
                Err(CycleError::Case(failure)) => warn!(%failure, "teardown failed"),
            }
        }

        Ok(report)
    }

    async fn run_case(&mut self, base: &AcquisitionConfig, data_type: DataType) -> Result<Verdict, HarnessError> {
        let outcome = self.cycle(base, data_type).await;
        debug!(state = %CaseState::Idle);
        match outcome {
            Ok(verdict) => Ok(verdict),
            Err(CycleError::Case(failure)) => Ok(Verdict::Fail(failure)),
            Err(CycleError::Fatal(err)) => {
                error!(error = %err, "fatal error, aborting run");
                Err(err)
            }
        }
    }

    async fn cycle(&mut self, base: &AcquisitionConfig, data_type: DataType) -> Result<Verdict, CycleError> {
        debug!(state = %CaseState::Configuring);
        let config = base.with_data_type(data_type);
        self.applier.apply_data_type(data_type).await?;
        let frame = self.generator.generate(config.shape, data_type);

        debug!(state = %CaseState::Acquiring);
        let received = self.driver.run(&config, &frame).await?;

        debug!(state = %CaseState::Validating);
        Ok(oracle::compare(&frame, &received))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::pv::{Fault, PvNames, SimulatedIoc};
    use std::time::Duration;

    fn harness() -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.frame.width = 16;
        config.frame.height = 8;
        config.frame.seed = Some(11);
        config.timing.ack_timeout = Duration::from_millis(200);
        config
    }

    fn sim() -> Arc<SimulatedIoc> {
        let settings = SimulatorConfig {
            arm_latency: Duration::from_millis(2),
            plugin_latency: Duration::from_millis(1),
            queue_capacity: 32,
        };
        Arc::new(SimulatedIoc::spawn(PvNames::default(), &settings))
    }

    #[tokio::test]
    async fn test_all_types_pass() {
        let config = harness();
        let ioc = sim();
        let mut runner = MatrixRunner::new(ioc, &config);
        let report = runner.run_all(&config.scenarios).await.unwrap();
        assert_eq!(report.total_cases(), 16);
        assert!(report.all_passed(), "failures: {:?}", report.all_failures());
    }

    #[tokio::test]
    async fn test_setup_failure_marks_every_case() {
        let config = harness();
        let ioc = sim();
        ioc.inject(Fault::RejectWrites { leaf: crate::pv::Leaf::TriggerMode }).await;
        let mut runner = MatrixRunner::new(ioc, &config);
        let report = runner.run_scenario(&config.scenarios[0]).await.unwrap();
        assert_eq!(report.failed_count(), 8);
        assert!(report.cases.iter().all(|c| c.status() == "PROTOCOL"));
    }

    #[tokio::test]
    async fn test_multiple_mode_stops_acquisition() {
        let config = harness();
        let ioc = sim();
        let mut runner = MatrixRunner::new(ioc.clone(), &config);
        let report = runner.run_scenario(&config.scenarios[1]).await.unwrap();
        assert!(report.passed());
        ioc.settle().await;
        assert!(!ioc.snapshot().await.acquiring);
    }

    #[test]
    fn test_case_state_display() {
        assert_eq!(CaseState::Validating.to_string(), "validating");
    }
}
