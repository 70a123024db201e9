//! Injected faults fail exactly the affected cases; connectivity loss is fatal.

mod common;

use ad_roundtrip::acquisition::{AcquisitionConfig, AcquisitionDriver, ConfigurationApplier, Endpoints};
use ad_roundtrip::config::{ArmStrategy, SimulatorConfig};
use ad_roundtrip::error::{CaseFailure, HarnessError, TransportError};
use ad_roundtrip::frame::{FrameGenerator, Shape};
use ad_roundtrip::oracle::{self, Verdict};
use ad_roundtrip::params::{DataType, ImageMode};
use ad_roundtrip::pv::{Fault, Leaf, PvNames, PvValue};
use ad_roundtrip::runner::MatrixRunner;
use common::{harness, scenario, spawn_ioc, statuses};
use std::time::Duration;

async fn run_with_fault(fault: Fault) -> ad_roundtrip::report::RunReport {
    let mut config = harness(16, 12);
    config.scenarios = vec![scenario("isolation", ImageMode::Single, DataType::ALL)];
    let ioc = spawn_ioc(&config.simulator);
    ioc.inject(fault).await;
    MatrixRunner::new(ioc, &config)
        .run_all(&config.scenarios)
        .await
        .unwrap()
}

fn assert_only_failure(report: &ad_roundtrip::report::RunReport, data_type: DataType, category: &str) {
    let scenario = &report.scenarios[0];
    assert_eq!(scenario.total_count(), 8, "matrix must not stop early");
    for (label, status) in statuses(scenario) {
        if label == data_type.as_str() {
            assert_eq!(status, category, "{label}");
        } else {
            assert_eq!(status, "PASS", "{label} should be unaffected");
        }
    }
}

#[tokio::test]
async fn test_truncated_read_back_fails_only_that_type() {
    let report = run_with_fault(Fault::TruncateReadback {
        data_type: DataType::Int16,
        keep: 10,
    })
    .await;
    assert_only_failure(&report, DataType::Int16, "SHAPE_MISMATCH");

    match &report.scenarios[0].case(DataType::Int16).unwrap().verdict {
        Verdict::Fail(CaseFailure::Shape(m)) => {
            assert_eq!(m.expected, 192);
            assert_eq!(m.actual, 10);
        }
        other => panic!("unexpected verdict {other:?}"),
    }
}

#[tokio::test]
async fn test_corrupted_element_reports_first_divergence() {
    let report = run_with_fault(Fault::CorruptElement {
        data_type: DataType::Float32,
        index: 42,
    })
    .await;
    assert_only_failure(&report, DataType::Float32, "VALUE_MISMATCH");

    match &report.scenarios[0].case(DataType::Float32).unwrap().verdict {
        Verdict::Fail(CaseFailure::ValueMismatch(m)) => {
            assert_eq!(m.index, 42);
            assert_ne!(m.expected, m.actual);
        }
        other => panic!("unexpected verdict {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_completion_is_ack_timeout_and_run_continues() {
    let report = run_with_fault(Fault::WithholdCompletion {
        data_type: DataType::UInt32,
    })
    .await;
    assert_only_failure(&report, DataType::UInt32, "ACK_TIMEOUT");
}

#[tokio::test]
async fn test_rejected_payload_fails_cases_without_aborting() {
    let report = run_with_fault(Fault::RejectWrites { leaf: Leaf::ArrayIn }).await;
    let scenario = &report.scenarios[0];
    assert_eq!(scenario.total_count(), 8);
    assert!(scenario.cases.iter().all(|c| c.status() == "PROTOCOL"));
}

#[tokio::test]
async fn test_unreachable_endpoint_aborts_run() {
    let mut config = harness(8, 8);
    config.scenarios = vec![scenario("fatal", ImageMode::Single, DataType::ALL)];
    let ioc = spawn_ioc(&config.simulator);
    ioc.inject(Fault::Disconnect { leaf: Leaf::ArrayData }).await;

    let err = MatrixRunner::new(ioc.clone(), &config)
        .run_all(&config.scenarios)
        .await
        .unwrap_err();
    match err {
        HarnessError::Connectivity(TransportError::Unreachable { pv, .. }) => {
            assert_eq!(pv, "13NDSA1:image1:ArrayData");
        }
        other => panic!("expected connectivity error, got {other:?}"),
    }

    // Aborted after the first read-back; no further cases were attempted.
    let array_writes = ioc
        .written_leaves()
        .await
        .into_iter()
        .filter(|leaf| *leaf == Leaf::ArrayIn)
        .count();
    assert_eq!(array_writes, 1);
}

#[tokio::test]
async fn test_fixed_delay_races_a_slow_detector() {
    let slow = SimulatorConfig {
        arm_latency: Duration::from_millis(250),
        ..common::fast_simulator()
    };

    let mut config = harness(8, 8);
    config.scenarios = vec![scenario("race", ImageMode::Single, &[DataType::UInt8])];
    config.timing.arm = ArmStrategy::FixedDelay {
        delay: Duration::from_millis(1),
    };
    let report = MatrixRunner::new(spawn_ioc(&slow), &config)
        .run_all(&config.scenarios)
        .await
        .unwrap();
    assert_eq!(
        report.scenarios[0].case(DataType::UInt8).map(|c| c.status()),
        Some("SHAPE_MISMATCH"),
        "frame written before arming must not reach the plugin"
    );

    config.timing.arm = ArmStrategy::Poll {
        interval: Duration::from_millis(5),
        timeout: Duration::from_secs(2),
    };
    let report = MatrixRunner::new(spawn_ioc(&slow), &config)
        .run_all(&config.scenarios)
        .await
        .unwrap();
    assert!(report.all_passed(), "failures: {:?}", report.all_failures());
}

#[tokio::test]
async fn test_arm_timeout_is_a_case_failure() {
    let slow = SimulatorConfig {
        arm_latency: Duration::from_secs(5),
        ..common::fast_simulator()
    };
    let mut config = harness(4, 4);
    config.scenarios = vec![scenario("never_armed", ImageMode::Single, &[DataType::Int8, DataType::UInt8])];
    config.timing.arm = ArmStrategy::Poll {
        interval: Duration::from_millis(2),
        timeout: Duration::from_millis(30),
    };

    let report = MatrixRunner::new(spawn_ioc(&slow), &config)
        .run_all(&config.scenarios)
        .await
        .unwrap();
    let scenario = &report.scenarios[0];
    assert_eq!(scenario.total_count(), 2);
    assert!(scenario.cases.iter().all(|c| c.status() == "ARM_TIMEOUT"));
}

#[tokio::test]
async fn test_drifted_data_type_is_type_mismatch() {
    let config = harness(6, 4);
    let ioc = spawn_ioc(&config.simulator);
    let endpoints = Endpoints::new(ioc.clone(), PvNames::default(), Duration::from_secs(1));
    let applier = ConfigurationApplier::new(endpoints.clone());
    let driver = AcquisitionDriver::new(endpoints.clone(), config.timing.arm);

    let acquisition = AcquisitionConfig::from_scenario(
        &scenario("drift", ImageMode::Single, &[DataType::Int16]),
        Shape::new(6, 4),
        DataType::Int16,
    );
    applier.apply(&acquisition).await.unwrap();
    // Another client changes the element type behind the harness.
    endpoints
        .put(Leaf::DataType, PvValue::Int(DataType::Int32.code()))
        .await
        .unwrap();

    let sent = FrameGenerator::seeded(config.frame.value_range(), 3).generate(acquisition.shape, DataType::Int16);
    let received = driver.run(&acquisition, &sent).await.unwrap();
    assert_eq!(received.data_type(), DataType::Int32);

    match oracle::compare(&sent, &received) {
        Verdict::Fail(CaseFailure::TypeMismatch { expected, actual }) => {
            assert_eq!(expected, DataType::Int16);
            assert_eq!(actual, DataType::Int32);
        }
        other => panic!("unexpected verdict {other:?}"),
    }
}
