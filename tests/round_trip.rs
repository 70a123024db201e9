//! End-to-end round trips against the simulated IOC.

mod common;

use ad_roundtrip::acquisition::{AcquisitionConfig, AcquisitionDriver, ConfigurationApplier, Endpoints};
use ad_roundtrip::frame::{ElementBuffer, FrameGenerator, Shape, ValueRange};
use ad_roundtrip::oracle::{self, Verdict};
use ad_roundtrip::params::{ArrayMode, DataType, ImageMode};
use ad_roundtrip::pv::{Leaf, PvNames};
use ad_roundtrip::runner::MatrixRunner;
use common::{fast_simulator, harness, scenario, spawn_ioc, statuses};
use std::time::Duration;
use tracing_test::traced_test;

#[tokio::test]
async fn test_concrete_uint8_and_float64_at_full_geometry() {
    let config = harness(256, 768);
    let ioc = spawn_ioc(&fast_simulator());
    let endpoints = Endpoints::new(ioc.clone(), PvNames::default(), Duration::from_secs(2));
    let applier = ConfigurationApplier::new(endpoints.clone());
    let driver = AcquisitionDriver::new(endpoints, config.timing.arm);
    let mut generator = FrameGenerator::seeded(ValueRange::default(), 1);

    let base = AcquisitionConfig::from_scenario(
        &scenario("concrete", ImageMode::Single, &[DataType::UInt8]),
        Shape::new(256, 768),
        DataType::UInt8,
    );
    applier.apply(&base).await.unwrap();

    for data_type in [DataType::UInt8, DataType::Float64] {
        applier.apply_data_type(data_type).await.unwrap();
        let config = base.with_data_type(data_type);
        let sent = generator.generate(config.shape, data_type);
        let received = driver.run(&config, &sent).await.unwrap();

        assert_eq!(received.data().len(), 196_608);
        assert_eq!(received.shape(), Shape::new(256, 768));
        assert_eq!(received.data_type(), data_type);
        assert_eq!(oracle::compare(&sent, &received), Verdict::Pass);
    }

    // Float64 values are drawn in [0, 255] and must come back bit for bit.
    let sent = generator.generate(Shape::new(256, 768), DataType::Float64);
    if let ElementBuffer::Float64(values) = sent.data() {
        assert!(values.iter().all(|v| (0.0..=255.0).contains(v)));
        assert!(values.iter().any(|v| v.fract() != 0.0));
    } else {
        panic!("expected float64 frame");
    }
}

#[tokio::test]
async fn test_signed_int8_frame_survives_round_trip() {
    let config = harness(256, 768);
    let ioc = spawn_ioc(&fast_simulator());
    let endpoints = Endpoints::new(ioc.clone(), PvNames::default(), Duration::from_secs(2));
    let applier = ConfigurationApplier::new(endpoints.clone());
    let driver = AcquisitionDriver::new(endpoints, config.timing.arm);

    let acquisition = AcquisitionConfig::from_scenario(
        &scenario("signed", ImageMode::Single, &[DataType::Int8]),
        config.frame.shape(),
        DataType::Int8,
    );
    applier.apply(&acquisition).await.unwrap();

    let sent = FrameGenerator::seeded(config.frame.value_range(), 1)
        .generate(acquisition.shape, DataType::Int8);
    match sent.data() {
        ElementBuffer::Int8(values) => assert!(values.iter().any(|v| *v < 0)),
        other => panic!("expected int8 frame, got {:?}", other.data_type()),
    }

    let received = driver.run(&acquisition, &sent).await.unwrap();
    assert_eq!(received.data_type(), DataType::Int8);
    assert_eq!(oracle::compare(&sent, &received), Verdict::Pass);
}

#[tokio::test]
async fn test_full_matrix_passes_in_every_default_scenario() {
    let config = harness(32, 24);
    let ioc = spawn_ioc(&config.simulator);
    let mut runner = MatrixRunner::new(ioc, &config);

    let report = runner.run_all(&config.scenarios).await.unwrap();

    assert_eq!(report.scenarios.len(), 2);
    assert_eq!(report.total_cases(), 16);
    assert!(report.all_passed(), "failures: {:?}", report.all_failures());
}

#[tokio::test]
async fn test_read_back_shape_matches_sent_shape() {
    for (width, height) in [(1, 1), (7, 3), (3, 7), (64, 2)] {
        let mut config = harness(width, height);
        config.scenarios = vec![scenario("shape", ImageMode::Single, &[DataType::Int16, DataType::Float32])];
        let ioc = spawn_ioc(&config.simulator);
        let report = MatrixRunner::new(ioc, &config)
            .run_all(&config.scenarios)
            .await
            .unwrap();
        assert!(report.all_passed(), "{width}x{height}: {:?}", report.all_failures());
        assert_eq!(report.scenarios[0].config.shape, Shape::new(width, height));
    }
}

#[tokio::test]
async fn test_verdicts_are_independent_of_type_order() {
    let forward: Vec<DataType> = DataType::ALL.to_vec();
    let reverse: Vec<DataType> = forward.iter().rev().copied().collect();

    let mut results = Vec::new();
    for order in [forward, reverse] {
        let mut config = harness(16, 16);
        config.scenarios = vec![scenario("order", ImageMode::Single, &order)];
        let ioc = spawn_ioc(&config.simulator);
        ioc.inject(ad_roundtrip::pv::Fault::CorruptElement {
            data_type: DataType::Int32,
            index: 17,
        })
        .await;
        let report = MatrixRunner::new(ioc, &config)
            .run_all(&config.scenarios)
            .await
            .unwrap();
        results.push(statuses(&report.scenarios[0]));
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0]["int32"], "VALUE_MISMATCH");
    assert_eq!(results[0]["float64"], "PASS");
}

#[tokio::test]
async fn test_append_mode_round_trip() {
    let mut config = harness(256, 768);
    let mut append = scenario("append", ImageMode::Single, &[DataType::UInt8, DataType::Float64]);
    append.array_mode = ArrayMode::Append;
    append.num_elements = 65_536;
    config.scenarios = vec![append];
    let ioc = spawn_ioc(&config.simulator);

    let report = MatrixRunner::new(ioc.clone(), &config)
        .run_all(&config.scenarios)
        .await
        .unwrap();

    assert!(report.all_passed(), "failures: {:?}", report.all_failures());
    let array_writes = ioc
        .written_leaves()
        .await
        .into_iter()
        .filter(|leaf| *leaf == Leaf::ArrayIn)
        .count();
    assert_eq!(array_writes, 6);
}

#[tokio::test]
async fn test_multiple_mode_keeps_acquiring_until_teardown() {
    let mut config = harness(8, 8);
    let mut multiple = scenario("multiple", ImageMode::Multiple, &DataType::ALL.to_vec());
    multiple.num_images = 100;
    config.scenarios = vec![multiple];
    let ioc = spawn_ioc(&config.simulator);

    let report = MatrixRunner::new(ioc.clone(), &config)
        .run_all(&config.scenarios)
        .await
        .unwrap();
    assert!(report.all_passed(), "failures: {:?}", report.all_failures());

    ioc.settle().await;
    let state = ioc.snapshot().await;
    assert!(!state.acquiring);
    assert_eq!(state.arrays_published, 8);
    assert_eq!(ioc.written_leaves().await.last(), Some(&Leaf::Acquire));
}

#[tokio::test]
#[traced_test]
async fn test_cases_are_logged_with_verdicts() {
    let mut config = harness(4, 4);
    config.scenarios = vec![scenario("logged", ImageMode::Single, &[DataType::UInt16])];
    let ioc = spawn_ioc(&config.simulator);

    MatrixRunner::new(ioc, &config)
        .run_all(&config.scenarios)
        .await
        .unwrap();

    assert!(logs_contain("case passed"));
    assert!(logs_contain("validating"));
    assert!(logs_contain("run complete"));
}
