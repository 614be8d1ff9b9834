//! End-to-end tests against a local mock server
//!
//! These run the real reqwest transport over loopback, so timings are real
//! and assertions leave room for scheduling noise.

use speed_probe::{
    probe_latency, run_throughput_test, Config, Direction, LatencyConfig, LatencyOutcome, MeasurementSource,
    ReqwestTransport, SampleOrigin, SpeedTest, Stage, ThroughputCallbacks, ThroughputConfig, Transport,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn transport() -> Arc<dyn Transport> {
    Arc::new(ReqwestTransport::new().unwrap())
}

async fn mount_ping(server: &MockServer, delay_ms: u64) {
    Mock::given(method("HEAD"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(delay_ms)))
        .mount(server)
        .await;
}

async fn mount_file(server: &MockServer, size: usize, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; size])
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}

async fn mount_sink(server: &MockServer, delay_ms: u64) {
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(delay_ms)))
        .mount(server)
        .await;
}

/// Loopback is far faster than any real link, so lift the sanity ceiling
fn loopback_throughput(base: ThroughputConfig, endpoint: String) -> ThroughputConfig {
    ThroughputConfig {
        endpoints: vec![endpoint],
        duration_ms: 1000,
        max_speed_mbps: 1_000_000.0,
        ..base
    }
}

#[derive(Default, Clone)]
struct Recorder {
    points: Arc<Mutex<Vec<speed_probe::Sample>>>,
    completes: Arc<Mutex<Vec<(f64, Instant)>>>,
}

impl Recorder {
    fn callbacks(&self) -> ThroughputCallbacks {
        let points = self.points.clone();
        let completes = self.completes.clone();
        ThroughputCallbacks::new()
            .on_data_point(move |sample| points.lock().unwrap().push(*sample))
            .on_complete(move |value| completes.lock().unwrap().push((value, Instant::now())))
    }
}

#[tokio::test]
async fn test_latency_against_mock_endpoint() {
    let server = MockServer::start().await;
    mount_ping(&server, 40).await;

    let config = LatencyConfig {
        endpoints: vec![format!("{}/ping", server.uri())],
        ..LatencyConfig::default()
    };
    let outcome = probe_latency(transport(), config).await.unwrap();

    match outcome {
        // 40 ms * 0.85 = 34, plus loopback overhead
        LatencyOutcome::Measured { millis } => assert!((34..=120).contains(&millis), "latency {}", millis),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_latency_endpoints_fail() {
    let config = LatencyConfig {
        endpoints: vec!["http://127.0.0.1:9/".to_string()],
        timeout_ms: 2000,
        ..LatencyConfig::default()
    };

    let outcome = probe_latency(transport(), config).await.unwrap();
    assert_eq!(outcome, LatencyOutcome::Failed);
    assert_eq!(outcome.as_sentinel_millis(), -1);
}

#[tokio::test]
async fn test_always_failing_download_pool_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = ThroughputConfig {
        max_failed_attempts: 2,
        ..loopback_throughput(ThroughputConfig::download(), format!("{}/file.bin", server.uri()))
    };
    let recorder = Recorder::default();

    let started = Instant::now();
    let outcome = run_throughput_test(Direction::Download, transport(), config.clone(), recorder.callbacks())
        .unwrap()
        .wait()
        .await
        .unwrap();

    let completes = recorder.completes.lock().unwrap().clone();
    assert_eq!(completes.len(), 1);
    let (value, at) = completes[0];
    assert!(at.duration_since(started) < Duration::from_millis(1500));

    let min = config.fallback_buckets.iter().map(|b| b.min).fold(f64::INFINITY, f64::min);
    let max = config.fallback_buckets.iter().map(|b| b.max).fold(0.0, f64::max);
    assert!(value >= min && value <= max, "fallback value {} outside [{}, {}]", value, min, max);

    assert_eq!(outcome.source, MeasurementSource::Synthetic);
    assert_eq!(outcome.failed_attempts, 2);
    assert!(recorder.points.lock().unwrap().iter().any(|s| s.origin == SampleOrigin::Backfill));
}

#[tokio::test]
async fn test_download_against_mock_file() {
    let server = MockServer::start().await;
    mount_file(&server, 512 * 1024, 50).await;

    let config = loopback_throughput(ThroughputConfig::download(), format!("{}/file.bin", server.uri()));
    let outcome = run_throughput_test(Direction::Download, transport(), config, ThroughputCallbacks::new())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(outcome.source, MeasurementSource::Measured);
    assert!(outcome.value.is_finite() && outcome.value > 0.0);
    assert!(outcome.measured_samples >= 3);
    for pair in outcome.samples.windows(2) {
        assert!(pair[1].time >= pair[0].time);
    }
}

#[tokio::test]
async fn test_upload_against_mock_sink() {
    let server = MockServer::start().await;
    mount_sink(&server, 50).await;

    let config = ThroughputConfig {
        concurrency: 2,
        payload_sizes: vec![64 * 1024],
        ..loopback_throughput(ThroughputConfig::upload(), format!("{}/upload", server.uri()))
    };
    let outcome = run_throughput_test(Direction::Upload, transport(), config, ThroughputCallbacks::new())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(outcome.source, MeasurementSource::Measured);
    assert!(outcome.value > 0.0);
    assert_eq!(outcome.failed_attempts, 0);

    let requests = server.received_requests().await.unwrap();
    assert!(requests.len() >= 6);
    assert!(requests.iter().all(|r| r.body.len() == 64 * 1024));
}

#[tokio::test]
async fn test_cancel_aborts_hanging_download() {
    let server = MockServer::start().await;
    mount_file(&server, 1024, 30_000).await;

    let config = loopback_throughput(ThroughputConfig::download(), format!("{}/file.bin", server.uri()));
    let recorder = Recorder::default();
    let controller = run_throughput_test(Direction::Download, transport(), config, recorder.callbacks()).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(controller.cancel());

    let outcome = tokio::time::timeout(Duration::from_secs(2), controller.wait()).await.unwrap();
    assert!(outcome.is_none());
    assert!(recorder.completes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_full_session_against_mock_server() {
    let server = MockServer::start().await;
    mount_ping(&server, 20).await;
    mount_file(&server, 256 * 1024, 30).await;
    mount_sink(&server, 30).await;

    let config = Config {
        latency: LatencyConfig {
            endpoints: vec![format!("{}/ping", server.uri())],
            ..LatencyConfig::default()
        },
        download: loopback_throughput(ThroughputConfig::download(), format!("{}/file.bin", server.uri())),
        upload: ThroughputConfig {
            payload_sizes: vec![32 * 1024],
            ..loopback_throughput(ThroughputConfig::upload(), format!("{}/upload", server.uri()))
        },
        ..Config::default()
    };

    let test = SpeedTest::new(transport(), config).unwrap();
    let results = test.start().await.unwrap().unwrap();

    assert!(results.is_complete());
    assert!(!results.ping.unwrap().is_synthetic());
    assert!(!results.download.unwrap().is_synthetic());
    assert!(!results.upload.unwrap().is_synthetic());

    let snapshot = test.snapshot();
    assert_eq!(snapshot.stage, Stage::Completed);
    assert!(!snapshot.download_samples.is_empty());
    assert!(!snapshot.upload_samples.is_empty());
    assert!(test.quality().is_some());
}
