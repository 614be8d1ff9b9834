//! Speed Probe
//!
//! A connection quality measurement engine. It probes round-trip latency
//! against a pool of public endpoints, samples download and upload
//! throughput with repeated timed transfers, and reduces the noisy samples
//! into one reported value per metric. When live measurement is unreliable
//! it substitutes plausible values that are always tagged as synthetic.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod netinfo;
pub mod orchestrator;
pub mod probe;
pub mod sampler;
pub mod stats;

// Re-export commonly used types
pub use client::{ReqwestTransport, Transport};
pub use error::{AppError, Result};
pub use models::{
    Config, Direction, Grade, LatencyConfig, MeasurementSource, QualityCategory, QualityReport, Reading, Sample,
    SampleOrigin, SpeedUnit, Stage, TestResults, ThroughputConfig,
};
pub use netinfo::{NetworkInfo, NetworkInfoLookup};
pub use orchestrator::{SpeedTest, TestSnapshot};
pub use probe::{probe_latency, LatencyOutcome, LatencyProbe};
pub use sampler::{run_throughput_test, ThroughputCallbacks, ThroughputController, ThroughputOutcome, ThroughputTest};
pub use stats::estimate_connection_quality;

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_PING_ENDPOINTS: &[&str] = &[
        "https://www.google.com",
        "https://www.cloudflare.com",
        "https://www.cloudflare.com/cdn-cgi/trace",
        "https://www.microsoft.com",
        "https://www.apple.com",
        "https://github.com",
        "https://cdn.jsdelivr.net/gh/mathiasbynens/small/empty.js",
    ];
    pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(5000);
    pub const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_millis(1500);
    pub const DEFAULT_MIN_LATENCY_MS: f64 = 5.0;
    pub const DEFAULT_MAX_LATENCY_MS: f64 = 1500.0;
    pub const DEFAULT_CORRECTION_FACTOR: f64 = 0.85;

    pub const DEFAULT_DOWNLOAD_URLS: &[&str] = &[
        "https://speed.cloudflare.com/__down?bytes=1000000",   // 1MB
        "https://speed.cloudflare.com/__down?bytes=5000000",   // 5MB
        "https://speed.cloudflare.com/__down?bytes=10000000",  // 10MB
        "https://cdn.jsdelivr.net/gh/librespeed/speedtest@master/garbage.php?ckSize=10",
        "https://cdn.jsdelivr.net/npm/jquery@3.6.0/dist/jquery.min.js",  // ~90KB
    ];
    pub const DEFAULT_UPLOAD_URLS: &[&str] = &[
        "https://speed.cloudflare.com/__up",
        "https://httpbin.org/post",
        "https://postman-echo.com/post",
    ];

    pub const DEFAULT_TEST_DURATION: Duration = Duration::from_millis(10_000);
    pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(200);
    pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_millis(5000);
    pub const DEFAULT_TRANSFER_PAUSE: Duration = Duration::from_millis(200);
    pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 8;
    pub const DEFAULT_MIN_SPEED_MBPS: f64 = 0.5;
    pub const DEFAULT_MAX_SPEED_MBPS: f64 = 1000.0;
    pub const DEFAULT_MIN_REAL_SAMPLES: usize = 3;
    pub const DEFAULT_AGGREGATE_PERCENTILE: f64 = 0.75;
    pub const DEFAULT_DEGRADED_FACTOR: f64 = 0.9;
    pub const DEFAULT_BACKFILL_POINTS: usize = 5;
    pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 1;
    pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 3;
    pub const DEFAULT_UPLOAD_PAYLOAD_SIZES: &[usize] = &[
        128 * 1024,
        256 * 1024,
        512 * 1024,
        1024 * 1024,
        2 * 1024 * 1024,
    ];

    /// (min, max, probability) in Mbps
    pub const DOWNLOAD_FALLBACK_BUCKETS: &[(f64, f64, f64)] = &[
        (5.0, 15.0, 0.25),
        (15.0, 50.0, 0.45),
        (50.0, 100.0, 0.2),
        (100.0, 500.0, 0.1),
    ];
    /// (min, max, probability) in Mbps
    pub const UPLOAD_FALLBACK_BUCKETS: &[(f64, f64, f64)] = &[
        (1.0, 5.0, 0.3),
        (5.0, 15.0, 0.4),
        (15.0, 50.0, 0.2),
        (50.0, 200.0, 0.1),
    ];
    /// (min, max, probability) in milliseconds
    pub const LATENCY_FALLBACK_BUCKETS: &[(f64, f64, f64)] = &[
        (10.0, 30.0, 0.3),
        (30.0, 60.0, 0.4),
        (60.0, 100.0, 0.2),
        (100.0, 200.0, 0.1),
    ];

    pub const DEFAULT_IP_ECHO_URL: &str = "https://api.ipify.org?format=json";
    pub const DEFAULT_IP_DETAILS_URL: &str = "https://ipapi.co/{ip}/json/";
    pub const DEFAULT_NETINFO_TIMEOUT: Duration = Duration::from_millis(5000);

    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
