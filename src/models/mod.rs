//! Data models and configuration structures for the measurement engine

pub mod config;
pub mod metrics;
pub mod quality;

// Re-export main model types
pub use config::{Config, LatencyConfig, ThroughputConfig};
pub use metrics::{
    Direction, DistributionBucket, MeasurementSource, Reading, Sample, SampleOrigin, Stage, TestResults,
};
pub use quality::{Grade, QualityCategory, QualityReport, SpeedUnit};
