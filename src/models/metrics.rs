//! Measurement data model: samples, readings, stages and results

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a throughput sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleOrigin {
    /// Computed from bytes actually transferred
    Measured,
    /// Stand-in emitted after a failed transfer (`last_good * degraded_factor`)
    Degraded,
    /// Filler emitted alongside a fallback aggregate
    Backfill,
}

impl SampleOrigin {
    pub fn is_synthetic(&self) -> bool {
        !matches!(self, Self::Measured)
    }
}

/// One timestamped instantaneous throughput observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the run started
    pub time: f64,
    /// Megabits per second
    pub value: f64,
    pub origin: SampleOrigin,
}

impl Sample {
    pub fn new(time: f64, value: f64, origin: SampleOrigin) -> Self {
        Self { time, value, origin }
    }

    pub fn measured(time: f64, value: f64) -> Self {
        Self::new(time, value, SampleOrigin::Measured)
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin.is_synthetic()
    }
}

/// Whether a reported value was measured or substituted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementSource {
    Measured,
    Synthetic,
}

/// A final per-metric value with its provenance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f64,
    pub source: MeasurementSource,
}

impl Reading {
    pub fn measured(value: f64) -> Self {
        Self { value, source: MeasurementSource::Measured }
    }

    pub fn synthetic(value: f64) -> Self {
        Self { value, source: MeasurementSource::Synthetic }
    }

    pub fn is_synthetic(&self) -> bool {
        self.source == MeasurementSource::Synthetic
    }
}

/// Transfer direction of a throughput run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => write!(f, "Download"),
            Self::Upload => write!(f, "Upload"),
        }
    }
}

/// Orchestrator stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Ping,
    Download,
    Upload,
    Completed,
}

impl Stage {
    /// Full-scale value for a gauge displaying this stage's live speed
    pub fn gauge_max(&self) -> f64 {
        match self {
            Self::Download => 200.0,
            Self::Upload => 100.0,
            _ => 100.0,
        }
    }

    /// True while a measurement stage is in progress
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Ping | Self::Download | Self::Upload)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Ping => "ping",
            Self::Download => "download",
            Self::Upload => "upload",
            Self::Completed => "completed",
        };
        write!(f, "{}", name)
    }
}

impl From<Direction> for Stage {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Download => Stage::Download,
            Direction::Upload => Stage::Upload,
        }
    }
}

/// Results of one full test. Fields fill in the order ping, download, upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    /// Milliseconds
    pub ping: Option<Reading>,
    /// Mbps
    pub download: Option<Reading>,
    /// Mbps
    pub upload: Option<Reading>,
}

impl TestResults {
    pub fn is_complete(&self) -> bool {
        self.ping.is_some() && self.download.is_some() && self.upload.is_some()
    }

    /// True if any stored reading was substituted rather than measured
    pub fn has_synthetic(&self) -> bool {
        [self.ping, self.download, self.upload]
            .iter()
            .flatten()
            .any(Reading::is_synthetic)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One range of a fallback distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionBucket {
    pub min: f64,
    pub max: f64,
    pub probability: f64,
}

impl DistributionBucket {
    pub fn new(min: f64, max: f64, probability: f64) -> Self {
        Self { min, max, probability }
    }

    /// Build buckets from `(min, max, probability)` tuples
    pub fn from_table(table: &[(f64, f64, f64)]) -> Vec<Self> {
        table.iter().map(|&(min, max, probability)| Self::new(min, max, probability)).collect()
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}
