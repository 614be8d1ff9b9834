//! Quality classification, per-metric grades and speed units

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall connection quality bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityCategory {
    Poor,
    Average,
    Good,
    Excellent,
}

impl QualityCategory {
    /// Classify a 0-100 score
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => Self::Poor,
            30..=59 => Self::Average,
            60..=84 => Self::Good,
            _ => Self::Excellent,
        }
    }
}

impl fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Poor => "Poor",
            Self::Average => "Average",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
        };
        write!(f, "{}", name)
    }
}

/// Result of `estimate_connection_quality`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: u8,
    pub quality: QualityCategory,
}

/// Letter grade for a single metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }

    /// Grade a latency in milliseconds (lower is better)
    pub fn for_ping(ms: f64) -> Self {
        if !ms.is_finite() || ms < 0.0 {
            return Self::F;
        }
        match ms {
            v if v < 20.0 => Self::APlus,
            v if v < 50.0 => Self::A,
            v if v < 80.0 => Self::B,
            v if v < 120.0 => Self::C,
            v if v < 200.0 => Self::D,
            _ => Self::F,
        }
    }

    /// Grade a download speed in Mbps
    pub fn for_download(mbps: f64) -> Self {
        Self::from_thresholds(mbps, [150.0, 100.0, 50.0, 25.0, 10.0])
    }

    /// Grade an upload speed in Mbps
    pub fn for_upload(mbps: f64) -> Self {
        Self::from_thresholds(mbps, [100.0, 50.0, 25.0, 10.0, 5.0])
    }

    // Thresholds are strict lower bounds for A+, A, B, C and D
    fn from_thresholds(value: f64, thresholds: [f64; 5]) -> Self {
        const GRADES: [Grade; 5] = [Grade::APlus, Grade::A, Grade::B, Grade::C, Grade::D];
        GRADES
            .iter()
            .zip(thresholds)
            .find(|(_, threshold)| value > *threshold)
            .map(|(grade, _)| *grade)
            .unwrap_or(Self::F)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Display unit for throughput values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedUnit {
    /// Megabits per second
    #[default]
    Mbps,
    /// Megabytes per second (1 MB/s = 8 Mbps)
    MBps,
}

impl SpeedUnit {
    /// Convert a Mbps value into this unit
    pub fn convert(&self, mbps: f64) -> f64 {
        match self {
            Self::Mbps => mbps,
            Self::MBps => mbps / 8.0,
        }
    }

    /// One-decimal representation; `"0"` when there is no value yet
    pub fn format(&self, mbps: Option<f64>) -> String {
        match mbps {
            Some(value) if value.is_finite() => format!("{:.1}", self.convert(value)),
            _ => "0".to_string(),
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Mbps => "Mbps",
            Self::MBps => "MB/s",
        }
    }

    /// Value and suffix together, e.g. `"12.5 MB/s"`
    pub fn format_with_suffix(&self, mbps: Option<f64>) -> String {
        format!("{} {}", self.format(mbps), self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_category_boundaries() {
        assert_eq!(QualityCategory::from_score(0), QualityCategory::Poor);
        assert_eq!(QualityCategory::from_score(29), QualityCategory::Poor);
        assert_eq!(QualityCategory::from_score(30), QualityCategory::Average);
        assert_eq!(QualityCategory::from_score(59), QualityCategory::Average);
        assert_eq!(QualityCategory::from_score(60), QualityCategory::Good);
        assert_eq!(QualityCategory::from_score(84), QualityCategory::Good);
        assert_eq!(QualityCategory::from_score(85), QualityCategory::Excellent);
        assert_eq!(QualityCategory::from_score(100), QualityCategory::Excellent);
    }

    #[test]
    fn test_ping_grades() {
        assert_eq!(Grade::for_ping(5.0), Grade::APlus);
        assert_eq!(Grade::for_ping(20.0), Grade::A);
        assert_eq!(Grade::for_ping(79.9), Grade::B);
        assert_eq!(Grade::for_ping(119.0), Grade::C);
        assert_eq!(Grade::for_ping(199.0), Grade::D);
        assert_eq!(Grade::for_ping(200.0), Grade::F);
        assert_eq!(Grade::for_ping(f64::NAN), Grade::F);
    }

    #[test]
    fn test_throughput_grades() {
        assert_eq!(Grade::for_download(151.0), Grade::APlus);
        assert_eq!(Grade::for_download(150.0), Grade::A);
        assert_eq!(Grade::for_download(60.0), Grade::B);
        assert_eq!(Grade::for_download(26.0), Grade::C);
        assert_eq!(Grade::for_download(11.0), Grade::D);
        assert_eq!(Grade::for_download(10.0), Grade::F);

        assert_eq!(Grade::for_upload(101.0), Grade::APlus);
        assert_eq!(Grade::for_upload(6.0), Grade::D);
        assert_eq!(Grade::for_upload(5.0), Grade::F);
        assert_eq!(Grade::for_upload(f64::NAN), Grade::F);
    }

    #[test]
    fn test_grade_display() {
        assert_eq!(Grade::APlus.to_string(), "A+");
        assert_eq!(serde_json::to_string(&Grade::APlus).unwrap(), "\"A+\"");
    }

    #[test]
    fn test_speed_unit_formatting() {
        assert_eq!(SpeedUnit::Mbps.format(Some(93.26)), "93.3");
        assert_eq!(SpeedUnit::MBps.format(Some(100.0)), "12.5");
        assert_eq!(SpeedUnit::MBps.format(None), "0");
        assert_eq!(SpeedUnit::Mbps.format(Some(f64::INFINITY)), "0");
        assert_eq!(SpeedUnit::MBps.format_with_suffix(Some(8.0)), "1.0 MB/s");
        assert_eq!(SpeedUnit::default().suffix(), "Mbps");
    }
}
