//! Sampling configuration for the trajectory driver.
//!
//! A schedule is either an explicit list of sample points or a uniform grid:
//!
//! ```toml
//! label = "pendulum"
//!
//! [schedule]
//! start = 0.0
//! stop = 2.0
//! count = 21
//! ```

use crate::errors::{RecordError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where the driver takes samples, and what to call the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Name attached to the driver's tracing span
    #[serde(default)]
    pub label: Option<String>,
    /// Sample points
    pub schedule: SampleSchedule,
}

/// Sample points, explicit or on a uniform grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleSchedule {
    /// Exactly these points, in order
    Explicit {
        /// Non-decreasing sample points
        points: Vec<f64>,
    },
    /// `count` evenly spaced points from `start` to `stop` inclusive
    Uniform {
        /// First sample point
        start: f64,
        /// Last sample point
        stop: f64,
        /// Number of points, at least one
        count: usize,
    },
}

impl SamplingConfig {
    /// Configuration for an explicit list of points
    pub fn explicit(points: Vec<f64>) -> Result<Self> {
        let config = Self {
            label: None,
            schedule: SampleSchedule::Explicit { points },
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a uniform grid
    pub fn uniform(start: f64, stop: f64, count: usize) -> Result<Self> {
        let config = Self {
            label: None,
            schedule: SampleSchedule::Uniform { start, stop, count },
        };
        config.validate()?;
        Ok(config)
    }

    /// Attach a label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| RecordError::config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Check the schedule is usable
    pub fn validate(&self) -> Result<()> {
        match &self.schedule {
            SampleSchedule::Explicit { points } => {
                if points.iter().any(|point| !point.is_finite()) {
                    return Err(RecordError::config("sample points must be finite"));
                }
                if points.windows(2).any(|pair| pair[1] < pair[0]) {
                    return Err(RecordError::config("sample points must be non-decreasing"));
                }
            }
            SampleSchedule::Uniform { start, stop, count } => {
                if !start.is_finite() || !stop.is_finite() {
                    return Err(RecordError::config("start and stop must be finite"));
                }
                if stop < start {
                    return Err(RecordError::config(format!(
                        "stop ({stop}) is before start ({start})"
                    )));
                }
                if *count == 0 {
                    return Err(RecordError::config("count must be at least 1"));
                }
            }
        }
        Ok(())
    }

    /// Materialize the sample points.
    ///
    /// The schedule is validated first, since the fields are public and may
    /// have been edited after construction.
    pub fn points(&self) -> Result<Vec<f64>> {
        self.validate()?;
        let points = match &self.schedule {
            SampleSchedule::Explicit { points } => points.clone(),
            SampleSchedule::Uniform { start, count: 1, .. } => vec![*start],
            SampleSchedule::Uniform { start, stop, count } => {
                let step = (stop - start) / (*count - 1) as f64;
                (0..*count).map(|i| start + step * i as f64).collect()
            }
        };
        Ok(points)
    }
}
