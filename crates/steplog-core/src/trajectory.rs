//! Time-indexed sequences of records.
//!
//! The driver calls the recording form of a step function once per sample
//! point, each time against a fresh record, and keeps `(point, record)` pairs
//! in order. Nothing carries over between samples: the keys of each record
//! depend only on the code path taken for that call.

use crate::config::SamplingConfig;
use crate::context::{call_recording, Context};
use crate::errors::{RecordError, Result};
use crate::record::Record;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// One sample: where it was taken and what was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample<P> {
    /// Sample point (typically a time stamp)
    pub point: P,
    /// Record produced by the step function at this point
    pub record: Record,
}

/// Ordered sequence of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory<P> {
    samples: Vec<Sample<P>>,
}

impl<P> Default for Trajectory<P> {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
        }
    }
}

impl<P> Trajectory<P> {
    /// Create an empty trajectory
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample
    pub fn push(&mut self, point: P, record: Record) {
        self.samples.push(Sample { point, record });
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples were taken
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate over samples in order
    pub fn iter(&self) -> std::slice::Iter<'_, Sample<P>> {
        self.samples.iter()
    }

    /// Sample points in order
    pub fn points(&self) -> impl Iterator<Item = &P> {
        self.samples.iter().map(|sample| &sample.point)
    }

    /// Records in order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.samples.iter().map(|sample| &sample.record)
    }

    /// The value at `path` in every sample.
    ///
    /// Fails with [`RecordError::MissingSeries`] at the first sample that
    /// does not carry the path.
    pub fn series(&self, path: &str) -> Result<Vec<&Value>> {
        self.samples
            .iter()
            .enumerate()
            .map(|(index, sample)| {
                sample
                    .record
                    .get_path(path)?
                    .ok_or_else(|| RecordError::MissingSeries {
                        path: path.to_owned(),
                        index,
                    })
            })
            .collect()
    }

    /// Numeric column at `path`; integers widen to `f64`
    pub fn series_f64(&self, path: &str) -> Result<Vec<f64>> {
        self.series(path)?
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                value.as_f64().ok_or_else(|| RecordError::NonNumericSeries {
                    path: path.to_owned(),
                    index,
                })
            })
            .collect()
    }
}

impl<P> IntoIterator for Trajectory<P> {
    type Item = Sample<P>;
    type IntoIter = std::vec::IntoIter<Sample<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl<'a, P> IntoIterator for &'a Trajectory<P> {
    type Item = &'a Sample<P>;
    type IntoIter = std::slice::Iter<'a, Sample<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Call `step` in recording mode at every point and collect the records.
///
/// Each call gets a fresh record. The first error aborts sampling and is
/// returned unchanged.
pub fn sample<P, T, I, F>(points: I, mut step: F) -> Result<Trajectory<P>>
where
    I: IntoIterator<Item = P>,
    F: FnMut(&P, &mut Context<'_>) -> Result<T>,
{
    let mut trajectory = Trajectory::new();
    for point in points {
        let record = call_recording(|ctx| step(&point, ctx))?;
        tracing::debug!(
            index = trajectory.len(),
            keys = record.len(),
            "sampled record"
        );
        trajectory.push(point, record);
    }
    Ok(trajectory)
}

/// [`sample`] over the points of a [`SamplingConfig`], inside a tracing span
/// named after the configured label.
pub fn sample_with_config<T, F>(config: &SamplingConfig, step: F) -> Result<Trajectory<f64>>
where
    F: FnMut(&f64, &mut Context<'_>) -> Result<T>,
{
    let points = config.points()?;
    let label = config.label.as_deref().unwrap_or("trajectory");
    let span = tracing::info_span!("sample", label);
    let _entered = span.enter();

    let trajectory = sample(points, step)?;
    tracing::info!(samples = trajectory.len(), "sampling complete");
    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(t: &f64, ctx: &mut Context<'_>) -> Result<f64> {
        ctx.log("t", *t)?;
        if *t > 0.5 {
            ctx.log("late", true)?;
        }
        Ok(*t)
    }

    #[test]
    fn one_record_per_point_without_leakage() {
        let trajectory = sample(vec![0.0, 1.0, 0.25], step).unwrap();

        assert_eq!(trajectory.len(), 3);
        let key_counts: Vec<usize> = trajectory.records().map(Record::len).collect();
        assert_eq!(key_counts, vec![1, 2, 1]);
        assert_eq!(trajectory.series_f64("t").unwrap(), vec![0.0, 1.0, 0.25]);
    }

    #[test]
    fn missing_column_reports_first_gap() {
        let trajectory = sample(vec![1.0, 0.0], step).unwrap();
        assert_eq!(
            trajectory.series("late").unwrap_err(),
            RecordError::MissingSeries {
                path: "late".into(),
                index: 1
            }
        );
        assert!(matches!(
            sample(vec![1.0], step).unwrap().series_f64("late"),
            Err(RecordError::NonNumericSeries { index: 0, .. })
        ));
    }

    #[test]
    fn step_errors_abort_sampling() {
        let err = sample(vec![0.0], |_, ctx| {
            ctx.log("x", 1)?;
            ctx.log("x", 2)
        })
        .unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn config_driven_sampling_uses_schedule() {
        let config = SamplingConfig::uniform(0.0, 1.0, 3).unwrap().with_label("unit");
        let trajectory = sample_with_config(&config, step).unwrap();
        assert_eq!(trajectory.points().copied().collect::<Vec<_>>(), vec![0.0, 0.5, 1.0]);
    }
}
