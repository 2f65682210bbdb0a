//! Persisted sweep status: which resource counts have a finished timing column.
//!
//! The status record, not the existence of the timing table, decides whether a
//! sweep is complete, so a table left half-written by a crashed step is re-run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Axis;
use crate::persist::write_atomic;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to read sweep status {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse sweep status {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write sweep status {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sweep status {path} belongs to {found_axis} up to {found_max}, expected {axis} up to {max}")]
    Mismatch {
        path: String,
        axis: Axis,
        max: usize,
        found_axis: Axis,
        found_max: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// RFC 3339 completion time.
    pub completed_at: String,
    pub iterations: usize,
    /// Thread-cap variables as the step's process saw them.
    #[serde(default)]
    pub thread_env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    NotStarted,
    Sweeping { next: usize },
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepStatus {
    pub axis: Axis,
    pub max_resource_count: usize,
    #[serde(default)]
    pub steps: BTreeMap<usize, StepRecord>,
}

impl SweepStatus {
    pub fn new(axis: Axis, max_resource_count: usize) -> Self {
        Self {
            axis,
            max_resource_count,
            steps: BTreeMap::new(),
        }
    }

    /// `None` when no status has been written yet.
    pub fn load(path: &Path) -> Result<Option<Self>, StatusError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path).map_err(|source| StatusError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StatusError::Parse {
                path: path.display().to_string(),
                source,
            })
    }

    pub fn load_or_new(path: &Path, axis: Axis, max_resource_count: usize) -> Result<Self, StatusError> {
        match Self::load(path)? {
            None => Ok(Self::new(axis, max_resource_count)),
            Some(status) if status.axis == axis && status.max_resource_count == max_resource_count => {
                Ok(status)
            }
            Some(status) => Err(StatusError::Mismatch {
                path: path.display().to_string(),
                axis,
                max: max_resource_count,
                found_axis: status.axis,
                found_max: status.max_resource_count,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StatusError> {
        let write_err = |source| StatusError::Write {
            path: path.display().to_string(),
            source,
        };
        let payload = serde_json::to_vec_pretty(self)
            .map_err(|err| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
        write_atomic(path, &payload).map_err(write_err)
    }

    pub fn mark_complete(&mut self, resource_count: usize, record: StepRecord) {
        self.steps.insert(resource_count, record);
    }

    pub fn is_step_complete(&self, resource_count: usize) -> bool {
        self.steps.contains_key(&resource_count)
    }

    /// Resource counts in `1..=max` still to be measured, in sweep order.
    pub fn pending(&self) -> Vec<usize> {
        (1..=self.max_resource_count)
            .filter(|count| !self.is_step_complete(*count))
            .collect()
    }

    pub fn state(&self) -> SweepState {
        match self.pending().first() {
            None => SweepState::Complete,
            Some(_) if self.steps.is_empty() => SweepState::NotStarted,
            Some(&next) => SweepState::Sweeping { next },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StepRecord {
        StepRecord {
            completed_at: "2026-01-01T00:00:00+00:00".to_string(),
            iterations: 4,
            thread_env: BTreeMap::from([("OMP_NUM_THREADS".to_string(), "1".to_string())]),
        }
    }

    #[test]
    fn state_moves_from_not_started_to_complete() {
        let mut status = SweepStatus::new(Axis::Threads, 3);
        assert_eq!(status.state(), SweepState::NotStarted);
        assert_eq!(status.pending(), vec![1, 2, 3]);

        status.mark_complete(1, record());
        assert_eq!(status.state(), SweepState::Sweeping { next: 2 });

        status.mark_complete(2, record());
        status.mark_complete(3, record());
        assert_eq!(status.state(), SweepState::Complete);
        assert!(status.pending().is_empty());
    }

    #[test]
    fn steps_beyond_max_do_not_count() {
        let mut status = SweepStatus::new(Axis::Processes, 2);
        status.mark_complete(5, record());
        assert_eq!(status.state(), SweepState::Sweeping { next: 1 });
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        assert_eq!(SweepStatus::load(&path).unwrap(), None);

        let mut status = SweepStatus::new(Axis::Threads, 2);
        status.mark_complete(1, record());
        status.save(&path).unwrap();

        let loaded = SweepStatus::load_or_new(&path, Axis::Threads, 2).unwrap();
        assert_eq!(loaded, status);
    }

    #[test]
    fn rejects_status_of_another_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        SweepStatus::new(Axis::Threads, 2).save(&path).unwrap();

        let err = SweepStatus::load_or_new(&path, Axis::Threads, 4).unwrap_err();
        assert!(matches!(err, StatusError::Mismatch { found_max: 2, .. }));
    }
}
