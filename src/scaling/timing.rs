//! Timing table: one column of microsecond samples per resource count.
//!
//! Stored as CSV. The header row holds the resource counts, each later row one
//! iteration. Columns may differ in length; missing cells are left empty.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::persist::write_atomic;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("timing table {path} not found")]
    Missing { path: String },
    #[error("timing table I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("timing table CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("timing table header '{0}' is not a resource count")]
    InvalidHeader(String),
    #[error("timing table column {column} listed twice")]
    DuplicateColumn { column: usize },
    #[error("timing table cell '{value}' (row {row}, column {column}) is not a duration")]
    InvalidCell {
        row: usize,
        column: usize,
        value: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingTable {
    columns: BTreeMap<usize, Vec<u64>>,
}

impl TimingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the samples measured under `resource_count`.
    pub fn set_column(&mut self, resource_count: usize, samples: Vec<u64>) {
        self.columns.insert(resource_count, samples);
    }

    pub fn column(&self, resource_count: usize) -> Option<&[u64]> {
        self.columns.get(&resource_count).map(Vec::as_slice)
    }

    pub fn columns(&self) -> impl Iterator<Item = (usize, &[u64])> {
        self.columns
            .iter()
            .map(|(count, samples)| (*count, samples.as_slice()))
    }

    pub fn resource_counts(&self) -> Vec<usize> {
        self.columns.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.columns.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, TableError> {
        if self.columns.is_empty() {
            return Ok(Vec::new());
        }
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.columns.keys().map(|count| count.to_string()))?;
        for row in 0..self.rows() {
            writer.write_record(
                self.columns
                    .values()
                    .map(|samples| samples.get(row).map(u64::to_string).unwrap_or_default()),
            )?;
        }
        writer.into_inner().map_err(|err| TableError::Io(err.into_error()))
    }

    pub fn from_csv<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let mut counts = Vec::new();
        let mut columns = BTreeMap::new();
        for header in reader.headers()?.iter() {
            let count: usize = header
                .trim()
                .parse()
                .map_err(|_| TableError::InvalidHeader(header.to_string()))?;
            if columns.insert(count, Vec::new()).is_some() {
                return Err(TableError::DuplicateColumn { column: count });
            }
            counts.push(count);
        }
        // Only trailing cells may be empty.
        let mut padded = vec![false; counts.len()];
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            for ((position, &count), cell) in counts.iter().enumerate().zip(record.iter()) {
                let cell = cell.trim();
                if cell.is_empty() {
                    padded[position] = true;
                    continue;
                }
                if padded[position] {
                    return Err(TableError::InvalidCell {
                        row,
                        column: count,
                        value: cell.to_string(),
                    });
                }
                let value = cell.parse::<u64>().map_err(|_| TableError::InvalidCell {
                    row,
                    column: count,
                    value: cell.to_string(),
                })?;
                if let Some(samples) = columns.get_mut(&count) {
                    samples.push(value);
                }
            }
        }
        Ok(Self { columns })
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        if !path.exists() {
            return Err(TableError::Missing {
                path: path.display().to_string(),
            });
        }
        Self::from_csv(File::open(path)?)
    }

    /// Like [TimingTable::load] but an absent file is an empty table.
    pub fn load_or_empty(path: &Path) -> Result<Self, TableError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        write_atomic(path, &self.to_csv()?)?;
        Ok(())
    }
}
