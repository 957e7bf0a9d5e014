//! Recording of committed samples and persistence of the result table.

use crate::clock::{FloatValue, Time};
use crate::errors::{CosimError, CosimResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Accepts `(t, values)` samples in time order.
pub trait ResultRecorder {
    /// Record values at time `t`.
    ///
    /// Unless `force` is set, a sample at the time of the last recorded
    /// sample is ignored.
    fn sample(&mut self, t: Time, values: &[FloatValue], force: bool);

    /// Table of everything recorded so far.
    fn result(&self) -> ResultTable;
}

/// Time-indexed rows of named values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultTable {
    pub names: Vec<String>,
    pub rows: Vec<(Time, Vec<FloatValue>)>,
}

impl ResultTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn times(&self) -> Vec<Time> {
        self.rows.iter().map(|(t, _)| *t).collect()
    }

    /// Values of a single column, if it exists.
    pub fn column(&self, name: &str) -> Option<Vec<FloatValue>> {
        let index = self.names.iter().position(|n| n == name)?;
        Some(self.rows.iter().map(|(_, values)| values[index]).collect())
    }

    /// Write the table as CSV with a leading `time` column.
    pub fn write_csv_to<W: Write>(&self, writer: W) -> CosimResult<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec!["time".to_string()];
        header.extend(self.names.iter().cloned());
        wtr.write_record(&header).map_err(csv_error)?;

        for (time, values) in &self.rows {
            let mut record = vec![time.to_string()];
            record.extend(values.iter().map(|v| v.to_string()));
            wtr.write_record(&record).map_err(csv_error)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Write the table to `path`, creating the parent directory if needed.
    pub fn write_csv(&self, path: &Path) -> CosimResult<()> {
        let write = || -> CosimResult<()> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = fs::File::create(path)?;
            self.write_csv_to(file)
        };

        write().map_err(|err| CosimError::ResultWrite {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
        info!("Wrote {} samples to {}", self.len(), path.display());
        Ok(())
    }
}

fn csv_error(err: csv::Error) -> CosimError {
    CosimError::Io(err.into())
}

/// In-memory recorder keeping every accepted sample.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    table: ResultTable,
}

impl Recorder {
    /// A recorder for the given column names.
    pub fn new(names: Vec<String>) -> Self {
        Self {
            table: ResultTable {
                names,
                rows: Vec::new(),
            },
        }
    }

    pub fn names(&self) -> &[String] {
        &self.table.names
    }
}

impl ResultRecorder for Recorder {
    fn sample(&mut self, t: Time, values: &[FloatValue], force: bool) {
        if !force {
            if let Some((last, _)) = self.table.rows.last() {
                if *last == t {
                    return;
                }
            }
        }
        self.table.rows.push((t, values.to_vec()));
    }

    fn result(&self) -> ResultTable {
        self.table.clone()
    }
}
