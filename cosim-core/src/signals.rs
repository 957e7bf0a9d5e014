//! Exogenous driving signals applied to the model before each step.

use crate::clock::{FloatValue, Time};
use crate::errors::{CosimError, CosimResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of time-indexed input values for named model variables.
pub trait SignalInput: fmt::Debug {
    /// Model variable names, in the order of [`SignalInput::values_at`].
    fn names(&self) -> &[String];

    /// Values of every signal at time `t`.
    fn values_at(&self, t: Time) -> Vec<FloatValue>;
}

/// How values between two table rows are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationStrategy {
    /// Linear interpolation between the surrounding rows.
    #[default]
    Linear,
    /// The value of the latest row at or before the requested time.
    Previous,
}

/// A table of signal values with a time column.
///
/// Outside the table's time range the first or last row is held.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTable {
    names: Vec<String>,
    times: Array1<Time>,
    values: Array2<FloatValue>,
    strategy: InterpolationStrategy,
}

impl SignalTable {
    /// Build a table from column names and rows.
    ///
    /// The first column must be `time` and the times must not decrease.
    pub fn from_rows(
        names: &[String],
        rows: &[Vec<FloatValue>],
        strategy: InterpolationStrategy,
    ) -> CosimResult<Self> {
        match names.first() {
            Some(first) if first == "time" => {}
            _ => {
                return Err(CosimError::configuration(
                    "The first input signal column must be 'time'",
                ))
            }
        }
        if names.len() < 2 {
            return Err(CosimError::configuration(
                "Input signals must define at least one signal besides 'time'",
            ));
        }
        if rows.is_empty() {
            return Err(CosimError::configuration("Input signals contain no data"));
        }

        let columns = names.len();
        let mut flat = Vec::with_capacity(rows.len() * (columns - 1));
        let mut times = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns {
                return Err(CosimError::configuration(format!(
                    "Input signal row {} has {} values, expected {}",
                    index,
                    row.len(),
                    columns
                )));
            }
            if let Some(&previous) = times.last() {
                if row[0] < previous {
                    return Err(CosimError::configuration(format!(
                        "Input signal times must not decrease (row {}: {} < {})",
                        index, row[0], previous
                    )));
                }
            }
            times.push(row[0]);
            flat.extend_from_slice(&row[1..]);
        }

        let values = Array2::from_shape_vec((rows.len(), columns - 1), flat)
            .map_err(|e| CosimError::configuration(format!("Invalid input signals: {}", e)))?;

        Ok(Self {
            names: names[1..].to_vec(),
            times: Array1::from(times),
            values,
            strategy,
        })
    }

    pub fn strategy(&self) -> InterpolationStrategy {
        self.strategy
    }
}

impl SignalInput for SignalTable {
    fn names(&self) -> &[String] {
        &self.names
    }

    fn values_at(&self, t: Time) -> Vec<FloatValue> {
        let rows = self.times.len();
        // Number of rows at or before t
        let after = self.times.iter().take_while(|&&time| time <= t).count();

        if after == 0 {
            return self.values.row(0).to_vec();
        }
        if after == rows {
            return self.values.row(rows - 1).to_vec();
        }

        let lower = after - 1;
        match self.strategy {
            InterpolationStrategy::Previous => self.values.row(lower).to_vec(),
            InterpolationStrategy::Linear => {
                let (t0, t1) = (self.times[lower], self.times[after]);
                let weight = (t - t0) / (t1 - t0);
                self.values
                    .row(lower)
                    .iter()
                    .zip(self.values.row(after).iter())
                    .map(|(v0, v1)| v0 + weight * (v1 - v0))
                    .collect()
            }
        }
    }
}
