//! # Frequency Tables
//!
//! The in-memory representation of a trajectory or genotype table: rows
//! keyed by string id, columns keyed by numeric timepoint, cells holding a
//! frequency in [0, 1]. Missing observations are stored as NaN so that a
//! cell that was never measured is distinguishable from a frequency of
//! zero.
//!
//! Tables are value types: every transformation returns a new table, and a
//! table is never mutated after construction.

use std::collections::HashMap;

use crate::error::{ClonesiftError, Result};

/// A rows-by-timepoints frequency table.
///
/// Columns are always sorted ascending by numeric timepoint value,
/// regardless of the order they arrived in.
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    timepoints: Vec<f64>,
    ids: Vec<String>,
    rows: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
}

impl FrequencyTable {
    /// Build a table from a timepoint domain and (id, values) rows.
    ///
    /// Rejects duplicate ids, rows whose length disagrees with the
    /// timepoint domain, and non-missing frequencies outside [0, 1].
    pub fn new(timepoints: Vec<f64>, rows: Vec<(String, Vec<f64>)>) -> Result<Self> {
        if timepoints.is_empty() {
            return Err(ClonesiftError::invalid_data(
                "table has no timepoint columns",
            ));
        }

        // Sort the column domain ascending and remember the permutation so
        // every row can be reordered to match.
        let mut order: Vec<usize> = (0..timepoints.len()).collect();
        order.sort_by(|&a, &b| {
            timepoints[a]
                .partial_cmp(&timepoints[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let sorted_timepoints: Vec<f64> = order.iter().map(|&i| timepoints[i]).collect();
        if sorted_timepoints.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(ClonesiftError::invalid_data(
                "table has duplicate timepoint columns",
            ));
        }

        let mut ids = Vec::with_capacity(rows.len());
        let mut data = Vec::with_capacity(rows.len());
        let mut index = HashMap::with_capacity(rows.len());
        for (id, values) in rows {
            if values.len() != sorted_timepoints.len() {
                return Err(ClonesiftError::invalid_data(format!(
                    "row {id} has {} values for {} timepoints",
                    values.len(),
                    sorted_timepoints.len()
                )));
            }
            for &value in &values {
                if !value.is_nan() && !(0.0..=1.0).contains(&value) {
                    return Err(ClonesiftError::invalid_data(format!(
                        "row {id} contains frequency {value} outside [0, 1]"
                    )));
                }
            }
            if index.insert(id.clone(), ids.len()).is_some() {
                return Err(ClonesiftError::invalid_data(format!("duplicate row id {id}")));
            }
            data.push(order.iter().map(|&i| values[i]).collect());
            ids.push(id);
        }

        Ok(Self {
            timepoints: sorted_timepoints,
            ids,
            rows: data,
            index,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The ascending timepoint domain shared by every row.
    pub fn timepoints(&self) -> &[f64] {
        &self.timepoints
    }

    /// Row ids in table order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Position of a row id in table order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Row view by position.
    pub fn row(&self, position: usize) -> SeriesView<'_> {
        SeriesView {
            id: &self.ids[position],
            timepoints: &self.timepoints,
            values: &self.rows[position],
        }
    }

    /// Row view by id.
    pub fn series(&self, id: &str) -> Option<SeriesView<'_>> {
        self.position(id).map(|position| self.row(position))
    }

    /// Iterate rows in table order.
    pub fn iter(&self) -> impl Iterator<Item = SeriesView<'_>> {
        (0..self.len()).map(move |position| self.row(position))
    }

    /// A new table containing the same rows reordered by `order`.
    ///
    /// Ids absent from the table are an algorithm error; `order` must be a
    /// permutation of the table's id set.
    pub fn reordered(&self, order: &[String]) -> Result<Self> {
        if order.len() != self.len() {
            return Err(ClonesiftError::algorithm(format!(
                "reorder of {} rows given {} ids",
                self.len(),
                order.len()
            )));
        }
        let mut rows = Vec::with_capacity(order.len());
        for id in order {
            let position = self.position(id).ok_or_else(|| {
                ClonesiftError::algorithm(format!("reorder references unknown row {id}"))
            })?;
            rows.push((id.clone(), self.rows[position].clone()));
        }
        Self::new(self.timepoints.clone(), rows)
    }
}

/// A borrowed view of one row of a [`FrequencyTable`].
#[derive(Debug, Clone, Copy)]
pub struct SeriesView<'a> {
    pub id: &'a str,
    pub timepoints: &'a [f64],
    pub values: &'a [f64],
}

impl<'a> SeriesView<'a> {
    /// Index of the first timepoint whose value exceeds `threshold`.
    /// Missing cells never cross.
    pub fn first_crossing(&self, threshold: f64) -> Option<usize> {
        self.values
            .iter()
            .position(|&value| !value.is_nan() && value > threshold)
    }

    /// Whether the series exceeds the fixation threshold at any timepoint.
    pub fn fixed(&self, fixed_limit: f64) -> bool {
        self.values
            .iter()
            .any(|&value| !value.is_nan() && value > fixed_limit)
    }

    /// Value at a column position (NaN for missing).
    pub fn value(&self, position: usize) -> f64 {
        self.values[position]
    }
}
