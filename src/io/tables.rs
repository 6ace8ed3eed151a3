//! # Table Reading and Writing
//!
//! Converts between delimited files and the in-memory tables. The reader
//! treats the first column as the trajectory id, every column whose
//! header parses as a number (optionally behind a single prefix
//! character, e.g. `X0`) as a timepoint, and anything else as display
//! metadata carried through to the annotated output. Delimiter follows
//! the file extension: tab for `.tsv`, comma otherwise.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::data::genotype::{GenotypeTable, LineageEdge};
use crate::data::table::FrequencyTable;
use crate::error::{ClonesiftError, Result};
use crate::model::muller::PopulationTable;
use crate::model::pairwise::TrajectoryMetrics;

/// Per-trajectory display metadata: the non-numeric input columns.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    pub columns: Vec<String>,
    rows: HashMap<String, Vec<String>>,
}

impl MetadataTable {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Metadata values for one trajectory, aligned with `columns`.
    pub fn row(&self, id: &str) -> Option<&[String]> {
        self.rows.get(id).map(Vec::as_slice)
    }
}

/// A parsed trajectory table plus its display metadata.
#[derive(Debug, Clone)]
pub struct TrajectoryInput {
    pub table: FrequencyTable,
    pub metadata: MetadataTable,
}

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

/// Parse a column header as a timepoint, tolerating one non-numeric
/// prefix character (R-style `X0`, `T17`, ...).
fn parse_timepoint(header: &str) -> Option<f64> {
    let trimmed = header.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        return Some(value);
    }
    let mut chars = trimmed.char_indices();
    chars.next()?;
    let rest = match chars.next() {
        Some((offset, _)) => &trimmed[offset..],
        None => return None,
    };
    rest.parse::<f64>().ok()
}

/// Read a trajectory table from a delimited file.
pub fn read_trajectory_table(path: &Path) -> Result<TrajectoryInput> {
    if !path.exists() {
        return Err(ClonesiftError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(ClonesiftError::invalid_data(
            "trajectory table needs an id column and at least one timepoint column",
        ));
    }

    // Classify columns: index 0 is the id, numeric headers are
    // timepoints, the rest is metadata.
    let mut timepoint_columns: Vec<(usize, f64)> = Vec::new();
    let mut metadata_columns: Vec<(usize, String)> = Vec::new();
    for (index, header) in headers.iter().enumerate().skip(1) {
        match parse_timepoint(header) {
            Some(timepoint) => timepoint_columns.push((index, timepoint)),
            None => metadata_columns.push((index, header.to_string())),
        }
    }
    if timepoint_columns.is_empty() {
        return Err(ClonesiftError::invalid_data(
            "trajectory table has no numeric timepoint columns",
        ));
    }

    let mut rows = Vec::new();
    let mut metadata_rows = HashMap::new();
    for (record_index, record) in reader.records().enumerate() {
        let record = record?;
        let row_number = record_index + 2; // header occupies line 1
        let id = record
            .get(0)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClonesiftError::parse(row_number, "missing trajectory id"))?
            .to_string();

        let mut values = Vec::with_capacity(timepoint_columns.len());
        for &(column, _) in &timepoint_columns {
            let cell = record.get(column).unwrap_or("").trim();
            if cell.is_empty() {
                values.push(f64::NAN);
                continue;
            }
            let value = cell.parse::<f64>().map_err(|_| {
                ClonesiftError::parse(
                    row_number,
                    format!("trajectory {id}: cannot parse frequency {cell:?}"),
                )
            })?;
            values.push(value);
        }
        rows.push((id.clone(), values));

        if !metadata_columns.is_empty() {
            let fields = metadata_columns
                .iter()
                .map(|&(column, _)| record.get(column).unwrap_or("").to_string())
                .collect();
            metadata_rows.insert(id, fields);
        }
    }

    let timepoints = timepoint_columns.iter().map(|&(_, t)| t).collect();
    let table = FrequencyTable::new(timepoints, rows)?;
    info!(
        trajectories = table.len(),
        timepoints = table.timepoints().len(),
        path = %path.display(),
        "loaded trajectory table"
    );
    Ok(TrajectoryInput {
        table,
        metadata: MetadataTable {
            columns: metadata_columns.into_iter().map(|(_, name)| name).collect(),
            rows: metadata_rows,
        },
    })
}

/// Render a timepoint header the way it was most likely written: without
/// a trailing `.0` for whole numbers.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{value}")
    }
}

/// Write the genotype table: id, '|'-joined members, mean frequencies.
pub fn write_genotype_table(path: &Path, genotypes: &GenotypeTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)?;
    let mut header = vec!["Genotype".to_string(), "members".to_string()];
    header.extend(genotypes.table().timepoints().iter().copied().map(format_number));
    writer.write_record(&header)?;
    for (series, members) in genotypes.iter() {
        let mut record = vec![series.id.to_string(), members.join("|")];
        record.extend(series.values.iter().copied().map(format_cell));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the trajectory table annotated with each row's genotype and the
/// original metadata columns.
pub fn write_trajectory_table(
    path: &Path,
    table: &FrequencyTable,
    genotypes: &GenotypeTable,
    metadata: &MetadataTable,
) -> Result<()> {
    let assignment = genotypes.trajectory_to_genotype();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)?;
    let mut header = vec!["Trajectory".to_string(), "genotype".to_string()];
    header.extend(table.timepoints().iter().copied().map(format_number));
    header.extend(metadata.columns.iter().cloned());
    writer.write_record(&header)?;
    for series in table.iter() {
        let genotype = assignment
            .get(series.id)
            .map(String::as_str)
            .unwrap_or_default();
        let mut record = vec![series.id.to_string(), genotype.to_string()];
        record.extend(series.values.iter().copied().map(format_cell));
        if let Some(fields) = metadata.row(series.id) {
            record.extend(fields.iter().cloned());
        } else {
            record.extend(metadata.columns.iter().map(|_| String::new()));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the ggmuller edge table.
pub fn write_edge_table(path: &Path, edges: &[LineageEdge]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)?;
    writer.write_record(["Parent", "Identity"])?;
    for edge in edges {
        writer.write_record([edge.parent.as_str(), edge.identity.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the ggmuller population table.
pub fn write_population_table(path: &Path, populations: &PopulationTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)?;
    writer.write_record(["Generation", "Identity", "Population"])?;
    for row in populations.rows() {
        writer.write_record([
            format_number(row.generation),
            row.identity.clone(),
            format!("{}", row.population),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the linkage matrix produced by the hierarchical method: one row
/// per merge in the standard (left, right, distance, size) layout.
pub fn write_linkage_matrix(path: &Path, linkage: &crate::model::cluster::LinkageMatrix) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)?;
    writer.write_record(["left", "right", "distance", "size"])?;
    let array = linkage.as_array();
    for merge in 0..array.nrows() {
        writer.write_record([
            format_number(array[[merge, 0]]),
            format_number(array[[merge, 1]]),
            format!("{}", array[[merge, 2]]),
            format_number(array[[merge, 3]]),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the pairwise diagnostic table: one row per unordered pair.
pub fn write_pairwise_table(path: &Path, metrics: &TrajectoryMetrics) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)?;
    writer.write_record([
        "leftTrajectory",
        "rightTrajectory",
        "pvalue",
        "statistic",
        "meanDifference",
    ])?;
    for (key, metric) in metrics.iter() {
        writer.write_record([
            key.left().to_string(),
            key.right().to_string(),
            format!("{}", metric.pvalue),
            format!("{}", metric.statistic),
            format!("{}", metric.mean_difference),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
