//! # Configuration Logic
//!
//! CLI argument parsing and validation, plus the immutable option records
//! consumed by the analysis stages. The records replace the original
//! dynamic option objects with plain structs and documented preset
//! constructors (`from_breakpoints`, `matlab_defaults`).

use std::path::PathBuf;

use clap::Parser;

use crate::error::{ClonesiftError, Result};
use crate::model::cluster::ClusterMethod;

/// Command-line configuration for a single batch run.
#[derive(Parser, Debug, Clone)]
#[command(name = "clonesift", version, about = "Clonal genotype clustering and lineage inference from time-series mutation frequencies")]
pub struct Config {
    /// Input trajectory table (.tsv or .csv; rows = trajectories, numeric columns = timepoints)
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// Output directory for the generated tables
    #[arg(long, short = 'o', default_value = "clonesift-output")]
    pub output: PathBuf,

    /// Frequency above which a trajectory counts as detected
    #[arg(long, default_value_t = 0.03)]
    pub detection_breakpoint: f64,

    /// Frequency above which a genotype counts as fixed (default: 1 - detection)
    #[arg(long)]
    pub fixed_breakpoint: Option<f64>,

    /// Minimum pairwise similarity (p-value) for two trajectories to share a genotype
    #[arg(long, default_value_t = 0.05)]
    pub similarity_breakpoint: f64,

    /// Maximum mean frequency difference for two trajectories to share a genotype
    #[arg(long, default_value_t = 0.10)]
    pub difference_breakpoint: f64,

    /// Clustering method: "matlab" (threshold-greedy) or "hierarchy" (agglomerative)
    #[arg(long, default_value = "matlab")]
    pub method: ClusterMethod,

    /// Frequency a genotype must reach before it is sorted into the significant tier
    #[arg(long, default_value_t = 0.15)]
    pub significant_breakpoint: f64,

    /// Descending frequency tiers used when ordering non-fixed genotypes
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [0.90, 0.75, 0.60, 0.45, 0.30, 0.15, 0.00]
    )]
    pub frequency_breakpoints: Vec<f64>,

    /// Seed genotypes for the greedy method: comma-separated groups of
    /// '|'-joined trajectory ids (e.g. "trajectory-1|trajectory-2,trajectory-7")
    #[arg(long, value_delimiter = ',')]
    pub starting_genotypes: Vec<String>,
}

impl Config {
    /// Parse the command line and validate the resulting configuration.
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Validate thresholds and input paths without touching the filesystem contents.
    pub fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            return Err(ClonesiftError::FileNotFound {
                path: self.input.clone(),
            });
        }
        if !(0.0..1.0).contains(&self.detection_breakpoint) {
            return Err(ClonesiftError::config(format!(
                "detection breakpoint must be in [0, 1): {}",
                self.detection_breakpoint
            )));
        }
        let fixed = self.fixed_breakpoint();
        if fixed <= self.detection_breakpoint || fixed > 1.0 {
            return Err(ClonesiftError::config(format!(
                "fixed breakpoint must be in ({}, 1]: {}",
                self.detection_breakpoint, fixed
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_breakpoint) {
            return Err(ClonesiftError::config(format!(
                "similarity breakpoint must be in [0, 1]: {}",
                self.similarity_breakpoint
            )));
        }
        if self.frequency_breakpoints.is_empty() {
            return Err(ClonesiftError::config(
                "at least one frequency breakpoint is required",
            ));
        }
        if self
            .frequency_breakpoints
            .windows(2)
            .any(|pair| pair[0] < pair[1])
        {
            return Err(ClonesiftError::config(
                "frequency breakpoints must be listed in descending order",
            ));
        }
        Ok(())
    }

    /// Fixed breakpoint, defaulting to the complement of the detection breakpoint.
    pub fn fixed_breakpoint(&self) -> f64 {
        self.fixed_breakpoint
            .unwrap_or(1.0 - self.detection_breakpoint)
    }

    /// Clustering options derived from this configuration.
    pub fn genotype_options(&self) -> GenotypeOptions {
        GenotypeOptions {
            detection_breakpoint: self.detection_breakpoint,
            fixed_breakpoint: self.fixed_breakpoint(),
            similarity_breakpoint: self.similarity_breakpoint,
            difference_breakpoint: self.difference_breakpoint,
            method: self.method,
            starting_genotypes: self
                .starting_genotypes
                .iter()
                .map(|group| group.split('|').map(str::to_string).collect())
                .collect(),
        }
    }

    /// Sorting options derived from this configuration.
    pub fn sort_options(&self) -> SortOptions {
        SortOptions {
            detection_breakpoint: self.detection_breakpoint,
            significant_breakpoint: self.significant_breakpoint,
            fixed_breakpoint: self.fixed_breakpoint(),
            frequency_breakpoints: self.frequency_breakpoints.clone(),
        }
    }

    /// Lineage-inference options derived from this configuration.
    pub fn lineage_options(&self) -> LineageOptions {
        LineageOptions::from_breakpoints(self.detection_breakpoint)
    }
}

/// Options controlling pairwise comparison and clustering.
#[derive(Debug, Clone)]
pub struct GenotypeOptions {
    /// Frequency above which a trajectory counts as detected.
    pub detection_breakpoint: f64,
    /// Frequency above which a trajectory counts as fixed; fixed stretches
    /// are masked out of the pairwise comparison.
    pub fixed_breakpoint: f64,
    /// Minimum similarity p-value for joining an existing genotype.
    pub similarity_breakpoint: f64,
    /// Maximum mean absolute difference for joining an existing genotype.
    pub difference_breakpoint: f64,
    /// Which clustering algorithm to run.
    pub method: ClusterMethod,
    /// Optional seed groups for the greedy method; each inner list founds
    /// one genotype before any free trajectory is considered.
    pub starting_genotypes: Vec<Vec<String>>,
}

impl GenotypeOptions {
    /// Standard options derived from a detection breakpoint alone.
    pub fn from_breakpoints(detection_breakpoint: f64) -> Self {
        Self {
            detection_breakpoint,
            fixed_breakpoint: 1.0 - detection_breakpoint,
            similarity_breakpoint: 0.05,
            difference_breakpoint: 0.10,
            method: ClusterMethod::Matlab,
            starting_genotypes: Vec::new(),
        }
    }
}

/// Options controlling the cascading-tier genotype sort.
#[derive(Debug, Clone)]
pub struct SortOptions {
    pub detection_breakpoint: f64,
    pub significant_breakpoint: f64,
    pub fixed_breakpoint: f64,
    /// Descending tier thresholds used after the fixed tier.
    pub frequency_breakpoints: Vec<f64>,
}

impl SortOptions {
    /// The threshold set used by the original MATLAB analysis.
    pub fn matlab_defaults() -> Self {
        Self {
            detection_breakpoint: 0.03,
            significant_breakpoint: 0.15,
            fixed_breakpoint: 0.85,
            frequency_breakpoints: vec![0.90, 0.75, 0.60, 0.45, 0.30, 0.15, 0.00],
        }
    }
}

/// Options controlling the background-inference checks.
///
/// The double/single cutoffs are carried for interface compatibility with
/// callers that tuned the pre-statistical checks; the statistical tests
/// decide significance from the location-test p-value alone.
#[derive(Debug, Clone)]
pub struct LineageOptions {
    pub detection_breakpoint: f64,
    pub additive_double_cutoff: f64,
    pub additive_single_cutoff: f64,
    pub subtractive_double_cutoff: f64,
    pub subtractive_single_cutoff: f64,
    pub derivative_detection_cutoff: f64,
    pub derivative_check_cutoff: f64,
}

impl LineageOptions {
    /// Standard options derived from a detection breakpoint alone.
    pub fn from_breakpoints(detection_breakpoint: f64) -> Self {
        Self {
            detection_breakpoint,
            additive_double_cutoff: 1.0 + detection_breakpoint,
            additive_single_cutoff: 1.15,
            subtractive_double_cutoff: -detection_breakpoint,
            subtractive_single_cutoff: -0.15,
            derivative_detection_cutoff: 0.02,
            derivative_check_cutoff: 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_breakpoint_defaults_to_detection_complement() {
        let options = GenotypeOptions::from_breakpoints(0.03);
        assert!((options.fixed_breakpoint - 0.97).abs() < 1e-12);
        assert_eq!(options.method, ClusterMethod::Matlab);
    }

    #[test]
    fn matlab_sort_tiers_are_descending() {
        let options = SortOptions::matlab_defaults();
        assert!(options
            .frequency_breakpoints
            .windows(2)
            .all(|pair| pair[0] >= pair[1]));
        assert!((options.fixed_breakpoint - 0.85).abs() < 1e-12);
    }
}
