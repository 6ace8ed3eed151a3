//! # Mean Genotype Aggregation
//!
//! Reduces the member trajectories of each genotype to one representative
//! mean frequency series. A missing observation is absent, not zero: a
//! timepoint's mean is taken over the members that were measured there,
//! and stays missing only when no member was.

use crate::data::genotype::GenotypeTable;
use crate::data::table::FrequencyTable;
use crate::error::{ClonesiftError, Result};
use crate::model::cluster::ClusterAssignment;

/// Build the mean genotype table from a cluster assignment.
///
/// Rows appear in genotype creation order; columns keep the trajectory
/// table's ascending timepoint domain.
pub fn calculate_mean_genotypes(
    assignment: &ClusterAssignment,
    table: &FrequencyTable,
) -> Result<GenotypeTable> {
    let n_columns = table.timepoints().len();
    let mut rows = Vec::with_capacity(assignment.len());
    let mut members = Vec::with_capacity(assignment.len());

    for genotype in assignment.genotypes() {
        let mut sums = vec![0.0f64; n_columns];
        let mut counts = vec![0usize; n_columns];
        for member in &genotype.members {
            let series = table.series(member).ok_or_else(|| {
                ClonesiftError::algorithm(format!(
                    "genotype {} references unknown trajectory {member}",
                    genotype.name
                ))
            })?;
            for (column, &value) in series.values.iter().enumerate() {
                if !value.is_nan() {
                    sums[column] += value;
                    counts[column] += 1;
                }
            }
        }
        let mean: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(&sum, &count)| if count == 0 { f64::NAN } else { sum / count as f64 })
            .collect();
        rows.push((genotype.name.clone(), mean));
        members.push(genotype.members.clone());
    }

    let mean_table = FrequencyTable::new(table.timepoints().to_vec(), rows)?;
    GenotypeTable::new(mean_table, members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenotypeOptions;
    use crate::model::cluster::cluster_trajectories;
    use crate::model::pairwise::TrajectoryMetrics;

    #[test]
    fn mean_skips_missing_members() {
        let table = FrequencyTable::new(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![
                ("trajectory-1".into(), vec![0.0, 0.4, f64::NAN, 0.5]),
                ("trajectory-2".into(), vec![0.0, 0.55, 0.8, 0.5]),
            ],
        )
        .unwrap();
        let mut metrics = TrajectoryMetrics::new();
        let outcome = cluster_trajectories(
            &table,
            &mut metrics,
            &GenotypeOptions::from_breakpoints(0.03),
        )
        .unwrap();
        let genotypes = calculate_mean_genotypes(outcome.assignment(), &table).unwrap();

        // The two trajectories track each other and cluster together; the
        // timepoint trajectory-1 missed is averaged over the one measured
        // member.
        assert_eq!(genotypes.len(), 1);
        let series = genotypes.series("genotype-1").unwrap();
        assert!((series.value(1) - 0.475).abs() < 1e-12);
        assert!((series.value(2) - 0.8).abs() < 1e-12);
        assert_eq!(
            genotypes.members("genotype-1").unwrap(),
            &["trajectory-1".to_string(), "trajectory-2".to_string()]
        );
    }

    #[test]
    fn all_members_missing_stays_missing() {
        let table = FrequencyTable::new(
            vec![0.0, 1.0],
            vec![("trajectory-1".into(), vec![f64::NAN, 0.5])],
        )
        .unwrap();
        let mut metrics = TrajectoryMetrics::new();
        let outcome = cluster_trajectories(
            &table,
            &mut metrics,
            &GenotypeOptions::from_breakpoints(0.03),
        )
        .unwrap();
        let genotypes = calculate_mean_genotypes(outcome.assignment(), &table).unwrap();
        let series = genotypes.series("genotype-1").unwrap();
        assert!(series.value(0).is_nan());
    }
}
