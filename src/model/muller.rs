//! # ggmuller Output Tables
//!
//! Converts the genotype table and lineage forest into the two tables the
//! downstream Muller-plot tooling consumes: the edge table
//! (`Parent`, `Identity`) and the population table
//! (`Generation`, `Identity`, `Population`). Population values account
//! for inheritance: a parent's own population at a timepoint is what its
//! children have not claimed, and the synthetic root absorbs whatever
//! frequency the sampled genotypes leave unexplained.

use std::collections::BTreeMap;

use tracing::warn;

use crate::data::genotype::{GenotypeTable, LineageEdge, LineageForest, ROOT_GENOTYPE};

/// Population floor for a parent whose children claim essentially all of
/// it at a timepoint; keeps the genotype visible to the plot without
/// inventing a negative population.
const POPULATION_FLOOR: f64 = 0.01;

/// One row of the population table.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationRow {
    pub generation: f64,
    pub identity: String,
    pub population: f64,
}

/// The ggmuller population table plus the oversubscription report.
#[derive(Debug, Clone)]
pub struct PopulationTable {
    rows: Vec<PopulationRow>,
    oversubscribed: Vec<f64>,
}

impl PopulationTable {
    /// Rows in genotype-table order, synthetic root rows last.
    pub fn rows(&self) -> &[PopulationRow] {
        &self.rows
    }

    /// Generations whose observed genotypes summed to over 100 before the
    /// root row was added. Surfaced for reporting; the root is clamped to
    /// zero there but nothing is rescaled.
    pub fn oversubscribed(&self) -> &[f64] {
        &self.oversubscribed
    }

    /// Total population at one generation, root included.
    pub fn generation_total(&self, generation: f64) -> f64 {
        self.rows
            .iter()
            .filter(|row| row.generation == generation)
            .map(|row| row.population)
            .sum()
    }
}

/// Build the edge table: one row per non-root genotype in table order.
///
/// A genotype whose inferred background is itself or is missing from the
/// forest maps to the synthetic root.
pub fn edge_table(genotypes: &GenotypeTable, forest: &LineageForest) -> Vec<LineageEdge> {
    genotypes
        .ids()
        .iter()
        .map(|identity| {
            let parent = match forest.parent_of(identity) {
                Some(parent) if parent != identity => parent,
                _ => ROOT_GENOTYPE,
            };
            LineageEdge {
                parent: parent.to_string(),
                identity: identity.clone(),
            }
        })
        .collect()
}

/// Build the population table from the genotype means and the edge table.
pub fn population_table(
    genotypes: &GenotypeTable,
    edges: &[LineageEdge],
    detection_cutoff: f64,
) -> PopulationTable {
    let table = genotypes.table();

    // parent -> children, restricted to genotypes present in the table.
    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in edges {
        if table.position(&edge.identity).is_some() {
            children
                .entry(edge.parent.as_str())
                .or_default()
                .push(edge.identity.as_str());
        }
    }

    let mut rows = Vec::new();
    for position in 0..table.len() {
        let genotype = table.row(position);
        match children.get(genotype.id) {
            Some(child_ids) => {
                for (column, &generation) in table.timepoints().iter().enumerate() {
                    let own = genotype.value(column);
                    if own.is_nan() || own <= detection_cutoff {
                        continue;
                    }
                    let child_max = child_ids
                        .iter()
                        .filter_map(|&child| table.series(child))
                        .map(|series| series.value(column))
                        .filter(|value| !value.is_nan())
                        .fold(f64::NEG_INFINITY, f64::max);
                    if child_max == f64::NEG_INFINITY {
                        continue;
                    }
                    let mut remainder = own - child_max;
                    if remainder < detection_cutoff {
                        remainder = POPULATION_FLOOR;
                    }
                    rows.push(PopulationRow {
                        generation,
                        identity: genotype.id.to_string(),
                        population: remainder * 100.0,
                    });
                }
            }
            None => {
                for (column, &generation) in table.timepoints().iter().enumerate() {
                    let own = genotype.value(column);
                    if own.is_nan() {
                        continue;
                    }
                    rows.push(PopulationRow {
                        generation,
                        identity: genotype.id.to_string(),
                        population: own * 100.0,
                    });
                }
            }
        }
    }

    // One synthetic root row per observed generation: the unexplained
    // remainder of the population, clamped at zero when the sampled
    // genotypes oversubscribe the generation.
    let mut totals: BTreeMap<u64, (f64, f64)> = BTreeMap::new();
    for row in &rows {
        let entry = totals
            .entry(row.generation.to_bits())
            .or_insert((row.generation, 0.0));
        entry.1 += row.population;
    }
    let mut oversubscribed = Vec::new();
    for &(generation, total) in totals.values() {
        let remainder = if total <= 100.0 {
            100.0 - total
        } else {
            oversubscribed.push(generation);
            0.0
        };
        rows.push(PopulationRow {
            generation,
            identity: ROOT_GENOTYPE.to_string(),
            population: remainder,
        });
    }
    if !oversubscribed.is_empty() {
        warn!(
            generations = ?oversubscribed,
            "observed genotypes exceed 100% of the population"
        );
    }

    PopulationTable {
        rows,
        oversubscribed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::FrequencyTable;

    fn genotype_table(rows: Vec<(&str, Vec<f64>)>) -> GenotypeTable {
        let timepoints = (0..rows[0].1.len()).map(|t| t as f64).collect();
        let members = rows
            .iter()
            .map(|(id, _)| vec![format!("{id}-member")])
            .collect();
        let table = FrequencyTable::new(
            timepoints,
            rows.into_iter().map(|(id, v)| (id.to_string(), v)).collect(),
        )
        .unwrap();
        GenotypeTable::new(table, members).unwrap()
    }

    fn forest(pairs: &[(&str, &str)]) -> LineageForest {
        LineageForest::from_parents(
            pairs
                .iter()
                .map(|(child, parent)| (child.to_string(), parent.to_string()))
                .collect(),
        )
    }

    #[test]
    fn self_parents_map_to_the_root() {
        let genotypes = genotype_table(vec![("genotype-1", vec![0.0, 0.5])]);
        let broken = forest(&[("genotype-1", "genotype-1")]);
        let edges = edge_table(&genotypes, &broken);
        assert_eq!(edges[0].parent, ROOT_GENOTYPE);
        assert_eq!(edges[0].identity, "genotype-1");
    }

    #[test]
    fn parents_cede_population_to_their_children() {
        let genotypes = genotype_table(vec![
            ("genotype-1", vec![0.0, 0.6, 0.9]),
            ("genotype-2", vec![0.0, 0.2, 0.5]),
        ]);
        let lineage = forest(&[
            ("genotype-1", ROOT_GENOTYPE),
            ("genotype-2", "genotype-1"),
        ]);
        let edges = edge_table(&genotypes, &lineage);
        let populations = population_table(&genotypes, &edges, 0.03);

        let parent_rows: Vec<_> = populations
            .rows()
            .iter()
            .filter(|row| row.identity == "genotype-1")
            .collect();
        // genotype-1 keeps only what genotype-2 has not claimed.
        assert_eq!(parent_rows.len(), 2);
        assert!((parent_rows[0].population - 40.0).abs() < 1e-9);
        assert!((parent_rows[1].population - 40.0).abs() < 1e-9);
    }

    #[test]
    fn generations_conserve_population_including_the_root() {
        let genotypes = genotype_table(vec![
            ("genotype-1", vec![0.0, 0.6, 0.9]),
            ("genotype-2", vec![0.0, 0.2, 0.5]),
        ]);
        let lineage = forest(&[
            ("genotype-1", ROOT_GENOTYPE),
            ("genotype-2", "genotype-1"),
        ]);
        let edges = edge_table(&genotypes, &lineage);
        let populations = population_table(&genotypes, &edges, 0.03);
        assert!(populations.oversubscribed().is_empty());
        for generation in [1.0, 2.0] {
            assert!((populations.generation_total(generation) - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn oversubscribed_generations_are_reported_and_root_clamped() {
        let genotypes = genotype_table(vec![
            ("genotype-1", vec![0.0, 0.9]),
            ("genotype-2", vec![0.0, 0.8]),
        ]);
        let lineage = forest(&[
            ("genotype-1", ROOT_GENOTYPE),
            ("genotype-2", ROOT_GENOTYPE),
        ]);
        let edges = edge_table(&genotypes, &lineage);
        let populations = population_table(&genotypes, &edges, 0.03);
        assert_eq!(populations.oversubscribed(), &[1.0]);
        let root_row = populations
            .rows()
            .iter()
            .find(|row| row.identity == ROOT_GENOTYPE && row.generation == 1.0)
            .unwrap();
        assert_eq!(root_row.population, 0.0);
    }

    #[test]
    fn nearly_consumed_parents_keep_the_floor_population() {
        let genotypes = genotype_table(vec![
            ("genotype-1", vec![0.0, 0.5]),
            ("genotype-2", vec![0.0, 0.49]),
        ]);
        let lineage = forest(&[
            ("genotype-1", ROOT_GENOTYPE),
            ("genotype-2", "genotype-1"),
        ]);
        let edges = edge_table(&genotypes, &lineage);
        let populations = population_table(&genotypes, &edges, 0.03);
        let parent_row = populations
            .rows()
            .iter()
            .find(|row| row.identity == "genotype-1" && row.generation == 1.0)
            .unwrap();
        assert!((parent_row.population - POPULATION_FLOOR * 100.0).abs() < 1e-9);
    }
}
