//! # Genotype Ordering
//!
//! Deterministic display order for the genotype table: genotypes that
//! fixed are placed first, then the remaining genotypes tier by tier
//! through a descending list of frequency thresholds. Within a tier the
//! order is when a genotype was first detected, then when it first rose
//! above the significance threshold, with ties keeping table order. Each
//! genotype is placed exactly once, at the strictest tier it satisfies.
//!
//! The order is a display concern only; clustering and lineage inference
//! never depend on it.

use tracing::debug;

use crate::config::SortOptions;
use crate::data::genotype::GenotypeTable;
use crate::error::Result;

/// Sentinel for "never crossed": sorts after every real timepoint index.
const NEVER: usize = usize::MAX;

/// Sort the genotype table through the cascading frequency tiers.
///
/// Returns a new table whose rows are a permutation of the input rows.
pub fn sort_genotypes(genotypes: &GenotypeTable, options: &SortOptions) -> Result<GenotypeTable> {
    let table = genotypes.table();
    let mut remaining: Vec<usize> = (0..table.len()).collect();
    let mut order: Vec<String> = Vec::with_capacity(table.len());

    let tiers = std::iter::once(options.fixed_breakpoint)
        .chain(options.frequency_breakpoints.iter().copied());
    for tier in tiers {
        if remaining.is_empty() {
            break;
        }
        // Keys per remaining genotype; rows that never reach this tier
        // stay in the pool for a looser tier.
        let mut tier_rows: Vec<(usize, usize, usize)> = Vec::new();
        for &position in &remaining {
            let series = table.row(position);
            if series.first_crossing(tier).is_none() {
                continue;
            }
            let first_detected = series
                .first_crossing(options.detection_breakpoint)
                .unwrap_or(NEVER);
            let first_above = series
                .first_crossing(options.significant_breakpoint)
                .unwrap_or(NEVER);
            tier_rows.push((position, first_detected, first_above));
        }
        if tier_rows.is_empty() {
            continue;
        }
        // `remaining` holds table order, so a stable sort keeps ties in
        // their original row order.
        tier_rows.sort_by_key(|&(_, first_detected, first_above)| (first_detected, first_above));

        debug!(tier, placed = tier_rows.len(), "placed genotypes at tier");
        for &(position, _, _) in &tier_rows {
            order.push(table.row(position).id.to_string());
        }
        remaining.retain(|position| !tier_rows.iter().any(|&(p, _, _)| p == *position));
    }

    // Rows that satisfied no tier (never rose above even the loosest
    // threshold) keep their table order at the end, so the output is
    // always a permutation of the input.
    for position in remaining {
        order.push(table.row(position).id.to_string());
    }

    genotypes.reordered(&order)
}
