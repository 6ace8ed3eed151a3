//! # Background (Lineage) Inference
//!
//! Decides, for every genotype, which other genotype's genetic background
//! it arose in. Three statistics are evaluated per ordered genotype pair
//! over their jointly detected timepoints:
//!
//! 1. additive — are the two frequency sums significantly over 1.0? If so
//!    the pair are disjoint, additively competing lineages and cannot be
//!    nested.
//! 2. subtractive — is the absolute difference indistinguishable from
//!    zero? If so the two plausibly ride the same background.
//! 3. derivative — sample covariance of the pair over the detected
//!    region, evaluated only while the subtractive check leaves the
//!    relationship undetermined.
//!
//! Each genotype then receives exactly one parent: the tightest
//! additive-compatible background that was detected no later and
//! dominates it at every shared detected timepoint, falling back to the
//! synthetic root when no candidate qualifies.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::LineageOptions;
use crate::data::genotype::{GenotypeTable, LineageForest, ROOT_GENOTYPE};
use crate::data::table::SeriesView;
use crate::error::Result;
use crate::model::pairwise::PairwiseCache;
use crate::model::stats::{covariance, one_sample_test};

/// Significance level shared by the additive and subtractive tests.
const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Dominance slack for comparing two mean frequencies.
const DOMINANCE_TOLERANCE: f64 = 1e-9;

/// Outcome of the three checks for one genotype pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundChecks {
    /// False when the pair's sums are significantly over 1.0 (disjoint
    /// additive lineages); true otherwise.
    pub additive: bool,
    /// True when the pair's absolute difference is not significant (the
    /// two plausibly share a background).
    pub subtractive: bool,
    /// Covariance over the detected region; present only when the
    /// subtractive check left the relationship undetermined.
    pub derivative: Option<f64>,
}

/// Paired values at timepoints where at least one series exceeds the
/// detection cutoff. Timepoints missing in either series are skipped.
fn detected_points(
    left: SeriesView<'_>,
    right: SeriesView<'_>,
    detection_cutoff: f64,
) -> (Vec<f64>, Vec<f64>) {
    let mut left_values = Vec::new();
    let mut right_values = Vec::new();
    for (&l, &r) in left.values.iter().zip(right.values) {
        if l.is_nan() || r.is_nan() {
            continue;
        }
        if l > detection_cutoff || r > detection_cutoff {
            left_values.push(l);
            right_values.push(r);
        }
    }
    (left_values, right_values)
}

/// Additive check: is the elementwise sum of the two series consistently
/// compatible with staying at or under 1.0?
///
/// The two-tailed p of the location test against 1.0 is halved into the
/// "greater" tail. A significantly-over-1 sum means the lineages are
/// mutually exclusive and returns false. An empty overlap is not
/// significant and returns true. Symmetric in its arguments.
pub fn check_additive_background(
    left: SeriesView<'_>,
    right: SeriesView<'_>,
    options: &LineageOptions,
) -> bool {
    let (left_values, right_values) = detected_points(left, right, options.detection_breakpoint);
    let sums: Vec<f64> = left_values
        .iter()
        .zip(&right_values)
        .map(|(l, r)| l + r)
        .collect();
    let test = one_sample_test(&sums, 1.0);
    if test.is_degenerate() {
        return true;
    }
    test.one_tailed_greater() > SIGNIFICANCE_LEVEL
}

/// Subtractive check: is the elementwise absolute difference
/// indistinguishable from zero?
///
/// True when the difference is not significant (the pair plausibly share
/// a background) and for the degenerate empty overlap. Symmetric in its
/// arguments.
pub fn check_subtractive_background(
    left: SeriesView<'_>,
    right: SeriesView<'_>,
    options: &LineageOptions,
) -> bool {
    let (left_values, right_values) = detected_points(left, right, options.detection_breakpoint);
    let differences: Vec<f64> = left_values
        .iter()
        .zip(&right_values)
        .map(|(l, r)| (l - r).abs())
        .collect();
    let test = one_sample_test(&differences, 0.0);
    if test.is_degenerate() {
        return true;
    }
    test.pvalue > SIGNIFICANCE_LEVEL
}

/// Derivative check: sample covariance of the pair over the overlapping
/// detected region. Strongly negative means one rises as the other
/// falls; positive means the two rise together on a shared branch.
pub fn check_derivative_background(
    left: SeriesView<'_>,
    right: SeriesView<'_>,
    detection_cutoff: f64,
) -> f64 {
    let (left_values, right_values) = detected_points(left, right, detection_cutoff);
    covariance(&left_values, &right_values)
}

/// Run the three checks for one ordered pair.
pub fn apply_genotype_checks(
    type_series: SeriesView<'_>,
    test_series: SeriesView<'_>,
    options: &LineageOptions,
) -> BackgroundChecks {
    let additive = check_additive_background(type_series, test_series, options);
    let subtractive = check_subtractive_background(type_series, test_series, options);
    let derivative = if subtractive {
        None
    } else {
        Some(check_derivative_background(
            type_series,
            test_series,
            options.derivative_detection_cutoff,
        ))
    };
    BackgroundChecks {
        additive,
        subtractive,
        derivative,
    }
}

/// A candidate parent for one genotype.
#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    /// Mean dominance margin over the shared detected region; smaller is
    /// a tighter enclosing background.
    margin: f64,
    first_detected: usize,
}

/// Assign every genotype exactly one parent, producing a forest rooted at
/// [`ROOT_GENOTYPE`].
///
/// Eligibility: the candidate was detected no later than the child,
/// dominates the child at every shared detected timepoint, and passes the
/// additive check (the pair are not disjoint lineages). A candidate
/// identical to the child over the shared region qualifies only when it
/// precedes the child in table order, which breaks symmetric pairs before
/// they can form a cycle. Among eligible candidates the tightest
/// background wins: smallest mean dominance margin, then earliest
/// detection, then lexical id.
pub fn infer_lineage(genotypes: &GenotypeTable, options: &LineageOptions) -> Result<LineageForest> {
    let table = genotypes.table();
    let mut checks_cache: PairwiseCache<BackgroundChecks> = PairwiseCache::new();
    let mut parents: BTreeMap<String, String> = BTreeMap::new();

    for child_position in 0..table.len() {
        let child = table.row(child_position);
        let child_id = child.id.to_string();
        let Some(child_detected) = child.first_crossing(options.detection_breakpoint) else {
            // Never-detected genotypes have no observable background.
            parents.insert(child_id, ROOT_GENOTYPE.to_string());
            continue;
        };

        let mut candidates: Vec<Candidate> = Vec::new();
        for candidate_position in 0..table.len() {
            if candidate_position == child_position {
                continue;
            }
            let candidate = table.row(candidate_position);
            let Some(candidate_detected) = candidate.first_crossing(options.detection_breakpoint)
            else {
                continue;
            };
            if candidate_detected > child_detected {
                continue;
            }

            // Dominance over the shared detected region.
            let mut margin_total = 0.0;
            let mut shared = 0usize;
            let mut dominates = true;
            for (&candidate_value, &child_value) in candidate.values.iter().zip(child.values) {
                if candidate_value.is_nan() || child_value.is_nan() {
                    continue;
                }
                if candidate_value <= options.detection_breakpoint
                    && child_value <= options.detection_breakpoint
                {
                    continue;
                }
                shared += 1;
                if candidate_value + DOMINANCE_TOLERANCE < child_value {
                    dominates = false;
                    break;
                }
                margin_total += candidate_value - child_value;
            }
            if !dominates || shared == 0 {
                continue;
            }
            let margin = margin_total / shared as f64;
            if margin <= DOMINANCE_TOLERANCE && candidate_position > child_position {
                continue;
            }

            let checks = *checks_cache.get_or_compute(candidate.id, child.id, || {
                apply_genotype_checks(candidate, child, options)
            });
            if !checks.additive {
                continue;
            }

            candidates.push(Candidate {
                id: candidate.id.to_string(),
                margin,
                first_detected: candidate_detected,
            });
        }

        candidates.sort_by(|a, b| {
            a.margin
                .partial_cmp(&b.margin)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.first_detected.cmp(&b.first_detected))
                .then(a.id.cmp(&b.id))
        });

        let parent = candidates
            .first()
            .map(|candidate| candidate.id.clone())
            .unwrap_or_else(|| ROOT_GENOTYPE.to_string());
        debug!(child = %child_id, parent = %parent, "assigned background");
        parents.insert(child_id, parent);
    }

    let mut forest = LineageForest::from_parents(parents);
    // The eligibility rules cannot produce a cycle, but the invariant is
    // validated rather than assumed; a broken chain is re-rooted at the
    // synthetic root instead of aborting the run.
    while forest.validate().is_err() {
        let stuck = table
            .ids()
            .iter()
            .find(|id| forest.ancestors(id.as_str()).is_err())
            .cloned();
        match stuck {
            Some(id) => {
                warn!(genotype = %id, "lineage chain did not terminate; re-rooting at {ROOT_GENOTYPE}");
                forest = forest.rerooted(&id);
            }
            None => break,
        }
    }
    forest.validate()?;
    Ok(forest)
}
