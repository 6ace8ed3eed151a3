//! # Pairwise Metric Cache
//!
//! Memoized symmetric store of pairwise comparisons, plus the trajectory
//! metric itself. Keys are unordered: `(a, b)` and `(b, a)` address the
//! same entry, and an entry is never recomputed once present. The full
//! O(n^2) population step fans out over rayon and merges results under
//! write-once-per-key semantics.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use crate::data::table::{FrequencyTable, SeriesView};
use crate::model::stats::{one_sample_test, LocationTest};

/// Unordered pair key: the lexically smaller id always comes first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(String, String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }

    pub fn left(&self) -> &str {
        &self.0
    }

    pub fn right(&self) -> &str {
        &self.1
    }
}

/// Memoized symmetric pairwise store.
///
/// Lives for one pipeline run; cleared or discarded afterwards.
#[derive(Debug, Clone)]
pub struct PairwiseCache<V> {
    entries: HashMap<PairKey, V>,
}

impl<V> Default for PairwiseCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> PairwiseCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order-independent lookup.
    pub fn get(&self, a: &str, b: &str) -> Option<&V> {
        self.entries.get(&PairKey::new(a, b))
    }

    /// Return the cached value or compute, store and return it.
    /// The closure runs at most once per unordered pair per run.
    pub fn get_or_compute(&mut self, a: &str, b: &str, metric_fn: impl FnOnce() -> V) -> &V {
        self.entries
            .entry(PairKey::new(a, b))
            .or_insert_with(metric_fn)
    }

    /// Insert only if the pair is not already cached (write-once).
    pub fn insert_if_absent(&mut self, key: PairKey, value: V) {
        self.entries.entry(key).or_insert(value);
    }

    /// Iterate cached entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PairKey, &V)> {
        let mut pairs: Vec<_> = self.entries.iter().collect();
        pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
        pairs.into_iter()
    }
}

/// The pairwise comparison of two trajectories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryMetric {
    /// Location-test statistic of the elementwise difference against zero.
    pub statistic: f64,
    /// Two-tailed p-value of that test; high p = indistinguishable series.
    pub pvalue: f64,
    /// Mean absolute difference over valid points, or the fixed-overlap
    /// distance when both trajectories fixed.
    pub mean_difference: f64,
    /// Number of valid points the comparison ran over.
    pub n_valid: usize,
}

impl TrajectoryMetric {
    /// Similarity in [0, 1]: the p-value that the two series share a mean.
    pub fn similarity(&self) -> f64 {
        self.pvalue
    }

    /// Distance in [0, 1] for hierarchical clustering.
    pub fn distance(&self) -> f64 {
        1.0 - self.pvalue
    }

    /// Neutral value for pairs with no jointly meaningful timepoints.
    pub fn neutral() -> Self {
        Self {
            statistic: 0.0,
            pvalue: 0.0,
            mean_difference: 1.0,
            n_valid: 0,
        }
    }
}

/// Cache of trajectory metrics keyed by unordered trajectory pair.
pub type TrajectoryMetrics = PairwiseCache<TrajectoryMetric>;

impl PairwiseCache<TrajectoryMetric> {
    /// Compute metrics for every unordered pair of table rows not yet
    /// cached. Pair evaluations are independent, so they run in parallel
    /// and merge into the cache write-once.
    pub fn bulk_populate(&mut self, table: &FrequencyTable, detection_cutoff: f64, fixed_cutoff: f64) {
        let mut missing = Vec::new();
        for i in 0..table.len() {
            for j in (i + 1)..table.len() {
                let left = table.row(i);
                let right = table.row(j);
                let key = PairKey::new(left.id, right.id);
                if !self.entries.contains_key(&key) {
                    missing.push((i, j, key));
                }
            }
        }
        debug!(pairs = missing.len(), "computing pairwise metrics");

        let computed: Vec<(PairKey, TrajectoryMetric)> = missing
            .into_par_iter()
            .map(|(i, j, key)| {
                let metric =
                    trajectory_metric(table.row(i), table.row(j), detection_cutoff, fixed_cutoff);
                (key, metric)
            })
            .collect();

        for (key, metric) in computed {
            self.insert_if_absent(key, metric);
        }
    }
}

/// Inclusive column window over which two series are jointly meaningful:
/// from the first to the last timepoint where at least one exceeds the
/// detection cutoff. Values above the fixed cutoff are masked as
/// undetected first, so two fixed trajectories are compared only where
/// they still segregate.
fn valid_window(
    left: &[f64],
    right: &[f64],
    detection_cutoff: f64,
    fixed_cutoff: f64,
) -> Option<(usize, usize)> {
    let masked = |value: f64| {
        if value.is_nan() || value > fixed_cutoff {
            -1.0
        } else {
            value
        }
    };
    let mut bounds: Option<(usize, usize)> = None;
    for (index, (&l, &r)) in left.iter().zip(right).enumerate() {
        if masked(l) > detection_cutoff || masked(r) > detection_cutoff {
            bounds = Some(match bounds {
                None => (index, index),
                Some((start, _)) => (start, index),
            });
        }
    }
    bounds
}

/// Distance between the fixed stretches of two trajectories: the mean
/// absolute difference over timepoints where exactly one series exceeds
/// the fixed cutoff. 0 when the stretches coincide; NaN when either
/// series never fixes (callers treat NaN as maximally different).
pub fn fixed_overlap(left: SeriesView<'_>, right: SeriesView<'_>, fixed_cutoff: f64) -> f64 {
    let is_fixed = |value: f64| !value.is_nan() && value > fixed_cutoff;
    if !left.values.iter().any(|&v| is_fixed(v)) || !right.values.iter().any(|&v| is_fixed(v)) {
        return f64::NAN;
    }
    let mut total = 0.0;
    let mut count = 0usize;
    for (&l, &r) in left.values.iter().zip(right.values) {
        if is_fixed(l) != is_fixed(r) {
            total += (l - r).abs();
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Compare two trajectories over their jointly meaningful timepoints.
///
/// Exact duplicates short-circuit to a maximal similarity so that
/// identical trajectories always collapse into one genotype, even when
/// every shared timepoint is masked as fixed. Pairs with no valid window
/// return [`TrajectoryMetric::neutral`].
pub fn trajectory_metric(
    left: SeriesView<'_>,
    right: SeriesView<'_>,
    detection_cutoff: f64,
    fixed_cutoff: f64,
) -> TrajectoryMetric {
    let identical = left
        .values
        .iter()
        .zip(right.values)
        .all(|(&l, &r)| (l.is_nan() && r.is_nan()) || l == r);
    if identical {
        return TrajectoryMetric {
            statistic: 0.0,
            pvalue: 1.0,
            mean_difference: 0.0,
            n_valid: left.values.len(),
        };
    }

    let Some((start, end)) = valid_window(left.values, right.values, detection_cutoff, fixed_cutoff)
    else {
        return TrajectoryMetric::neutral();
    };

    let mut differences = Vec::with_capacity(end - start + 1);
    for index in start..=end {
        let l = left.values[index];
        let r = right.values[index];
        if l.is_nan() || r.is_nan() {
            continue;
        }
        differences.push(l - r);
    }

    let test: LocationTest = one_sample_test(&differences, 0.0);
    if test.is_degenerate() {
        return TrajectoryMetric::neutral();
    }

    let mean_difference = {
        let overlap = fixed_overlap(left, right, fixed_cutoff);
        if overlap.is_nan() {
            differences.iter().map(|d| d.abs()).sum::<f64>() / differences.len() as f64
        } else {
            overlap
        }
    };

    TrajectoryMetric {
        statistic: test.statistic,
        pvalue: test.pvalue,
        mean_difference,
        n_valid: differences.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::FrequencyTable;

    fn two_row_table(left: Vec<f64>, right: Vec<f64>) -> FrequencyTable {
        let timepoints = (0..left.len()).map(|t| t as f64).collect();
        FrequencyTable::new(
            timepoints,
            vec![("left".into(), left), ("right".into(), right)],
        )
        .unwrap()
    }

    #[test]
    fn cache_keys_are_order_independent() {
        let mut cache: PairwiseCache<u32> = PairwiseCache::new();
        cache.get_or_compute("b", "a", || 7);
        assert_eq!(cache.get("a", "b"), Some(&7));
        assert_eq!(cache.get("b", "a"), Some(&7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cached_entries_are_never_recomputed() {
        let mut cache: PairwiseCache<u32> = PairwiseCache::new();
        cache.get_or_compute("a", "b", || 1);
        let value = *cache.get_or_compute("a", "b", || panic!("recomputed a cached pair"));
        assert_eq!(value, 1);
    }

    #[test]
    fn bulk_populate_covers_all_pairs_symmetrically() {
        let table = FrequencyTable::new(
            vec![0.0, 1.0, 2.0],
            vec![
                ("trajectory-1".into(), vec![0.0, 0.2, 0.5]),
                ("trajectory-2".into(), vec![0.0, 0.25, 0.45]),
                ("trajectory-3".into(), vec![0.9, 0.4, 0.0]),
            ],
        )
        .unwrap();
        let mut metrics = TrajectoryMetrics::new();
        metrics.bulk_populate(&table, 0.03, 0.97);
        assert_eq!(metrics.len(), 3);
        let forward = metrics.get("trajectory-1", "trajectory-2").copied().unwrap();
        let reverse = metrics.get("trajectory-2", "trajectory-1").copied().unwrap();
        assert_eq!(forward, reverse);
    }

    #[test]
    fn identical_series_are_maximally_similar() {
        let table = two_row_table(vec![0.0, 0.5, 0.9, 0.9], vec![0.0, 0.5, 0.9, 0.9]);
        let metric = trajectory_metric(table.row(0), table.row(1), 0.03, 0.97);
        assert_eq!(metric.pvalue, 1.0);
        assert_eq!(metric.mean_difference, 0.0);
    }

    #[test]
    fn disjoint_series_have_no_valid_window() {
        let table = two_row_table(vec![0.0, 0.0, 0.0], vec![0.0, 0.01, 0.02]);
        let metric = trajectory_metric(table.row(0), table.row(1), 0.03, 0.97);
        assert_eq!(metric, TrajectoryMetric::neutral());
    }

    #[test]
    fn diverging_series_score_low_similarity() {
        let table = two_row_table(
            vec![0.0, 0.1, 0.2, 0.3, 0.35],
            vec![0.0, 0.5, 0.7, 0.9, 0.95],
        );
        let metric = trajectory_metric(table.row(0), table.row(1), 0.03, 0.97);
        assert!(metric.pvalue < 0.05);
        assert!(metric.mean_difference > 0.10);
    }

    #[test]
    fn fixed_overlap_distinguishes_fixation_windows() {
        let identical = two_row_table(
            vec![0.0, 0.0, 1.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0, 1.0, 0.0],
        );
        assert_eq!(
            fixed_overlap(identical.row(0), identical.row(1), 0.97),
            0.0
        );

        let shifted = two_row_table(
            vec![0.0, 1.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0, 1.0],
        );
        assert_eq!(fixed_overlap(shifted.row(0), shifted.row(1), 0.97), 1.0);

        let never_fixed = two_row_table(vec![0.0, 0.5, 0.5, 0.0, 0.0], vec![0.0, 1.0, 1.0, 0.0, 0.0]);
        assert!(fixed_overlap(never_fixed.row(0), never_fixed.row(1), 0.97).is_nan());
    }
}
