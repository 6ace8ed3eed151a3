//! # Trajectory Clustering
//!
//! Two interchangeable algorithms partition trajectories into genotypes:
//! the threshold-greedy method inherited from the original MATLAB
//! analysis, and average-linkage agglomerative clustering over the
//! pairwise distance matrix. Both consume the memoized pairwise cache;
//! the hierarchical method additionally returns its linkage matrix for
//! diagnostics.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use tracing::debug;

use crate::config::GenotypeOptions;
use crate::data::table::FrequencyTable;
use crate::error::{ClonesiftError, Result};
use crate::model::pairwise::{trajectory_metric, TrajectoryMetrics};

/// Which clustering algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMethod {
    /// Threshold-greedy assignment in table order.
    Matlab,
    /// Average-linkage agglomerative clustering.
    Hierarchy,
}

impl FromStr for ClusterMethod {
    type Err = ClonesiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "matlab" => Ok(Self::Matlab),
            "hierarchy" => Ok(Self::Hierarchy),
            other => Err(ClonesiftError::config(format!(
                "invalid clustering method: {other} (expected \"matlab\" or \"hierarchy\")"
            ))),
        }
    }
}

impl fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matlab => write!(f, "matlab"),
            Self::Hierarchy => write!(f, "hierarchy"),
        }
    }
}

/// One genotype: its generated name and ordered member trajectories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypeMembers {
    pub name: String,
    pub members: Vec<String>,
}

/// Total mapping from trajectories to genotypes.
///
/// Every trajectory belongs to exactly one genotype and every genotype
/// has at least one member.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    genotypes: Vec<GenotypeMembers>,
    by_trajectory: HashMap<String, usize>,
}

impl ClusterAssignment {
    fn from_groups(groups: Vec<Vec<String>>) -> Self {
        let genotypes: Vec<GenotypeMembers> = groups
            .into_iter()
            .filter(|members| !members.is_empty())
            .enumerate()
            .map(|(index, members)| GenotypeMembers {
                name: format!("genotype-{}", index + 1),
                members,
            })
            .collect();
        let mut by_trajectory = HashMap::new();
        for (index, genotype) in genotypes.iter().enumerate() {
            for member in &genotype.members {
                by_trajectory.insert(member.clone(), index);
            }
        }
        Self {
            genotypes,
            by_trajectory,
        }
    }

    /// Genotypes in creation order (`genotype-1` first).
    pub fn genotypes(&self) -> &[GenotypeMembers] {
        &self.genotypes
    }

    pub fn len(&self) -> usize {
        self.genotypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genotypes.is_empty()
    }

    /// The genotype a trajectory was assigned to.
    pub fn genotype_of(&self, trajectory: &str) -> Option<&str> {
        self.by_trajectory
            .get(trajectory)
            .map(|&index| self.genotypes[index].name.as_str())
    }
}

/// Linkage matrix in the standard layout: one row per merge with the two
/// merged cluster ids, the merge distance, and the new cluster size.
#[derive(Debug, Clone)]
pub struct LinkageMatrix(Array2<f64>);

impl LinkageMatrix {
    pub fn as_array(&self) -> &Array2<f64> {
        &self.0
    }

    pub fn n_merges(&self) -> usize {
        self.0.nrows()
    }
}

/// Clustering result; the linkage matrix exists only for the
/// hierarchical method, and the variant makes that contract explicit.
#[derive(Debug, Clone)]
pub enum ClusterOutcome {
    AssignmentOnly(ClusterAssignment),
    AssignmentWithLinkage(ClusterAssignment, LinkageMatrix),
}

impl ClusterOutcome {
    pub fn assignment(&self) -> &ClusterAssignment {
        match self {
            Self::AssignmentOnly(assignment) => assignment,
            Self::AssignmentWithLinkage(assignment, _) => assignment,
        }
    }

    pub fn linkage(&self) -> Option<&LinkageMatrix> {
        match self {
            Self::AssignmentOnly(_) => None,
            Self::AssignmentWithLinkage(_, linkage) => Some(linkage),
        }
    }
}

/// Partition the table's trajectories into genotypes.
pub fn cluster_trajectories(
    table: &FrequencyTable,
    metrics: &mut TrajectoryMetrics,
    options: &GenotypeOptions,
) -> Result<ClusterOutcome> {
    metrics.bulk_populate(table, options.detection_breakpoint, options.fixed_breakpoint);
    match options.method {
        ClusterMethod::Matlab => {
            let assignment = matlab_method(table, metrics, options)?;
            Ok(ClusterOutcome::AssignmentOnly(assignment))
        }
        ClusterMethod::Hierarchy => {
            let (assignment, linkage) = hierarchy_method(table, metrics, options);
            Ok(ClusterOutcome::AssignmentWithLinkage(assignment, linkage))
        }
    }
}

/// Threshold-greedy clustering in table order.
///
/// Each unassigned trajectory is compared against the founding member of
/// every existing genotype; the best-scoring genotype wins the
/// trajectory iff its similarity reaches the similarity breakpoint and
/// its difference stays under the difference breakpoint. Ties keep the
/// earliest-created genotype. Otherwise the trajectory founds a new
/// genotype.
fn matlab_method(
    table: &FrequencyTable,
    metrics: &mut TrajectoryMetrics,
    options: &GenotypeOptions,
) -> Result<ClusterAssignment> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut assigned: HashSet<usize> = HashSet::new();

    for seed in &options.starting_genotypes {
        let mut group = Vec::with_capacity(seed.len());
        for id in seed {
            let position = table.position(id).ok_or_else(|| {
                ClonesiftError::invalid_data(format!(
                    "starting genotype references unknown trajectory {id}"
                ))
            })?;
            if !assigned.insert(position) {
                return Err(ClonesiftError::invalid_data(format!(
                    "trajectory {id} appears in more than one starting genotype"
                )));
            }
            group.push(position);
        }
        if !group.is_empty() {
            groups.push(group);
        }
    }

    for position in 0..table.len() {
        if assigned.contains(&position) {
            continue;
        }
        let row = table.row(position);

        let mut best: Option<(usize, f64, f64)> = None;
        for (group_index, group) in groups.iter().enumerate() {
            let representative = table.row(group[0]);
            let metric = *metrics.get_or_compute(row.id, representative.id, || {
                trajectory_metric(
                    row,
                    representative,
                    options.detection_breakpoint,
                    options.fixed_breakpoint,
                )
            });
            let candidate = (group_index, metric.similarity(), metric.mean_difference);
            // Strictly-greater keeps the earliest-created genotype on ties.
            if best.map_or(true, |(_, best_similarity, _)| candidate.1 > best_similarity) {
                best = Some(candidate);
            }
        }

        match best {
            Some((group_index, similarity, difference))
                if similarity >= options.similarity_breakpoint
                    && difference < options.difference_breakpoint =>
            {
                groups[group_index].push(position);
            }
            _ => groups.push(vec![position]),
        }
        assigned.insert(position);
    }

    Ok(ClusterAssignment::from_groups(
        groups
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .map(|member| table.row(member).id.to_string())
                    .collect()
            })
            .collect(),
    ))
}

/// Average-linkage agglomerative clustering over `1 - similarity`.
///
/// Runs the full dendrogram for the linkage matrix, then cuts it so that
/// merges at distance `<= 1 - similarity_breakpoint` form flat clusters.
/// Genotypes are numbered by the first table appearance of a member.
fn hierarchy_method(
    table: &FrequencyTable,
    metrics: &mut TrajectoryMetrics,
    options: &GenotypeOptions,
) -> (ClusterAssignment, LinkageMatrix) {
    let n = table.len();
    if n == 0 {
        return (
            ClusterAssignment::from_groups(Vec::new()),
            LinkageMatrix(Array2::zeros((0, 4))),
        );
    }

    // Pairwise distances between leaves, from the cache.
    let mut leaf_distance = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let left = table.row(i);
            let right = table.row(j);
            let metric = *metrics.get_or_compute(left.id, right.id, || {
                trajectory_metric(
                    left,
                    right,
                    options.detection_breakpoint,
                    options.fixed_breakpoint,
                )
            });
            leaf_distance[[i, j]] = metric.distance();
            leaf_distance[[j, i]] = metric.distance();
        }
    }

    // Cluster ids: 0..n are leaves, n.. are merges. Distances between
    // active clusters evolve under the Lance-Williams average update.
    let mut distances: HashMap<(usize, usize), f64> = HashMap::new();
    for i in 0..n {
        for j in (i + 1)..n {
            distances.insert((i, j), leaf_distance[[i, j]]);
        }
    }
    let mut leaves: HashMap<usize, Vec<usize>> = (0..n).map(|i| (i, vec![i])).collect();
    let mut active: Vec<usize> = (0..n).collect();
    let mut linkage = Array2::zeros((n.saturating_sub(1), 4));

    let pair_key = |a: usize, b: usize| if a < b { (a, b) } else { (b, a) };

    for merge_index in 0..n.saturating_sub(1) {
        // Closest active pair; ties resolve to the smallest id pair so the
        // dendrogram is deterministic.
        let mut best: Option<(usize, usize, f64)> = None;
        for (ai, &a) in active.iter().enumerate() {
            for &b in &active[(ai + 1)..] {
                let d = distances[&pair_key(a, b)];
                let better = match best {
                    None => true,
                    Some((ba, bb, bd)) => d < bd || (d == bd && pair_key(a, b) < pair_key(ba, bb)),
                };
                if better {
                    best = Some((a, b, d));
                }
            }
        }
        // Two or more clusters remain on every iteration of this loop.
        let Some((a, b, merge_distance)) = best else {
            break;
        };

        let merged_id = n + merge_index;
        let mut merged_leaves = leaves[&a].clone();
        merged_leaves.extend(leaves[&b].iter().copied());
        merged_leaves.sort_unstable();
        let size_a = leaves[&a].len() as f64;
        let size_b = leaves[&b].len() as f64;

        linkage[[merge_index, 0]] = a.min(b) as f64;
        linkage[[merge_index, 1]] = a.max(b) as f64;
        linkage[[merge_index, 2]] = merge_distance;
        linkage[[merge_index, 3]] = merged_leaves.len() as f64;

        active.retain(|&id| id != a && id != b);
        for &other in &active {
            let da = distances[&pair_key(a, other)];
            let db = distances[&pair_key(b, other)];
            let updated = (size_a * da + size_b * db) / (size_a + size_b);
            distances.insert(pair_key(merged_id, other), updated);
        }
        active.push(merged_id);
        leaves.insert(merged_id, merged_leaves);
    }

    // Cut: a cluster survives the cut only if every merge inside it sits
    // at or under the breakpoint distance.
    let cut = 1.0 - options.similarity_breakpoint;
    let mut flat: Vec<usize> = (0..n).collect();
    let mut accepted: HashSet<usize> = (0..n).collect();
    for merge_index in 0..linkage.nrows() {
        let child_a = linkage[[merge_index, 0]] as usize;
        let child_b = linkage[[merge_index, 1]] as usize;
        if linkage[[merge_index, 2]] > cut
            || !accepted.contains(&child_a)
            || !accepted.contains(&child_b)
        {
            continue;
        }
        let merged_id = n + merge_index;
        accepted.insert(merged_id);
        let members = &leaves[&merged_id];
        let target = flat[members[0]];
        for &leaf in members {
            let from = flat[leaf];
            if from != target {
                for slot in flat.iter_mut() {
                    if *slot == from {
                        *slot = target;
                    }
                }
            }
        }
    }

    // Group leaves by flat label, ordered by first table appearance.
    let mut order: Vec<usize> = Vec::new();
    let mut groups_by_label: HashMap<usize, Vec<usize>> = HashMap::new();
    for leaf in 0..n {
        let label = flat[leaf];
        if !groups_by_label.contains_key(&label) {
            order.push(label);
        }
        groups_by_label.entry(label).or_default().push(leaf);
    }
    let groups: Vec<Vec<String>> = order
        .into_iter()
        .map(|label| {
            groups_by_label[&label]
                .iter()
                .map(|&leaf| table.row(leaf).id.to_string())
                .collect()
        })
        .collect();

    debug!(
        clusters = groups.len(),
        merges = linkage.nrows(),
        "hierarchical clustering complete"
    );
    (ClusterAssignment::from_groups(groups), LinkageMatrix(linkage))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: Vec<(&str, Vec<f64>)>) -> FrequencyTable {
        let timepoints = (0..rows[0].1.len()).map(|t| t as f64).collect();
        FrequencyTable::new(
            timepoints,
            rows.into_iter().map(|(id, v)| (id.to_string(), v)).collect(),
        )
        .unwrap()
    }

    fn options(method: ClusterMethod) -> GenotypeOptions {
        GenotypeOptions {
            method,
            ..GenotypeOptions::from_breakpoints(0.03)
        }
    }

    #[test]
    fn unknown_method_is_a_configuration_error() {
        let parsed: Result<ClusterMethod> = "kmeans".parse();
        assert!(matches!(parsed, Err(ClonesiftError::Config { .. })));
    }

    #[test]
    fn greedy_collapses_identical_trajectories() {
        let table = table(vec![
            ("trajectory-1", vec![0.0, 0.5, 0.9, 0.9]),
            ("trajectory-2", vec![0.0, 0.5, 0.9, 0.9]),
            ("trajectory-3", vec![0.9, 0.5, 0.05, 0.0]),
        ]);
        let mut metrics = TrajectoryMetrics::new();
        let outcome =
            cluster_trajectories(&table, &mut metrics, &options(ClusterMethod::Matlab)).unwrap();
        let assignment = outcome.assignment();
        assert_eq!(
            assignment.genotype_of("trajectory-1"),
            assignment.genotype_of("trajectory-2")
        );
        assert_ne!(
            assignment.genotype_of("trajectory-1"),
            assignment.genotype_of("trajectory-3")
        );
        assert!(outcome.linkage().is_none());
    }

    #[test]
    fn every_trajectory_lands_in_exactly_one_genotype() {
        let table = table(vec![
            ("trajectory-1", vec![0.0, 0.1, 0.2, 0.3]),
            ("trajectory-2", vec![0.0, 0.12, 0.19, 0.31]),
            ("trajectory-3", vec![0.8, 0.5, 0.2, 0.0]),
            ("trajectory-4", vec![0.0, 0.0, 0.0, 0.0]),
        ]);
        for method in [ClusterMethod::Matlab, ClusterMethod::Hierarchy] {
            let mut metrics = TrajectoryMetrics::new();
            let outcome = cluster_trajectories(&table, &mut metrics, &options(method)).unwrap();
            let assignment = outcome.assignment();
            let mut seen = 0usize;
            for id in table.ids() {
                assert!(assignment.genotype_of(id).is_some(), "{id} unassigned");
                seen += 1;
            }
            let total_members: usize = assignment
                .genotypes()
                .iter()
                .map(|genotype| genotype.members.len())
                .sum();
            assert_eq!(total_members, seen);
            assert!(assignment
                .genotypes()
                .iter()
                .all(|genotype| !genotype.members.is_empty()));
        }
    }

    #[test]
    fn starting_genotypes_seed_the_greedy_method() {
        let table = table(vec![
            ("trajectory-1", vec![0.0, 0.1, 0.2, 0.3]),
            ("trajectory-2", vec![0.8, 0.5, 0.2, 0.0]),
        ]);
        let mut seeded = options(ClusterMethod::Matlab);
        seeded.starting_genotypes = vec![vec!["trajectory-2".to_string()]];
        let mut metrics = TrajectoryMetrics::new();
        let outcome = cluster_trajectories(&table, &mut metrics, &seeded).unwrap();
        // The seeded group is created first, so it takes the first name.
        assert_eq!(
            outcome.assignment().genotype_of("trajectory-2"),
            Some("genotype-1")
        );
    }

    #[test]
    fn hierarchy_returns_a_full_linkage_matrix() {
        let table = table(vec![
            ("trajectory-1", vec![0.0, 0.5, 0.9, 0.9]),
            ("trajectory-2", vec![0.0, 0.5, 0.9, 0.9]),
            ("trajectory-3", vec![0.9, 0.5, 0.05, 0.0]),
        ]);
        let mut metrics = TrajectoryMetrics::new();
        let outcome =
            cluster_trajectories(&table, &mut metrics, &options(ClusterMethod::Hierarchy)).unwrap();
        let linkage = outcome.linkage().expect("hierarchy retains its linkage");
        assert_eq!(linkage.n_merges(), 2);
        assert_eq!(
            outcome.assignment().genotype_of("trajectory-1"),
            outcome.assignment().genotype_of("trajectory-2")
        );
    }
}
