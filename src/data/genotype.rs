//! # Genotypes and the Lineage Forest
//!
//! A genotype is a cluster of trajectories represented by their mean
//! frequency series; the lineage forest records which genotype arose in
//! the background of which other genotype. `genotype-0` is the reserved
//! synthetic root for the unsampled ancestral background and never has
//! member trajectories of its own.

use std::collections::{BTreeMap, HashMap};

use crate::data::table::{FrequencyTable, SeriesView};
use crate::error::{ClonesiftError, Result};

/// The synthetic root background.
pub const ROOT_GENOTYPE: &str = "genotype-0";

/// Mean genotype series plus the ordered member list behind each row.
#[derive(Debug, Clone)]
pub struct GenotypeTable {
    table: FrequencyTable,
    members: Vec<Vec<String>>,
}

impl GenotypeTable {
    /// Pair a mean-frequency table with the member list of each row.
    pub fn new(table: FrequencyTable, members: Vec<Vec<String>>) -> Result<Self> {
        if table.len() != members.len() {
            return Err(ClonesiftError::algorithm(format!(
                "{} genotype rows but {} member lists",
                table.len(),
                members.len()
            )));
        }
        if members.iter().any(|list| list.is_empty()) {
            return Err(ClonesiftError::algorithm(
                "every genotype must have at least one member trajectory",
            ));
        }
        Ok(Self { table, members })
    }

    /// The mean-frequency table (rows = genotype ids).
    pub fn table(&self) -> &FrequencyTable {
        &self.table
    }

    /// Genotype ids in table order.
    pub fn ids(&self) -> &[String] {
        self.table.ids()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Mean series for one genotype.
    pub fn series(&self, id: &str) -> Option<SeriesView<'_>> {
        self.table.series(id)
    }

    /// Ordered member trajectories of one genotype.
    pub fn members(&self, id: &str) -> Option<&[String]> {
        self.table
            .position(id)
            .map(|position| self.members[position].as_slice())
    }

    /// Iterate (genotype series, members) in table order.
    pub fn iter(&self) -> impl Iterator<Item = (SeriesView<'_>, &[String])> {
        self.table
            .iter()
            .zip(self.members.iter().map(Vec::as_slice))
    }

    /// Total mapping from member trajectory to its genotype.
    pub fn trajectory_to_genotype(&self) -> HashMap<String, String> {
        let mut mapping = HashMap::new();
        for (series, members) in self.iter() {
            for member in members {
                mapping.insert(member.clone(), series.id.to_string());
            }
        }
        mapping
    }

    /// A new table with rows permuted into `order`.
    pub fn reordered(&self, order: &[String]) -> Result<Self> {
        let table = self.table.reordered(order)?;
        let members = order
            .iter()
            .map(|id| {
                self.members(id)
                    .map(<[String]>::to_vec)
                    .ok_or_else(|| {
                        ClonesiftError::algorithm(format!("reorder references unknown genotype {id}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(table, members)
    }
}

/// One parent/child relationship in the lineage forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageEdge {
    pub parent: String,
    pub identity: String,
}

/// Parent assignment for every non-root genotype.
///
/// Construction guarantees totality; [`LineageForest::validate`] checks the
/// structural invariants (no self-parenting, acyclic, rooted at
/// [`ROOT_GENOTYPE`]).
#[derive(Debug, Clone, Default)]
pub struct LineageForest {
    parents: BTreeMap<String, String>,
}

impl LineageForest {
    /// Build a forest from (child, parent) pairs.
    pub fn from_parents(parents: BTreeMap<String, String>) -> Self {
        Self { parents }
    }

    /// The assigned parent of a genotype, if the genotype is known.
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(String::as_str)
    }

    /// Child ids in lexical order.
    pub fn children_ids(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(String::as_str)
    }

    /// Edges in lexical child order.
    pub fn edges(&self) -> Vec<LineageEdge> {
        self.parents
            .iter()
            .map(|(identity, parent)| LineageEdge {
                parent: parent.clone(),
                identity: identity.clone(),
            })
            .collect()
    }

    /// parent -> children index, built once and treated as read-only.
    pub fn children_index(&self) -> BTreeMap<String, Vec<String>> {
        let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (identity, parent) in &self.parents {
            index.entry(parent.clone()).or_default().push(identity.clone());
        }
        index
    }

    /// Ancestor chain of `id`, ending at [`ROOT_GENOTYPE`].
    ///
    /// Stops after `|genotypes| + 1` steps; a chain that has not reached
    /// the root by then is cyclic and reported as an error.
    pub fn ancestors(&self, id: &str) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut current = id;
        for _ in 0..=self.parents.len() {
            match self.parents.get(current) {
                None if current == ROOT_GENOTYPE => return Ok(chain),
                None => {
                    return Err(ClonesiftError::algorithm(format!(
                        "lineage chain of {id} escapes through unknown genotype {current}"
                    )))
                }
                Some(parent) => {
                    chain.push(parent.clone());
                    current = parent;
                }
            }
        }
        Err(ClonesiftError::algorithm(format!(
            "lineage chain of {id} does not terminate at {ROOT_GENOTYPE}"
        )))
    }

    /// Check that every parent chain terminates at the root without cycles.
    pub fn validate(&self) -> Result<()> {
        for id in self.parents.keys() {
            if self.parents.get(id).map(String::as_str) == Some(id.as_str()) {
                return Err(ClonesiftError::algorithm(format!(
                    "genotype {id} is assigned as its own parent"
                )));
            }
            self.ancestors(id)?;
        }
        Ok(())
    }

    /// A new forest with `child` re-rooted at [`ROOT_GENOTYPE`].
    pub fn rerooted(&self, child: &str) -> Self {
        let mut parents = self.parents.clone();
        if let Some(parent) = parents.get_mut(child) {
            *parent = ROOT_GENOTYPE.to_string();
        }
        Self { parents }
    }
}
