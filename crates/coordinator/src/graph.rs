//! Fragment dependency graph.
//!
//! Maps each dependency id of the current batch to the sites expected to
//! produce it and the tables received so far. A dependency is satisfied
//! once every expected site has delivered its table.

use indexmap::IndexMap;
use std::collections::BTreeSet;
use strata_types::{DependencyId, SiteId, Table};

/// Outcome of recording one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphOffer {
    Recorded,
    /// No such dependency, or the site is not an expected respondent.
    Unexpected,
    /// The site already delivered this dependency.
    Duplicate,
}

#[derive(Debug, Default)]
struct DependencyEntry {
    expected: BTreeSet<SiteId>,
    received: IndexMap<SiteId, Table>,
}

impl DependencyEntry {
    fn is_satisfied(&self) -> bool {
        self.expected.len() == self.received.len()
    }
}

/// Outstanding dependencies of one batch.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    deps: IndexMap<DependencyId, DependencyEntry>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `dep` from every site in `respondents`.
    ///
    /// Re-declaring a dependency replaces its expectations and discards
    /// anything received for it.
    pub fn expect(&mut self, dep: DependencyId, respondents: BTreeSet<SiteId>) {
        self.deps.insert(
            dep,
            DependencyEntry {
                expected: respondents,
                received: IndexMap::new(),
            },
        );
    }

    /// Record `site`'s table for `dep`.
    pub fn offer(&mut self, dep: DependencyId, site: SiteId, table: Table) -> GraphOffer {
        let Some(entry) = self.deps.get_mut(&dep) else {
            return GraphOffer::Unexpected;
        };
        if !entry.expected.contains(&site) {
            return GraphOffer::Unexpected;
        }
        if entry.received.contains_key(&site) {
            return GraphOffer::Duplicate;
        }
        entry.received.insert(site, table);
        GraphOffer::Recorded
    }

    pub fn contains(&self, dep: DependencyId) -> bool {
        self.deps.contains_key(&dep)
    }

    pub fn is_satisfied(&self, dep: DependencyId) -> bool {
        self.deps.get(&dep).is_some_and(DependencyEntry::is_satisfied)
    }

    /// Dependencies still waiting on at least one site, in declaration order.
    pub fn missing(&self) -> Vec<DependencyId> {
        self.deps
            .iter()
            .filter(|(_, entry)| !entry.is_satisfied())
            .map(|(dep, _)| *dep)
            .collect()
    }

    pub fn all_satisfied(&self) -> bool {
        self.deps.values().all(DependencyEntry::is_satisfied)
    }

    /// Tables received for `dep`, in arrival order.
    pub fn tables(&self, dep: DependencyId) -> Option<Vec<Table>> {
        self.deps
            .get(&dep)
            .map(|entry| entry.received.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub fn clear(&mut self) {
        self.deps.clear();
    }
}
