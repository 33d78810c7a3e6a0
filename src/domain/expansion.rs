//! Which interior nodes are open.

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::domain::arena::CategoryForest;
use crate::domain::entities::CategoryId;

/// Expanded/collapsed flag per node id. Unknown ids are collapsed.
///
/// Toggling never cascades: collapsing a parent keeps the flags of its
/// descendants, so re-expanding it restores the previous layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    open: HashMap<CategoryId, bool>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// First-load defaults: every root expanded, everything else collapsed.
    pub fn for_forest(forest: &CategoryForest) -> Self {
        let open = forest.root_ids().into_iter().map(|id| (id, true)).collect();
        Self { open }
    }

    pub fn is_expanded(&self, id: CategoryId) -> bool {
        self.open.get(&id).copied().unwrap_or(false)
    }

    /// Flips one entry and returns the new state.
    pub fn toggle(&mut self, id: CategoryId) -> bool {
        let entry = self.open.entry(id).or_insert(false);
        *entry = !*entry;
        *entry
    }

    pub fn expand(&mut self, id: CategoryId) {
        self.open.insert(id, true);
    }

    pub fn collapse(&mut self, id: CategoryId) {
        self.open.insert(id, false);
    }

    /// Forces every ancestor of `id` open so the node itself is visible.
    ///
    /// Returns the number of ancestors touched.
    #[instrument(level = "debug", skip(self, forest))]
    pub fn reveal(&mut self, forest: &CategoryForest, id: CategoryId) -> usize {
        let ancestors = forest.ancestors(id);
        for &ancestor in &ancestors {
            self.expand(ancestor);
        }
        debug!("reveal: {} ancestors of {} expanded", ancestors.len(), id);
        ancestors.len()
    }

    /// Opens every node that has children.
    pub fn expand_all_parents(&mut self, forest: &CategoryForest) {
        for node in forest.iter().filter(|n| n.has_children()) {
            self.expand(node.id());
        }
    }

    /// Ids currently expanded, ascending.
    pub fn expanded_ids(&self) -> Vec<CategoryId> {
        let mut ids: Vec<_> = self
            .open
            .iter()
            .filter(|&(_, &open)| open)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
