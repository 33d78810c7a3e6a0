use std::collections::{HashMap, HashSet};

use generational_arena::{Arena, Index};
use termtree::Tree;
use tracing::instrument;

use crate::domain::entities::{CategoryId, CategoryRecord};

/// Tree node in the arena-based category forest.
#[derive(Debug)]
pub struct TreeNode {
    /// Category data for this node
    pub record: CategoryRecord,
    /// Index of parent node in the arena, None for root nodes
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, in display order
    pub children: Vec<Index>,
    /// Distance from the root (roots have depth 0)
    pub depth: usize,
}

impl TreeNode {
    pub fn id(&self) -> CategoryId {
        self.record.id
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Arena-based forest of category trees.
///
/// Built once by [`crate::domain::ForestBuilder`] and never mutated afterwards;
/// a new snapshot of records means a new forest.
#[derive(Debug, Default)]
pub struct CategoryForest {
    arena: Arena<TreeNode>,
    roots: Vec<Index>,
    by_id: HashMap<CategoryId, Index>,
}

impl CategoryForest {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[instrument(level = "trace", skip(self, record), fields(id = record.id))]
    pub(crate) fn insert_node(
        &mut self,
        record: CategoryRecord,
        parent: Option<Index>,
        depth: usize,
    ) -> Index {
        let id = record.id;
        let node = TreeNode {
            record,
            parent,
            children: Vec::new(),
            depth,
        };
        let node_idx = self.arena.insert(node);

        if let Some(parent_idx) = parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.push(node_idx);
            }
        } else {
            self.roots.push(node_idx);
        }
        self.by_id.insert(id, node_idx);

        node_idx
    }

    fn get(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn node(&self, id: CategoryId) -> Option<&TreeNode> {
        self.by_id.get(&id).and_then(|&idx| self.get(idx))
    }

    pub fn record(&self, id: CategoryId) -> Option<&CategoryRecord> {
        self.node(id).map(|n| &n.record)
    }

    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.roots.iter().filter_map(|&idx| self.get(idx))
    }

    pub fn root_ids(&self) -> Vec<CategoryId> {
        self.roots().map(TreeNode::id).collect()
    }

    pub fn is_root(&self, id: CategoryId) -> bool {
        self.node(id).map(|n| n.parent.is_none()).unwrap_or(false)
    }

    pub fn has_children(&self, id: CategoryId) -> bool {
        self.node(id).map(TreeNode::has_children).unwrap_or(false)
    }

    pub fn children(&self, id: CategoryId) -> Vec<&TreeNode> {
        self.node(id)
            .map(|n| n.children.iter().filter_map(|&c| self.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn child_ids(&self, id: CategoryId) -> Vec<CategoryId> {
        self.children(id).into_iter().map(TreeNode::id).collect()
    }

    pub fn parent_id(&self, id: CategoryId) -> Option<CategoryId> {
        self.node(id)
            .and_then(|n| n.parent)
            .and_then(|p| self.get(p))
            .map(TreeNode::id)
    }

    /// Ancestors of `id`, nearest first. Empty for roots and unknown ids.
    #[instrument(level = "trace", skip(self))]
    pub fn ancestors(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut chain = Vec::new();
        let mut current = self.node(id).and_then(|n| n.parent);
        while let Some(idx) = current {
            match self.get(idx) {
                Some(node) => {
                    chain.push(node.id());
                    current = node.parent;
                }
                None => break,
            }
        }
        chain
    }

    /// Ids from the root down to `id` inclusive. Empty for unknown ids.
    pub fn path(&self, id: CategoryId) -> Vec<CategoryId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut path = self.ancestors(id);
        path.reverse();
        path.push(id);
        path
    }

    /// Labels along [`Self::path`], joined with `" / "`.
    pub fn breadcrumb(&self, id: CategoryId) -> String {
        self.path(id)
            .into_iter()
            .filter_map(|p| self.record(p))
            .map(CategoryRecord::display_label)
            .collect::<Vec<_>>()
            .join(" / ")
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter(&self) -> ForestIterator<'_> {
        ForestIterator::new(self)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Height of the deepest tree; 0 for an empty forest, 1 for roots only.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.iter().map(|n| n.depth + 1).max().unwrap_or(0)
    }

    /// Ids of nodes without children, in display order.
    #[instrument(level = "debug", skip(self))]
    pub fn leaf_ids(&self) -> Vec<CategoryId> {
        self.iter()
            .filter(|n| !n.has_children())
            .map(TreeNode::id)
            .collect()
    }

    /// Renders the forest below a synthetic `root_label` node.
    ///
    /// With `visible` set, nodes outside the set are left out together with
    /// their subtrees. Subtrees are assembled bottom-up in one post-order pass.
    pub fn to_tree_string(
        &self,
        root_label: &str,
        visible: Option<&HashSet<CategoryId>>,
    ) -> Tree<String> {
        let shown = |id: CategoryId| visible.map(|v| v.contains(&id)).unwrap_or(true);
        let mut built: HashMap<CategoryId, Tree<String>> = HashMap::new();

        for node in self.iter_postorder().filter(|n| shown(n.id())) {
            let leaves: Vec<_> = node
                .children
                .iter()
                .filter_map(|&c| self.get(c))
                .filter_map(|c| built.remove(&c.id()))
                .collect();
            built.insert(
                node.id(),
                Tree::new(node.record.display_label()).with_leaves(leaves),
            );
        }

        let leaves: Vec<_> = self
            .roots()
            .filter_map(|r| built.remove(&r.id()))
            .collect();
        Tree::new(root_label.to_string()).with_leaves(leaves)
    }
}

/// Pre-order, left-to-right traversal over all trees of the forest.
pub struct ForestIterator<'a> {
    forest: &'a CategoryForest,
    stack: Vec<Index>,
}

impl<'a> ForestIterator<'a> {
    fn new(forest: &'a CategoryForest) -> Self {
        let stack = forest.roots.iter().rev().copied().collect();
        Self { forest, stack }
    }
}

impl<'a> Iterator for ForestIterator<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.forest.get(current_idx) {
                // Push children in reverse order for left-to-right traversal
                self.stack.extend(node.children.iter().rev());
                return Some(node);
            }
        }
        None
    }
}

/// Post-order traversal: every node is yielded after all of its descendants.
pub struct PostOrderIterator<'a> {
    forest: &'a CategoryForest,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(forest: &'a CategoryForest) -> Self {
        let stack = forest.roots.iter().rev().map(|&r| (r, false)).collect();
        Self { forest, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.forest.get(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some(node);
                }
            }
        }
        None
    }
}
