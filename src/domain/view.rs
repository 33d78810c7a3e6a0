use std::collections::HashSet;

use crate::domain::arena::{CategoryForest, TreeNode};
use crate::domain::entities::CategoryId;
use crate::domain::expansion::ExpansionState;

/// One line of the rendered picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub id: CategoryId,
    pub depth: usize,
    pub has_children: bool,
    pub expanded: bool,
}

/// Flattens the forest into the rows a renderer draws, top to bottom.
///
/// Without a filter, children appear only below expanded parents. With a
/// filter, only ids in `visibility` are emitted and a parent with a visible
/// child is shown open regardless of its expansion flag.
pub fn visible_rows(
    forest: &CategoryForest,
    expansion: &ExpansionState,
    visibility: Option<&HashSet<CategoryId>>,
) -> Vec<Row> {
    let is_visible = |node: &TreeNode| visibility.map(|v| v.contains(&node.id())).unwrap_or(true);

    let mut rows = Vec::new();
    let mut stack: Vec<&TreeNode> = forest.roots().filter(|n| is_visible(n)).collect();
    stack.reverse();

    while let Some(node) = stack.pop() {
        let children: Vec<&TreeNode> = forest
            .children(node.id())
            .into_iter()
            .filter(|c| is_visible(c))
            .collect();
        let expanded = match visibility {
            Some(_) => !children.is_empty(),
            None => expansion.is_expanded(node.id()),
        };
        rows.push(Row {
            id: node.id(),
            depth: node.depth,
            has_children: node.has_children(),
            expanded,
        });
        if expanded {
            stack.extend(children.into_iter().rev());
        }
    }
    rows
}
