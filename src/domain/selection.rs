//! Selection Reconciler: single and multiple selection against a category forest.
//!
//! The reconciler owns the selection and translates clicks into selection or
//! expansion changes. Every change to the selection is pushed to a
//! [`SelectionSink`] immediately, one notification per user action.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::arena::CategoryForest;
use crate::domain::entities::{CategoryId, CategoryRecord};
use crate::domain::expansion::ExpansionState;
use crate::domain::natural::natural_cmp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Single,
    Multiple,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Single => write!(f, "single"),
            SelectionMode::Multiple => write!(f, "multiple"),
        }
    }
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(SelectionMode::Single),
            "multiple" | "multi" => Ok(SelectionMode::Multiple),
            other => Err(format!("unknown selection mode '{other}'")),
        }
    }
}

/// Which nodes may be selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SelectionPolicy {
    /// Every node, interior ones included
    AnyNode,
    /// Nodes without children
    #[default]
    LeafOnly,
    /// Nodes without children that are not roots
    NonRootLeaf,
    /// Nodes whose code starts with the prefix (case-insensitive)
    CodePrefix(String),
}

impl SelectionPolicy {
    /// Unknown ids are never selectable.
    pub fn allows(&self, forest: &CategoryForest, id: CategoryId) -> bool {
        let Some(node) = forest.node(id) else {
            return false;
        };
        match self {
            SelectionPolicy::AnyNode => true,
            SelectionPolicy::LeafOnly => !node.has_children(),
            SelectionPolicy::NonRootLeaf => !node.has_children() && !forest.is_root(id),
            SelectionPolicy::CodePrefix(prefix) => node
                .record
                .code
                .trim()
                .to_lowercase()
                .starts_with(&prefix.to_lowercase()),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::AnyNode => write!(f, "any"),
            SelectionPolicy::LeafOnly => write!(f, "leaf-only"),
            SelectionPolicy::NonRootLeaf => write!(f, "non-root-leaf"),
            SelectionPolicy::CodePrefix(prefix) => write!(f, "prefix:{prefix}"),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(prefix) = s.strip_prefix("prefix:") {
            let prefix = prefix.trim();
            if prefix.is_empty() {
                return Err("selection policy 'prefix:' needs a code prefix".to_string());
            }
            return Ok(SelectionPolicy::CodePrefix(prefix.to_string()));
        }
        match s.to_lowercase().as_str() {
            "any" => Ok(SelectionPolicy::AnyNode),
            "leaf-only" | "leaf" => Ok(SelectionPolicy::LeafOnly),
            "non-root-leaf" => Ok(SelectionPolicy::NonRootLeaf),
            other => Err(format!(
                "unknown selection policy '{other}' (expected any, leaf-only, non-root-leaf or prefix:<code>)"
            )),
        }
    }
}

impl TryFrom<String> for SelectionPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SelectionPolicy> for String {
    fn from(policy: SelectionPolicy) -> Self {
        policy.to_string()
    }
}

/// Value handed to the host form: `id | null` or `[id, ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectionValue {
    Single(Option<CategoryId>),
    Multiple(Vec<CategoryId>),
}

impl SelectionValue {
    pub fn empty(mode: SelectionMode) -> Self {
        match mode {
            SelectionMode::Single => SelectionValue::Single(None),
            SelectionMode::Multiple => SelectionValue::Multiple(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SelectionValue::Single(id) => id.is_none(),
            SelectionValue::Multiple(ids) => ids.is_empty(),
        }
    }

    pub fn ids(&self) -> Vec<CategoryId> {
        match self {
            SelectionValue::Single(id) => id.iter().copied().collect(),
            SelectionValue::Multiple(ids) => ids.clone(),
        }
    }
}

/// Receives every selection change.
pub trait SelectionSink {
    fn on_change(&mut self, value: SelectionValue);
}

impl<F: FnMut(SelectionValue)> SelectionSink for F {
    fn on_change(&mut self, value: SelectionValue) {
        self(value)
    }
}

/// What a click did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Single selection made; the host closes the picker
    Picked,
    /// Multiple selection changed; `selected` is the node's new state
    Toggled { selected: bool },
    Expanded,
    Collapsed,
    Ignored,
}

/// Selection state machine for one picker instance.
///
/// Ids that vanish from a refreshed forest stay selected until the host
/// clears them; they just have no label.
pub struct SelectionReconciler {
    mode: SelectionMode,
    policy: SelectionPolicy,
    single: Option<CategoryId>,
    multiple: BTreeSet<CategoryId>,
    loaded: bool,
    reveal_pending: bool,
    sink: Box<dyn SelectionSink>,
}

impl fmt::Debug for SelectionReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionReconciler")
            .field("mode", &self.mode)
            .field("policy", &self.policy)
            .field("value", &self.value())
            .field("loaded", &self.loaded)
            .field("reveal_pending", &self.reveal_pending)
            .finish_non_exhaustive()
    }
}

impl SelectionReconciler {
    pub fn new(
        mode: SelectionMode,
        policy: SelectionPolicy,
        initial: SelectionValue,
        sink: impl SelectionSink + 'static,
    ) -> Self {
        let mut reconciler = Self {
            mode,
            policy,
            single: None,
            multiple: BTreeSet::new(),
            loaded: false,
            reveal_pending: false,
            sink: Box::new(sink),
        };
        reconciler.sync_external(initial);
        reconciler
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Hooks up the first loaded forest: ancestors of the externally supplied
    /// selection are forced open. Later calls never force expansion again.
    #[instrument(level = "debug", skip_all)]
    pub fn attach(&mut self, forest: &CategoryForest, expansion: &mut ExpansionState) {
        if self.reveal_pending {
            for id in self.selected_ids() {
                expansion.reveal(forest, id);
            }
            self.reveal_pending = false;
        }
        self.loaded = true;
    }

    /// Resynchronizes with a value controlled by the host (form reset, edit).
    ///
    /// A value of the wrong shape for the mode counts as empty. Does not
    /// notify the sink.
    pub fn sync_external(&mut self, value: SelectionValue) {
        match (self.mode, value) {
            (SelectionMode::Single, SelectionValue::Single(id)) => self.single = id,
            (SelectionMode::Multiple, SelectionValue::Multiple(ids)) => {
                self.multiple = ids.into_iter().collect()
            }
            (SelectionMode::Single, SelectionValue::Multiple(_)) => self.single = None,
            (SelectionMode::Multiple, SelectionValue::Single(_)) => self.multiple.clear(),
        }
        let empty = self.value().is_empty();
        if empty {
            self.reveal_pending = false;
        } else if !self.loaded {
            self.reveal_pending = true;
        }
        debug!("sync_external: {:?}", self.value());
    }

    pub fn value(&self) -> SelectionValue {
        match self.mode {
            SelectionMode::Single => SelectionValue::Single(self.single),
            SelectionMode::Multiple => {
                SelectionValue::Multiple(self.multiple.iter().copied().collect())
            }
        }
    }

    pub fn selected_ids(&self) -> Vec<CategoryId> {
        self.value().ids()
    }

    pub fn is_selected(&self, id: CategoryId) -> bool {
        match self.mode {
            SelectionMode::Single => self.single == Some(id),
            SelectionMode::Multiple => self.multiple.contains(&id),
        }
    }

    pub fn is_selectable(&self, forest: &CategoryForest, id: CategoryId) -> bool {
        self.policy.allows(forest, id)
    }

    /// Selects `id` if the policy allows it.
    ///
    /// In multiple mode this is a [`Self::toggle`].
    #[instrument(level = "debug", skip(self, forest))]
    pub fn pick(&mut self, forest: &CategoryForest, id: CategoryId) -> ClickOutcome {
        if self.mode == SelectionMode::Multiple {
            return match self.toggle(forest, id) {
                Some(selected) => ClickOutcome::Toggled { selected },
                None => ClickOutcome::Ignored,
            };
        }
        if !self.is_selectable(forest, id) {
            debug!("pick: {} not selectable under {}", id, self.policy);
            return ClickOutcome::Ignored;
        }
        self.single = Some(id);
        self.emit();
        ClickOutcome::Picked
    }

    /// Adds or removes `id` in multiple mode; returns its new state.
    ///
    /// `None` when nothing changed (single mode or a non-selectable node).
    #[instrument(level = "debug", skip(self, forest))]
    pub fn toggle(&mut self, forest: &CategoryForest, id: CategoryId) -> Option<bool> {
        if self.mode != SelectionMode::Multiple || !self.is_selectable(forest, id) {
            return None;
        }
        let selected = if self.multiple.remove(&id) {
            false
        } else {
            self.multiple.insert(id);
            true
        };
        self.emit();
        Some(selected)
    }

    /// Row click as the picker sees it.
    ///
    /// Single mode: nodes with children toggle open/closed, other nodes are
    /// picked if selectable. Multiple mode: selectable nodes toggle, a
    /// collapsed node with children opens, anything else is ignored (only the
    /// explicit expander collapses).
    #[instrument(level = "debug", skip(self, forest, expansion))]
    pub fn click(
        &mut self,
        forest: &CategoryForest,
        expansion: &mut ExpansionState,
        id: CategoryId,
    ) -> ClickOutcome {
        let has_children = forest.has_children(id);
        match self.mode {
            SelectionMode::Single => {
                if has_children {
                    if expansion.toggle(id) {
                        ClickOutcome::Expanded
                    } else {
                        ClickOutcome::Collapsed
                    }
                } else {
                    self.pick(forest, id)
                }
            }
            SelectionMode::Multiple => {
                if let Some(selected) = self.toggle(forest, id) {
                    ClickOutcome::Toggled { selected }
                } else if has_children && !expansion.is_expanded(id) {
                    expansion.expand(id);
                    ClickOutcome::Expanded
                } else {
                    ClickOutcome::Ignored
                }
            }
        }
    }

    /// Text for the picker's input field.
    ///
    /// Multiple mode lists resolvable selections by natural code order,
    /// separated by `"; "`. Unresolvable ids contribute nothing.
    pub fn current_label(&self, forest: &CategoryForest) -> String {
        match self.mode {
            SelectionMode::Single => self
                .single
                .and_then(|id| forest.record(id))
                .map(CategoryRecord::display_label)
                .unwrap_or_default(),
            SelectionMode::Multiple => self
                .multiple
                .iter()
                .filter_map(|&id| forest.record(id))
                .sorted_by(|a, b| natural_cmp(&a.code, &b.code))
                .map(CategoryRecord::display_label)
                .join("; "),
        }
    }

    fn emit(&mut self) {
        let value = self.value();
        debug!("selection changed: {:?}", value);
        self.sink.on_change(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ForestBuilder;
    use rstest::rstest;

    fn forest() -> CategoryForest {
        ForestBuilder::new().build(vec![
            CategoryRecord::new(1, None, "H1", "Group"),
            CategoryRecord::new(2, Some(1), "S1", "Leaf A"),
            CategoryRecord::new(3, Some(1), "S2", "Leaf B"),
            CategoryRecord::new(9, None, "X9", "Lonely root"),
        ])
    }

    #[rstest]
    #[case("any", SelectionPolicy::AnyNode)]
    #[case("leaf-only", SelectionPolicy::LeafOnly)]
    #[case("Non-Root-Leaf", SelectionPolicy::NonRootLeaf)]
    #[case("prefix:S", SelectionPolicy::CodePrefix("S".into()))]
    fn policy_parses_from_config_text(#[case] text: &str, #[case] expected: SelectionPolicy) {
        assert_eq!(text.parse::<SelectionPolicy>(), Ok(expected.clone()));
        assert_eq!(expected.to_string().parse::<SelectionPolicy>(), Ok(expected));
    }

    #[test]
    fn given_bad_policy_text_when_parsing_then_errors() {
        assert!("prefix:".parse::<SelectionPolicy>().is_err());
        assert!("roots".parse::<SelectionPolicy>().is_err());
    }

    #[rstest]
    #[case(SelectionPolicy::AnyNode, vec![1, 2, 3, 9])]
    #[case(SelectionPolicy::LeafOnly, vec![2, 3, 9])]
    #[case(SelectionPolicy::NonRootLeaf, vec![2, 3])]
    #[case(SelectionPolicy::CodePrefix("h".into()), vec![1])]
    fn policy_decides_selectable_nodes(
        #[case] policy: SelectionPolicy,
        #[case] expected: Vec<CategoryId>,
    ) {
        let forest = forest();
        let selectable: Vec<_> = forest
            .iter()
            .map(|n| n.id())
            .filter(|&id| policy.allows(&forest, id))
            .collect();
        assert_eq!(selectable, expected);
        assert!(!policy.allows(&forest, 404));
    }

    #[test]
    fn given_single_value_when_serializing_then_matches_host_contract() {
        let single = serde_json::to_string(&SelectionValue::Single(Some(2))).unwrap();
        let none = serde_json::to_string(&SelectionValue::Single(None)).unwrap();
        let many = serde_json::to_string(&SelectionValue::Multiple(vec![2, 3])).unwrap();
        assert_eq!(single, "2");
        assert_eq!(none, "null");
        assert_eq!(many, "[2,3]");
    }

    #[test]
    fn given_mismatched_external_value_when_syncing_then_treated_as_empty() {
        let mut r = SelectionReconciler::new(
            SelectionMode::Multiple,
            SelectionPolicy::LeafOnly,
            SelectionValue::Multiple(vec![2]),
            |_: SelectionValue| {},
        );
        r.sync_external(SelectionValue::Single(Some(3)));
        assert_eq!(r.value(), SelectionValue::Multiple(vec![]));
    }

    #[test]
    fn given_multiple_selection_when_labelling_then_sorted_and_stale_skipped() {
        let forest = forest();
        let r = SelectionReconciler::new(
            SelectionMode::Multiple,
            SelectionPolicy::LeafOnly,
            SelectionValue::Multiple(vec![3, 404, 2]),
            |_: SelectionValue| {},
        );
        assert_eq!(r.current_label(&forest), "S1 Leaf A; S2 Leaf B");
    }
}
