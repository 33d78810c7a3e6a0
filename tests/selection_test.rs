//! Integration tests for SelectionReconciler and ExpansionState working together

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use rstest::{fixture, rstest};

use catpick::domain::{
    CategoryForest, CategoryId, CategoryRecord, ClickOutcome, ExpansionState, ForestBuilder,
    SelectionMode, SelectionPolicy, SelectionReconciler, SelectionValue,
};
use catpick::util::testing;

type Emitted = Rc<RefCell<Vec<SelectionValue>>>;

fn reconciler(
    mode: SelectionMode,
    policy: SelectionPolicy,
    initial: SelectionValue,
) -> (SelectionReconciler, Emitted) {
    let emitted: Emitted = Rc::default();
    let sink = {
        let emitted = Rc::clone(&emitted);
        move |value: SelectionValue| emitted.borrow_mut().push(value)
    };
    (SelectionReconciler::new(mode, policy, initial, sink), emitted)
}

/// H1 Group → {S1 Leaf A, S2 Leaf B}
#[fixture]
fn group() -> CategoryForest {
    testing::init_test_setup();
    ForestBuilder::new().build(vec![
        CategoryRecord::new(1, None, "H1", "Group"),
        CategoryRecord::new(2, Some(1), "S1", "Leaf A"),
        CategoryRecord::new(3, Some(1), "S2", "Leaf B"),
    ])
}

/// R → B → L plus an unrelated root
#[fixture]
fn deep() -> CategoryForest {
    ForestBuilder::new().build(vec![
        CategoryRecord::new(10, None, "R", "Root"),
        CategoryRecord::new(20, Some(10), "B", "Branch"),
        CategoryRecord::new(30, Some(20), "L", "Leaf"),
        CategoryRecord::new(40, None, "Z", "Other"),
    ])
}

// ============================================================
// Single selection
// ============================================================

#[rstest]
fn given_leaf_only_single_mode_when_picking_then_interior_is_noop_and_leaf_emits(
    group: CategoryForest,
) {
    let (mut r, emitted) = reconciler(
        SelectionMode::Single,
        SelectionPolicy::LeafOnly,
        SelectionValue::Single(None),
    );

    assert_eq!(r.pick(&group, 1), ClickOutcome::Ignored);
    assert_eq!(r.value(), SelectionValue::Single(None));
    assert!(emitted.borrow().is_empty());

    assert_eq!(r.pick(&group, 2), ClickOutcome::Picked);
    assert_eq!(*emitted.borrow(), vec![SelectionValue::Single(Some(2))]);
}

#[rstest]
fn given_single_mode_when_clicking_interior_then_toggles_expansion_only(group: CategoryForest) {
    let (mut r, emitted) = reconciler(
        SelectionMode::Single,
        SelectionPolicy::AnyNode,
        SelectionValue::Single(None),
    );
    let mut expansion = ExpansionState::for_forest(&group);

    assert_eq!(r.click(&group, &mut expansion, 1), ClickOutcome::Collapsed);
    assert_eq!(r.click(&group, &mut expansion, 1), ClickOutcome::Expanded);
    assert_eq!(r.value(), SelectionValue::Single(None));
    assert!(emitted.borrow().is_empty());

    assert_eq!(r.click(&group, &mut expansion, 3), ClickOutcome::Picked);
    assert_eq!(r.current_label(&group), "S2 Leaf B");
}

#[rstest]
fn given_any_node_policy_when_picking_interior_then_selects_it(group: CategoryForest) {
    let (mut r, _) = reconciler(
        SelectionMode::Single,
        SelectionPolicy::AnyNode,
        SelectionValue::Single(None),
    );
    assert_eq!(r.pick(&group, 1), ClickOutcome::Picked);
    assert!(r.is_selected(1));
}

#[rstest]
fn given_non_root_leaf_policy_when_picking_childless_root_then_ignored(deep: CategoryForest) {
    let (mut r, _) = reconciler(
        SelectionMode::Single,
        SelectionPolicy::NonRootLeaf,
        SelectionValue::Single(None),
    );
    assert_eq!(r.pick(&deep, 40), ClickOutcome::Ignored);
    assert_eq!(r.pick(&deep, 30), ClickOutcome::Picked);
}

#[rstest]
fn given_prefix_policy_when_picking_then_only_matching_codes_selectable(group: CategoryForest) {
    let (mut r, _) = reconciler(
        SelectionMode::Single,
        SelectionPolicy::CodePrefix("h".into()),
        SelectionValue::Single(None),
    );
    assert_eq!(r.pick(&group, 2), ClickOutcome::Ignored);
    assert_eq!(r.pick(&group, 1), ClickOutcome::Picked);
}

// ============================================================
// Multiple selection
// ============================================================

#[rstest]
fn given_empty_multi_selection_when_toggling_2_3_2_then_only_3_remains(group: CategoryForest) {
    let (mut r, emitted) = reconciler(
        SelectionMode::Multiple,
        SelectionPolicy::LeafOnly,
        SelectionValue::Multiple(vec![]),
    );

    assert_eq!(r.toggle(&group, 2), Some(true));
    assert_eq!(r.toggle(&group, 3), Some(true));
    assert_eq!(r.toggle(&group, 2), Some(false));

    assert_eq!(r.value(), SelectionValue::Multiple(vec![3]));
    assert_eq!(
        *emitted.borrow(),
        vec![
            SelectionValue::Multiple(vec![2]),
            SelectionValue::Multiple(vec![2, 3]),
            SelectionValue::Multiple(vec![3]),
        ]
    );
}

#[rstest]
fn given_multi_mode_when_clicking_interior_then_expands_but_never_collapses(
    group: CategoryForest,
) {
    let (mut r, emitted) = reconciler(
        SelectionMode::Multiple,
        SelectionPolicy::LeafOnly,
        SelectionValue::Multiple(vec![]),
    );
    let mut expansion = ExpansionState::new();

    assert_eq!(r.click(&group, &mut expansion, 1), ClickOutcome::Expanded);
    assert!(expansion.is_expanded(1));
    assert_eq!(r.click(&group, &mut expansion, 1), ClickOutcome::Ignored);
    assert!(expansion.is_expanded(1));
    assert!(emitted.borrow().is_empty());

    assert_eq!(
        r.click(&group, &mut expansion, 2),
        ClickOutcome::Toggled { selected: true }
    );
}

#[rstest]
fn given_multi_mode_when_picking_then_behaves_like_toggle(group: CategoryForest) {
    let (mut r, _) = reconciler(
        SelectionMode::Multiple,
        SelectionPolicy::LeafOnly,
        SelectionValue::Multiple(vec![2]),
    );
    assert_eq!(r.pick(&group, 2), ClickOutcome::Toggled { selected: false });
    assert_eq!(r.pick(&group, 1), ClickOutcome::Ignored);
}

#[rstest]
fn given_single_mode_when_toggling_then_nothing_changes(group: CategoryForest) {
    let (mut r, emitted) = reconciler(
        SelectionMode::Single,
        SelectionPolicy::LeafOnly,
        SelectionValue::Single(Some(2)),
    );
    assert_eq!(r.toggle(&group, 3), None);
    assert_eq!(r.value(), SelectionValue::Single(Some(2)));
    assert!(emitted.borrow().is_empty());
}

#[rstest]
fn given_stale_selection_when_forest_refreshes_then_id_is_kept_without_label(
    group: CategoryForest,
) {
    let (r, _) = reconciler(
        SelectionMode::Multiple,
        SelectionPolicy::LeafOnly,
        SelectionValue::Multiple(vec![2, 3]),
    );
    let refreshed = ForestBuilder::new().build(vec![
        CategoryRecord::new(1, None, "H1", "Group"),
        CategoryRecord::new(3, Some(1), "S2", "Leaf B"),
    ]);

    assert_eq!(r.selected_ids(), vec![2, 3]);
    assert_eq!(r.current_label(&refreshed), "S2 Leaf B");
    assert_eq!(r.current_label(&group), "S1 Leaf A; S2 Leaf B");
}

// ============================================================
// Load-time reveal and external sync
// ============================================================

#[rstest]
fn given_external_selection_deep_in_tree_when_attaching_then_ancestors_expand(
    deep: CategoryForest,
) {
    let (mut r, _) = reconciler(
        SelectionMode::Single,
        SelectionPolicy::LeafOnly,
        SelectionValue::Single(Some(30)),
    );
    let mut expansion = ExpansionState::for_forest(&deep);
    assert!(!expansion.is_expanded(20));

    r.attach(&deep, &mut expansion);

    assert!(expansion.is_expanded(10));
    assert!(expansion.is_expanded(20));
    assert!(!expansion.is_expanded(30));
}

#[rstest]
fn given_attached_reconciler_when_user_collapses_and_reattaches_then_no_forced_expansion(
    deep: CategoryForest,
) {
    let (mut r, _) = reconciler(
        SelectionMode::Single,
        SelectionPolicy::LeafOnly,
        SelectionValue::Single(Some(30)),
    );
    let mut expansion = ExpansionState::for_forest(&deep);
    r.attach(&deep, &mut expansion);
    expansion.collapse(20);

    r.attach(&deep, &mut expansion);

    assert!(!expansion.is_expanded(20));
}

#[rstest]
fn given_external_reset_to_null_before_load_when_attaching_then_nothing_forced(
    deep: CategoryForest,
) {
    let (mut r, emitted) = reconciler(
        SelectionMode::Single,
        SelectionPolicy::LeafOnly,
        SelectionValue::Single(Some(30)),
    );
    r.sync_external(SelectionValue::Single(None));
    let mut expansion = ExpansionState::for_forest(&deep);

    r.attach(&deep, &mut expansion);

    assert!(!expansion.is_expanded(20));
    assert_eq!(r.value(), SelectionValue::Single(None));
    assert!(emitted.borrow().is_empty());
}

#[rstest]
fn given_loaded_reconciler_when_host_changes_value_then_state_follows_silently(
    group: CategoryForest,
) {
    let (mut r, emitted) = reconciler(
        SelectionMode::Multiple,
        SelectionPolicy::LeafOnly,
        SelectionValue::Multiple(vec![]),
    );
    let mut expansion = ExpansionState::for_forest(&group);
    r.attach(&group, &mut expansion);

    r.sync_external(SelectionValue::Multiple(vec![3, 2, 3]));

    assert_eq!(r.value(), SelectionValue::Multiple(vec![2, 3]));
    assert!(r.is_selected(3));
    assert!(emitted.borrow().is_empty());
}

// ============================================================
// Properties
// ============================================================

fn leaf_forest(n: usize) -> CategoryForest {
    let root = n as CategoryId + 1;
    let mut records = vec![CategoryRecord::new(root, None, "H0", "Root")];
    records.extend((1..root).map(|id| {
        CategoryRecord::new(id, Some(root), format!("S{id}"), format!("Leaf {id}"))
    }));
    ForestBuilder::new().build(records)
}

proptest! {
    #[test]
    fn toggling_twice_restores_selection(
        initial in prop::collection::btree_set(1i64..=20, 0..10),
        id in 1i64..=21,
    ) {
        let forest = leaf_forest(20);
        let initial: Vec<CategoryId> = initial.into_iter().collect();
        let (mut r, _) = reconciler(
            SelectionMode::Multiple,
            SelectionPolicy::LeafOnly,
            SelectionValue::Multiple(initial.clone()),
        );

        r.toggle(&forest, id);
        r.toggle(&forest, id);

        prop_assert_eq!(r.value(), SelectionValue::Multiple(initial));
    }

    #[test]
    fn leaf_only_pick_changes_state_exactly_for_leaves(id in 1i64..=21) {
        let forest = leaf_forest(20);
        let (mut r, emitted) = reconciler(
            SelectionMode::Single,
            SelectionPolicy::LeafOnly,
            SelectionValue::Single(None),
        );

        let outcome = r.pick(&forest, id);

        if forest.has_children(id) {
            prop_assert_eq!(outcome, ClickOutcome::Ignored);
            prop_assert_eq!(r.value(), SelectionValue::Single(None));
            prop_assert!(emitted.borrow().is_empty());
        } else {
            prop_assert_eq!(outcome, ClickOutcome::Picked);
            prop_assert_eq!(r.value(), SelectionValue::Single(Some(id)));
        }
    }
}
