//! One picker instance from the first fetch until close.
//!
//! Fetches are the only suspending step. The session hands out a ticket per
//! fetch and applies a completion only if it carries the newest ticket and
//! the session is still open.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::domain::arena::CategoryForest;
use crate::domain::builder::{ForestBuilder, SortKey};
use crate::domain::entities::{
    BorderlineSplitter, CategoryId, CategoryRecord, ReferenceCard, DEFAULT_BORDERLINE_MARKER,
};
use crate::domain::expansion::ExpansionState;
use crate::domain::matcher::{visible_ids, Matcher, SearchScope};
use crate::domain::selection::{
    ClickOutcome, SelectionMode, SelectionPolicy, SelectionReconciler, SelectionSink,
    SelectionValue,
};
use crate::domain::view::{visible_rows, Row};

/// Everything that parameterizes one picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerConfig {
    pub mode: SelectionMode,
    pub policy: SelectionPolicy,
    pub scope: SearchScope,
    pub sort: SortKey,
    pub borderline_marker: String,
    /// Open every parent on first load instead of only the roots
    pub expand_all: bool,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Single,
            policy: SelectionPolicy::LeafOnly,
            scope: SearchScope::default(),
            sort: SortKey::Code,
            borderline_marker: DEFAULT_BORDERLINE_MARKER.to_string(),
            expand_all: false,
        }
    }
}

/// Generation number of an issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The records replaced the forest
    Applied,
    /// A newer fetch was issued after this one
    Superseded,
    /// The session was closed
    Discarded,
}

pub struct PickerSession {
    config: PickerConfig,
    builder: ForestBuilder,
    splitter: BorderlineSplitter,
    forest: CategoryForest,
    expansion: ExpansionState,
    reconciler: SelectionReconciler,
    matcher: Matcher,
    visible: Option<HashSet<CategoryId>>,
    generation: u64,
    loading: bool,
    loaded: bool,
    closed: bool,
}

impl PickerSession {
    pub fn new(
        config: PickerConfig,
        initial: SelectionValue,
        sink: impl SelectionSink + 'static,
    ) -> Self {
        let reconciler =
            SelectionReconciler::new(config.mode, config.policy.clone(), initial, sink);
        Self {
            builder: ForestBuilder::new().sort_by(config.sort),
            splitter: BorderlineSplitter::new(&config.borderline_marker),
            matcher: Matcher::new("", config.scope.clone()),
            forest: CategoryForest::default(),
            expansion: ExpansionState::new(),
            reconciler,
            visible: None,
            generation: 0,
            loading: false,
            loaded: false,
            closed: false,
            config,
        }
    }

    pub fn config(&self) -> &PickerConfig {
        &self.config
    }

    pub fn forest(&self) -> &CategoryForest {
        &self.forest
    }

    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    pub fn reconciler(&self) -> &SelectionReconciler {
        &self.reconciler
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Starts a fetch; any ticket issued earlier becomes stale.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        self.loading = true;
        debug!("begin_fetch: generation {}", self.generation);
        FetchTicket(self.generation)
    }

    /// Applies fetched records if `ticket` is still current.
    ///
    /// The first applied fetch sets up default expansion and reveals the
    /// external selection. Later ones keep expansion flags and selection.
    #[instrument(level = "debug", skip(self, records), fields(records = records.len()))]
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        records: Vec<CategoryRecord>,
    ) -> FetchOutcome {
        if self.closed {
            debug!("complete_fetch: session closed, discarding {:?}", ticket);
            return FetchOutcome::Discarded;
        }
        if ticket.0 != self.generation {
            debug!(
                "complete_fetch: {:?} superseded by generation {}",
                ticket, self.generation
            );
            return FetchOutcome::Superseded;
        }

        self.forest = self.builder.build(records);
        if !self.loaded {
            self.expansion = ExpansionState::for_forest(&self.forest);
            if self.config.expand_all {
                self.expansion.expand_all_parents(&self.forest);
            }
        }
        self.reconciler.attach(&self.forest, &mut self.expansion);
        self.refresh_visibility();
        self.loading = false;
        self.loaded = true;
        info!("loaded {} categories", self.forest.len());
        FetchOutcome::Applied
    }

    /// The source failed; the previous forest stays.
    pub fn fail_fetch(&mut self, ticket: FetchTicket) {
        if !self.closed && ticket.0 == self.generation {
            warn!("category fetch failed, keeping {} categories", self.forest.len());
            self.loading = false;
        }
    }

    /// Tears the session down; pending fetches are discarded on completion.
    pub fn close(&mut self) {
        self.closed = true;
        self.loading = false;
    }

    pub fn set_filter(&mut self, query: &str) {
        self.matcher = Matcher::new(query, self.config.scope.clone());
        self.refresh_visibility();
    }

    pub fn filter(&self) -> &str {
        self.matcher.query()
    }

    fn refresh_visibility(&mut self) {
        self.visible = self
            .matcher
            .is_active()
            .then(|| visible_ids(&self.forest, &self.matcher));
    }

    pub fn rows(&self) -> Vec<Row> {
        visible_rows(&self.forest, &self.expansion, self.visible.as_ref())
    }

    pub fn click(&mut self, id: CategoryId) -> ClickOutcome {
        self.reconciler.click(&self.forest, &mut self.expansion, id)
    }

    pub fn pick(&mut self, id: CategoryId) -> ClickOutcome {
        self.reconciler.pick(&self.forest, id)
    }

    pub fn toggle(&mut self, id: CategoryId) -> Option<bool> {
        self.reconciler.toggle(&self.forest, id)
    }

    /// Explicit expander control.
    pub fn toggle_expansion(&mut self, id: CategoryId) -> bool {
        self.expansion.toggle(id)
    }

    pub fn sync_external(&mut self, value: SelectionValue) {
        self.reconciler.sync_external(value)
    }

    pub fn value(&self) -> SelectionValue {
        self.reconciler.value()
    }

    pub fn current_label(&self) -> String {
        self.reconciler.current_label(&self.forest)
    }

    pub fn inspect(&self, id: CategoryId) -> Option<ReferenceCard> {
        self.forest
            .record(id)
            .map(|record| ReferenceCard::from_record(record, &self.splitter))
    }
}
