//! Domain layer: category records and the picker state machines
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).
//! Every operation is total; malformed input is normalized instead of rejected.

pub mod arena;
pub mod builder;
pub mod entities;
pub mod expansion;
pub mod matcher;
pub mod natural;
pub mod selection;
pub mod session;
pub mod view;

pub use arena::{CategoryForest, TreeNode};
pub use builder::{BuildStats, ForestBuilder, RecordComparator, SortKey};
pub use entities::*;
pub use expansion::ExpansionState;
pub use matcher::{visible_ids, Matcher, SearchField, SearchScope};
pub use natural::natural_cmp;
pub use selection::{
    ClickOutcome, SelectionMode, SelectionPolicy, SelectionReconciler, SelectionSink,
    SelectionValue,
};
pub use session::{FetchOutcome, FetchTicket, PickerConfig, PickerSession};
pub use view::{visible_rows, Row};
