//! Interactive picking loop over a [`Selector`]
//!
//! Every tree row becomes one selector entry. A parent that the policy also
//! allows to be selected gets two entries: one that opens or closes it and
//! one that selects it.

use tracing::{debug, instrument};

use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::domain::{CategoryId, ClickOutcome, PickerSession, Row, SelectionMode, SelectionValue};
use crate::infrastructure::traits::{SelectionItem, Selector};
use crate::infrastructure::InfraError;

const DONE: &str = "done";

/// What choosing a selector entry does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    /// Open or close a parent
    Expand(CategoryId),
    /// Pick (single) or toggle (multiple)
    Select(CategoryId),
    /// Finish a multiple selection
    Done,
}

impl RowAction {
    pub fn encode(self) -> String {
        match self {
            RowAction::Expand(id) => format!("expand:{id}"),
            RowAction::Select(id) => format!("select:{id}"),
            RowAction::Done => DONE.to_string(),
        }
    }

    pub fn decode(value: &str) -> Option<Self> {
        if value == DONE {
            return Some(RowAction::Done);
        }
        let (kind, id) = value.split_once(':')?;
        let id = id.parse().ok()?;
        match kind {
            "expand" => Some(RowAction::Expand(id)),
            "select" => Some(RowAction::Select(id)),
            _ => None,
        }
    }
}

/// Selector entries for the rows currently visible in `session`.
pub fn picker_items(session: &PickerSession) -> Vec<SelectionItem> {
    let multiple = session.reconciler().mode() == SelectionMode::Multiple;
    let mut items = Vec::new();
    if multiple {
        items.push(SelectionItem {
            display: format!(
                "✔ done ({} selected)",
                session.reconciler().selected_ids().len()
            ),
            value: RowAction::Done.encode(),
        });
    }
    for row in session.rows() {
        items.extend(row_items(session, &row, multiple));
    }
    items
}

fn row_items(session: &PickerSession, row: &Row, multiple: bool) -> Vec<SelectionItem> {
    let forest = session.forest();
    let reconciler = session.reconciler();
    let indent = "  ".repeat(row.depth);
    let label = forest
        .record(row.id)
        .map(|r| r.display_label())
        .unwrap_or_default();
    let selectable = reconciler.is_selectable(forest, row.id);
    let check = match (multiple, selectable, reconciler.is_selected(row.id)) {
        (false, _, _) => "",
        (true, false, _) => "    ",
        (true, true, true) => "[x] ",
        (true, true, false) => "[ ] ",
    };

    if !row.has_children {
        return vec![SelectionItem {
            display: format!("{indent}  {check}{label}  [{}]", row.id),
            value: RowAction::Select(row.id).encode(),
        }];
    }

    let marker = if row.expanded { "▾" } else { "▸" };
    let mut items = vec![SelectionItem {
        display: format!("{indent}{marker} {label}  [{}]", row.id),
        value: RowAction::Expand(row.id).encode(),
    }];
    if selectable {
        items.push(SelectionItem {
            display: format!("{indent}  {check}select {label}  [{}]", row.id),
            value: RowAction::Select(row.id).encode(),
        });
    }
    items
}

/// Runs the dialog until a single pick, `done` or Esc, then closes `session`.
///
/// Returns the final value when it differs from the value the dialog opened with.
#[instrument(level = "debug", skip_all)]
pub fn run_picker(
    selector: &dyn Selector,
    session: &mut PickerSession,
) -> CliResult<Option<SelectionValue>> {
    let initial = session.value();

    loop {
        let items = picker_items(session);
        let prompt = format!("{}> ", session.current_label());
        let Some(choice) = selector
            .select_one(&items, &prompt)
            .map_err(|message| InfraError::Selector { message })?
        else {
            debug!("run_picker: dialog dismissed");
            break;
        };

        match RowAction::decode(&choice.value) {
            Some(RowAction::Done) => break,
            Some(RowAction::Expand(id)) => {
                let open = session.toggle_expansion(id);
                debug!("run_picker: {} expanded={}", id, open);
            }
            Some(RowAction::Select(id)) => match session.pick(id) {
                ClickOutcome::Picked => break,
                ClickOutcome::Ignored => output::warning(&format!(
                    "{} is not selectable under policy {}",
                    choice.display.trim(),
                    session.reconciler().policy()
                )),
                outcome => debug!("run_picker: {:?}", outcome),
            },
            None => debug!("run_picker: unknown entry '{}'", choice.value),
        }
    }
    session.close();

    let value = session.value();
    Ok((value != initial).then_some(value))
}

/// Selection as the host form receives it: `2`, `null` or `[2,3]`.
pub fn selection_json(value: &SelectionValue) -> CliResult<String> {
    serde_json::to_string(value)
        .map_err(|e| CliError::Usage(format!("cannot encode selection: {e}")))
}
