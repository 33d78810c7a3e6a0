//! Domain entities: category records and the reference card shown on inspection

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Stable identity of a category.
pub type CategoryId = i64;

/// Default marker separating borderline notes from the excludes text.
pub const DEFAULT_BORDERLINE_MARKER: &str = "Пограничное:";

/// One node of the category hierarchy as delivered by the record source.
///
/// Every field except `id` is optional on the wire. Missing or `null` strings
/// become empty, and a missing, `null` or `0` parent reference means root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: CategoryId,
    #[serde(
        default,
        alias = "parentId",
        alias = "parent",
        deserialize_with = "parent_reference"
    )]
    pub parent_id: Option<CategoryId>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub code: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(
        default,
        alias = "includesText",
        alias = "includes",
        deserialize_with = "nullable_string"
    )]
    pub includes_text: String,
    #[serde(
        default,
        alias = "excludesText",
        alias = "excludes",
        deserialize_with = "nullable_string"
    )]
    pub excludes_text: String,
    #[serde(
        default,
        alias = "borderlineText",
        alias = "borderline",
        deserialize_with = "nullable_string"
    )]
    pub borderline_text: String,
}

impl CategoryRecord {
    /// Minimal record, mostly useful for building fixtures.
    pub fn new(
        id: CategoryId,
        parent_id: Option<CategoryId>,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            code: code.into(),
            name: name.into(),
            description: String::new(),
            includes_text: String::new(),
            excludes_text: String::new(),
            borderline_text: String::new(),
        }
    }

    /// Name, or `#<id>` when the record has none.
    pub fn label(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            format!("#{}", self.id)
        } else {
            name.to_string()
        }
    }

    /// `code label` as shown in pickers; just the label when there is no code.
    pub fn display_label(&self) -> String {
        let code = self.code.trim();
        if code.is_empty() {
            self.label()
        } else {
            format!("{} {}", code, self.label())
        }
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn parent_reference<'de, D>(deserializer: D) -> Result<Option<CategoryId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<CategoryId>::deserialize(deserializer)?.filter(|&id| id != 0))
}

/// Splits `excludes` text into the excludes part and its borderline notes.
///
/// `"finishing (H07); Пограничное: frames"` splits into
/// `("finishing (H07)", "frames")`. The marker matches case-insensitively at
/// the start of the text or after whitespace.
#[derive(Debug, Clone)]
pub struct BorderlineSplitter {
    pattern: Option<Regex>,
}

impl Default for BorderlineSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_BORDERLINE_MARKER)
    }
}

impl BorderlineSplitter {
    pub fn new(marker: &str) -> Self {
        let marker = marker.trim();
        let pattern = if marker.is_empty() {
            None
        } else {
            Regex::new(&format!(r"(?is)(?:^|\s){}\s*(.*)$", regex::escape(marker))).ok()
        };
        Self { pattern }
    }

    /// Returns `(excludes, notes)`; `notes` is empty when no marker is present.
    pub fn split(&self, excludes: &str) -> (String, String) {
        let text = excludes.trim();
        let Some(pattern) = &self.pattern else {
            return (text.to_string(), String::new());
        };
        match pattern.captures(text) {
            Some(caps) => {
                let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                let notes = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                let before = text[..start]
                    .trim_end_matches(|c: char| c == '.' || c == ';' || c == ',' || c.is_whitespace());
                (before.to_string(), notes.to_string())
            }
            None => (text.to_string(), String::new()),
        }
    }
}

/// Reference material for one category: what belongs to it and what does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceCard {
    pub id: CategoryId,
    pub title: String,
    pub description: String,
    pub includes: String,
    pub excludes: String,
    pub borderline: String,
}

impl ReferenceCard {
    /// Explicit borderline text wins; otherwise notes are split out of `excludes`.
    pub fn from_record(record: &CategoryRecord, splitter: &BorderlineSplitter) -> Self {
        let (excludes, notes) = splitter.split(&record.excludes_text);
        let borderline = if record.borderline_text.trim().is_empty() {
            notes
        } else {
            record.borderline_text.trim().to_string()
        };
        let title = if record.code.trim().is_empty() {
            record.label()
        } else {
            format!("{} — {}", record.code.trim(), record.label())
        };
        Self {
            id: record.id,
            title,
            description: record.description.trim().to_string(),
            includes: record.includes_text.trim().to_string(),
            excludes,
            borderline,
        }
    }
}

fn panel(text: &str) -> &str {
    if text.is_empty() {
        "—"
    } else {
        text
    }
}

impl fmt::Display for ReferenceCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        if !self.description.is_empty() {
            writeln!(f, "{}", self.description)?;
        }
        writeln!(f, "Includes:   {}", panel(&self.includes))?;
        writeln!(f, "Excludes:   {}", panel(&self.excludes))?;
        write!(f, "Borderline: {}", panel(&self.borderline))
    }
}
