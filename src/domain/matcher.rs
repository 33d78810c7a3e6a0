//! Case-insensitive substring matching over category text.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::arena::CategoryForest;
use crate::domain::entities::{CategoryId, CategoryRecord};

/// Text field of a record that a search can look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Code,
    Name,
    Description,
    Includes,
    Excludes,
    Borderline,
}

impl SearchField {
    pub const ALL: [SearchField; 6] = [
        SearchField::Code,
        SearchField::Name,
        SearchField::Description,
        SearchField::Includes,
        SearchField::Excludes,
        SearchField::Borderline,
    ];

    fn text(self, record: &CategoryRecord) -> String {
        match self {
            SearchField::Code => record.code.clone(),
            SearchField::Name => record.label(),
            SearchField::Description => record.description.clone(),
            SearchField::Includes => record.includes_text.clone(),
            SearchField::Excludes => record.excludes_text.clone(),
            SearchField::Borderline => record.borderline_text.clone(),
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchField::Code => "code",
            SearchField::Name => "name",
            SearchField::Description => "description",
            SearchField::Includes => "includes",
            SearchField::Excludes => "excludes",
            SearchField::Borderline => "borderline",
        };
        f.write_str(name)
    }
}

impl FromStr for SearchField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchField::ALL
            .into_iter()
            .find(|f| f.to_string() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown search field '{}'", s.trim()))
    }
}

/// Set of fields a [`Matcher`] looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchScope {
    fields: Vec<SearchField>,
}

impl Default for SearchScope {
    fn default() -> Self {
        Self::code_and_name()
    }
}

impl SearchScope {
    pub fn code_and_name() -> Self {
        Self {
            fields: vec![SearchField::Code, SearchField::Name],
        }
    }

    pub fn all_text() -> Self {
        Self {
            fields: SearchField::ALL.to_vec(),
        }
    }

    pub fn from_names(names: &[String]) -> Result<Self, String> {
        let mut fields = names
            .iter()
            .map(|n| n.parse::<SearchField>())
            .collect::<Result<Vec<_>, _>>()?;
        fields.sort();
        fields.dedup();
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[SearchField] {
        &self.fields
    }
}

/// Single-node search predicate.
///
/// Ancestor visibility is not decided here; see [`visible_ids`].
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    needle: String,
    scope: SearchScope,
}

impl Matcher {
    pub fn new(query: &str, scope: SearchScope) -> Self {
        Self {
            needle: query.trim().to_lowercase(),
            scope,
        }
    }

    /// False for an empty query, which matches everything.
    pub fn is_active(&self) -> bool {
        !self.needle.is_empty()
    }

    pub fn query(&self) -> &str {
        &self.needle
    }

    pub fn matches(&self, record: &CategoryRecord) -> bool {
        if !self.is_active() {
            return true;
        }
        self.scope
            .fields
            .iter()
            .any(|f| f.text(record).to_lowercase().contains(&self.needle))
    }
}

/// Ids that stay visible under `matcher`: matches plus all of their ancestors.
///
/// One post-order pass, so every child is decided before its parent.
pub fn visible_ids(forest: &CategoryForest, matcher: &Matcher) -> HashSet<CategoryId> {
    let mut visible = HashSet::new();
    for node in forest.iter_postorder() {
        let child_visible = forest
            .child_ids(node.id())
            .iter()
            .any(|c| visible.contains(c));
        if child_visible || matcher.matches(&node.record) {
            visible.insert(node.id());
        }
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CategoryRecord {
        let mut r = CategoryRecord::new(5, Some(1), "S05", "Anchor Bolts");
        r.includes_text = "chemical anchors".into();
        r
    }

    #[test]
    fn given_empty_query_when_matching_then_everything_matches() {
        let matcher = Matcher::new("   ", SearchScope::default());
        assert!(!matcher.is_active());
        assert!(matcher.matches(&record()));
    }

    #[test]
    fn given_mixed_case_query_when_matching_then_ignores_case() {
        assert!(Matcher::new("aNCHOR b", SearchScope::default()).matches(&record()));
        assert!(Matcher::new("s05", SearchScope::default()).matches(&record()));
    }

    #[test]
    fn given_descriptive_text_when_scope_excludes_it_then_no_match() {
        assert!(!Matcher::new("chemical", SearchScope::code_and_name()).matches(&record()));
        assert!(Matcher::new("chemical", SearchScope::all_text()).matches(&record()));
    }

    #[test]
    fn given_placeholder_label_when_matching_then_placeholder_is_searchable() {
        let r = CategoryRecord::new(77, None, "", "");
        assert!(Matcher::new("#77", SearchScope::default()).matches(&r));
    }

    #[test]
    fn given_field_names_when_building_scope_then_parses_and_dedups() {
        let names = vec!["Name".to_string(), "code".to_string(), "name".to_string()];
        let scope = SearchScope::from_names(&names).unwrap();
        assert_eq!(scope.fields(), &[SearchField::Code, SearchField::Name]);
        assert!(SearchScope::from_names(&["colour".to_string()]).is_err());
    }
}
