//! Category catalog service
//!
//! Loads category snapshots from disk, normalizes the accepted document
//! shapes into plain records and answers lookups against the built forest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::{
    BorderlineSplitter, CategoryForest, CategoryId, CategoryRecord, ForestBuilder, Matcher,
    ReferenceCard, SearchScope,
};
use crate::infrastructure::traits::FileSystem;

/// One search result with its position in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub id: CategoryId,
    pub label: String,
    pub breadcrumb: String,
}

/// Entry of a `{families, leaves}` seed document.
#[derive(Debug, Deserialize)]
struct SeedEntry {
    #[serde(default, deserialize_with = "trimmed")]
    code: String,
    #[serde(default, deserialize_with = "trimmed")]
    name: String,
    #[serde(default, deserialize_with = "trimmed")]
    description: String,
    #[serde(default, deserialize_with = "trimmed")]
    includes: String,
    #[serde(default, deserialize_with = "trimmed")]
    excludes: String,
    #[serde(default, deserialize_with = "trimmed")]
    borderline: String,
    #[serde(default, deserialize_with = "trimmed")]
    parent_code: String,
}

fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|s| s.trim().to_string())
        .unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct SeedDocument {
    #[serde(default)]
    families: Vec<SeedEntry>,
    #[serde(default)]
    leaves: Vec<SeedEntry>,
}

/// Service for loading and querying category snapshots.
pub struct CatalogService {
    fs: Arc<dyn FileSystem>,
    settings: Arc<Settings>,
}

impl CatalogService {
    /// Create a new catalog service.
    pub fn new(fs: Arc<dyn FileSystem>, settings: Arc<Settings>) -> Self {
        Self { fs, settings }
    }

    /// Path given on the command line, else the configured `source`.
    pub fn source_path(&self, explicit: Option<&Path>) -> ApplicationResult<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.settings.source.clone())
            .ok_or_else(|| ApplicationError::Source {
                message: "pass --file or set `source` in the config".into(),
            })
    }

    /// Read and normalize the category document at `path`.
    #[instrument(level = "debug", skip(self))]
    pub fn load(&self, path: &Path) -> ApplicationResult<Vec<CategoryRecord>> {
        if !self.fs.exists(path) {
            return Err(ApplicationError::NotFound(path.to_path_buf()));
        }
        let content = self
            .fs
            .read_to_string(path)
            .with_path_context("read category source", path)?;
        let splitter = BorderlineSplitter::new(&self.settings.picker.borderline_marker);
        let records = parse_document(&content, path, &splitter)?;
        debug!("load: {} records from {}", records.len(), path.display());
        Ok(records)
    }

    /// Build a forest ordered by the configured sort key.
    pub fn build_forest(&self, records: Vec<CategoryRecord>) -> CategoryForest {
        ForestBuilder::new()
            .sort_by(self.settings.picker.sort)
            .build(records)
    }

    pub fn load_forest(&self, path: &Path) -> ApplicationResult<CategoryForest> {
        let records = self.load(path)?;
        Ok(self.build_forest(records))
    }

    /// Nodes matching `query` themselves, in display order.
    pub fn search(
        &self,
        forest: &CategoryForest,
        query: &str,
        scope: SearchScope,
    ) -> Vec<SearchHit> {
        let matcher = Matcher::new(query, scope);
        forest
            .iter()
            .filter(|node| matcher.matches(&node.record))
            .map(|node| SearchHit {
                id: node.id(),
                label: node.record.display_label(),
                breadcrumb: forest.breadcrumb(node.id()),
            })
            .collect()
    }

    /// Resolves a numeric id or a category code (case-insensitive).
    pub fn find(&self, forest: &CategoryForest, key: &str) -> ApplicationResult<CategoryId> {
        let key = key.trim();
        if let Ok(id) = key.parse::<CategoryId>() {
            if forest.contains(id) {
                return Ok(id);
            }
        }
        let lowered = key.to_lowercase();
        forest
            .iter()
            .find(|node| node.record.code.trim().to_lowercase() == lowered)
            .map(|node| node.id())
            .ok_or_else(|| ApplicationError::UnknownCategory(key.to_string()))
    }

    pub fn card(&self, forest: &CategoryForest, id: CategoryId) -> Option<ReferenceCard> {
        let splitter = BorderlineSplitter::new(&self.settings.picker.borderline_marker);
        forest
            .record(id)
            .map(|record| ReferenceCard::from_record(record, &splitter))
    }
}

/// Accepts a bare array, a `{"results": [...]}` page or a seed document.
fn parse_document(
    content: &str,
    path: &Path,
    splitter: &BorderlineSplitter,
) -> ApplicationResult<Vec<CategoryRecord>> {
    let parse_err = |message: String| ApplicationError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let value: Value = serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?;
    match value {
        Value::Array(_) => serde_json::from_value(value).map_err(|e| parse_err(e.to_string())),
        Value::Object(mut map) => {
            if let Some(results) = map.remove("results") {
                serde_json::from_value(results).map_err(|e| parse_err(e.to_string()))
            } else if map.contains_key("families") || map.contains_key("leaves") {
                let seed: SeedDocument = serde_json::from_value(Value::Object(map))
                    .map_err(|e| parse_err(e.to_string()))?;
                Ok(records_from_seed(seed, splitter))
            } else {
                Err(parse_err(
                    "expected an array of categories, a `results` page or a `families`/`leaves` seed"
                        .into(),
                ))
            }
        }
        _ => Err(parse_err("document is not a JSON array or object".into())),
    }
}

/// Flattens a seed into records with sequential ids, families first.
///
/// A repeated code updates the earlier entry in place and keeps its id.
/// Entries without explicit borderline notes get them split out of `excludes`.
fn records_from_seed(seed: SeedDocument, splitter: &BorderlineSplitter) -> Vec<CategoryRecord> {
    let mut records: Vec<CategoryRecord> = Vec::new();
    let mut by_code: HashMap<String, usize> = HashMap::new();
    let mut families: HashMap<String, CategoryId> = HashMap::new();

    let mut upsert = |entry: SeedEntry, parent_id: Option<CategoryId>| -> CategoryId {
        let slot = by_code.get(&entry.code).copied();
        let id = match slot {
            Some(i) => records[i].id,
            None => records.len() as CategoryId + 1,
        };
        let (excludes_text, borderline_text) = if entry.borderline.is_empty() {
            splitter.split(&entry.excludes)
        } else {
            (entry.excludes, entry.borderline)
        };
        let record = CategoryRecord {
            id,
            parent_id,
            code: entry.code.clone(),
            name: entry.name,
            description: entry.description,
            includes_text: entry.includes,
            excludes_text,
            borderline_text,
        };
        match slot {
            Some(i) => records[i] = record,
            None => {
                by_code.insert(entry.code, records.len());
                records.push(record);
            }
        }
        id
    };

    for family in seed.families {
        let code = family.code.clone();
        let id = upsert(family, None);
        families.insert(code, id);
    }
    for leaf in seed.leaves {
        let parent = families.get(&leaf.parent_code).copied();
        if parent.is_none() {
            warn!(
                "seed leaf {} names unknown family '{}', keeping it as a root",
                leaf.code, leaf.parent_code
            );
        }
        upsert(leaf, parent);
    }
    records
}
