//! Forest builder: turns a flat record list into an ordered category forest.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::arena::CategoryForest;
use crate::domain::entities::{CategoryId, CategoryRecord};
use crate::domain::natural::natural_cmp;

/// Sibling comparator used at every level of the forest.
pub type RecordComparator = Box<dyn Fn(&CategoryRecord, &CategoryRecord) -> Ordering + Send + Sync>;

/// Built-in sibling orderings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Natural order of `code`
    #[default]
    Code,
    /// Natural order of the display label
    Name,
}

impl SortKey {
    pub fn comparator(self) -> RecordComparator {
        match self {
            SortKey::Code => Box::new(|a, b| natural_cmp(&a.code, &b.code)),
            SortKey::Name => Box::new(|a, b| natural_cmp(&a.label(), &b.label())),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Code => write!(f, "code"),
            SortKey::Name => write!(f, "name"),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "code" => Ok(SortKey::Code),
            "name" => Ok(SortKey::Name),
            other => Err(format!("unknown sort key '{other}' (expected code or name)")),
        }
    }
}

/// Counters collected while building, logged at debug level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub records: usize,
    pub duplicates: usize,
    pub dangling_parents: usize,
    pub cycles_broken: usize,
    pub roots: usize,
}

#[derive(Clone, Copy)]
enum Mark {
    OnPath,
    Done,
}

/// Constructs category forests from flat record lists.
///
/// Records whose parent is absent, unknown or part of a cycle become roots.
/// Building never fails.
pub struct ForestBuilder {
    comparator: RecordComparator,
}

impl Default for ForestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ForestBuilder {
    pub fn new() -> Self {
        Self {
            comparator: SortKey::Code.comparator(),
        }
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.comparator = key.comparator();
        self
    }

    pub fn with_comparator<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&CategoryRecord, &CategoryRecord) -> Ordering + Send + Sync + 'static,
    {
        self.comparator = Box::new(comparator);
        self
    }

    pub fn build(&self, records: Vec<CategoryRecord>) -> CategoryForest {
        self.build_with_stats(records).0
    }

    #[instrument(level = "debug", skip_all, fields(records = records.len()))]
    pub fn build_with_stats(&self, records: Vec<CategoryRecord>) -> (CategoryForest, BuildStats) {
        let mut stats = BuildStats {
            records: records.len(),
            ..BuildStats::default()
        };

        // Index by id, first occurrence wins
        let mut seen = HashSet::new();
        let mut records: Vec<CategoryRecord> = records
            .into_iter()
            .filter(|r| {
                let fresh = seen.insert(r.id);
                if !fresh {
                    warn!("dropping duplicate category id {}", r.id);
                    stats.duplicates += 1;
                }
                fresh
            })
            .collect();
        let position: HashMap<CategoryId, usize> =
            records.iter().enumerate().map(|(i, r)| (r.id, i)).collect();

        // Resolve parent links; unknown and self references mean root
        let mut parents: Vec<Option<usize>> = records
            .iter()
            .map(|r| match r.parent_id {
                Some(pid) if pid == r.id => {
                    stats.cycles_broken += 1;
                    None
                }
                Some(pid) => match position.get(&pid) {
                    Some(&p) => Some(p),
                    None => {
                        stats.dangling_parents += 1;
                        None
                    }
                },
                None => None,
            })
            .collect();

        stats.cycles_broken += break_cycles(&mut parents);

        // Bucket children under their parent, then order each bucket
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
        let mut roots = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => buckets[*p].push(i),
                None => roots.push(i),
            }
        }
        let by_order = |a: &usize, b: &usize| (self.comparator)(&records[*a], &records[*b]);
        roots.sort_by(by_order);
        for bucket in buckets.iter_mut() {
            bucket.sort_by(by_order);
        }
        stats.roots = roots.len();

        // Depth-first insertion so children land in sorted order with depth set
        let mut forest = CategoryForest::new();
        let mut slots: Vec<Option<CategoryRecord>> = records.drain(..).map(Some).collect();
        let mut stack: Vec<(usize, Option<generational_arena::Index>, usize)> =
            roots.iter().rev().map(|&r| (r, None, 0)).collect();

        while let Some((current, parent_idx, depth)) = stack.pop() {
            let Some(record) = slots[current].take() else {
                continue;
            };
            let current_idx = forest.insert_node(record, parent_idx, depth);
            for &child in buckets[current].iter().rev() {
                stack.push((child, Some(current_idx), depth + 1));
            }
        }

        debug!(
            "build: {} records, {} roots, {} duplicates, {} dangling parents, {} cycles broken",
            stats.records, stats.roots, stats.duplicates, stats.dangling_parents, stats.cycles_broken
        );
        (forest, stats)
    }
}

/// Cuts the parent link of the first revisited node on every cyclic chain.
///
/// Returns the number of links cut.
fn break_cycles(parents: &mut [Option<usize>]) -> usize {
    let mut marks: Vec<Option<Mark>> = vec![None; parents.len()];
    let mut broken = 0;

    for start in 0..parents.len() {
        let mut path = Vec::new();
        let mut current = Some(start);

        while let Some(node) = current {
            match marks[node] {
                Some(Mark::Done) => break,
                Some(Mark::OnPath) => {
                    parents[node] = None;
                    broken += 1;
                    break;
                }
                None => {
                    marks[node] = Some(Mark::OnPath);
                    path.push(node);
                    current = parents[node];
                }
            }
        }

        for node in path {
            marks[node] = Some(Mark::Done);
        }
    }

    broken
}
