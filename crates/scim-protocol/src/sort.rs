//! Sorting and pagination (RFC 7644 §3.4.2.3 / §3.4.2.4).

use std::cmp::Ordering;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::as_number;
use crate::path;

/// Sort direction; wire values `ascending` / `descending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Stable type-aware sort by an attribute path. Each resource's comparison
/// key is extracted once up front. An empty or unparseable path is a no-op.
pub fn sort_resources(resources: &mut Vec<Value>, sort_by: &str, order: SortOrder) {
    if sort_by.trim().is_empty() {
        return;
    }
    let attr = match path::parse_path(sort_by) {
        Ok(p) => p,
        Err(_) => return,
    };

    let mut keyed: Vec<(Option<Value>, Value)> = resources
        .drain(..)
        .map(|r| (path::resolve(&r, &attr).cloned(), r))
        .collect();
    keyed.sort_by(|a, b| compare_keys(&a.0, &b.0));
    if order == SortOrder::Descending {
        keyed.reverse();
    }
    resources.extend(keyed.into_iter().map(|(_, r)| r));
}

/// Comparator: absent sorts before anything; strings compare
/// lexicographically unless both parse as timestamps; numerics compare after
/// coercion; booleans false < true; cross-type pairs compare equal.
fn compare_keys(a: &Option<Value>, b: &Option<Value>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (a, b),
    };

    if let (Value::String(x), Value::String(y)) = (a, b) {
        if let (Ok(dx), Ok(dy)) = (
            DateTime::parse_from_rfc3339(x),
            DateTime::parse_from_rfc3339(y),
        ) {
            return dx.cmp(&dy);
        }
        return x.cmp(y);
    }
    if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
        return x.cmp(y);
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    Ordering::Equal
}

/// One page of results plus the fields a ListResponse must echo.
#[derive(Debug, Clone)]
pub struct Page {
    pub resources: Vec<Value>,
    pub start_index: usize,
    pub items_per_page: usize,
}

/// 1-based slice pagination. `start_index` below 1 clamps to 1; an
/// out-of-range start yields an empty page that still reports the requested
/// index and an itemsPerPage of 0.
pub fn paginate(resources: Vec<Value>, start_index: usize, count: usize) -> Page {
    let start_index = start_index.max(1);
    let begin = (start_index - 1).min(resources.len());
    let end = begin.saturating_add(count).min(resources.len());
    let page: Vec<Value> = resources.into_iter().skip(begin).take(end - begin).collect();
    Page {
        start_index,
        items_per_page: page.len(),
        resources: page,
    }
}
