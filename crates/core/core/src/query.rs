//! List queries: filter, sort and pagination.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::filter::{order, Filter};
use crate::error::OwnerResult;

/// Default page size.
pub const DEFAULT_PER_PAGE: usize = 30;
/// Largest page a single list call returns.
pub const MAX_PER_PAGE: usize = 500;

/// Parameters of a list call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Filter string (see [`crate::filter`]).
    #[serde(default)]
    pub filter: Option<String>,
    /// Sort string, e.g. `-created_at,name`.
    #[serde(default)]
    pub sort: Option<String>,
    /// 1-based page number.
    #[serde(default = "default_page")]
    pub page: usize,
    /// Items per page.
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ListQuery {
    /// Creates a query for the first page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets the sort.
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Sets the page.
    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Sets the page size.
    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    /// Page clamped to at least 1.
    pub fn effective_page(&self) -> usize {
        self.page.max(1)
    }

    /// Page size clamped to `1..=MAX_PER_PAGE`.
    pub fn effective_per_page(&self) -> usize {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// Parses the filter string.
    pub fn parsed_filter(&self) -> OwnerResult<Filter> {
        self.filter.as_deref().map(Filter::parse).unwrap_or(Ok(Filter::All))
    }

    /// Parses the sort string.
    pub fn sort_keys(&self) -> Vec<SortKey> {
        self.sort.as_deref().map(SortKey::parse_list).unwrap_or_default()
    }

    /// Sort keys as applied: `created_at` when none are given, then `id`
    /// so that pages never shuffle records with equal keys.
    pub fn ordering(&self) -> Vec<SortKey> {
        let mut keys = self.sort_keys();
        if keys.is_empty() {
            keys.push(SortKey::asc("created_at"));
        }
        if !keys.iter().any(|k| k.field == "id") {
            keys.push(SortKey::asc("id"));
        }
        keys
    }

    /// Applies filter, sort and pagination to an in-memory set of records.
    pub fn apply(&self, records: impl IntoIterator<Item = Value>) -> OwnerResult<ListResult<Value>> {
        let filter = self.parsed_filter()?;
        let mut matched: Vec<Value> = records.into_iter().filter(|r| filter.matches(r)).collect();

        let keys = self.ordering();
        matched.sort_by(|a, b| compare_by(a, b, &keys));

        Ok(ListResult::paginate(matched, self.effective_page(), self.effective_per_page()))
    }
}

/// One key of a sort string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    /// Ascending key.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending key.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Parses `-created_at,name` style lists.
    pub fn parse_list(sort: &str) -> Vec<SortKey> {
        sort.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('-') {
                Some(field) => SortKey::desc(field),
                None => SortKey::asc(s.strip_prefix('+').unwrap_or(s)),
            })
            .collect()
    }
}

fn compare_by(a: &Value, b: &Value, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get(&key.field).unwrap_or(&Value::Null);
        let right = b.get(&key.field).unwrap_or(&Value::Null);
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => order(left, right).unwrap_or(Ordering::Equal),
        };
        let ordering = if key.descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// One page of a list call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub items: Vec<T>,
}

impl<T> ListResult<T> {
    /// Cuts one page out of an already ordered list.
    pub fn paginate(all: Vec<T>, page: usize, per_page: usize) -> Self {
        let total_items = all.len();
        let total_pages = total_items.div_ceil(per_page);
        let items = all
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Self {
            page,
            per_page,
            total_items,
            total_pages,
            items,
        }
    }

    /// Converts every item, failing on the first error.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<ListResult<U>, E> {
        Ok(ListResult {
            page: self.page,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
        })
    }
}
