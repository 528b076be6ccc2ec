//! Filter and query expressions for cache subscriptions

use serde::{Deserialize, Serialize};

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// In list of values
    In,
    /// Not in list of values
    Nin,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Substring (strings) or element membership (lists)
    Contains,
}

/// A single filter condition.
///
/// The value is a JSON value so the same filter shape works across string,
/// numeric and list-valued fields. An operator that is not meaningful for
/// the field's type evaluates to false rather than erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field to filter on
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against
    pub value: serde_json::Value,
}

impl Filter {
    /// Create a new filter condition.
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::new(field, FilterOperator::Eq, value.into())
    }

    /// Create a contains filter.
    pub fn contains(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::new(field, FilterOperator::Contains, value.into())
    }
}

/// One sort key of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub desc: bool,
}

impl SortField {
    /// Ascending sort on a field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: false,
        }
    }

    /// Descending sort on a field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: true,
        }
    }
}

/// A query: filters (AND semantics), then sort, then offset, then limit.
///
/// A `limit` of zero means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortField>,
    pub limit: usize,
    pub offset: usize,
}

impl Query {
    /// Create an empty query matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a sort key.
    pub fn sort_by(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    /// Set the result limit (zero means unbounded).
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the result offset.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}
