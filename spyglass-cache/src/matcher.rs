//! Filter and query evaluation
//!
//! All comparisons operate on `serde_json::Value`, the shape the entity
//! accessor yields. An operator that is not meaningful for the operand
//! types fails the filter as false; it never errors. Unknown fields fail
//! the filter the same way.

use std::cmp::Ordering;

use serde_json::Value;
use spyglass_core::{Filter, FilterOperator, Query, SortField};

use crate::entity::CacheEntity;

/// Whether an entity satisfies every filter (AND semantics).
pub fn matches_filters<T: CacheEntity>(entity: &T, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        entity
            .field(&filter.field)
            .map(|value| matches_filter(&value, filter))
            .unwrap_or(false)
    })
}

/// Whether a single field value satisfies a filter.
fn matches_filter(value: &Value, filter: &Filter) -> bool {
    match filter.operator {
        FilterOperator::Eq => value == &filter.value,
        FilterOperator::Ne => value != &filter.value,
        FilterOperator::In => member_of(&filter.value, value),
        FilterOperator::Nin => match &filter.value {
            Value::Array(candidates) => !candidates.contains(value),
            _ => false,
        },
        FilterOperator::Gt => {
            matches!(partial_cmp_values(value, &filter.value), Some(Ordering::Greater))
        }
        FilterOperator::Lt => {
            matches!(partial_cmp_values(value, &filter.value), Some(Ordering::Less))
        }
        FilterOperator::Contains => contains(value, &filter.value),
    }
}

/// `in`: the field value must be an element of the set-valued operand.
fn member_of(set: &Value, value: &Value) -> bool {
    match set {
        Value::Array(candidates) => candidates.contains(value),
        _ => false,
    }
}

/// `contains`: substring on strings, element membership on lists.
fn contains(value: &Value, needle: &Value) -> bool {
    match (value, needle) {
        (Value::String(haystack), Value::String(sub)) => haystack.contains(sub.as_str()),
        (Value::Array(elements), _) => elements.contains(needle),
        _ => false,
    }
}

/// Total order where one exists: numbers and strings. Everything else is
/// unordered and compares as `None`.
fn partial_cmp_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Apply a query's sort, offset and limit to an already-filtered set.
pub fn apply_query<T: CacheEntity>(mut items: Vec<T>, query: &Query) -> Vec<T> {
    if !query.sort.is_empty() {
        items.sort_by(|a, b| compare_by_keys(a, b, &query.sort));
    }

    let take = if query.limit == 0 {
        usize::MAX
    } else {
        query.limit
    };
    items.into_iter().skip(query.offset).take(take).collect()
}

fn compare_by_keys<T: CacheEntity>(a: &T, b: &T, keys: &[SortField]) -> Ordering {
    for key in keys {
        let av = a.field(&key.field).unwrap_or(Value::Null);
        let bv = b.field(&key.field).unwrap_or(Value::Null);
        let mut ordering = partial_cmp_values(&av, &bv).unwrap_or(Ordering::Equal);
        if key.desc {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spyglass_core::{Message, MessageRole, Session};

    fn message(id: &str, role: MessageRole, content: &str) -> Message {
        Message::new(id, "s1", role, content)
    }

    #[test]
    fn test_eq_ne() {
        let msg = message("m1", MessageRole::User, "hello");
        assert!(matches_filters(&msg, &[Filter::eq("role", "user")]));
        assert!(!matches_filters(&msg, &[Filter::eq("role", "assistant")]));
        assert!(matches_filters(
            &msg,
            &[Filter::new("role", FilterOperator::Ne, json!("assistant"))]
        ));
    }

    #[test]
    fn test_and_semantics() {
        let msg = message("m1", MessageRole::User, "hello");
        let both = [
            Filter::eq("session_id", "s1"),
            Filter::eq("role", "user"),
        ];
        assert!(matches_filters(&msg, &both));

        let conflicting = [
            Filter::eq("session_id", "s1"),
            Filter::eq("role", "tool"),
        ];
        assert!(!matches_filters(&msg, &conflicting));
    }

    #[test]
    fn test_in_nin() {
        let msg = message("m1", MessageRole::Tool, "output");
        let in_set = Filter::new("role", FilterOperator::In, json!(["user", "tool"]));
        assert!(matches_filters(&msg, &[in_set]));

        let nin_set = Filter::new("role", FilterOperator::Nin, json!(["user", "tool"]));
        assert!(!matches_filters(&msg, &[nin_set]));

        // A non-array operand is a type mismatch, which fails the filter.
        let bad = Filter::new("role", FilterOperator::In, json!("user"));
        assert!(!matches_filters(&msg, &[bad]));
    }

    #[test]
    fn test_gt_lt_numbers_and_strings() {
        let mut session = Session::new("s1", "triage");
        session.message_count = 5;

        assert!(matches_filters(
            &session,
            &[Filter::new("message_count", FilterOperator::Gt, json!(3))]
        ));
        assert!(!matches_filters(
            &session,
            &[Filter::new("message_count", FilterOperator::Lt, json!(3))]
        ));
        // Lexicographic ordering on strings.
        assert!(matches_filters(
            &session,
            &[Filter::new("title", FilterOperator::Gt, json!("alpha"))]
        ));
    }

    #[test]
    fn test_gt_on_unordered_type_is_false() {
        let session = Session::new("s1", "top");
        // parent_session_id is null; null has no ordering.
        let filter = Filter::new("parent_session_id", FilterOperator::Gt, json!("a"));
        assert!(!matches_filters(&session, &[filter]));
    }

    #[test]
    fn test_contains() {
        let msg = message("m1", MessageRole::User, "please run the tests");
        assert!(matches_filters(&msg, &[Filter::contains("content", "run the")]));
        assert!(!matches_filters(&msg, &[Filter::contains("content", "deploy")]));
        // Non-string operand against a string field is a mismatch.
        let bad = Filter::new("content", FilterOperator::Contains, json!(5));
        assert!(!matches_filters(&msg, &[bad]));
    }

    #[test]
    fn test_unknown_field_fails_filter() {
        let msg = message("m1", MessageRole::User, "hello");
        assert!(!matches_filters(&msg, &[Filter::eq("no_such_field", "x")]));
    }

    #[test]
    fn test_empty_filter_set_matches_everything() {
        let msg = message("m1", MessageRole::User, "hello");
        assert!(matches_filters(&msg, &[]));
    }

    #[test]
    fn test_query_sort_offset_limit() {
        let mut items = Vec::new();
        for (id, count) in [("a", 3i64), ("b", 1), ("c", 2), ("d", 5)] {
            let mut session = Session::new(id, id);
            session.message_count = count;
            items.push(session);
        }

        let query = Query::new()
            .sort_by(SortField::desc("message_count"))
            .offset(1)
            .limit(2);
        let result = apply_query(items, &query);

        let ids: Vec<&str> = result.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_query_zero_limit_is_unbounded() {
        let items: Vec<Session> = (0..4)
            .map(|i| Session::new(format!("s{i}"), "t"))
            .collect();
        let result = apply_query(items, &Query::new());
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_query_multi_key_sort() {
        let mut a = Message::new("a", "s1", MessageRole::User, "x");
        let mut b = Message::new("b", "s1", MessageRole::Assistant, "y");
        let mut c = Message::new("c", "s2", MessageRole::User, "z");
        a.model = Some("m".into());
        b.model = Some("m".into());
        c.model = Some("m".into());

        let query = Query::new()
            .sort_by(SortField::asc("session_id"))
            .sort_by(SortField::asc("role"));
        let result = apply_query(vec![c, a, b], &query);

        let ids: Vec<&str> = result.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
