use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A backend row. Always a JSON object; typed models parse it at their own boundary.
pub type Row = Value;

/// Collections the client core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Likes,
    Matches,
    Chats,
    Messages,
    TypingIndicators,
    Notifications,
    PushTokens,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::Profiles,
        Table::Likes,
        Table::Matches,
        Table::Chats,
        Table::Messages,
        Table::TypingIndicators,
        Table::Notifications,
        Table::PushTokens,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Likes => "likes",
            Self::Matches => "matches",
            Self::Chats => "chats",
            Self::Messages => "messages",
            Self::TypingIndicators => "typing_indicators",
            Self::Notifications => "notifications",
            Self::PushTokens => "push_tokens",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Filters ---

/// Row predicate. `Neq` and `In` follow SQL semantics: a null column never matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    IsNull(String),
    NotNull(String),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Neq(column.into(), value.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Self::NotNull(column.into())
    }

    pub fn in_list<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq(column, value) => row.get(column) == Some(value),
            Self::Neq(column, value) => row
                .get(column)
                .is_some_and(|v| !v.is_null() && v != value),
            Self::IsNull(column) => row.get(column).map_or(true, Value::is_null),
            Self::NotNull(column) => row.get(column).is_some_and(|v| !v.is_null()),
            Self::In(column, values) => row
                .get(column)
                .is_some_and(|v| !v.is_null() && values.contains(v)),
        }
    }
}

// --- Query ---

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A select/update target: one table, a conjunction of filters, optional order and limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn neq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::neq(column, value))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.filter(Filter::is_null(column))
    }

    pub fn in_list<V: Into<Value>>(self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::in_list(column, values))
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

/// Conflict handling for upserts, mirroring `ON CONFLICT (...) DO UPDATE | DO NOTHING`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertOptions {
    pub on_conflict: Vec<String>,
    pub ignore_duplicates: bool,
}

impl UpsertOptions {
    pub fn on_conflict(columns: &[&str]) -> Self {
        Self {
            on_conflict: columns.iter().map(|c| c.to_string()).collect(),
            ignore_duplicates: false,
        }
    }

    pub fn ignore_duplicates(mut self) -> Self {
        self.ignore_duplicates = true;
        self
    }
}

// --- Value helpers ---

/// Backend timestamp encoding: RFC 3339, microsecond precision, `Z` suffix.
pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Read a string column, treating empty strings as absent.
pub fn row_str<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Ordering used for `ORDER BY`: nulls first, timestamps chronologically,
/// numbers numerically, everything else by its JSON text.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(dx), Ok(dy)) => dx.cmp(&dy),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_names() {
        assert_eq!(Table::TypingIndicators.as_str(), "typing_indicators");
        assert_eq!(Table::PushTokens.to_string(), "push_tokens");
        let json = serde_json::to_string(&Table::Matches).unwrap();
        assert_eq!(json, "\"matches\"");
    }

    #[test]
    fn null_checks() {
        let row = json!({ "id": "m1", "seen_at": null });
        assert!(Filter::is_null("seen_at").matches(&row));
        assert!(Filter::is_null("delivered_at").matches(&row));
        assert!(!Filter::not_null("seen_at").matches(&row));
        assert!(Filter::not_null("id").matches(&row));
    }

    #[test]
    fn neq_and_in_skip_nulls() {
        let row = json!({ "id": "u1", "gender": null });
        assert!(!Filter::neq("gender", "male").matches(&row));
        assert!(Filter::neq("id", "u2").matches(&row));
        assert!(!Filter::neq("id", "u1").matches(&row));
        assert!(Filter::in_list("id", ["u1", "u3"]).matches(&row));
        assert!(!Filter::in_list("gender", [Value::Null]).matches(&row));
    }

    #[test]
    fn query_is_a_conjunction() {
        let q = Query::from(Table::Likes).eq("sender_id", "u1").eq("receiver_id", "u2");
        assert!(q.matches(&json!({ "sender_id": "u1", "receiver_id": "u2" })));
        assert!(!q.matches(&json!({ "sender_id": "u2", "receiver_id": "u1" })));
    }

    #[test]
    fn timestamps_compare_chronologically() {
        let utc = json!("2024-05-01T09:00:00.000001Z");
        let offset = json!("2024-05-01T10:00:00+01:00");
        // 10:00+01:00 is 09:00Z, a microsecond before `utc`
        assert_eq!(compare_values(Some(&utc), Some(&offset)), Ordering::Greater);
        assert_eq!(compare_values(None, Some(&utc)), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
    }

    #[test]
    fn row_str_ignores_empty() {
        let row = json!({ "name": "", "bio": "hi" });
        assert_eq!(row_str(&row, "name"), None);
        assert_eq!(row_str(&row, "bio"), Some("hi"));
        assert_eq!(row_str(&row, "missing"), None);
    }
}
