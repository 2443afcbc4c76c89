// src/query.rs

//! Listing and search query composition
//!
//! Builds SELECTs over the versioned tables from a structured filter
//! description: scalar equality, creation-time ranges, property filters
//! via JSON1 extraction, keyset cursor pagination, and the two-shape ACL
//! filter. Every value travels as a prepared-statement parameter;
//! property keys, JSON paths, and sort columns are validated against
//! strict patterns before any SQL concatenation.

use crate::acl::AclFilter;
use crate::db::models::{ResourceKind, ResourceRow};
use crate::error::{Error, Result};
use regex::Regex;
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

/// Default page size
pub const DEFAULT_LIMIT: usize = 20;
/// Hard page-size ceiling
pub const MAX_LIMIT: usize = 100;
/// Over-sampling factor when ACL filtering happens post-query
pub const ACL_OVERSAMPLE: usize = 3;

fn property_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

fn json_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\$(\.[A-Za-z_][A-Za-z0-9_]*(\[[0-9]+\])?)+$").unwrap()
    })
}

/// Keyset cursor over `(created_at DESC, id DESC)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: i64,
    pub id: String,
}

impl Cursor {
    pub fn encode(&self) -> String {
        format!("{}:{}", self.created_at, self.id)
    }

    /// Parse an opaque cursor; malformed input is ignored with a warning
    pub fn decode(raw: &str) -> Option<Cursor> {
        let (ts, id) = raw.split_once(':')?;
        match ts.parse::<i64>() {
            Ok(created_at) if !id.is_empty() => Some(Cursor {
                created_at,
                id: id.to_string(),
            }),
            _ => {
                warn!(cursor = raw, "ignoring malformed cursor");
                None
            }
        }
    }

    pub fn from_row(row: &ResourceRow) -> Cursor {
        Cursor {
            created_at: row.created_at,
            id: row.id.clone(),
        }
    }
}

/// Comparison operator of a rich property filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    StartsWith,
    EndsWith,
    Contains,
    Exists,
    NotExists,
    In,
    NotIn,
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "eq" => Ok(FilterOp::Eq),
            "ne" => Ok(FilterOp::Ne),
            "gt" => Ok(FilterOp::Gt),
            "gte" => Ok(FilterOp::Gte),
            "lt" => Ok(FilterOp::Lt),
            "lte" => Ok(FilterOp::Lte),
            "like" => Ok(FilterOp::Like),
            "ilike" => Ok(FilterOp::Ilike),
            "starts_with" => Ok(FilterOp::StartsWith),
            "ends_with" => Ok(FilterOp::EndsWith),
            "contains" => Ok(FilterOp::Contains),
            "exists" => Ok(FilterOp::Exists),
            "not_exists" => Ok(FilterOp::NotExists),
            "in" => Ok(FilterOp::In),
            "not_in" => Ok(FilterOp::NotIn),
            _ => Err(format!("Invalid filter operator: {}", s)),
        }
    }
}

/// One rich property filter: `(json_path, operator, value)`
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyFilter {
    #[serde(alias = "json_path")]
    pub path: String,
    #[serde(alias = "operator")]
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
}

/// Structured description of a listing or search
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub type_id: Option<String>,
    pub created_by: Option<String>,
    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
    pub include_deleted: bool,
    pub show_all_versions: bool,
    /// Simple `property_<key>=<value>` equality filters, values coerced
    pub property_equals: Vec<(String, Value)>,
    pub property_filters: Vec<PropertyFilter>,
}

/// Search-only sort selection, restricted to a column whitelist
#[derive(Debug, Clone)]
pub struct SortSpec {
    pub column: String,
    pub descending: bool,
}

const SORT_COLUMNS: &[&str] = &["created_at", "version", "type_id", "id"];

impl SortSpec {
    pub fn new(column: &str, descending: bool) -> Result<SortSpec> {
        if !SORT_COLUMNS.contains(&column) {
            return Err(Error::validation(
                "sort_by",
                format!("sort column {} is not allowed", column),
            ));
        }
        Ok(SortSpec {
            column: column.to_string(),
            descending,
        })
    }
}

/// One page of rows
#[derive(Debug)]
pub struct Page {
    pub items: Vec<ResourceRow>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Coerce a raw query-string scalar: integer, then float, then boolean,
/// otherwise string
pub fn coerce_scalar(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn sql_param(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(*b as i64)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                // an integral float compares against JSON integers
                if f.fract() == 0.0 && f.is_finite() && f.abs() < 9.007_199_254_740_992e15 {
                    Ok(SqlValue::Integer(f as i64))
                } else {
                    Ok(SqlValue::Real(f))
                }
            } else {
                Err(Error::validation("value", "unrepresentable number"))
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        _ => Err(Error::validation("value", "filter value must be a scalar")),
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Validate a `property_<key>` key and turn it into a JSON path
fn key_to_path(key: &str) -> Result<String> {
    if !property_key_re().is_match(key) {
        return Err(Error::validation(
            format!("property_{}", key),
            format!("invalid property key: {}", key),
        ));
    }
    Ok(format!("$.{}", key))
}

/// Validate a rich-filter JSON path (`$.a.b[0]` dialect)
pub fn validate_json_path(path: &str) -> Result<()> {
    if json_path_re().is_match(path) {
        Ok(())
    } else {
        Err(Error::validation(
            "json_path",
            format!("invalid property path: {}", path),
        ))
    }
}

struct QueryParts {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl QueryParts {
    fn new() -> Self {
        Self {
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    fn push_param(&mut self, clause: impl Into<String>, param: SqlValue) {
        self.clauses.push(clause.into());
        self.params.push(param);
    }
}

fn property_filter_clause(parts: &mut QueryParts, filter: &PropertyFilter) -> Result<()> {
    validate_json_path(&filter.path)?;
    let path = SqlValue::Text(filter.path.clone());

    match filter.op {
        FilterOp::Eq | FilterOp::Ne | FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let op = match filter.op {
                FilterOp::Eq => "=",
                FilterOp::Ne => "!=",
                FilterOp::Gt => ">",
                FilterOp::Gte => ">=",
                FilterOp::Lt => "<",
                FilterOp::Lte => "<=",
                _ => unreachable!(),
            };
            parts.push(format!("json_extract(properties, ?) {} ?", op));
            parts.params.push(path);
            parts.params.push(sql_param(&coerce_filter_value(&filter.value))?);
        }
        FilterOp::Like => {
            parts.push("json_extract(properties, ?) LIKE ?");
            parts.params.push(path);
            parts.params.push(sql_param(&filter.value)?);
        }
        FilterOp::Ilike => {
            parts.push("LOWER(json_extract(properties, ?)) LIKE LOWER(?)");
            parts.params.push(path);
            parts.params.push(sql_param(&filter.value)?);
        }
        FilterOp::StartsWith | FilterOp::EndsWith | FilterOp::Contains => {
            let needle = filter
                .value
                .as_str()
                .ok_or_else(|| Error::validation("value", "pattern filter needs a string value"))?;
            let escaped = escape_like(needle);
            let pattern = match filter.op {
                FilterOp::StartsWith => format!("{}%", escaped),
                FilterOp::EndsWith => format!("%{}", escaped),
                FilterOp::Contains => format!("%{}%", escaped),
                _ => unreachable!(),
            };
            parts.push("json_extract(properties, ?) LIKE ? ESCAPE '\\'");
            parts.params.push(path);
            parts.params.push(SqlValue::Text(pattern));
        }
        FilterOp::Exists => {
            parts.push_param("json_type(properties, ?) IS NOT NULL", path);
        }
        FilterOp::NotExists => {
            parts.push_param("json_type(properties, ?) IS NULL", path);
        }
        FilterOp::In | FilterOp::NotIn => {
            let items = filter
                .value
                .as_array()
                .ok_or_else(|| Error::validation("value", "in/not_in filter needs an array value"))?;
            if items.is_empty() {
                return Err(Error::validation(
                    "value",
                    "in/not_in filter needs a non-empty array",
                ));
            }
            let placeholders: Vec<&str> = items.iter().map(|_| "?").collect();
            let negate = if filter.op == FilterOp::NotIn { "NOT " } else { "" };
            parts.push(format!(
                "json_extract(properties, ?) {}IN ({})",
                negate,
                placeholders.join(", ")
            ));
            parts.params.push(path);
            for item in items {
                parts.params.push(sql_param(&coerce_filter_value(item))?);
            }
        }
    }
    Ok(())
}

/// Coerce string scalars inside rich filters the same way query-string
/// values coerce
fn coerce_filter_value(value: &Value) -> Value {
    match value {
        Value::String(s) => coerce_scalar(s),
        other => other.clone(),
    }
}

/// Run a listing query, returning one cursor page
///
/// `fetch = limit + 1` detects has_more; the page key of the last
/// returned row becomes the next cursor. When the ACL filter is
/// post-query the fetch is over-sampled and rows are filtered in memory
/// before slicing.
pub fn list_resources(
    conn: &Connection,
    kind: ResourceKind,
    filter: &ListFilter,
    acl_filter: &AclFilter,
    limit: usize,
    cursor: Option<&Cursor>,
    sort: Option<&SortSpec>,
) -> Result<Page> {
    let limit = limit.clamp(1, MAX_LIMIT);
    let mut parts = QueryParts::new();

    if !filter.show_all_versions {
        parts.push("is_latest = 1");
    }
    if !filter.include_deleted {
        parts.push("is_deleted = 0");
    }
    if let Some(type_id) = &filter.type_id {
        parts.push_param("type_id = ?", SqlValue::Text(type_id.clone()));
    }
    if let Some(created_by) = &filter.created_by {
        parts.push_param("created_by = ?", SqlValue::Text(created_by.clone()));
    }
    if let Some(after) = filter.created_after {
        parts.push_param("created_at >= ?", SqlValue::Integer(after));
    }
    if let Some(before) = filter.created_before {
        parts.push_param("created_at <= ?", SqlValue::Integer(before));
    }

    for (key, value) in &filter.property_equals {
        let path = key_to_path(key)?;
        parts.push("json_extract(properties, ?) = ?");
        parts.params.push(SqlValue::Text(path));
        parts.params.push(sql_param(value)?);
    }

    for prop_filter in &filter.property_filters {
        property_filter_clause(&mut parts, prop_filter)?;
    }

    if let Some((clause, acl_params)) = acl_filter.where_clause("acl_id") {
        parts.clauses.push(clause);
        for id in acl_params {
            parts.params.push(SqlValue::Integer(id));
        }
    }

    // cursor pagination only composes with the default ordering
    let paginate = sort.is_none();
    if paginate {
        if let Some(cursor) = cursor {
            parts.push("(created_at < ? OR (created_at = ? AND id < ?))");
            parts.params.push(SqlValue::Integer(cursor.created_at));
            parts.params.push(SqlValue::Integer(cursor.created_at));
            parts.params.push(SqlValue::Text(cursor.id.clone()));
        }
    } else if cursor.is_some() {
        warn!("cursor ignored for non-default sort order");
    }

    let order_by = match sort {
        None => "created_at DESC, id DESC".to_string(),
        Some(spec) => {
            let dir = if spec.descending { "DESC" } else { "ASC" };
            format!("{} {}, id DESC", spec.column, dir)
        }
    };

    let oversample = if acl_filter.is_post_query() {
        ACL_OVERSAMPLE
    } else {
        1
    };
    let fetch = (limit + 1) * oversample;

    let where_sql = if parts.clauses.is_empty() {
        "1 = 1".to_string()
    } else {
        parts.clauses.join(" AND ")
    };
    let sql = format!(
        "SELECT {cols} FROM {table} WHERE {where_sql} ORDER BY {order_by} LIMIT {fetch}",
        cols = kind.select_columns(),
        table = kind.table(),
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(parts.params), |row| {
        ResourceRow::from_row(kind, row)
    })?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }

    if acl_filter.is_post_query() {
        items.retain(|row| acl_filter.allows_row(row.acl_id));
    }

    let has_more = items.len() > limit;
    items.truncate(limit);

    let next_cursor = if paginate && has_more {
        items.last().map(|row| Cursor::from_row(row).encode())
    } else {
        None
    };

    Ok(Page {
        items,
        next_cursor,
        has_more,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = Cursor {
            created_at: 1700000000,
            id: "abc-def".into(),
        };
        assert_eq!(Cursor::decode(&cursor.encode()), Some(cursor));
    }

    #[test]
    fn test_malformed_cursor_ignored() {
        assert_eq!(Cursor::decode("not-a-cursor"), None);
        assert_eq!(Cursor::decode("xyz:abc"), None);
        assert_eq!(Cursor::decode("123:"), None);
        assert_eq!(Cursor::decode(""), None);
    }

    #[test]
    fn test_coerce_scalar() {
        assert_eq!(coerce_scalar("30"), json!(30));
        assert_eq!(coerce_scalar("30.5"), json!(30.5));
        assert_eq!(coerce_scalar("true"), json!(true));
        assert_eq!(coerce_scalar("false"), json!(false));
        assert_eq!(coerce_scalar("foo"), json!("foo"));
        assert_eq!(coerce_scalar("-7"), json!(-7));
    }

    #[test]
    fn test_integral_float_param_matches_integer() {
        // 30.0 coerces to an INTEGER parameter so json 30 matches
        let param = sql_param(&coerce_scalar("30.0")).unwrap();
        assert_eq!(param, SqlValue::Integer(30));
    }

    #[test]
    fn test_property_key_validation() {
        assert!(key_to_path("age").is_ok());
        assert!(key_to_path("snake_case_2").is_ok());
        assert!(key_to_path("drop table").is_err());
        assert!(key_to_path("a;b").is_err());
        assert!(key_to_path("").is_err());
    }

    #[test]
    fn test_json_path_validation() {
        assert!(validate_json_path("$.a").is_ok());
        assert!(validate_json_path("$.a.b.c").is_ok());
        assert!(validate_json_path("$.items[0]").is_ok());
        assert!(validate_json_path("$").is_err());
        assert!(validate_json_path("a.b").is_err());
        assert!(validate_json_path("$.a'; DROP TABLE x; --").is_err());
    }

    #[test]
    fn test_sort_whitelist() {
        assert!(SortSpec::new("created_at", true).is_ok());
        assert!(SortSpec::new("version", false).is_ok());
        assert!(SortSpec::new("properties", true).is_err());
        assert!(SortSpec::new("id; DROP TABLE", true).is_err());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }
}
