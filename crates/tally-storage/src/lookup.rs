//! Lookup translation: restricted lookup specifications to bounded SQL.
//!
//! A lookup specification names an allow-listed entity, a filter map whose
//! keys may carry comparison operators, and a field projection. The
//! translator validates everything against the entity catalog, normalizes
//! operators and date values, and executes a read-only query. Failures come
//! back as structured `{"error": ...}` payloads so the caller can feed them
//! verbatim into the conversation instead of aborting the turn.

use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::types::{ToSql, ValueRef};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use tally_core::catalog::EntityKind;
use tally_core::error::TallyError;

use crate::db::Database;

/// Comparison kinds a filter key may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Case-insensitive equality.
    IExact,
    /// Case-insensitive substring match.
    IContains,
}

/// Symbolic operator tokens embedded in filter keys, checked in this order
/// so two-character tokens win over their one-character prefixes.
const OPERATOR_TOKENS: [(&str, FilterOp); 6] = [
    (">=", FilterOp::Gte),
    ("<=", FilterOp::Lte),
    (">", FilterOp::Gt),
    ("<", FilterOp::Lt),
    ("!=", FilterOp::Ne),
    ("=", FilterOp::Eq),
];

/// ORM-style key suffixes, the other spelling the model is prompted with.
const SUFFIX_TOKENS: [(&str, FilterOp); 8] = [
    ("__gte", FilterOp::Gte),
    ("__lte", FilterOp::Lte),
    ("__gt", FilterOp::Gt),
    ("__lt", FilterOp::Lt),
    ("__ne", FilterOp::Ne),
    ("__exact", FilterOp::Eq),
    ("__iexact", FilterOp::IExact),
    ("__icontains", FilterOp::IContains),
];

/// Date formats tried in order when normalizing date-like filter values.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y"];

/// A lookup specification as extracted from a function-call payload.
#[derive(Debug, Clone, Default)]
pub struct LookupSpec {
    pub model: Option<String>,
    pub filters: Map<String, Value>,
    pub fields: Vec<String>,
}

impl LookupSpec {
    /// Lenient extraction from arbitrary JSON: missing or mis-typed members
    /// degrade to empty slots that fail validation later, rather than
    /// failing the whole turn.
    pub fn from_value(value: &Value) -> Self {
        let model = value
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string);
        let filters = value
            .get("filters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let fields = value
            .get("fields")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            model,
            filters,
            fields,
        }
    }
}

/// Translator-level failures, surfaced as structured payloads.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Invalid model name")]
    InvalidModel,
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl LookupError {
    pub fn to_payload(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

/// Split a filter key into a bare field path and a comparison kind.
///
/// Keys with no embedded operator and no recognized suffix are exact-match
/// field names unchanged.
pub fn split_filter_key(key: &str) -> (String, FilterOp) {
    for (token, op) in OPERATOR_TOKENS {
        if let Some((field, _)) = key.split_once(token) {
            return (field.trim().to_string(), op);
        }
    }
    for (suffix, op) in SUFFIX_TOKENS {
        if let Some(field) = key.strip_suffix(suffix) {
            if !field.is_empty() {
                return (field.to_string(), op);
            }
        }
    }
    (key.to_string(), FilterOp::Eq)
}

/// Coerce a date-like string value to canonical ISO form.
///
/// The first format that parses wins; non-matching or non-string values
/// pass through unchanged.
pub fn normalize_date(value: &Value) -> Value {
    if let Value::String(s) = value {
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return Value::String(date.format("%Y-%m-%d").to_string());
            }
        }
    }
    value.clone()
}

/// Translates restricted lookup specifications into read-only queries.
pub struct LookupTranslator {
    db: Arc<Database>,
}

impl LookupTranslator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Translate and execute a lookup.
    ///
    /// Returns a JSON array of row objects on success, or a structured
    /// `{"error": ...}` payload. Never propagates a fault to the caller.
    pub fn execute(&self, spec: &LookupSpec) -> Value {
        match self.run(spec) {
            Ok(rows) => Value::Array(rows),
            Err(e) => {
                warn!(error = %e, "Lookup rejected");
                e.to_payload()
            }
        }
    }

    fn run(&self, spec: &LookupSpec) -> Result<Vec<Value>, LookupError> {
        let entity = spec
            .model
            .as_deref()
            .and_then(EntityKind::from_name)
            .ok_or(LookupError::InvalidModel)?;

        let query = build_query(entity, &spec.filters, &spec.fields)?;
        debug!(entity = entity.name(), sql = %query.sql, "Running lookup");

        self.db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare(&query.sql)
                    .map_err(|e| TallyError::Storage(e.to_string()))?;

                let param_refs: Vec<&dyn ToSql> =
                    query.params.iter().map(|p| p.as_ref()).collect();

                let mapped = stmt
                    .query_map(param_refs.as_slice(), |row| {
                        let mut obj = Map::new();
                        for (i, alias) in query.aliases.iter().enumerate() {
                            obj.insert(alias.clone(), column_value(row.get_ref(i)?));
                        }
                        Ok(Value::Object(obj))
                    })
                    .map_err(|e| TallyError::Storage(e.to_string()))?;

                let mut rows = Vec::new();
                for row in mapped {
                    rows.push(row.map_err(|e| TallyError::Storage(e.to_string()))?);
                }
                Ok(rows)
            })
            .map_err(|e| LookupError::UnexpectedError(e.to_string()))
    }
}

/// A fully bound, ready-to-run query.
struct BoundQuery {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
    aliases: Vec<String>,
}

/// Resolve a filter or projection path against the catalog.
///
/// A bare field resolves on the base entity; `relation__field` traverses
/// exactly one allow-listed relation. Anything else is a field-resolution
/// failure.
fn resolve_path(
    entity: EntityKind,
    path: &str,
) -> Result<(String, Option<(&'static str, EntityKind, &'static str)>), LookupError> {
    let segments: Vec<&str> = path.split("__").collect();
    match segments.as_slice() {
        [field] if entity.has_field(field) => {
            Ok((format!("{}.{}", entity.table(), field), None))
        }
        [field] => Err(LookupError::InvalidFilter(format!(
            "unknown field '{}' on {}",
            field,
            entity.name()
        ))),
        [relation, field] => {
            let (rel_name, target, fk) = entity
                .relations()
                .iter()
                .find(|(rel, _, _)| rel == relation)
                .copied()
                .ok_or_else(|| {
                    LookupError::InvalidFilter(format!(
                        "unknown relation '{}' on {}",
                        relation,
                        entity.name()
                    ))
                })?;
            if !target.has_field(field) {
                return Err(LookupError::InvalidFilter(format!(
                    "unknown field '{}' on {}",
                    field,
                    target.name()
                )));
            }
            Ok((
                format!("{}.{}", target.table(), field),
                Some((rel_name, target, fk)),
            ))
        }
        _ => Err(LookupError::InvalidFilter(format!(
            "filter path '{}' is too deep",
            path
        ))),
    }
}

fn build_query(
    entity: EntityKind,
    filters: &Map<String, Value>,
    fields: &[String],
) -> Result<BoundQuery, LookupError> {
    // (relation name, join clause) pairs, deduplicated by relation.
    let mut joins: Vec<(&'static str, String)> = Vec::new();
    let add_join = |joins: &mut Vec<(&'static str, String)>,
                        relation: &'static str,
                        target: EntityKind,
                        fk: &'static str| {
        if !joins.iter().any(|(rel, _)| *rel == relation) {
            joins.push((
                relation,
                format!(
                    "JOIN {} ON {}.id = {}.{}",
                    target.table(),
                    target.table(),
                    entity.table(),
                    fk
                ),
            ));
        }
    };

    // Projection: requested field paths, or every catalog field.
    let mut select_parts = Vec::new();
    let mut aliases = Vec::new();
    if fields.is_empty() {
        for field in entity.fields() {
            select_parts.push(format!("{}.{} AS \"{}\"", entity.table(), field, field));
            aliases.push((*field).to_string());
        }
    } else {
        for path in fields {
            let (column, join) = resolve_path(entity, path)?;
            if let Some((relation, target, fk)) = join {
                add_join(&mut joins, relation, target, fk);
            }
            select_parts.push(format!("{} AS \"{}\"", column, path));
            aliases.push(path.clone());
        }
    }

    // Filters: normalize keys and date values, then bind.
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    for (key, raw_value) in filters {
        let (path, op) = split_filter_key(key);
        let value = if key.contains("date") || key.contains("created_at") {
            normalize_date(raw_value)
        } else {
            raw_value.clone()
        };

        let (column, join) = resolve_path(entity, &path)?;
        if let Some((relation, target, fk)) = join {
            add_join(&mut joins, relation, target, fk);
        }

        match (op, &value) {
            (FilterOp::Eq, Value::Null) => conditions.push(format!("{} IS NULL", column)),
            (FilterOp::Ne, Value::Null) => conditions.push(format!("{} IS NOT NULL", column)),
            (FilterOp::IExact, _) => {
                conditions.push(format!("lower({}) = lower(?)", column));
                params.push(bind_value(&value, key)?);
            }
            (FilterOp::IContains, _) => {
                conditions.push(format!("instr(lower({}), lower(?)) > 0", column));
                params.push(bind_value(&value, key)?);
            }
            (op, _) => {
                let sql_op = match op {
                    FilterOp::Eq => "=",
                    FilterOp::Ne => "<>",
                    FilterOp::Gt => ">",
                    FilterOp::Lt => "<",
                    FilterOp::Gte => ">=",
                    FilterOp::Lte => "<=",
                    FilterOp::IExact | FilterOp::IContains => unreachable!(),
                };
                conditions.push(format!("{} {} ?", column, sql_op));
                params.push(bind_value(&value, key)?);
            }
        }
    }

    let mut sql = format!(
        "SELECT {} FROM {}",
        select_parts.join(", "),
        entity.table()
    );
    for (_, clause) in &joins {
        sql.push(' ');
        sql.push_str(clause);
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    Ok(BoundQuery {
        sql,
        params,
        aliases,
    })
}

fn bind_value(value: &Value, key: &str) -> Result<Box<dyn ToSql>, LookupError> {
    match value {
        Value::Null => Ok(Box::new(rusqlite::types::Null)),
        Value::Bool(b) => Ok(Box::new(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Box::new(i))
            } else {
                Ok(Box::new(n.as_f64().unwrap_or_default()))
            }
        }
        Value::String(s) => Ok(Box::new(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(LookupError::InvalidFilter(format!(
            "unsupported value type for '{}'",
            key
        ))),
    }
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}
