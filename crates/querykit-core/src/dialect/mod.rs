//! SQL dialects.
//!
//! [`SqlDialect`] compiles the [query model](crate::query) of one entity into
//! SQL text. All compilation logic lives in the trait's provided methods; a
//! backend only overrides its quote character, transaction keyword,
//! case-insensitive matching, regex operator, full-text search rendering and
//! whether inserts return the generated id, plus a few literal spellings.
//!
//! Dialects are stateless and resolved from a [`DialectKind`]:
//!
//! ```rust
//! use querykit_core::dialect::DialectKind;
//!
//! let dialect = DialectKind::MySql.dialect();
//! assert_eq!(dialect.escape_id("User"), "`User`");
//! ```

mod mariadb;
mod mysql;
mod postgres;
mod relations;
mod sqlite;

use std::fmt;
use std::slice;
use std::str::FromStr;
use std::sync::LazyLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use mariadb::MariaDbDialect;
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use relations::{DeferredRelation, RelationJoinPlan};
pub use sqlite::SqliteDialect;

use crate::entity::{EntityMeta, EntityRef, EntityRegistry, FieldMeta, FieldType, ValueFn};
use crate::error::{QueryError, Result};
use crate::query::{
    FieldCondition, FieldOperator, LogicalOperator, OperatorArg, Query, Raw, RawContext, Select,
    SelectItem, SelectValue, Sort, SortEntry, TextSearch, Where, WhereItem, WhereMap, WhereValue,
};
use crate::value::{hex, Value};

/// A record to persist: field keys mapped to values.
pub type Record = IndexMap<String, Value>;

/// Supported SQL backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialectKind {
    /// PostgreSQL.
    #[serde(rename = "postgres")]
    Postgres,
    /// MySQL.
    #[serde(rename = "mysql")]
    MySql,
    /// MariaDB.
    #[serde(rename = "mariadb")]
    MariaDb,
    /// SQLite.
    #[serde(rename = "sqlite")]
    Sqlite,
}

static POSTGRES: PostgresDialect = PostgresDialect;
static MYSQL: MySqlDialect = MySqlDialect;
static MARIADB: MariaDbDialect = MariaDbDialect;
static SQLITE: SqliteDialect = SqliteDialect;

impl DialectKind {
    /// Lower-case identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::Sqlite => "sqlite",
        }
    }

    /// The query compiler of this backend.
    #[must_use]
    pub fn dialect(self) -> &'static dyn SqlDialect {
        match self {
            Self::Postgres => &POSTGRES,
            Self::MySql => &MYSQL,
            Self::MariaDb => &MARIADB,
            Self::Sqlite => &SQLITE,
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "mariadb" | "maria" => Ok(Self::MariaDb),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(format!("unknown dialect '{other}'")),
        }
    }
}

/// Which keyword introduces a compiled filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clause {
    /// ` WHERE ...`
    #[default]
    Where,
    /// ` HAVING ...`
    Having,
    /// Bare fragment, e.g. for sub-queries and join predicates.
    None,
}

/// Options of [`SqlDialect::where_clause`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WhereOptions<'a> {
    /// Table name or relation alias qualifying columns.
    pub prefix: Option<&'a str>,
    /// Wrap the fragment in parentheses when it holds several predicates.
    pub use_precedence: bool,
    /// Leading keyword.
    pub clause: Clause,
    /// `Some(false)` disables the soft-delete predicate.
    pub soft_delete: Option<bool>,
}

/// Options of [`SqlDialect::compare`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions<'a> {
    /// Table name or relation alias qualifying columns.
    pub prefix: Option<&'a str>,
    /// The comparison is joined with siblings or negated, so a compound
    /// result must be parenthesized.
    pub use_precedence: bool,
}

/// Options of [`SqlDialect::find`] and friends.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions<'a> {
    /// Explicit column qualifier.
    pub prefix: Option<&'a str>,
    /// Qualify columns with the table name even without joins.
    pub auto_prefix: bool,
    /// `Some(false)` disables the soft-delete predicate.
    pub soft_delete: Option<bool>,
}

/// Options of [`SqlDialect::update`] and [`SqlDialect::delete`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// `Some(true)` requires soft delete, `Some(false)` forbids it.
    pub soft_delete: Option<bool>,
}

/// Access to a dialect as a trait object, for raw-expression callbacks.
pub trait AsDialect {
    /// Returns `self` as `&dyn SqlDialect`.
    fn as_dialect(&self) -> &dyn SqlDialect;
}

impl<T: SqlDialect> AsDialect for T {
    fn as_dialect(&self) -> &dyn SqlDialect {
        self
    }
}

static EMPTY_REGISTRY: LazyLock<EntityRegistry> = LazyLock::new(EntityRegistry::new);

fn invalid(key: &str, message: &str) -> QueryError {
    QueryError::InvalidFilter {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Copies `payload`, adding generated values for fields it lacks.
fn fill_generated(meta: &EntityMeta, payload: &Record, pick: fn(&FieldMeta) -> Option<&ValueFn>) -> Record {
    let mut record = payload.clone();
    for (key, field) in &meta.fields {
        if let Some(generate) = pick(field) {
            if !record.contains_key(key) {
                record.insert(key.clone(), generate.call());
            }
        }
    }
    record
}

/// Compiles the query model into SQL for one backend.
pub trait SqlDialect: AsDialect + fmt::Debug + Send + Sync {
    // ---- backend specifics ----

    /// Backend identifier.
    fn kind(&self) -> DialectKind;

    /// Identifier quote character.
    fn quote_char(&self) -> char;

    /// Statement opening a transaction.
    fn begin_transaction_command(&self) -> &'static str;

    /// Case-insensitive `LIKE`; `pattern` already contains wildcards.
    fn case_insensitive_like(&self, column: &str, pattern: &str) -> String {
        format!("LOWER({column}) LIKE {}", self.escape_string(&pattern.to_lowercase()))
    }

    /// Regular expression match operator.
    fn regex_operator(&self) -> &'static str {
        "REGEXP"
    }

    /// Full-text predicate.
    ///
    /// # Errors
    ///
    /// Implementations may reject searches they cannot express.
    fn text_search(&self, entity: EntityRef<'_>, search: &TextSearch, prefix: Option<&str>) -> Result<String> {
        let escaped_prefix = self.escape_id_with(prefix.unwrap_or(""), true, true);
        let columns = search
            .fields
            .iter()
            .map(|key| format!("{escaped_prefix}{}", self.escape_id_with(&entity.column_name(key), true, false)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "MATCH({columns}) AGAINST({})",
            self.escape_string(&search.value)
        ))
    }

    /// `RETURNING` clause appended to inserts, when the backend returns
    /// generated ids that way.
    fn returning_id(&self, _entity: EntityRef<'_>) -> Option<String> {
        None
    }

    /// Conflict handling appended by [`SqlDialect::upsert`]. Both lists hold
    /// escaped column names.
    fn upsert_clause(&self, conflict: &[String], update: &[String]) -> String {
        if update.is_empty() {
            return format!(" ON CONFLICT ({}) DO NOTHING", conflict.join(", "));
        }
        let sets = update
            .iter()
            .map(|col| format!("{col} = EXCLUDED.{col}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" ON CONFLICT ({}) DO UPDATE SET {sets}", conflict.join(", "))
    }

    /// Quotes a string literal.
    fn escape_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Wraps an escaped JSON literal for a JSON column.
    fn json_literal(&self, escaped: &str) -> String {
        format!("CAST({escaped} AS JSON)")
    }

    /// Renders a blob literal.
    fn blob_literal(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex(bytes))
    }

    /// `LIMIT` needed by backends that reject a bare `OFFSET`.
    fn unbounded_limit(&self) -> Option<&'static str> {
        None
    }

    // ---- escaping ----

    /// Escapes an identifier; `a.b` is escaped segment by segment.
    fn escape_id(&self, id: &str) -> String {
        self.escape_id_with(id, false, false)
    }

    /// Escapes an identifier. With `forbid_qualified` dots are kept inside
    /// a single identifier; `add_dot` appends a `.` to non-empty results.
    fn escape_id_with(&self, id: &str, forbid_qualified: bool, add_dot: bool) -> String {
        if id.is_empty() {
            return String::new();
        }
        let quote = self.quote_char();
        let doubled = format!("{quote}{quote}");
        let quoted = |part: &str| format!("{quote}{}{quote}", part.replace(quote, &doubled));
        let mut escaped = if !forbid_qualified && id.contains('.') {
            id.split('.').map(quoted).collect::<Vec<_>>().join(".")
        } else {
            quoted(id)
        };
        if add_dot {
            escaped.push('.');
        }
        escaped
    }

    /// Escapes a value as a SQL literal.
    ///
    /// # Errors
    ///
    /// Propagates errors from raw-expression callbacks.
    fn escape(&self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Float(_) => "NULL".to_string(),
            Value::Text(s) => self.escape_string(s),
            Value::Blob(bytes) => self.blob_literal(bytes),
            Value::Json(json) => self.escape_string(&json.to_string()),
            Value::List(items) => items
                .iter()
                .map(|item| self.escape(item))
                .collect::<Result<Vec<_>>>()?
                .join(", "),
            Value::Raw(raw) => raw.render(&RawContext {
                prefix: "",
                escaped_prefix: "",
                dialect: self.as_dialect(),
                registry: &EMPTY_REGISTRY,
            })?,
        })
    }

    /// Renders a raw expression with `prefix` in its context.
    ///
    /// # Errors
    ///
    /// Propagates errors from the callback.
    fn raw_sql(&self, entity: EntityRef<'_>, raw: &Raw, prefix: Option<&str>) -> Result<String> {
        let prefix = prefix.unwrap_or("");
        let escaped_prefix = self.escape_id_with(prefix, true, true);
        raw.render(&RawContext {
            prefix,
            escaped_prefix: &escaped_prefix,
            dialect: self.as_dialect(),
            registry: entity.registry(),
        })
    }

    /// Renders a comparison value; raw expressions see the column prefix.
    ///
    /// # Errors
    ///
    /// Propagates errors from raw-expression callbacks.
    fn value_sql(&self, entity: EntityRef<'_>, value: &Value, prefix: Option<&str>) -> Result<String> {
        match value {
            Value::Raw(raw) => self.raw_sql(entity, raw, prefix),
            Value::List(items) => Ok(items
                .iter()
                .map(|item| self.value_sql(entity, item, prefix))
                .collect::<Result<Vec<_>>>()?
                .join(", ")),
            other => self.escape(other),
        }
    }

    /// SQL reference to a field, a computed field or a `relation.field` path.
    ///
    /// # Errors
    ///
    /// Propagates errors from computed-field callbacks.
    fn column_ref(&self, entity: EntityRef<'_>, key: &str, prefix: Option<&str>) -> Result<String> {
        let escaped_prefix = self.escape_id_with(prefix.unwrap_or(""), true, true);
        if let Some(field) = entity.fields.get(key) {
            if let Some(expr) = &field.virtual_expr {
                return self.raw_sql(entity, expr, prefix);
            }
            return Ok(format!(
                "{escaped_prefix}{}",
                self.escape_id_with(&entity.column_name(key), true, false)
            ));
        }
        if let Some((path, last)) = key.rsplit_once('.') {
            let mut target = entity;
            for segment in path.split('.') {
                match target.related(segment) {
                    Ok(related) => target = related,
                    Err(_) => return Ok(self.escape_id(key)),
                }
            }
            return Ok(format!(
                "{}.{}",
                self.escape_id_with(path, true, false),
                self.escape_id_with(&target.column_name(last), true, false)
            ));
        }
        Ok(format!("{escaped_prefix}{}", self.escape_id(key)))
    }

    // ---- reading ----

    /// `SELECT ... FROM ... [JOIN ...] [WHERE ...] [GROUP BY ...] [HAVING ...]
    /// [ORDER BY ...] [LIMIT ...] [OFFSET ...]`.
    ///
    /// # Errors
    ///
    /// Fails on unknown operators, relations or malformed filters.
    fn find(&self, entity: EntityRef<'_>, query: &Query, opts: &FindOptions<'_>) -> Result<String> {
        let select = self.select(entity, query.select.as_ref(), opts)?;
        let criteria = self.criteria(entity, query, opts)?;
        Ok(format!("{select}{criteria}"))
    }

    /// `SELECT COUNT(*) count FROM ...` honoring the filter and grouping.
    ///
    /// # Errors
    ///
    /// Same as [`SqlDialect::find`].
    fn count(&self, entity: EntityRef<'_>, query: &Query, opts: &FindOptions<'_>) -> Result<String> {
        let counting = Query {
            select: Some(Select::Fields(vec![SelectItem::Raw(Raw::new("COUNT(*)").alias("count"))])),
            filter: query.filter.clone(),
            group: query.group.clone(),
            having: query.having.clone(),
            ..Query::default()
        };
        self.find(entity, &counting, opts)
    }

    /// Column qualifier for the root entity: the explicit prefix, or the
    /// table name when relations are joined or auto-prefixing is requested.
    fn resolve_prefix(&self, entity: EntityRef<'_>, select: Option<&Select>, opts: &FindOptions<'_>) -> Option<String> {
        opts.prefix.map(ToString::to_string).or_else(|| {
            (opts.auto_prefix || is_projecting_relations(entity, select)).then(|| entity.table_name())
        })
    }

    /// `SELECT <fields> FROM <table><joins>`.
    ///
    /// # Errors
    ///
    /// Fails on unknown relations and raw callback errors.
    fn select(&self, entity: EntityRef<'_>, select: Option<&Select>, opts: &FindOptions<'_>) -> Result<String> {
        let prefix = self.resolve_prefix(entity, select, opts);
        let mut fields = self.select_fields(entity, select, prefix.as_deref(), false)?;
        let plan = self.select_relations(entity, select, None)?;
        if !plan.fields.is_empty() {
            fields = format!("{fields}, {}", plan.fields.join(", "));
        }
        Ok(format!(
            "SELECT {fields} FROM {}{}",
            self.escape_id(&entity.table_name()),
            plan.tables
        ))
    }

    /// Comma-separated projection of one entity. With `alias_prefix` every
    /// column is aliased `<prefix>.<key>`, which is how joined relation
    /// columns are told apart.
    ///
    /// # Errors
    ///
    /// Propagates raw callback errors.
    fn select_fields(
        &self,
        entity: EntityRef<'_>,
        select: Option<&Select>,
        prefix: Option<&str>,
        alias_prefix: bool,
    ) -> Result<String> {
        let mut items: Vec<SelectItem> = match select {
            None => entity.fields.keys().cloned().map(SelectItem::Field).collect(),
            Some(Select::Fields(items)) => items
                .iter()
                .filter(|item| match item {
                    SelectItem::Field(key) => entity.fields.contains_key(key),
                    SelectItem::Raw(_) => true,
                })
                .cloned()
                .collect(),
            Some(Select::Map(map)) => {
                let positive: Vec<SelectItem> = map
                    .iter()
                    .filter(|(key, value)| {
                        entity.fields.contains_key(*key) && matches!(value, SelectValue::Include(true))
                    })
                    .map(|(key, _)| SelectItem::Field(key.clone()))
                    .collect();
                if positive.is_empty() {
                    entity
                        .fields
                        .keys()
                        .filter(|key| !matches!(map.get(*key), Some(SelectValue::Include(false))))
                        .cloned()
                        .map(SelectItem::Field)
                        .collect()
                } else {
                    positive
                }
            }
        };

        if select.is_some() && prefix.is_some() {
            let id = SelectItem::Field(entity.id.clone());
            if !items.contains(&id) {
                items.insert(0, id);
            }
        }

        let prefix_name = prefix.unwrap_or("");
        let escaped_prefix = self.escape_id_with(prefix_name, true, true);
        let alias = |name: &str| {
            if alias_prefix {
                self.escape_id_with(&format!("{prefix_name}.{name}"), true, false)
            } else {
                self.escape_id_with(name, true, false)
            }
        };

        let mut fields = Vec::with_capacity(items.len());
        for item in &items {
            let sql = match item {
                SelectItem::Raw(raw) => {
                    let sql = self.raw_sql(entity, raw, prefix)?;
                    match &raw.alias {
                        Some(name) => format!("{sql} {}", alias(name)),
                        None => sql,
                    }
                }
                SelectItem::Field(key) => {
                    let virtual_expr = entity.fields.get(key).and_then(|f| f.virtual_expr.as_ref());
                    if let Some(expr) = virtual_expr {
                        format!("{} {}", self.raw_sql(entity, expr, prefix)?, alias(key))
                    } else {
                        let column = entity.column_name(key);
                        let path = format!("{escaped_prefix}{}", self.escape_id_with(&column, true, false));
                        if alias_prefix || column != *key {
                            format!("{path} {}", alias(key))
                        } else {
                            path
                        }
                    }
                }
            };
            fields.push(sql);
        }
        Ok(fields.join(", "))
    }

    /// Plans joins for the relations of a map selection. To-one relations
    /// are joined; to-many relations are returned as deferred.
    ///
    /// # Errors
    ///
    /// Fails on unknown relations or entities.
    fn select_relations(
        &self,
        entity: EntityRef<'_>,
        select: Option<&Select>,
        parent_alias: Option<&str>,
    ) -> Result<RelationJoinPlan> {
        relations::plan(self.as_dialect(), entity, select, parent_alias)
    }

    /// Everything after the `FROM` clause.
    ///
    /// # Errors
    ///
    /// Fails on unknown operators and malformed filters.
    fn criteria(&self, entity: EntityRef<'_>, query: &Query, opts: &FindOptions<'_>) -> Result<String> {
        let prefix = self.resolve_prefix(entity, query.select.as_ref(), opts);
        let prefix = prefix.as_deref();
        let where_sql = self.where_clause(
            entity,
            query.filter.as_ref(),
            &WhereOptions {
                prefix,
                use_precedence: false,
                clause: Clause::Where,
                soft_delete: opts.soft_delete,
            },
        )?;
        let group = self.group(entity, &query.group, prefix)?;
        let having = self.where_map(
            entity,
            query.having.as_ref(),
            &WhereOptions {
                prefix,
                use_precedence: false,
                clause: Clause::Having,
                soft_delete: Some(false),
            },
        )?;
        let sort = self.sort(entity, query.sort.as_ref(), prefix)?;
        let pager = self.pager(query.limit, query.skip);
        Ok(format!("{where_sql}{group}{having}{sort}{pager}"))
    }

    // ---- filtering ----

    /// Compiles a `$where` into an AND-joined fragment, injecting the
    /// soft-delete predicate when the entity has one.
    ///
    /// # Errors
    ///
    /// Fails on unknown operators and malformed filters.
    fn where_clause(&self, entity: EntityRef<'_>, filter: Option<&Where>, opts: &WhereOptions<'_>) -> Result<String> {
        match filter {
            Some(Where::Id(id)) => {
                let map = WhereMap::new().field(entity.id.clone(), id.clone());
                self.where_map(entity, Some(&map), opts)
            }
            Some(Where::Map(map)) => self.where_map(entity, Some(map), opts),
            None => self.where_map(entity, None, opts),
        }
    }

    /// [`SqlDialect::where_clause`] for a filter map.
    ///
    /// # Errors
    ///
    /// Fails on unknown operators and malformed filters.
    fn where_map(&self, entity: EntityRef<'_>, map: Option<&WhereMap>, opts: &WhereOptions<'_>) -> Result<String> {
        let null_condition = WhereValue::Field(FieldCondition::Value(Value::Null));
        let mut entries: Vec<(&str, &WhereValue)> = map.map(|m| m.iter().collect()).unwrap_or_default();

        let soft_delete = entity
            .soft_delete
            .as_deref()
            .filter(|_| opts.clause != Clause::Having && opts.soft_delete != Some(false))
            .filter(|key| !map.is_some_and(|m| m.contains_key(key)));
        if let Some(key) = soft_delete {
            entries.push((key, &null_condition));
        }

        let compare_opts = CompareOptions {
            prefix: opts.prefix,
            use_precedence: entries.len() > 1 || opts.use_precedence,
        };
        let mut parts = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let sql = self.compare(entity, key, value, &compare_opts)?;
            if !sql.is_empty() {
                parts.push(sql);
            }
        }
        if parts.is_empty() {
            return Ok(String::new());
        }

        let mut sql = parts.join(" AND ");
        if opts.use_precedence && parts.len() > 1 {
            sql = format!("({sql})");
        }
        Ok(match opts.clause {
            Clause::Where => format!(" WHERE {sql}"),
            Clause::Having => format!(" HAVING {sql}"),
            Clause::None => sql,
        })
    }

    /// Compiles one filter entry.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownOperator`] for unknown `$` keys.
    fn compare(&self, entity: EntityRef<'_>, key: &str, value: &WhereValue, opts: &CompareOptions<'_>) -> Result<String> {
        match value {
            WhereValue::Raw(raw) => match key {
                "$exists" => Ok(format!("EXISTS ({})", self.raw_sql(entity, raw, opts.prefix)?)),
                "$nexists" => Ok(format!("NOT EXISTS ({})", self.raw_sql(entity, raw, opts.prefix)?)),
                _ => Err(invalid(key, "raw sub-queries are only allowed under $exists and $nexists")),
            },
            WhereValue::Text(search) if key == "$text" => self.text_search(entity, search, opts.prefix),
            WhereValue::Text(_) => Err(invalid(key, "text search is only allowed under $text")),
            WhereValue::Logical(items) => {
                let operator = LogicalOperator::parse(key).ok_or_else(|| QueryError::UnknownOperator(key.to_string()))?;
                self.compare_logical(entity, operator, items, opts)
            }
            WhereValue::Field(_) if key.starts_with('$') => Err(QueryError::UnknownOperator(key.to_string())),
            WhereValue::Field(condition) => self.compare_field(entity, key, condition, opts),
        }
    }

    /// Compiles `$and`/`$or`/`$not`/`$nor`.
    ///
    /// # Errors
    ///
    /// Propagates errors of the children.
    fn compare_logical(
        &self,
        entity: EntityRef<'_>,
        operator: LogicalOperator,
        items: &[WhereItem],
        opts: &CompareOptions<'_>,
    ) -> Result<String> {
        let (joiner, negate) = operator.joiner();
        let atomic_items = items.len() > 1 || negate || opts.use_precedence;
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            let sql = match item {
                WhereItem::Raw(raw) => self.raw_sql(entity, raw, opts.prefix)?,
                WhereItem::Map(map) => self.where_map(
                    entity,
                    Some(map),
                    &WhereOptions {
                        prefix: opts.prefix,
                        use_precedence: atomic_items,
                        clause: Clause::None,
                        soft_delete: Some(false),
                    },
                )?,
            };
            if !sql.is_empty() {
                parts.push(sql);
            }
        }
        if parts.is_empty() {
            return Ok(String::new());
        }

        let mut sql = parts.join(joiner);
        if parts.len() > 1 && (opts.use_precedence || negate) {
            sql = format!("({sql})");
        }
        if negate {
            sql = format!("NOT {sql}");
        }
        Ok(sql)
    }

    /// Compiles the condition on one field; several operators are AND-ed
    /// inside parentheses.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownOperator`] for unknown operators.
    fn compare_field(
        &self,
        entity: EntityRef<'_>,
        key: &str,
        condition: &FieldCondition,
        opts: &CompareOptions<'_>,
    ) -> Result<String> {
        let operators = condition.operators();
        let mut parts = Vec::with_capacity(operators.len());
        for (op, arg) in &operators {
            parts.push(self.compare_field_operator(entity, key, op, arg, opts)?);
        }
        let sql = parts.join(" AND ");
        Ok(if parts.len() > 1 { format!("({sql})") } else { sql })
    }

    /// Compiles a single field operator.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownOperator`] when `op` is not an operator,
    /// or [`QueryError::InvalidFilter`] for unusable arguments.
    fn compare_field_operator(
        &self,
        entity: EntityRef<'_>,
        key: &str,
        op: &str,
        arg: &OperatorArg,
        opts: &CompareOptions<'_>,
    ) -> Result<String> {
        let operator: FieldOperator = op.parse()?;

        if operator == FieldOperator::Not {
            let inner = match arg {
                OperatorArg::Condition(condition) => self.compare_field(entity, key, condition, opts)?,
                OperatorArg::Value(value) => {
                    self.compare_field(entity, key, &FieldCondition::Value(value.clone()), opts)?
                }
            };
            return Ok(format!("NOT ({inner})"));
        }

        let OperatorArg::Value(value) = arg else {
            return Err(invalid(key, "nested conditions are only allowed under $not"));
        };
        let column = self.column_ref(entity, key, opts.prefix)?;
        let pattern = || {
            value
                .pattern_text()
                .ok_or_else(|| invalid(key, "pattern operators need a text value"))
        };

        Ok(match operator {
            FieldOperator::Eq if value.is_null() => format!("{column} IS NULL"),
            FieldOperator::Ne if value.is_null() => format!("{column} IS NOT NULL"),
            FieldOperator::Eq => format!("{column} = {}", self.value_sql(entity, value, opts.prefix)?),
            FieldOperator::Ne => format!("{column} <> {}", self.value_sql(entity, value, opts.prefix)?),
            FieldOperator::Lt => format!("{column} < {}", self.value_sql(entity, value, opts.prefix)?),
            FieldOperator::Lte => format!("{column} <= {}", self.value_sql(entity, value, opts.prefix)?),
            FieldOperator::Gt => format!("{column} > {}", self.value_sql(entity, value, opts.prefix)?),
            FieldOperator::Gte => format!("{column} >= {}", self.value_sql(entity, value, opts.prefix)?),
            FieldOperator::StartsWith => format!("{column} LIKE {}", self.escape_string(&format!("{}%", pattern()?))),
            FieldOperator::EndsWith => format!("{column} LIKE {}", self.escape_string(&format!("%{}", pattern()?))),
            FieldOperator::Includes => format!("{column} LIKE {}", self.escape_string(&format!("%{}%", pattern()?))),
            FieldOperator::IStartsWith => self.case_insensitive_like(&column, &format!("{}%", pattern()?)),
            FieldOperator::IEndsWith => self.case_insensitive_like(&column, &format!("%{}", pattern()?)),
            FieldOperator::IIncludes => self.case_insensitive_like(&column, &format!("%{}%", pattern()?)),
            FieldOperator::Like => format!("{column} LIKE {}", self.escape_string(&pattern()?)),
            FieldOperator::ILike => self.case_insensitive_like(&column, &pattern()?),
            FieldOperator::In | FieldOperator::Nin => {
                let negated = operator == FieldOperator::Nin;
                let items = match value {
                    Value::List(items) => items.as_slice(),
                    other => slice::from_ref(other),
                };
                if items.is_empty() {
                    return Ok(if negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let list = items
                    .iter()
                    .map(|item| self.value_sql(entity, item, opts.prefix))
                    .collect::<Result<Vec<_>>>()?
                    .join(", ");
                format!("{column} {}IN ({list})", if negated { "NOT " } else { "" })
            }
            FieldOperator::Regex => format!(
                "{column} {} {}",
                self.regex_operator(),
                self.escape_string(&pattern()?)
            ),
            FieldOperator::Not => return Err(invalid(key, "$not needs a condition")),
        })
    }

    // ---- ordering, grouping, paging ----

    /// ` ORDER BY ...`; nested relation sorts are flattened.
    ///
    /// # Errors
    ///
    /// Fails when a nested sort names an unknown relation.
    fn sort(&self, entity: EntityRef<'_>, sort: Option<&Sort>, prefix: Option<&str>) -> Result<String> {
        let Some(sort) = sort.filter(|s| !s.is_empty()) else {
            return Ok(String::new());
        };
        let mut parts = Vec::new();
        flatten_sort(self.as_dialect(), entity, sort, prefix, None, &mut parts)?;
        Ok(format!(" ORDER BY {}", parts.join(", ")))
    }

    /// ` GROUP BY ...`.
    ///
    /// # Errors
    ///
    /// Propagates computed-field callback errors.
    fn group(&self, entity: EntityRef<'_>, keys: &[String], prefix: Option<&str>) -> Result<String> {
        if keys.is_empty() {
            return Ok(String::new());
        }
        let columns = keys
            .iter()
            .map(|key| self.column_ref(entity, key, prefix))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(" GROUP BY {}", columns.join(", ")))
    }

    /// ` LIMIT n OFFSET m`.
    fn pager(&self, limit: Option<u64>, skip: Option<u64>) -> String {
        let mut sql = String::new();
        match (limit, skip, self.unbounded_limit()) {
            (Some(limit), _, _) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(_), Some(unbounded)) => sql.push_str(&format!(" LIMIT {unbounded}")),
            _ => {}
        }
        if let Some(skip) = skip {
            sql.push_str(&format!(" OFFSET {skip}"));
        }
        sql
    }

    // ---- writing ----

    /// `INSERT INTO ... VALUES (...), (...)`. Columns are the persistable
    /// keys of the first record after insert-time generators ran; missing
    /// keys in later records are written as NULL.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyPayload`] when nothing can be inserted.
    fn insert(&self, entity: EntityRef<'_>, payloads: &[Record]) -> Result<String> {
        let (mut sql, _) = self.insert_statement(entity, payloads)?;
        if let Some(returning) = self.returning_id(entity) {
            sql.push(' ');
            sql.push_str(&returning);
        }
        Ok(sql)
    }

    /// The bare insert statement and its persisted keys.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyPayload`] when nothing can be inserted.
    fn insert_statement(&self, entity: EntityRef<'_>, payloads: &[Record]) -> Result<(String, Vec<String>)> {
        let records: Vec<Record> = payloads
            .iter()
            .map(|payload| fill_generated(entity.meta(), payload, |f| f.on_insert.as_ref()))
            .collect();
        let keys: Vec<String> = records
            .first()
            .map(|first| first.keys().filter(|k| entity.is_persistable(k)).cloned().collect())
            .unwrap_or_default();
        if keys.is_empty() {
            return Err(QueryError::EmptyPayload(entity.name.clone()));
        }

        let columns = keys
            .iter()
            .map(|key| self.escape_id_with(&entity.column_name(key), true, false))
            .collect::<Vec<_>>()
            .join(", ");
        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            let values = keys
                .iter()
                .map(|key| match record.get(key) {
                    Some(value) => self.format_persistable_value(entity, key, value),
                    None => Ok("NULL".to_string()),
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(format!("({})", values.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {} ({columns}) VALUES {}",
            self.escape_id(&entity.table_name()),
            rows.join(", ")
        );
        Ok((sql, keys))
    }

    /// `UPDATE ... SET ...` after update-time generators ran.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyPayload`] when nothing can be updated.
    fn update(&self, entity: EntityRef<'_>, filter: Option<&Where>, payload: &Record, opts: &WriteOptions) -> Result<String> {
        let record = fill_generated(entity.meta(), payload, |f| f.on_update.as_ref());
        self.update_statement(entity, filter, &record, opts.soft_delete)
    }

    /// `UPDATE ... SET ...` of exactly the given record.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyPayload`] when nothing can be updated.
    fn update_statement(
        &self,
        entity: EntityRef<'_>,
        filter: Option<&Where>,
        record: &Record,
        soft_delete: Option<bool>,
    ) -> Result<String> {
        let mut sets = Vec::with_capacity(record.len());
        for (key, value) in record.iter().filter(|(k, _)| entity.is_persistable(k)) {
            sets.push(format!(
                "{} = {}",
                self.escape_id_with(&entity.column_name(key), true, false),
                self.format_persistable_value(entity, key, value)?
            ));
        }
        if sets.is_empty() {
            return Err(QueryError::EmptyPayload(entity.name.clone()));
        }
        let where_sql = self.where_clause(
            entity,
            filter,
            &WhereOptions {
                soft_delete,
                ..WhereOptions::default()
            },
        )?;
        Ok(format!(
            "UPDATE {} SET {}{where_sql}",
            self.escape_id(&entity.table_name()),
            sets.join(", ")
        ))
    }

    /// Insert that updates every non-conflict column on conflict.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyPayload`] when nothing can be inserted.
    fn upsert(&self, entity: EntityRef<'_>, conflict_keys: &[&str], payload: &Record) -> Result<String> {
        let (insert, keys) = self.insert_statement(entity, slice::from_ref(payload))?;
        let column = |key: &str| self.escape_id_with(&entity.column_name(key), true, false);
        let conflict: Vec<String> = conflict_keys.iter().map(|key| column(key)).collect();
        let update: Vec<String> = keys
            .iter()
            .filter(|key| !conflict_keys.contains(&key.as_str()))
            .map(|key| column(key))
            .collect();
        let mut sql = format!("{insert}{}", self.upsert_clause(&conflict, &update));
        if let Some(returning) = self.returning_id(entity) {
            sql.push(' ');
            sql.push_str(&returning);
        }
        Ok(sql)
    }

    /// Soft delete (`UPDATE ... SET <col> = <value>`) when the entity has a
    /// soft-delete field and it is not disabled, otherwise `DELETE FROM`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::SoftDeleteNotEnabled`] when soft delete is
    /// requested on an entity without a soft-delete field.
    fn delete(&self, entity: EntityRef<'_>, filter: Option<&Where>, opts: &WriteOptions) -> Result<String> {
        match (opts.soft_delete, entity.soft_delete.as_deref()) {
            (Some(true), None) => Err(QueryError::SoftDeleteNotEnabled(entity.name.clone())),
            (Some(false), _) | (_, None) => {
                let where_sql = self.where_clause(
                    entity,
                    filter,
                    &WhereOptions {
                        soft_delete: Some(false),
                        ..WhereOptions::default()
                    },
                )?;
                Ok(format!("DELETE FROM {}{where_sql}", self.escape_id(&entity.table_name())))
            }
            (_, Some(key)) => {
                let value = entity
                    .fields
                    .get(key)
                    .and_then(|f| f.on_delete.as_ref())
                    .map_or_else(|| Value::Raw(Raw::new("CURRENT_TIMESTAMP")), ValueFn::call);
                let mut record = Record::new();
                record.insert(key.to_string(), value);
                self.update_statement(entity, filter, &record, opts.soft_delete)
            }
        }
    }

    /// Renders a value for a stored column: JSON fields are serialized and
    /// cast, vectors become `'[1,2,3]'`, raw expressions are rendered.
    ///
    /// # Errors
    ///
    /// Propagates raw callback errors.
    fn format_persistable_value(&self, entity: EntityRef<'_>, key: &str, value: &Value) -> Result<String> {
        let field_type = entity.fields.get(key).map(|f| f.field_type);
        match (value, field_type) {
            (Value::Raw(raw), _) => self.raw_sql(entity, raw, None),
            (Value::Null, _) => Ok("NULL".to_string()),
            (_, Some(FieldType::Json)) => {
                let text = match value {
                    Value::Text(s) => s.clone(),
                    other => other.to_json().to_string(),
                };
                Ok(self.json_literal(&self.escape_string(&text)))
            }
            (Value::List(items), Some(FieldType::Vector)) => {
                let numbers = items.iter().map(|item| item.to_json().to_string()).collect::<Vec<_>>();
                Ok(self.escape_string(&format!("[{}]", numbers.join(","))))
            }
            _ => self.escape(value),
        }
    }
}

/// Whether a selection asks for any relation.
fn is_projecting_relations(entity: EntityRef<'_>, select: Option<&Select>) -> bool {
    match select {
        Some(Select::Map(map)) => map.iter().any(|(key, value)| {
            entity.relations.contains_key(key) && !matches!(value, SelectValue::Include(false))
        }),
        _ => false,
    }
}

fn flatten_sort(
    dialect: &dyn SqlDialect,
    entity: EntityRef<'_>,
    sort: &Sort,
    root_prefix: Option<&str>,
    relation_alias: Option<&str>,
    out: &mut Vec<String>,
) -> Result<()> {
    for (key, entry) in sort.iter() {
        match entry {
            SortEntry::Direction(direction) => {
                let is_computed = entity.fields.get(key).is_some_and(|f| f.virtual_expr.is_some());
                let column = if is_computed {
                    dialect.escape_id_with(key, true, false)
                } else {
                    let column = entity.column_name(key);
                    match relation_alias.or(root_prefix) {
                        Some(qualifier) if entity.fields.contains_key(key) => format!(
                            "{}{}",
                            dialect.escape_id_with(qualifier, true, true),
                            dialect.escape_id_with(&column, true, false)
                        ),
                        _ => dialect.escape_id(&column),
                    }
                };
                out.push(format!("{column}{}", direction.as_sql()));
            }
            SortEntry::Nested(inner) => {
                let related = entity.related(key)?;
                let alias = relation_alias.map_or_else(|| key.to_string(), |parent| format!("{parent}.{key}"));
                flatten_sort(dialect, related, inner, root_prefix, Some(&alias), out)?;
            }
        }
    }
    Ok(())
}
