//! Parsing queries from their JSON notation.

use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use super::{
    FieldCondition, OperatorArg, Query, RelationQuery, Select, SelectItem, SelectValue, Sort,
    SortDirection, SortEntry, TextSearch, Where, WhereItem, WhereMap, WhereValue,
};
use crate::error::{QueryError, Result};
use crate::query::raw;
use crate::value::Value;

fn invalid(key: &str, message: impl Into<String>) -> QueryError {
    QueryError::InvalidFilter {
        key: key.to_string(),
        message: message.into(),
    }
}

fn object<'a>(key: &str, json: &'a Json) -> Result<&'a Map<String, Json>> {
    json.as_object().ok_or_else(|| invalid(key, "expected an object"))
}

fn count(key: &str, json: &Json) -> Result<u64> {
    json.as_u64().ok_or_else(|| invalid(key, "expected a non-negative integer"))
}

impl Query {
    /// Parses a query written as `{ "$select": .., "$where": .., "$sort": .. }`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidFilter`] for malformed entries.
    pub fn from_json(json: &Json) -> Result<Self> {
        let map = object("query", json)?;
        let mut query = Self::new();
        for (key, value) in map {
            match key.as_str() {
                "$select" => query.select = Some(Select::from_json(value)?),
                "$where" => query.filter = Some(Where::from_json(value)?),
                "$sort" => query.sort = Some(Sort::from_json(value)?),
                "$group" => {
                    let keys = value.as_array().ok_or_else(|| invalid(key, "expected an array"))?;
                    query.group = keys
                        .iter()
                        .map(|k| k.as_str().map(ToString::to_string).ok_or_else(|| invalid(key, "expected strings")))
                        .collect::<Result<_>>()?;
                }
                "$having" => query.having = Some(WhereMap::from_json(value)?),
                "$limit" => query.limit = Some(count(key, value)?),
                "$skip" => query.skip = Some(count(key, value)?),
                other => return Err(invalid(other, "unknown query key")),
            }
        }
        Ok(query)
    }
}

impl Where {
    /// Parses a `$where` value: a scalar id or a filter object.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for malformed filters.
    pub fn from_json(json: &Json) -> Result<Self> {
        match json {
            Json::Object(_) => Ok(Self::Map(WhereMap::from_json(json)?)),
            Json::Array(_) => Ok(Self::Id(scalar(json))),
            Json::Null | Json::Bool(_) => Err(invalid("$where", "expected an id or an object")),
            _ => Ok(Self::Id(scalar(json))),
        }
    }
}

impl WhereMap {
    /// Parses a filter object.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for malformed filters.
    pub fn from_json(json: &Json) -> Result<Self> {
        let mut map = Self::new();
        for (key, value) in object("$where", json)? {
            let entry = match key.as_str() {
                "$and" | "$or" | "$not" | "$nor" => {
                    let items = value.as_array().ok_or_else(|| invalid(key, "expected an array"))?;
                    WhereValue::Logical(
                        items
                            .iter()
                            .map(|item| match item {
                                Json::String(sql) => Ok(WhereItem::Raw(raw(sql.clone()))),
                                _ => Self::from_json(item).map(WhereItem::Map),
                            })
                            .collect::<Result<_>>()?,
                    )
                }
                "$text" => {
                    let search = object(key, value)?;
                    let fields = search
                        .get("$fields")
                        .and_then(Json::as_array)
                        .ok_or_else(|| invalid(key, "missing $fields"))?;
                    let value = search
                        .get("$value")
                        .and_then(Json::as_str)
                        .ok_or_else(|| invalid(key, "missing $value"))?;
                    WhereValue::Text(TextSearch {
                        fields: fields.iter().filter_map(Json::as_str).map(ToString::to_string).collect(),
                        value: value.to_string(),
                    })
                }
                "$exists" | "$nexists" => {
                    let sql = value.as_str().ok_or_else(|| invalid(key, "expected raw SQL text"))?;
                    WhereValue::Raw(raw(sql))
                }
                _ => WhereValue::Field(FieldCondition::from_json(value)),
            };
            map.insert(key.clone(), entry);
        }
        Ok(map)
    }
}

impl FieldCondition {
    /// Parses a field condition. Objects whose keys all start with `$` are
    /// operator maps; every other value is a bare comparison value.
    #[must_use]
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => Self::Operators(
                ops.iter()
                    .map(|(op, arg)| {
                        let arg = if op == "$not" && arg.is_object() {
                            OperatorArg::Condition(Self::from_json(arg))
                        } else {
                            OperatorArg::Value(scalar(arg))
                        };
                        (op.clone(), arg)
                    })
                    .collect(),
            ),
            _ => Self::Value(scalar(json)),
        }
    }
}

/// Converts JSON into a [`Value`]; arrays become lists, objects stay JSON.
fn scalar(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => n.as_i64().map_or_else(|| Value::Float(n.as_f64().unwrap_or_default()), Value::Int),
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(scalar).collect()),
        Json::Object(_) => Value::Json(json.clone()),
    }
}

impl Select {
    /// Parses a `$select` value.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for malformed selections.
    pub fn from_json(json: &Json) -> Result<Self> {
        match json {
            Json::Array(items) => Ok(Self::Fields(
                items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(|k| SelectItem::Field(k.to_string()))
                            .ok_or_else(|| invalid("$select", "expected field names"))
                    })
                    .collect::<Result<_>>()?,
            )),
            Json::Object(map) => {
                let mut out = IndexMap::new();
                for (key, value) in map {
                    let entry = match value {
                        Json::Bool(b) => SelectValue::Include(*b),
                        Json::Number(n) => SelectValue::Include(n.as_i64() != Some(0)),
                        Json::Object(_) => SelectValue::Relation(RelationQuery::from_json(value)?),
                        _ => return Err(invalid(key, "expected a flag or a relation query")),
                    };
                    out.insert(key.clone(), entry);
                }
                Ok(Self::Map(out))
            }
            _ => Err(invalid("$select", "expected an array or an object")),
        }
    }
}

impl RelationQuery {
    /// Parses a relation query; keys without a `$` prefix are treated as a
    /// shorthand projection.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for malformed entries.
    pub fn from_json(json: &Json) -> Result<Self> {
        let map = object("$select", json)?;
        if !map.keys().any(|k| k.starts_with('$')) {
            return Ok(Self::new().select(Select::from_json(json)?));
        }
        let mut query = Self::new();
        for (key, value) in map {
            match key.as_str() {
                "$select" => query.select = Some(Select::from_json(value)?),
                "$where" => query.filter = Some(WhereMap::from_json(value)?),
                "$required" => query.required = value.as_bool().unwrap_or(false),
                "$sort" => query.sort = Some(Sort::from_json(value)?),
                "$limit" => query.limit = Some(count(key, value)?),
                "$skip" => query.skip = Some(count(key, value)?),
                other => return Err(invalid(other, "unknown relation query key")),
            }
        }
        Ok(query)
    }
}

impl Sort {
    /// Parses a `$sort` object; directions accept `1`/`-1`/`asc`/`desc`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for unknown directions.
    pub fn from_json(json: &Json) -> Result<Self> {
        let mut sort = Self::new();
        for (key, value) in object("$sort", json)? {
            sort = match value {
                Json::Number(n) => {
                    let n = n.as_i64().ok_or_else(|| invalid(key, "expected 1 or -1"))?;
                    sort.by(key.clone(), SortDirection::try_from(n)?)
                }
                Json::String(s) => sort.by(key.clone(), s.parse()?),
                Json::Object(_) => sort.nested(key.clone(), Self::from_json(value)?),
                _ => return Err(invalid(key, "expected a sort direction")),
            };
        }
        Ok(sort)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_full_query() {
        let query = Query::from_json(&json!({
            "$select": ["id", "name"],
            "$where": { "id": 1, "name": { "$ne": "abc", "$startsWith": "a" } },
            "$sort": { "name": -1, "id": "asc" },
            "$limit": 5,
            "$skip": 10
        }))
        .unwrap();

        assert_eq!(query.select, Some(Select::fields(["id", "name"])));
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.skip, Some(10));
        let Some(Where::Map(filter)) = &query.filter else {
            panic!("expected a filter map");
        };
        assert!(matches!(filter.get("id"), Some(WhereValue::Field(FieldCondition::Value(Value::Int(1))))));
        let Some(WhereValue::Field(FieldCondition::Operators(ops))) = filter.get("name") else {
            panic!("expected operators");
        };
        assert_eq!(ops[0].0, "$ne");
        assert_eq!(ops[1].0, "$startsWith");
        assert_eq!(query.sort, Some(Sort::new().desc("name").asc("id")));
    }

    #[test]
    fn test_parse_id_shorthand() {
        assert_eq!(Where::from_json(&json!(123)).unwrap(), Where::Id(Value::Int(123)));
        assert!(Where::from_json(&json!(true)).is_err());
    }

    #[test]
    fn test_parse_relation_select() {
        let select = Select::from_json(&json!({
            "id": true,
            "measureUnit": { "$select": { "name": 1 }, "$required": true }
        }))
        .unwrap();
        let Select::Map(map) = select else {
            panic!("expected a map");
        };
        let Some(SelectValue::Relation(rel)) = map.get("measureUnit") else {
            panic!("expected a relation");
        };
        assert!(rel.required);
        assert_eq!(rel.select, Some(Select::map().include("name")));
    }

    #[test]
    fn test_rejects_unknown_query_key() {
        assert!(Query::from_json(&json!({ "$foo": 1 })).is_err());
        assert!(Sort::from_json(&json!({ "name": 3 })).is_err());
    }
}
