//! Filter (`$where`) model.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use super::Raw;
use crate::error::QueryError;
use crate::value::Value;

/// A `$where` clause: an id shorthand or a filter map.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    /// Shorthand for `{ <id>: value }`.
    Id(Value),
    /// Field and logical entries, implicitly AND-ed.
    Map(WhereMap),
}

impl From<WhereMap> for Where {
    fn from(map: WhereMap) -> Self {
        Self::Map(map)
    }
}

/// Ordered map of filter entries.
///
/// Keys are field keys, or one of the logical keys `$and`, `$or`, `$not`,
/// `$nor`, `$text`, `$exists`, `$nexists`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereMap {
    entries: IndexMap<String, WhereValue>,
}

/// The value bound to a [`WhereMap`] key.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereValue {
    /// Condition on a field.
    Field(FieldCondition),
    /// Children of a logical key.
    Logical(Vec<WhereItem>),
    /// Full-text search under `$text`.
    Text(TextSearch),
    /// Raw sub-query under `$exists`/`$nexists`.
    Raw(Raw),
}

/// A child of a logical node.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereItem {
    /// A nested filter map.
    Map(WhereMap),
    /// A raw fragment.
    Raw(Raw),
}

impl From<WhereMap> for WhereItem {
    fn from(map: WhereMap) -> Self {
        Self::Map(map)
    }
}

impl From<Raw> for WhereItem {
    fn from(raw: Raw) -> Self {
        Self::Raw(raw)
    }
}

/// Condition applied to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
    /// Bare value: a list means `$in`, anything else `$eq`.
    Value(Value),
    /// Operator entries, AND-ed together. Operator keys are validated when
    /// the filter is compiled.
    Operators(Vec<(String, OperatorArg)>),
}

/// The argument of a field operator.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorArg {
    /// A plain value.
    Value(Value),
    /// A nested condition, used by `$not`.
    Condition(FieldCondition),
}

macro_rules! impl_from_value {
    ($target:ident: $($t:ty),*) => {
        $(
            impl From<$t> for $target {
                fn from(value: $t) -> Self {
                    Self::Value(value.into())
                }
            }
        )*
        impl<T: Into<Value>> From<Vec<T>> for $target {
            fn from(values: Vec<T>) -> Self {
                Self::Value(values.into())
            }
        }
    };
}

impl_from_value!(OperatorArg: Value, bool, i32, i64, u32, f64, &str, String, serde_json::Value, Raw);
impl_from_value!(FieldCondition: Value, bool, i32, i64, u32, f64, &str, String, serde_json::Value, Raw);

/// Full-text search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSearch {
    /// Field keys searched.
    pub fields: Vec<String>,
    /// Search terms.
    pub value: String,
}

/// Known field operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOperator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Includes,
    IIncludes,
    Like,
    ILike,
    In,
    Nin,
    Regex,
    Not,
}

impl FieldOperator {
    /// The operator key as written in a filter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::StartsWith => "$startsWith",
            Self::IStartsWith => "$istartsWith",
            Self::EndsWith => "$endsWith",
            Self::IEndsWith => "$iendsWith",
            Self::Includes => "$includes",
            Self::IIncludes => "$iincludes",
            Self::Like => "$like",
            Self::ILike => "$ilike",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Regex => "$regex",
            Self::Not => "$not",
        }
    }
}

impl fmt::Display for FieldOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldOperator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$startsWith" => Self::StartsWith,
            "$istartsWith" => Self::IStartsWith,
            "$endsWith" => Self::EndsWith,
            "$iendsWith" => Self::IEndsWith,
            "$includes" => Self::Includes,
            "$iincludes" => Self::IIncludes,
            "$like" => Self::Like,
            "$ilike" => Self::ILike,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$regex" => Self::Regex,
            "$not" => Self::Not,
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        })
    }
}

/// Logical keys allowed at the filter-map level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
    Nor,
}

impl LogicalOperator {
    /// Parses a logical key, returning `None` for anything else.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "$and" => Some(Self::And),
            "$or" => Some(Self::Or),
            "$not" => Some(Self::Not),
            "$nor" => Some(Self::Nor),
            _ => None,
        }
    }

    /// The joining keyword and whether the group is negated.
    ///
    /// `$not` joins like `$and`, `$nor` like `$or`.
    #[must_use]
    pub const fn joiner(self) -> (&'static str, bool) {
        match self {
            Self::And => (" AND ", false),
            Self::Or => (" OR ", false),
            Self::Not => (" AND ", true),
            Self::Nor => (" OR ", true),
        }
    }
}

impl FieldCondition {
    /// Starts an operator condition.
    #[must_use]
    pub fn op(operator: FieldOperator, arg: impl Into<OperatorArg>) -> Self {
        Self::Operators(vec![(operator.as_str().to_string(), arg.into())])
    }

    /// Starts an operator condition from an unchecked key.
    #[must_use]
    pub fn raw_op(operator: impl Into<String>, arg: impl Into<OperatorArg>) -> Self {
        Self::Operators(vec![(operator.into(), arg.into())])
    }

    /// Adds another operator, AND-ed with the existing ones.
    #[must_use]
    pub fn and(self, operator: FieldOperator, arg: impl Into<OperatorArg>) -> Self {
        let mut ops = match self {
            Self::Value(value) => vec![(default_operator(&value).as_str().to_string(), OperatorArg::Value(value))],
            Self::Operators(ops) => ops,
        };
        ops.push((operator.as_str().to_string(), arg.into()));
        Self::Operators(ops)
    }

    /// Wraps this condition in `$not`.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Operators(vec![(FieldOperator::Not.as_str().to_string(), OperatorArg::Condition(self))])
    }

    /// Normalizes the condition into operator entries.
    #[must_use]
    pub fn operators(&self) -> Vec<(&str, OperatorArg)> {
        match self {
            Self::Value(value) => vec![(default_operator(value).as_str(), OperatorArg::Value(value.clone()))],
            Self::Operators(ops) => ops.iter().map(|(op, arg)| (op.as_str(), arg.clone())).collect(),
        }
    }
}

const fn default_operator(value: &Value) -> FieldOperator {
    if matches!(value, Value::List(_)) {
        FieldOperator::In
    } else {
        FieldOperator::Eq
    }
}

impl WhereMap {
    /// Creates an empty filter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition on a field. A bare value means equality.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, condition: impl Into<FieldCondition>) -> Self {
        self.entries.insert(key.into(), WhereValue::Field(condition.into()));
        self
    }

    /// Adds an `$and` group.
    #[must_use]
    pub fn and(self, items: Vec<WhereItem>) -> Self {
        self.logical("$and", items)
    }

    /// Adds an `$or` group.
    #[must_use]
    pub fn or(self, items: Vec<WhereItem>) -> Self {
        self.logical("$or", items)
    }

    /// Adds a `$not` group.
    #[must_use]
    pub fn not(self, items: Vec<WhereItem>) -> Self {
        self.logical("$not", items)
    }

    /// Adds a `$nor` group.
    #[must_use]
    pub fn nor(self, items: Vec<WhereItem>) -> Self {
        self.logical("$nor", items)
    }

    fn logical(mut self, key: &str, items: Vec<WhereItem>) -> Self {
        self.entries.insert(key.to_string(), WhereValue::Logical(items));
        self
    }

    /// Adds a `$text` search.
    #[must_use]
    pub fn text(mut self, fields: &[&str], value: impl Into<String>) -> Self {
        let search = TextSearch {
            fields: fields.iter().map(ToString::to_string).collect(),
            value: value.into(),
        };
        self.entries.insert("$text".to_string(), WhereValue::Text(search));
        self
    }

    /// Adds an `$exists` sub-query.
    #[must_use]
    pub fn exists(mut self, sub_query: Raw) -> Self {
        self.entries.insert("$exists".to_string(), WhereValue::Raw(sub_query));
        self
    }

    /// Adds a `$nexists` sub-query.
    #[must_use]
    pub fn nexists(mut self, sub_query: Raw) -> Self {
        self.entries.insert("$nexists".to_string(), WhereValue::Raw(sub_query));
        self
    }

    /// Inserts an entry, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: WhereValue) {
        self.entries.insert(key.into(), value);
    }

    /// Returns the value bound to `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&WhereValue> {
        self.entries.get(key)
    }

    /// Returns `true` if the map has an entry for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WhereValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse() {
        assert_eq!("$ne".parse::<FieldOperator>(), Ok(FieldOperator::Ne));
        assert_eq!("$iincludes".parse::<FieldOperator>(), Ok(FieldOperator::IIncludes));
        assert_eq!(
            "$between".parse::<FieldOperator>(),
            Err(QueryError::UnknownOperator("$between".into()))
        );
    }

    #[test]
    fn test_bare_values_normalize() {
        let cond = FieldCondition::from(vec![1, 2]);
        let ops = cond.operators();
        assert_eq!(ops[0].0, "$in");
        let cond = FieldCondition::from("a");
        let ops = cond.operators();
        assert_eq!(ops[0].0, "$eq");
    }

    #[test]
    fn test_chained_operators_keep_order() {
        let cond = FieldCondition::op(FieldOperator::Gte, 1).and(FieldOperator::Lt, 10);
        let keys: Vec<_> = cond.operators().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["$gte", "$lt"]);
    }

    #[test]
    fn test_logical_joiner() {
        assert_eq!(LogicalOperator::parse("$nor").map(LogicalOperator::joiner), Some((" OR ", true)));
        assert_eq!(LogicalOperator::parse("$x"), None);
    }
}
