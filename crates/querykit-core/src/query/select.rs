//! Projection (`$select`) model.

use indexmap::IndexMap;

use super::{Raw, Sort, WhereMap};

/// A `$select` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Select {
    /// Explicit list of field keys and raw expressions.
    Fields(Vec<SelectItem>),
    /// Field and relation keys mapped to an inclusion flag or nested query.
    Map(IndexMap<String, SelectValue>),
}

/// One entry of [`Select::Fields`].
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// A field key.
    Field(String),
    /// A raw expression, aliased when it carries one.
    Raw(Raw),
}

/// The value bound to a key in [`Select::Map`].
#[derive(Debug, Clone, PartialEq)]
pub enum SelectValue {
    /// Include (`true`) or exclude (`false`) the key.
    Include(bool),
    /// Nested query for a relation.
    Relation(RelationQuery),
}

/// Query applied to a selected relation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationQuery {
    /// Projection of the related entity.
    pub select: Option<Select>,
    /// Extra join predicate (or follow-up filter for to-many relations).
    pub filter: Option<WhereMap>,
    /// Joins with `INNER JOIN` instead of `LEFT JOIN`.
    pub required: bool,
    /// Sort of a deferred to-many query.
    pub sort: Option<Sort>,
    /// Limit of a deferred to-many query.
    pub limit: Option<u64>,
    /// Offset of a deferred to-many query.
    pub skip: Option<u64>,
}

impl RelationQuery {
    /// Creates an empty relation query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relation projection.
    #[must_use]
    pub fn select(mut self, select: Select) -> Self {
        self.select = Some(select);
        self
    }

    /// Sets the relation filter.
    #[must_use]
    pub fn filter(mut self, filter: WhereMap) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Marks the relation as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl Select {
    /// Selects the given field keys.
    #[must_use]
    pub fn fields<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(keys.into_iter().map(|k| SelectItem::Field(k.into())).collect())
    }

    /// Starts an empty map selection.
    #[must_use]
    pub fn map() -> Self {
        Self::Map(IndexMap::new())
    }

    /// Adds a key with `true`.
    #[must_use]
    pub fn include(self, key: impl Into<String>) -> Self {
        self.with(key, SelectValue::Include(true))
    }

    /// Adds a key with `false`.
    #[must_use]
    pub fn exclude(self, key: impl Into<String>) -> Self {
        self.with(key, SelectValue::Include(false))
    }

    /// Adds a relation with a nested query.
    #[must_use]
    pub fn relation(self, key: impl Into<String>, query: RelationQuery) -> Self {
        self.with(key, SelectValue::Relation(query))
    }

    /// Adds a raw expression. Map selections are converted to field lists.
    #[must_use]
    pub fn raw(self, raw: Raw) -> Self {
        match self {
            Self::Fields(mut items) => {
                items.push(SelectItem::Raw(raw));
                Self::Fields(items)
            }
            Self::Map(map) => {
                let mut items: Vec<SelectItem> = map
                    .into_iter()
                    .filter(|(_, v)| matches!(v, SelectValue::Include(true)))
                    .map(|(k, _)| SelectItem::Field(k))
                    .collect();
                items.push(SelectItem::Raw(raw));
                Self::Fields(items)
            }
        }
    }

    fn with(self, key: impl Into<String>, value: SelectValue) -> Self {
        match self {
            Self::Map(mut map) => {
                map.insert(key.into(), value);
                Self::Map(map)
            }
            Self::Fields(items) => {
                let mut map: IndexMap<String, SelectValue> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        SelectItem::Field(k) => Some((k, SelectValue::Include(true))),
                        SelectItem::Raw(_) => None,
                    })
                    .collect();
                map.insert(key.into(), value);
                Self::Map(map)
            }
        }
    }
}
