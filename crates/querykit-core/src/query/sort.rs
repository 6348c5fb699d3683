//! Sort (`$sort`) model.

use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending, written `1` or `asc`.
    Asc,
    /// Descending, written `-1` or `desc`.
    Desc,
}

impl SortDirection {
    /// SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "",
            Self::Desc => " DESC",
        }
    }
}

impl TryFrom<i64> for SortDirection {
    type Error = QueryError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Asc),
            -1 => Ok(Self::Desc),
            other => Err(QueryError::InvalidFilter {
                key: "$sort".into(),
                message: format!("unknown direction {other}"),
            }),
        }
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "1" => Ok(Self::Asc),
            "desc" | "-1" => Ok(Self::Desc),
            _ => Err(QueryError::InvalidFilter {
                key: "$sort".into(),
                message: format!("unknown direction '{s}'"),
            }),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        })
    }
}

/// One `$sort` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortEntry {
    /// Direction for a field.
    Direction(SortDirection),
    /// Sort applied inside a to-one relation.
    Nested(Sort),
}

/// Ordered field to direction pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    entries: Vec<(String, SortEntry)>,
}

impl Sort {
    /// Creates an empty sort.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts by `key` ascending.
    #[must_use]
    pub fn asc(self, key: impl Into<String>) -> Self {
        self.by(key, SortDirection::Asc)
    }

    /// Sorts by `key` descending.
    #[must_use]
    pub fn desc(self, key: impl Into<String>) -> Self {
        self.by(key, SortDirection::Desc)
    }

    /// Sorts by `key` in `direction`.
    #[must_use]
    pub fn by(mut self, key: impl Into<String>, direction: SortDirection) -> Self {
        self.entries.push((key.into(), SortEntry::Direction(direction)));
        self
    }

    /// Sorts by fields of the relation `key`.
    #[must_use]
    pub fn nested(mut self, key: impl Into<String>, sort: Self) -> Self {
        self.entries.push((key.into(), SortEntry::Nested(sort)));
        self
    }

    /// Iterates entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SortEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns `true` when no entry is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
