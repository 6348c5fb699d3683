//! Dialect-neutral column types.
//!
//! Schemas built from entities and schemas introspected from a database are
//! compared through [`CanonicalType`], never through raw SQL strings, so that
//! spelling differences (`INT` vs `INTEGER`, `numeric` vs `DECIMAL`) do not
//! show up as changes.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dialect::DialectKind;
use crate::entity::{FieldMeta, FieldType};

/// Broad family of a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeCategory {
    Integer,
    Float,
    Double,
    Decimal,
    String,
    Text,
    Boolean,
    Date,
    Time,
    Timestamp,
    Json,
    Uuid,
    Blob,
    Vector,
    Unknown,
}

/// Storage size of an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntegerSize {
    Tiny,
    Small,
    Medium,
    Regular,
    Big,
}

/// A dialect-neutral column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalType {
    /// Type family.
    pub category: TypeCategory,
    /// Integer size, for [`TypeCategory::Integer`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<IntegerSize>,
    /// Character length, or dimensions for vectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Decimal precision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    /// Decimal scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    /// Unsigned numeric type.
    #[serde(default)]
    pub unsigned: bool,
    /// Time or timestamp carrying a time zone.
    #[serde(default)]
    pub with_timezone: bool,
    /// Original spelling of types that could not be classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl CanonicalType {
    /// A type of the given category with no modifiers.
    #[must_use]
    pub const fn of(category: TypeCategory) -> Self {
        Self {
            category,
            size: None,
            length: None,
            precision: None,
            scale: None,
            unsigned: false,
            with_timezone: false,
            raw: None,
        }
    }

    /// `INTEGER`.
    #[must_use]
    pub const fn integer() -> Self {
        Self::sized_integer(IntegerSize::Regular)
    }

    /// Integer of the given size.
    #[must_use]
    pub const fn sized_integer(size: IntegerSize) -> Self {
        let mut ty = Self::of(TypeCategory::Integer);
        ty.size = Some(size);
        ty
    }

    /// `BIGINT`.
    #[must_use]
    pub const fn big_integer() -> Self {
        Self::sized_integer(IntegerSize::Big)
    }

    /// `VARCHAR(length)`.
    #[must_use]
    pub const fn varchar(length: u32) -> Self {
        let mut ty = Self::of(TypeCategory::String);
        ty.length = Some(length);
        ty
    }

    /// `TEXT`.
    #[must_use]
    pub const fn text() -> Self {
        Self::of(TypeCategory::Text)
    }

    /// `BOOLEAN`.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::of(TypeCategory::Boolean)
    }

    /// `DECIMAL(precision, scale)`.
    #[must_use]
    pub const fn decimal(precision: u32, scale: u32) -> Self {
        let mut ty = Self::of(TypeCategory::Decimal);
        ty.precision = Some(precision);
        ty.scale = Some(scale);
        ty
    }

    /// `TIMESTAMP`.
    #[must_use]
    pub const fn timestamp() -> Self {
        Self::of(TypeCategory::Timestamp)
    }

    /// `VECTOR(dimensions)`.
    #[must_use]
    pub const fn vector(dimensions: u32) -> Self {
        let mut ty = Self::of(TypeCategory::Vector);
        ty.length = Some(dimensions);
        ty
    }

    /// An unclassified type kept by its SQL spelling.
    #[must_use]
    pub fn unknown(raw: impl Into<String>) -> Self {
        let mut ty = Self::of(TypeCategory::Unknown);
        ty.raw = Some(raw.into());
        ty
    }

    /// Marks the type unsigned.
    #[must_use]
    pub const fn with_unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Marks the type as time-zone aware.
    #[must_use]
    pub const fn with_timezone(mut self) -> Self {
        self.with_timezone = true;
        self
    }

    /// Whether two types describe the same column type.
    ///
    /// Modifiers missing on either side are not compared.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        fn same<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        if self.category != other.category {
            return false;
        }
        match self.category {
            TypeCategory::Integer => {
                self.size.unwrap_or(IntegerSize::Regular) == other.size.unwrap_or(IntegerSize::Regular)
                    && self.unsigned == other.unsigned
            }
            TypeCategory::Float | TypeCategory::Double => self.unsigned == other.unsigned,
            TypeCategory::Decimal => {
                same(self.precision, other.precision)
                    && same(self.scale, other.scale)
                    && self.unsigned == other.unsigned
            }
            TypeCategory::String | TypeCategory::Vector => same(self.length, other.length),
            TypeCategory::Time | TypeCategory::Timestamp => self.with_timezone == other.with_timezone,
            TypeCategory::Unknown => {
                self.raw.as_deref().map(str::to_ascii_lowercase) == other.raw.as_deref().map(str::to_ascii_lowercase)
            }
            _ => true,
        }
    }

    /// Parses a SQL type spelling from any supported dialect.
    #[must_use]
    pub fn parse(sql: &str) -> Self {
        static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^([a-z][a-z0-9_ ]*)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*([a-z ]*)$")
                .expect("static regex")
        });

        let lowered = sql.trim().to_ascii_lowercase();
        let unsigned = lowered.split_whitespace().any(|w| w == "unsigned");
        let cleaned = lowered
            .split_whitespace()
            .filter(|w| *w != "unsigned" && *w != "zerofill")
            .collect::<Vec<_>>()
            .join(" ");

        let Some(caps) = TYPE_RE.captures(&cleaned) else {
            return Self::unknown(sql.trim());
        };
        let base = caps.get(1).map_or("", |m| m.as_str().trim());
        let first = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        let second = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok());
        let suffix = caps.get(4).map_or("", |m| m.as_str().trim());
        let name = if suffix.is_empty() {
            base.to_string()
        } else {
            format!("{base} {suffix}")
        };

        let mut ty = match name.as_str() {
            "tinyint" if first == Some(1) => Self::boolean(),
            "tinyint" => Self::sized_integer(IntegerSize::Tiny),
            "smallint" | "int2" | "smallserial" => Self::sized_integer(IntegerSize::Small),
            "mediumint" => Self::sized_integer(IntegerSize::Medium),
            "int" | "integer" | "int4" | "serial" => Self::integer(),
            "bigint" | "int8" | "bigserial" => Self::big_integer(),
            "real" | "float" | "float4" => Self::of(TypeCategory::Float),
            "double" | "double precision" | "float8" => Self::of(TypeCategory::Double),
            "decimal" | "numeric" | "dec" => {
                let mut ty = Self::of(TypeCategory::Decimal);
                ty.precision = first;
                ty.scale = second.or(first.map(|_| 0));
                ty
            }
            "varchar" | "character varying" | "char" | "character" | "nvarchar" | "nchar" => {
                let mut ty = Self::of(TypeCategory::String);
                ty.length = first;
                ty
            }
            "text" | "tinytext" | "mediumtext" | "longtext" | "clob" => Self::text(),
            "bool" | "boolean" | "bit" => Self::boolean(),
            "date" => Self::of(TypeCategory::Date),
            "time" | "time without time zone" => Self::of(TypeCategory::Time),
            "timetz" | "time with time zone" => Self::of(TypeCategory::Time).with_timezone(),
            "timestamp" | "datetime" | "timestamp without time zone" => Self::timestamp(),
            "timestamptz" | "timestamp with time zone" => Self::timestamp().with_timezone(),
            "json" | "jsonb" => Self::of(TypeCategory::Json),
            "uuid" => Self::of(TypeCategory::Uuid),
            "blob" | "bytea" | "binary" | "varbinary" | "tinyblob" | "mediumblob" | "longblob" => {
                Self::of(TypeCategory::Blob)
            }
            "vector" => {
                let mut ty = Self::of(TypeCategory::Vector);
                ty.length = first;
                ty
            }
            _ => return Self::unknown(sql.trim()),
        };
        if unsigned && ty.is_numeric() {
            ty.unsigned = true;
        }
        ty
    }

    /// The type as `dialect` stores it. Modifiers the dialect cannot
    /// express (`UNSIGNED` outside MySQL, integer sizes Postgres lacks,
    /// vectors stored as JSON) are dropped.
    #[must_use]
    pub fn for_dialect(&self, dialect: DialectKind) -> Self {
        if self.category == TypeCategory::Unknown {
            return self.clone();
        }
        sql_to_canonical(&canonical_to_sql(self, dialect), dialect)
    }

    /// Whether the category is numeric.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self.category,
            TypeCategory::Integer | TypeCategory::Float | TypeCategory::Double | TypeCategory::Decimal
        )
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            TypeCategory::Integer => f.write_str(match self.size.unwrap_or(IntegerSize::Regular) {
                IntegerSize::Tiny => "tinyint",
                IntegerSize::Small => "smallint",
                IntegerSize::Medium => "mediumint",
                IntegerSize::Regular => "int",
                IntegerSize::Big => "bigint",
            })?,
            TypeCategory::Float => f.write_str("float")?,
            TypeCategory::Double => f.write_str("double")?,
            TypeCategory::Decimal => match (self.precision, self.scale) {
                (Some(p), Some(s)) => write!(f, "decimal({p},{s})")?,
                (Some(p), None) => write!(f, "decimal({p})")?,
                _ => f.write_str("decimal")?,
            },
            TypeCategory::String => match self.length {
                Some(len) => write!(f, "varchar({len})")?,
                None => f.write_str("varchar")?,
            },
            TypeCategory::Text => f.write_str("text")?,
            TypeCategory::Boolean => f.write_str("boolean")?,
            TypeCategory::Date => f.write_str("date")?,
            TypeCategory::Time => f.write_str(if self.with_timezone { "timetz" } else { "time" })?,
            TypeCategory::Timestamp => f.write_str(if self.with_timezone { "timestamptz" } else { "timestamp" })?,
            TypeCategory::Json => f.write_str("json")?,
            TypeCategory::Uuid => f.write_str("uuid")?,
            TypeCategory::Blob => f.write_str("blob")?,
            TypeCategory::Vector => match self.length {
                Some(dim) => write!(f, "vector({dim})")?,
                None => f.write_str("vector")?,
            },
            TypeCategory::Unknown => f.write_str(self.raw.as_deref().unwrap_or("unknown"))?,
        }
        if self.unsigned {
            f.write_str(" unsigned")?;
        }
        Ok(())
    }
}

/// Canonical type of an entity field.
///
/// An explicit `column_type` wins over the field type; explicit length,
/// precision and scale override whatever the spelling implied.
#[must_use]
pub fn field_to_canonical(field: &FieldMeta) -> CanonicalType {
    let mut ty = if let Some(column_type) = &field.column_type {
        CanonicalType::parse(column_type)
    } else {
        match field.field_type {
            FieldType::String => CanonicalType::varchar(field.length.unwrap_or(255)),
            FieldType::Text => CanonicalType::text(),
            FieldType::SmallInt => CanonicalType::sized_integer(IntegerSize::Small),
            FieldType::Integer => CanonicalType::integer(),
            FieldType::BigInt => CanonicalType::big_integer(),
            FieldType::Float => CanonicalType::of(TypeCategory::Float),
            FieldType::Double => CanonicalType::of(TypeCategory::Double),
            FieldType::Decimal => CanonicalType::of(TypeCategory::Decimal),
            FieldType::Boolean => CanonicalType::boolean(),
            FieldType::Date => CanonicalType::of(TypeCategory::Date),
            FieldType::Time => CanonicalType::of(TypeCategory::Time),
            FieldType::Timestamp => CanonicalType::timestamp(),
            FieldType::Json => CanonicalType::of(TypeCategory::Json),
            FieldType::Uuid => CanonicalType::of(TypeCategory::Uuid),
            FieldType::Blob => CanonicalType::of(TypeCategory::Blob),
            FieldType::Vector => CanonicalType::of(TypeCategory::Vector),
        }
    };

    if let Some(length) = field.length {
        if matches!(ty.category, TypeCategory::String | TypeCategory::Vector) {
            ty.length = Some(length);
        }
    }
    if ty.category == TypeCategory::Decimal {
        if field.precision.is_some() {
            ty.precision = field.precision;
        }
        if field.scale.is_some() {
            ty.scale = field.scale;
        }
    }
    if field.unsigned && ty.is_numeric() {
        ty.unsigned = true;
    }
    ty
}

/// Renders a canonical type in the spelling of `dialect`.
#[must_use]
pub fn canonical_to_sql(ty: &CanonicalType, dialect: DialectKind) -> String {
    let mysql_like = matches!(dialect, DialectKind::MySql | DialectKind::MariaDb);
    let size = ty.size.unwrap_or(IntegerSize::Regular);

    let base = match ty.category {
        TypeCategory::Integer => match (dialect, size) {
            (DialectKind::Postgres, IntegerSize::Tiny | IntegerSize::Small) => "SMALLINT".to_string(),
            (DialectKind::Postgres, IntegerSize::Medium | IntegerSize::Regular) => "INTEGER".to_string(),
            (_, IntegerSize::Big) => "BIGINT".to_string(),
            (_, IntegerSize::Tiny) => "TINYINT".to_string(),
            (_, IntegerSize::Small) => "SMALLINT".to_string(),
            (_, IntegerSize::Medium) => "MEDIUMINT".to_string(),
            (DialectKind::Sqlite, IntegerSize::Regular) => "INTEGER".to_string(),
            (_, IntegerSize::Regular) => "INT".to_string(),
        },
        TypeCategory::Float => match dialect {
            DialectKind::Postgres | DialectKind::Sqlite => "REAL".to_string(),
            _ => "FLOAT".to_string(),
        },
        TypeCategory::Double => match dialect {
            DialectKind::Postgres => "DOUBLE PRECISION".to_string(),
            _ => "DOUBLE".to_string(),
        },
        TypeCategory::Decimal => match (ty.precision, ty.scale) {
            (Some(p), Some(s)) => format!("DECIMAL({p},{s})"),
            (Some(p), None) => format!("DECIMAL({p})"),
            _ => "DECIMAL".to_string(),
        },
        TypeCategory::String => format!("VARCHAR({})", ty.length.unwrap_or(255)),
        TypeCategory::Text => "TEXT".to_string(),
        TypeCategory::Boolean if mysql_like => "TINYINT(1)".to_string(),
        TypeCategory::Boolean => "BOOLEAN".to_string(),
        TypeCategory::Date => "DATE".to_string(),
        TypeCategory::Time if ty.with_timezone && dialect == DialectKind::Postgres => "TIMETZ".to_string(),
        TypeCategory::Time => "TIME".to_string(),
        TypeCategory::Timestamp if ty.with_timezone && !mysql_like => "TIMESTAMPTZ".to_string(),
        TypeCategory::Timestamp => "TIMESTAMP".to_string(),
        TypeCategory::Json if dialect == DialectKind::Postgres => "JSONB".to_string(),
        TypeCategory::Json => "JSON".to_string(),
        TypeCategory::Uuid if mysql_like => "CHAR(36)".to_string(),
        TypeCategory::Uuid => "UUID".to_string(),
        TypeCategory::Blob if dialect == DialectKind::Postgres => "BYTEA".to_string(),
        TypeCategory::Blob => "BLOB".to_string(),
        TypeCategory::Vector if mysql_like => "JSON".to_string(),
        TypeCategory::Vector => match ty.length {
            Some(dim) => format!("VECTOR({dim})"),
            None => "VECTOR".to_string(),
        },
        TypeCategory::Unknown => ty.raw.clone().unwrap_or_else(|| "TEXT".to_string()),
    };

    if ty.unsigned && mysql_like && ty.is_numeric() {
        format!("{base} UNSIGNED")
    } else {
        base
    }
}

/// Parses a SQL type as reported by `dialect`.
///
/// MySQL and MariaDB store UUIDs as `CHAR(36)`, which is mapped back.
#[must_use]
pub fn sql_to_canonical(sql: &str, dialect: DialectKind) -> CanonicalType {
    let ty = CanonicalType::parse(sql);
    if matches!(dialect, DialectKind::MySql | DialectKind::MariaDb)
        && ty.category == TypeCategory::String
        && ty.length == Some(36)
        && sql.trim().to_ascii_lowercase().starts_with("char(")
    {
        return CanonicalType::of(TypeCategory::Uuid);
    }
    ty
}
