//! # querykit-core
//!
//! The compilation core of a database-access toolkit.
//!
//! This crate provides:
//! - A dialect-agnostic query model (`$where`, `$select`, `$sort`, paging)
//! - Query compilers for PostgreSQL, MySQL, MariaDB and SQLite
//! - Relation join planning with deferred to-many loading
//! - An in-memory schema graph, built from entity metadata or introspected
//! - Schema diffing with canonical type comparison, and DDL generation
//!
//! Nothing here performs I/O; see `querykit-migrate` for the async side.
//!
//! ## Compiling a query
//!
//! ```rust
//! use querykit_core::prelude::*;
//!
//! let registry = EntityRegistry::new().with(
//!     EntityMeta::new("User")
//!         .field("id", FieldMeta::new(FieldType::Integer))
//!         .field("name", FieldMeta::new(FieldType::String)),
//! );
//! let user = registry.get("User").unwrap();
//! let query = Query::new()
//!     .select(Select::fields(["id"]))
//!     .filter(WhereMap::new().field("id", 123).field("name", FieldCondition::op(FieldOperator::Ne, "abc")));
//!
//! let sql = DialectKind::MySql
//!     .dialect()
//!     .find(user, &query, &FindOptions::default())
//!     .unwrap();
//! assert_eq!(sql, "SELECT `id` FROM `User` WHERE `id` = 123 AND `name` <> 'abc'");
//! ```

pub mod dialect;
pub mod entity;
pub mod error;
pub mod query;
pub mod schema;
pub mod value;

pub use error::{QueryError, Result, SchemaError, SchemaResult};
pub use value::{ToValue, Value};

/// Commonly used types.
pub mod prelude {
    pub use crate::dialect::{
        Clause, DialectKind, FindOptions, Record, SqlDialect, WhereOptions, WriteOptions,
    };
    pub use crate::entity::{
        Cardinality, EntityMeta, EntityRef, EntityRegistry, FieldMeta, FieldReference, FieldType,
        IndexMeta, Reference, RelationMeta,
    };
    pub use crate::query::{
        raw, FieldCondition, FieldOperator, Query, Raw, RelationQuery, Select, Sort, Where,
        WhereItem, WhereMap,
    };
    pub use crate::schema::{
        SchemaAst, SchemaAstBuilder, SchemaAstDiffer, SchemaGenerator, DiffOptions,
    };
    pub use crate::value::Value;
}
