//! Schema model, diffing and DDL generation.
//!
//! The desired schema is built from entity metadata with
//! [`SchemaAstBuilder`], the current one is introspected from a live
//! database. [`SchemaAstDiffer`] compares the two and [`SchemaGenerator`]
//! renders the resulting [`SchemaDiff`]s as DDL for one dialect.

mod ast;
mod builder;
mod canonical;
mod differ;
mod document;
mod generator;

pub use ast::{
    ColumnNode, DefaultValue, ForeignKeyAction, IndexNode, IndexSource, IndexType, RelationEndpoint,
    RelationshipNode, SchemaAst, SyncStatus, TableNode,
};
pub use builder::SchemaAstBuilder;
pub use canonical::{
    canonical_to_sql, field_to_canonical, sql_to_canonical, CanonicalType, IntegerSize, TypeCategory,
};
pub use differ::{
    ColumnChange, ColumnDiff, ColumnDiffKind, DiffKind, DiffOptions, IndexDiff, RelationshipDiff,
    SchemaAstDiffer, SchemaDiff, SchemaDiffKind, SchemaDiffResult, TableDefinition,
};
pub use document::{DocumentCommand, DocumentSchemaGenerator};
pub use generator::{DialectFeatures, SchemaGenerator, SerialPrimaryKey, MANUAL_REVERSAL_MARKER};
