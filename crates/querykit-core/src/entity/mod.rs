//! Entity metadata registry.
//!
//! Entities are described once, at start-up, with plain descriptor records:
//! each [`EntityMeta`] lists its fields and relations, and an
//! [`EntityRegistry`] maps entity names to descriptors. Relations point to
//! other entities by name, so cyclic and self-referencing relations are just
//! repeated lookups.
//!
//! Descriptors can be built in code or deserialized from JSON. Callbacks
//! (value generators, computed fields) are code-only.

mod naming;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use naming::{DefaultNaming, NamingStrategy, SnakeCaseNaming};

use crate::error::{QueryError, Result};
use crate::query::Raw;
use crate::schema::{DefaultValue, ForeignKeyAction, IndexType};
use crate::value::Value;

/// Logical type of a field, used when no explicit column type is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Text,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Boolean,
    Date,
    Time,
    Timestamp,
    Json,
    Uuid,
    Blob,
    Vector,
}

/// Generates a value when a record is inserted, updated or soft-deleted.
#[derive(Clone)]
pub struct ValueFn(Arc<dyn Fn() -> Value + Send + Sync>);

impl ValueFn {
    /// Wraps a generator.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Produces a value.
    #[must_use]
    pub fn call(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for ValueFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueFn")
    }
}

/// A foreign-key reference declared on a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    /// Referenced entity name.
    pub entity: String,
    /// Referenced field key; the entity's id when absent.
    #[serde(default)]
    pub field: Option<String>,
    /// ON DELETE action.
    #[serde(default)]
    pub on_delete: Option<ForeignKeyAction>,
    /// ON UPDATE action.
    #[serde(default)]
    pub on_update: Option<ForeignKeyAction>,
}

impl FieldReference {
    /// References the id of `entity`.
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            field: None,
            on_delete: None,
            on_update: None,
        }
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub const fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub const fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }
}

const fn nullable_by_default() -> bool {
    true
}

/// Field descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    /// Explicit column name.
    #[serde(default)]
    pub column: Option<String>,
    /// Logical type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Explicit SQL column type, e.g. `varchar(36)`.
    #[serde(default)]
    pub column_type: Option<String>,
    /// Character length or vector dimensions.
    #[serde(default)]
    pub length: Option<u32>,
    /// Decimal precision.
    #[serde(default)]
    pub precision: Option<u32>,
    /// Decimal scale.
    #[serde(default)]
    pub scale: Option<u32>,
    /// Unsigned numeric column.
    #[serde(default)]
    pub unsigned: bool,
    /// Whether NULL is allowed. Id fields are never nullable.
    #[serde(default = "nullable_by_default")]
    pub nullable: bool,
    /// Single-column UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
    /// Single-column secondary index.
    #[serde(default)]
    pub index: bool,
    /// Column default in DDL.
    #[serde(default)]
    pub default: Option<DefaultValue>,
    /// Column comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Generated by the database.
    #[serde(default)]
    pub auto_increment: bool,
    /// Foreign key target.
    #[serde(default)]
    pub reference: Option<FieldReference>,
    /// Computed field: a raw expression rendered instead of a column.
    #[serde(skip)]
    pub virtual_expr: Option<Raw>,
    /// Value filled in on insert when the payload lacks the field.
    #[serde(skip)]
    pub on_insert: Option<ValueFn>,
    /// Value filled in on update when the payload lacks the field.
    #[serde(skip)]
    pub on_update: Option<ValueFn>,
    /// Value written by a soft delete.
    #[serde(skip)]
    pub on_delete: Option<ValueFn>,
}

impl FieldMeta {
    /// Creates a nullable field of the given type.
    #[must_use]
    pub const fn new(field_type: FieldType) -> Self {
        Self {
            column: None,
            field_type,
            column_type: None,
            length: None,
            precision: None,
            scale: None,
            unsigned: false,
            nullable: true,
            unique: false,
            index: false,
            default: None,
            comment: None,
            auto_increment: false,
            reference: None,
            virtual_expr: None,
            on_insert: None,
            on_update: None,
            on_delete: None,
        }
    }

    /// Sets the column name.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = Some(name.into());
        self
    }

    /// Sets an explicit SQL column type.
    #[must_use]
    pub fn column_type(mut self, sql: impl Into<String>) -> Self {
        self.column_type = Some(sql.into());
        self
    }

    /// Sets the length.
    #[must_use]
    pub const fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets decimal precision and scale.
    #[must_use]
    pub const fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Marks the field unsigned.
    #[must_use]
    pub const fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Marks the field NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the field unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Adds a single-column index.
    #[must_use]
    pub const fn indexed(mut self) -> Self {
        self.index = true;
        self
    }

    /// Sets the DDL default.
    #[must_use]
    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Marks the field auto-increment.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Declares a foreign key.
    #[must_use]
    pub fn references(mut self, reference: FieldReference) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Turns the field into a computed one.
    #[must_use]
    pub fn computed(mut self, expr: Raw) -> Self {
        self.virtual_expr = Some(expr);
        self
    }

    /// Sets the insert-time generator.
    #[must_use]
    pub fn on_insert<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.on_insert = Some(ValueFn::new(f));
        self
    }

    /// Sets the update-time generator.
    #[must_use]
    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.on_update = Some(ValueFn::new(f));
        self
    }

    /// Sets the soft-delete generator.
    #[must_use]
    pub fn on_delete<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.on_delete = Some(ValueFn::new(f));
        self
    }

    /// Whether the field maps to a stored column.
    #[must_use]
    pub const fn is_persistable(&self) -> bool {
        self.virtual_expr.is_none()
    }
}

/// Relation cardinality, seen from the declaring entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Many-to-one.
    #[serde(rename = "m1")]
    ManyToOne,
    /// One-to-one.
    #[serde(rename = "11")]
    OneToOne,
    /// One-to-many.
    #[serde(rename = "1m")]
    OneToMany,
    /// Many-to-many.
    #[serde(rename = "mm")]
    ManyToMany,
}

impl Cardinality {
    /// Whether at most one related record exists.
    #[must_use]
    pub const fn is_to_one(self) -> bool {
        matches!(self, Self::ManyToOne | Self::OneToOne)
    }
}

/// A local/foreign field key pair of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Field key on the local side.
    pub local: String,
    /// Field key on the foreign side.
    pub foreign: String,
}

impl Reference {
    /// Creates a reference pair.
    #[must_use]
    pub fn new(local: impl Into<String>, foreign: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            foreign: foreign.into(),
        }
    }
}

/// Relation descriptor.
///
/// For to-one relations `local` keys belong to the declaring entity and
/// `foreign` keys to the related one. One-to-many relations pair the
/// declaring entity's key (`local`) with the related entity's foreign key
/// (`foreign`). Many-to-many relations go through a junction entity: the
/// first reference maps the junction column pointing back to the declaring
/// entity, the second the one pointing at the related entity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationMeta {
    /// Related entity name.
    pub entity: String,
    /// Cardinality.
    pub cardinality: Cardinality,
    /// Key pairs.
    #[serde(default)]
    pub references: Vec<Reference>,
    /// Junction entity of a many-to-many relation.
    #[serde(default)]
    pub through: Option<String>,
    /// Whether related records are deleted with this one. Turns the foreign
    /// keys pointing back at this entity into `ON DELETE CASCADE`.
    #[serde(default)]
    pub cascade: bool,
}

impl RelationMeta {
    fn new(entity: impl Into<String>, cardinality: Cardinality, references: Vec<Reference>) -> Self {
        Self {
            entity: entity.into(),
            cardinality,
            references,
            through: None,
            cascade: false,
        }
    }

    /// Many-to-one relation joined on `local = related.foreign`.
    #[must_use]
    pub fn many_to_one(entity: impl Into<String>, local: impl Into<String>, foreign: impl Into<String>) -> Self {
        Self::new(entity, Cardinality::ManyToOne, vec![Reference::new(local, foreign)])
    }

    /// One-to-one relation joined on `local = related.foreign`.
    #[must_use]
    pub fn one_to_one(entity: impl Into<String>, local: impl Into<String>, foreign: impl Into<String>) -> Self {
        Self::new(entity, Cardinality::OneToOne, vec![Reference::new(local, foreign)])
    }

    /// One-to-many relation: `related.foreign` points back at `local`.
    #[must_use]
    pub fn one_to_many(entity: impl Into<String>, local: impl Into<String>, foreign: impl Into<String>) -> Self {
        Self::new(entity, Cardinality::OneToMany, vec![Reference::new(local, foreign)])
    }

    /// Many-to-many relation through a junction entity.
    #[must_use]
    pub fn many_to_many(
        entity: impl Into<String>,
        through: impl Into<String>,
        owner: Reference,
        target: Reference,
    ) -> Self {
        let mut rel = Self::new(entity, Cardinality::ManyToMany, vec![owner, target]);
        rel.through = Some(through.into());
        rel
    }

    /// Deletes related records together with this one.
    #[must_use]
    pub const fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }
}

/// Composite index declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMeta {
    /// Index name; generated when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Field keys.
    pub fields: Vec<String>,
    /// UNIQUE index.
    #[serde(default)]
    pub unique: bool,
    /// Index method.
    #[serde(default, rename = "type")]
    pub index_type: Option<IndexType>,
}

fn default_id() -> String {
    "id".to_string()
}

/// Entity descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    /// Entity name.
    pub name: String,
    /// Explicit table name.
    #[serde(default)]
    pub table: Option<String>,
    /// Key of the primary-key field.
    #[serde(default = "default_id")]
    pub id: String,
    /// Fields in declaration order.
    pub fields: IndexMap<String, FieldMeta>,
    /// Relations by key.
    #[serde(default)]
    pub relations: IndexMap<String, RelationMeta>,
    /// Key of the soft-delete field.
    #[serde(default)]
    pub soft_delete: Option<String>,
    /// Composite indexes.
    #[serde(default)]
    pub indexes: Vec<IndexMeta>,
    /// Table comment.
    #[serde(default)]
    pub comment: Option<String>,
}

impl EntityMeta {
    /// Creates an entity with an `id` primary key and no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            id: default_id(),
            fields: IndexMap::new(),
            relations: IndexMap::new(),
            soft_delete: None,
            indexes: Vec::new(),
            comment: None,
        }
    }

    /// Sets the table name.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Sets the id field key.
    #[must_use]
    pub fn with_id(mut self, key: impl Into<String>) -> Self {
        self.id = key.into();
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, field: FieldMeta) -> Self {
        self.fields.insert(key.into(), field);
        self
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, key: impl Into<String>, relation: RelationMeta) -> Self {
        self.relations.insert(key.into(), relation);
        self
    }

    /// Enables soft delete through `key`.
    #[must_use]
    pub fn soft_delete(mut self, key: impl Into<String>) -> Self {
        self.soft_delete = Some(key.into());
        self
    }

    /// Adds a composite index.
    #[must_use]
    pub fn index(mut self, index: IndexMeta) -> Self {
        self.indexes.push(index);
        self
    }

    /// Whether `key` names a stored column.
    #[must_use]
    pub fn is_persistable(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(FieldMeta::is_persistable)
    }
}

/// Registry of entity descriptors.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: IndexMap<String, EntityMeta>,
    naming: Arc<dyn NamingStrategy>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self {
            entities: IndexMap::new(),
            naming: Arc::new(DefaultNaming),
        }
    }
}

impl EntityRegistry {
    /// Creates an empty registry using [`DefaultNaming`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the naming strategy.
    #[must_use]
    pub fn with_naming(mut self, naming: impl NamingStrategy + 'static) -> Self {
        self.naming = Arc::new(naming);
        self
    }

    /// Adds an entity.
    #[must_use]
    pub fn with(mut self, entity: EntityMeta) -> Self {
        self.register(entity);
        self
    }

    /// Adds (or replaces) an entity.
    pub fn register(&mut self, entity: EntityMeta) {
        self.entities.insert(entity.name.clone(), entity);
    }

    /// Looks up an entity by name.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownEntity`] when no entity has that name.
    pub fn get(&self, name: &str) -> Result<EntityRef<'_>> {
        self.entities
            .get(name)
            .map(|meta| EntityRef { registry: self, meta })
            .ok_or_else(|| QueryError::UnknownEntity(name.to_string()))
    }

    /// Iterates entities in registration order.
    pub fn iter(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.entities.values().map(move |meta| EntityRef { registry: self, meta })
    }

    /// The naming strategy.
    #[must_use]
    pub fn naming(&self) -> &dyn NamingStrategy {
        self.naming.as_ref()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl FromIterator<EntityMeta> for EntityRegistry {
    fn from_iter<T: IntoIterator<Item = EntityMeta>>(iter: T) -> Self {
        let mut registry = Self::new();
        for entity in iter {
            registry.register(entity);
        }
        registry
    }
}

/// An entity descriptor bound to its registry.
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    registry: &'a EntityRegistry,
    meta: &'a EntityMeta,
}

impl<'a> EntityRef<'a> {
    /// The descriptor.
    #[must_use]
    pub const fn meta(&self) -> &'a EntityMeta {
        self.meta
    }

    /// The registry the descriptor belongs to.
    #[must_use]
    pub const fn registry(&self) -> &'a EntityRegistry {
        self.registry
    }

    /// Resolved table name.
    #[must_use]
    pub fn table_name(&self) -> String {
        self.meta
            .table
            .clone()
            .unwrap_or_else(|| self.registry.naming.table_name(&self.meta.name))
    }

    /// Resolved column name of a field key. Keys that are not fields are
    /// returned unchanged.
    #[must_use]
    pub fn column_name(&self, key: &str) -> String {
        match self.meta.fields.get(key) {
            Some(field) => field
                .column
                .clone()
                .unwrap_or_else(|| self.registry.naming.column_name(key)),
            None => key.to_string(),
        }
    }

    /// Resolved column name of the id field.
    #[must_use]
    pub fn id_column(&self) -> String {
        self.column_name(&self.meta.id)
    }

    /// Looks up a relation.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownRelation`] when the key is not a relation.
    pub fn relation(&self, key: &str) -> Result<&'a RelationMeta> {
        self.meta.relations.get(key).ok_or_else(|| QueryError::UnknownRelation {
            entity: self.meta.name.clone(),
            relation: key.to_string(),
        })
    }

    /// The entity on the other side of a relation.
    ///
    /// # Errors
    ///
    /// Fails when the relation or its target entity is unknown.
    pub fn related(&self, key: &str) -> Result<EntityRef<'a>> {
        let relation = self.relation(key)?;
        self.registry.get(&relation.entity)
    }
}

impl Deref for EntityRef<'_> {
    type Target = EntityMeta;

    fn deref(&self) -> &EntityMeta {
        self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> EntityRegistry {
        EntityRegistry::new()
            .with(
                EntityMeta::new("Category")
                    .field("id", FieldMeta::new(FieldType::Integer).auto_increment())
                    .field("parentId", FieldMeta::new(FieldType::Integer).references(FieldReference::new("Category")))
                    .relation("parent", RelationMeta::many_to_one("Category", "parentId", "id")),
            )
            .with(
                EntityMeta::new("Item")
                    .table("items")
                    .field("id", FieldMeta::new(FieldType::Integer))
                    .field("name", FieldMeta::new(FieldType::String).column("item_name")),
            )
    }

    #[test]
    fn test_self_reference_resolves_by_name() {
        let registry = registry();
        let category = registry.get("Category").unwrap();
        let parent = category.related("parent").unwrap();
        assert_eq!(parent.name, "Category");
        assert!(category.related("children").is_err());
    }

    #[test]
    fn test_name_resolution() {
        let registry = registry();
        let item = registry.get("Item").unwrap();
        assert_eq!(item.table_name(), "items");
        assert_eq!(item.column_name("name"), "item_name");
        assert_eq!(item.column_name("unknown"), "unknown");

        let snake = registry.with_naming(SnakeCaseNaming);
        let category = snake.get("Category").unwrap();
        assert_eq!(category.table_name(), "category");
        assert_eq!(category.column_name("parentId"), "parent_id");
    }

    #[test]
    fn test_unknown_entity() {
        assert_eq!(
            registry().get("Nope").unwrap_err(),
            QueryError::UnknownEntity("Nope".into())
        );
    }

    #[test]
    fn test_deserialize_entity() {
        let entity: EntityMeta = serde_json::from_value(serde_json::json!({
            "name": "User",
            "fields": {
                "id": { "type": "integer", "autoIncrement": true },
                "email": { "type": "string", "length": 120, "unique": true, "nullable": false },
                "companyId": { "type": "integer", "reference": { "entity": "Company", "onDelete": "CASCADE" } }
            },
            "relations": {
                "company": { "entity": "Company", "cardinality": "m1", "references": [{ "local": "companyId", "foreign": "id" }] }
            },
            "softDelete": "deletedAt"
        }))
        .unwrap();

        assert_eq!(entity.id, "id");
        assert!(entity.fields["id"].auto_increment);
        assert!(!entity.fields["email"].nullable);
        assert_eq!(
            entity.fields["companyId"].reference.as_ref().and_then(|r| r.on_delete),
            Some(ForeignKeyAction::Cascade)
        );
        assert_eq!(entity.relations["company"].cardinality, Cardinality::ManyToOne);
    }
}
