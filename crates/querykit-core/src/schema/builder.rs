//! Desired schema from entity metadata.

use super::ast::{ColumnNode, ForeignKeyAction, IndexNode, RelationEndpoint, RelationshipNode, SchemaAst, TableNode};
use super::canonical::field_to_canonical;
use crate::entity::{Cardinality, EntityRef, EntityRegistry, NamingStrategy};
use crate::error::SchemaResult;

/// Builds a [`SchemaAst`] from an [`EntityRegistry`].
///
/// Names are resolved through the registry's naming strategy unless another
/// one is supplied with [`SchemaAstBuilder::with_naming`]. Explicit table
/// and column names always win.
#[derive(Debug, Clone, Copy)]
pub struct SchemaAstBuilder<'a> {
    registry: &'a EntityRegistry,
    naming: Option<&'a dyn NamingStrategy>,
}

impl<'a> SchemaAstBuilder<'a> {
    /// Creates a builder over `registry`.
    #[must_use]
    pub const fn new(registry: &'a EntityRegistry) -> Self {
        Self { registry, naming: None }
    }

    /// Overrides the naming strategy.
    #[must_use]
    pub const fn with_naming(mut self, naming: &'a dyn NamingStrategy) -> Self {
        self.naming = Some(naming);
        self
    }

    /// Shorthand for `SchemaAstBuilder::new(registry).build()`.
    ///
    /// # Errors
    ///
    /// See [`SchemaAstBuilder::build`].
    pub fn from_entities(registry: &'a EntityRegistry) -> SchemaResult<SchemaAst> {
        Self::new(registry).build()
    }

    fn naming(&self) -> &dyn NamingStrategy {
        self.naming.unwrap_or_else(|| self.registry.naming())
    }

    fn table_name(&self, entity: EntityRef<'_>) -> String {
        entity
            .table
            .clone()
            .unwrap_or_else(|| self.naming().table_name(&entity.name))
    }

    fn column_name(&self, entity: EntityRef<'_>, key: &str) -> String {
        match entity.fields.get(key) {
            Some(field) => field
                .column
                .clone()
                .unwrap_or_else(|| self.naming().column_name(key)),
            None => self.naming().column_name(key),
        }
    }

    /// Builds one table per entity, then the foreign key relationships
    /// declared by field references and owning to-one relations.
    ///
    /// Foreign keys pointing back at an entity through a `cascade`
    /// relation delete with it (`ON DELETE CASCADE`) unless their reference
    /// sets another action.
    ///
    /// # Errors
    ///
    /// Fails when a reference names an unknown entity.
    pub fn build(&self) -> SchemaResult<SchemaAst> {
        let mut schema = SchemaAst::new();

        for entity in self.registry.iter() {
            schema.add_table(self.build_table(entity));
        }

        for entity in self.registry.iter() {
            for relationship in self.build_relationships(entity)? {
                if !schema.relationships.contains_key(&relationship.name) {
                    schema.add_relationship(relationship)?;
                }
            }
        }

        for entity in self.registry.iter() {
            for name in self.cascaded_relationships(entity)? {
                if let Some(relationship) = schema.relationships.get_mut(&name) {
                    relationship.on_delete.get_or_insert(ForeignKeyAction::Cascade);
                }
            }
        }

        tracing::debug!(
            tables = schema.tables.len(),
            relationships = schema.relationships.len(),
            "built schema from entities"
        );
        Ok(schema)
    }

    fn build_table(&self, entity: EntityRef<'_>) -> TableNode {
        let table_name = self.table_name(entity);
        let mut table = TableNode::new(&table_name);
        table.comment.clone_from(&entity.comment);

        for (key, field) in entity.fields.iter().filter(|(_, f)| f.is_persistable()) {
            let name = self.column_name(entity, key);
            let mut column = ColumnNode::new(&name, field_to_canonical(field));
            column.nullable = field.nullable;
            if *key == entity.id {
                column = column.primary_key();
            }
            if field.auto_increment {
                column = column.auto_increment();
            }
            if field.unique && *key != entity.id {
                column = column.unique();
            }
            column.default_value.clone_from(&field.default);
            column.comment.clone_from(&field.comment);
            table.add_column(column);

            if field.index {
                table.add_index(IndexNode::new(format!("idx_{table_name}_{name}"), [name]));
            }
        }

        for index in &entity.indexes {
            let columns: Vec<String> = index.fields.iter().map(|key| self.column_name(entity, key)).collect();
            let name = index
                .name
                .clone()
                .unwrap_or_else(|| format!("idx_{table_name}_{}", columns.join("_")));
            let mut node = IndexNode::new(name, columns);
            node.unique = index.unique;
            node.index_type = index.index_type;
            table.add_index(node);
        }

        table
    }

    fn build_relationships(&self, entity: EntityRef<'_>) -> SchemaResult<Vec<RelationshipNode>> {
        let table_name = self.table_name(entity);
        let mut relationships = Vec::new();

        for (key, field) in &entity.fields {
            let Some(reference) = &field.reference else {
                continue;
            };
            let target = self.registry.get(&reference.entity)?;
            let target_key = reference.field.as_deref().unwrap_or(&target.id);
            let column = self.column_name(entity, key);
            let mut relationship = RelationshipNode::new(
                format!("fk_{table_name}_{column}"),
                RelationEndpoint::new(&table_name, [column]),
                RelationEndpoint::new(self.table_name(target), [self.column_name(target, target_key)]),
            );
            relationship.on_delete = reference.on_delete;
            relationship.on_update = reference.on_update;
            relationships.push(relationship);
        }

        for relation in entity.relations.values() {
            let owns_key = relation.cardinality.is_to_one()
                && !relation.references.is_empty()
                && relation
                    .references
                    .iter()
                    .all(|r| r.local != entity.id && entity.fields.contains_key(&r.local));
            if !owns_key {
                continue;
            }
            let target = self.registry.get(&relation.entity)?;
            let columns: Vec<String> = relation.references.iter().map(|r| self.column_name(entity, &r.local)).collect();
            let foreign: Vec<String> = relation.references.iter().map(|r| self.column_name(target, &r.foreign)).collect();
            let name = format!("fk_{table_name}_{}", columns.join("_"));
            if relationships.iter().any(|r| r.name == name) {
                continue;
            }
            let mut relationship = RelationshipNode::new(
                name,
                RelationEndpoint::new(&table_name, columns),
                RelationEndpoint::new(self.table_name(target), foreign),
            );
            relationship.kind = if relation.cardinality == Cardinality::OneToOne {
                Cardinality::OneToOne
            } else {
                Cardinality::ManyToOne
            };
            relationships.push(relationship);
        }

        Ok(relationships)
    }

    /// Names of the foreign keys held by records that cascading relations
    /// of `entity` own: the children of one-to-many and inverse one-to-one
    /// relations, and the junction rows of many-to-many relations.
    fn cascaded_relationships(&self, entity: EntityRef<'_>) -> SchemaResult<Vec<String>> {
        let mut names = Vec::new();
        for relation in entity.relations.values().filter(|r| r.cascade) {
            let (holder, keys): (EntityRef<'_>, Vec<&str>) = match (&relation.through, relation.cardinality) {
                (Some(through), Cardinality::ManyToMany) => {
                    let Some(owner) = relation.references.first() else {
                        continue;
                    };
                    (self.registry.get(through)?, vec![owner.local.as_str()])
                }
                (None, Cardinality::OneToMany) => (
                    self.registry.get(&relation.entity)?,
                    relation.references.iter().map(|r| r.foreign.as_str()).collect(),
                ),
                (None, Cardinality::OneToOne) if relation.references.iter().all(|r| r.local == entity.id) => (
                    self.registry.get(&relation.entity)?,
                    relation.references.iter().map(|r| r.foreign.as_str()).collect(),
                ),
                _ => continue,
            };
            if keys.is_empty() {
                continue;
            }
            let columns: Vec<String> = keys.iter().map(|key| self.column_name(holder, key)).collect();
            names.push(format!("fk_{}_{}", self.table_name(holder), columns.join("_")));
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{
        EntityMeta, FieldMeta, FieldReference, FieldType, IndexMeta, Reference, RelationMeta, SnakeCaseNaming,
    };
    use crate::schema::{CanonicalType, TypeCategory};

    fn registry() -> EntityRegistry {
        EntityRegistry::new()
            .with(
                EntityMeta::new("MeasureUnitCategory")
                    .field("id", FieldMeta::new(FieldType::Integer).auto_increment())
                    .field("name", FieldMeta::new(FieldType::String).not_null()),
            )
            .with(
                EntityMeta::new("MeasureUnit")
                    .field("id", FieldMeta::new(FieldType::Integer).auto_increment())
                    .field("name", FieldMeta::new(FieldType::String).length(100).indexed())
                    .field(
                        "categoryId",
                        FieldMeta::new(FieldType::Integer).references(
                            FieldReference::new("MeasureUnitCategory").on_delete(ForeignKeyAction::Cascade),
                        ),
                    )
                    .field("deletedAt", FieldMeta::new(FieldType::Timestamp))
                    .relation("category", RelationMeta::many_to_one("MeasureUnitCategory", "categoryId", "id"))
                    .index(IndexMeta {
                        name: None,
                        fields: vec!["name".into(), "categoryId".into()],
                        unique: true,
                        index_type: None,
                    }),
            )
    }

    #[test]
    fn test_builds_tables_in_declaration_order() {
        let schema = SchemaAstBuilder::from_entities(&registry()).unwrap();
        let names: Vec<&str> = schema.tables.keys().map(String::as_str).collect();
        assert_eq!(names, ["MeasureUnitCategory", "MeasureUnit"]);

        let unit = schema.table("MeasureUnit").unwrap();
        let columns: Vec<&str> = unit.columns.keys().map(String::as_str).collect();
        assert_eq!(columns, ["id", "name", "categoryId", "deletedAt"]);
        assert_eq!(unit.primary_key, ["id"]);

        let id = unit.get_column("id").unwrap();
        assert!(id.is_primary_key && id.is_auto_increment && !id.nullable);
        assert_eq!(unit.get_column("name").unwrap().column_type, CanonicalType::varchar(100));
        assert_eq!(
            unit.get_column("deletedAt").unwrap().column_type.category,
            TypeCategory::Timestamp
        );
    }

    #[test]
    fn test_builds_indexes() {
        let schema = SchemaAstBuilder::from_entities(&registry()).unwrap();
        let unit = schema.table("MeasureUnit").unwrap();
        assert_eq!(unit.indexes.len(), 2);
        assert_eq!(unit.indexes[0].name, "idx_MeasureUnit_name");
        let composite = unit.get_index("idx_MeasureUnit_name_categoryId").unwrap();
        assert!(composite.unique);
        assert_eq!(composite.columns, ["name", "categoryId"]);
    }

    #[test]
    fn test_reference_and_relation_share_one_foreign_key() {
        let schema = SchemaAstBuilder::from_entities(&registry()).unwrap();
        assert_eq!(schema.relationships.len(), 1);
        let fk = &schema.relationships["fk_MeasureUnit_categoryId"];
        assert_eq!(fk.from.table, "MeasureUnit");
        assert_eq!(fk.to.table, "MeasureUnitCategory");
        assert_eq!(fk.to.columns, ["id"]);
        assert_eq!(fk.delete_action(), ForeignKeyAction::Cascade);
        assert_eq!(schema.table("MeasureUnitCategory").unwrap().incoming, ["fk_MeasureUnit_categoryId"]);
    }

    #[test]
    fn test_cascading_relations_delete_dependent_rows() {
        let registry = EntityRegistry::new()
            .with(
                EntityMeta::new("Item")
                    .field("id", FieldMeta::new(FieldType::Integer).auto_increment())
                    .relation("notes", RelationMeta::one_to_many("Note", "id", "itemId").cascade())
                    .relation(
                        "tags",
                        RelationMeta::many_to_many(
                            "Tag",
                            "ItemTag",
                            Reference::new("itemId", "id"),
                            Reference::new("tagId", "id"),
                        )
                        .cascade(),
                    ),
            )
            .with(EntityMeta::new("Tag").field("id", FieldMeta::new(FieldType::Integer)))
            .with(
                EntityMeta::new("Note")
                    .field("id", FieldMeta::new(FieldType::Integer))
                    .field("itemId", FieldMeta::new(FieldType::Integer).references(FieldReference::new("Item"))),
            )
            .with(
                EntityMeta::new("ItemTag")
                    .field("id", FieldMeta::new(FieldType::Integer))
                    .field("itemId", FieldMeta::new(FieldType::Integer).references(FieldReference::new("Item")))
                    .field(
                        "tagId",
                        FieldMeta::new(FieldType::Integer)
                            .references(FieldReference::new("Tag").on_delete(ForeignKeyAction::Restrict)),
                    ),
            );
        let schema = SchemaAstBuilder::from_entities(&registry).unwrap();

        assert_eq!(schema.relationships["fk_Note_itemId"].on_delete, Some(ForeignKeyAction::Cascade));
        assert_eq!(schema.relationships["fk_ItemTag_itemId"].on_delete, Some(ForeignKeyAction::Cascade));
        assert_eq!(schema.relationships["fk_ItemTag_tagId"].on_delete, Some(ForeignKeyAction::Restrict));
    }

    #[test]
    fn test_custom_naming() {
        let registry = registry();
        let naming = SnakeCaseNaming;
        let schema = SchemaAstBuilder::new(&registry).with_naming(&naming).build().unwrap();
        let unit = schema.table("measure_unit").unwrap();
        assert!(unit.get_column("category_id").is_some());
        assert!(schema.relationships.contains_key("fk_measure_unit_category_id"));
    }

    #[test]
    fn test_unknown_reference_target() {
        let registry = EntityRegistry::new().with(
            EntityMeta::new("Item")
                .field("id", FieldMeta::new(FieldType::Integer))
                .field("taxId", FieldMeta::new(FieldType::Integer).references(FieldReference::new("Tax"))),
        );
        assert!(SchemaAstBuilder::from_entities(&registry).is_err());
    }
}
