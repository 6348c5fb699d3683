//! Entity metadata to schema, diff and DDL.

mod common;

use common::registry;
use querykit_core::dialect::DialectKind;
use querykit_core::entity::{EntityMeta, EntityRegistry, FieldMeta, FieldType, SnakeCaseNaming};
use querykit_core::schema::{
    ColumnDiffKind, DocumentSchemaGenerator, SchemaAst, SchemaAstBuilder, SchemaAstDiffer, SchemaDiffKind,
    SchemaGenerator,
};

fn customer(with_email: bool) -> EntityRegistry {
    let mut entity = EntityMeta::new("Customer")
        .field("id", FieldMeta::new(FieldType::Integer).not_null().auto_increment())
        .field("name", FieldMeta::new(FieldType::String).length(100).not_null());
    if with_email {
        entity = entity.field("email", FieldMeta::new(FieldType::String));
    }
    EntityRegistry::new().with(entity)
}

fn build(registry: &EntityRegistry) -> SchemaAst {
    SchemaAstBuilder::from_entities(registry).unwrap()
}

#[test]
fn tables_are_sorted_by_dependency() {
    let schema = build(&registry());
    let order: Vec<&str> = schema.sorted_tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(order.len(), 9);
    let position = |name: &str| order.iter().position(|t| *t == name).unwrap();
    for relationship in schema.relationships.values() {
        if relationship.from.table != relationship.to.table {
            assert!(
                position(&relationship.to.table) < position(&relationship.from.table),
                "{} must come before {}",
                relationship.to.table,
                relationship.from.table
            );
        }
    }
}

#[test]
fn diff_against_itself_is_empty() {
    let schema = build(&registry());
    let result = SchemaAstDiffer::default().diff(&schema, &schema);
    assert!(!result.has_differences());
    assert!(result.schema_diffs().is_empty());
}

#[test]
fn fresh_database_creates_every_table() {
    let schema = build(&registry());
    let result = SchemaAstDiffer::default().diff(&schema, &SchemaAst::new());
    assert_eq!(result.tables_to_create.len(), 9);
    assert!(!result.has_breaking_changes());

    let diffs = result.schema_diffs();
    assert!(diffs.iter().all(|d| d.kind == SchemaDiffKind::Create));
    let item = diffs.iter().find(|d| d.table_name == "Item").unwrap();
    assert_eq!(
        SchemaGenerator::new(DialectKind::Sqlite).generate(item).unwrap(),
        [
            "CREATE TABLE \"Item\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"name\" VARCHAR(150) NOT NULL, \
             \"description\" TEXT, \"code\" VARCHAR(50) UNIQUE, \"buyPrice\" DECIMAL(8,2), \"salePrice\" DECIMAL(8,2), \
             \"taxId\" INTEGER, \"measureUnitId\" INTEGER, \"creatorId\" INTEGER, \
             CONSTRAINT \"fk_Item_taxId\" FOREIGN KEY (\"taxId\") REFERENCES \"Tax\" (\"id\") ON DELETE NO ACTION ON UPDATE NO ACTION, \
             CONSTRAINT \"fk_Item_measureUnitId\" FOREIGN KEY (\"measureUnitId\") REFERENCES \"MeasureUnit\" (\"id\") ON DELETE NO ACTION ON UPDATE NO ACTION, \
             CONSTRAINT \"fk_Item_creatorId\" FOREIGN KEY (\"creatorId\") REFERENCES \"User\" (\"id\") ON DELETE NO ACTION ON UPDATE NO ACTION)",
            "CREATE INDEX \"idx_Item_name_code\" ON \"Item\" (\"name\", \"code\")",
        ]
    );
}

#[test]
fn uuid_primary_key_in_postgres() {
    let schema = build(&registry());
    let result = SchemaAstDiffer::default().diff(&schema, &SchemaAst::new());
    let diffs = result.schema_diffs();
    let category = diffs.iter().find(|d| d.table_name == "TaxCategory").unwrap();
    let generator = SchemaGenerator::new(DialectKind::Postgres);
    assert_eq!(
        generator.generate(category).unwrap(),
        ["CREATE TABLE \"TaxCategory\" (\"name\" VARCHAR(100) NOT NULL, \"createdAt\" BIGINT, \"pk\" UUID PRIMARY KEY)"]
    );
    assert_eq!(generator.generate_down(category).unwrap(), ["DROP TABLE IF EXISTS \"TaxCategory\""]);
}

#[test]
fn added_column_is_not_breaking() {
    let desired = build(&customer(true));
    let current = build(&customer(false));
    let result = SchemaAstDiffer::default().diff(&desired, &current);

    assert_eq!(result.column_diffs.len(), 1);
    assert_eq!(result.column_diffs[0].column, "email");
    assert_eq!(result.column_diffs[0].kind, ColumnDiffKind::Add);
    assert!(!result.has_breaking_changes());

    let diffs = result.schema_diffs();
    assert_eq!(
        SchemaGenerator::new(DialectKind::MySql).generate(&diffs[0]).unwrap(),
        ["ALTER TABLE `Customer` ADD COLUMN `email` VARCHAR(255)"]
    );
    assert_eq!(
        SchemaGenerator::new(DialectKind::MySql).generate_down(&diffs[0]).unwrap(),
        ["ALTER TABLE `Customer` DROP COLUMN `email`"]
    );
}

#[test]
fn missing_column_is_breaking() {
    let desired = build(&customer(false));
    let current = build(&customer(true));
    let result = SchemaAstDiffer::default().diff(&desired, &current);

    assert_eq!(result.column_diffs.len(), 1);
    assert_eq!(result.column_diffs[0].column, "email");
    assert_eq!(result.column_diffs[0].kind, ColumnDiffKind::Drop);
    assert!(result.has_breaking_changes());

    assert!(result
        .schema_diffs()
        .into_iter()
        .all(|d| d.without_destructive().is_empty()));
}

#[test]
fn snake_case_naming_flows_into_ddl() {
    let registry = registry().with_naming(SnakeCaseNaming);
    let schema = build(&registry);
    let unit = schema.table("measure_unit").unwrap();
    assert!(unit.get_column("category_id").is_some());
    assert!(schema.relationships.contains_key("fk_measure_unit_category_id"));
    // explicit names are kept
    assert!(schema.table("user_profile").unwrap().get_column("image").is_some());
}

#[test]
fn document_store_commands() {
    let schema = build(&customer(false));
    let result = SchemaAstDiffer::default().diff(&schema, &SchemaAst::new());
    let statements = DocumentSchemaGenerator::new().generate(&result.schema_diffs()[0]);
    assert_eq!(statements, [r#"{"action":"createCollection","collection":"Customer"}"#]);
}
