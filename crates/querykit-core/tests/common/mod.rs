#![allow(dead_code)]

use querykit_core::dialect::SqlDialect;
use querykit_core::entity::{
    EntityMeta, EntityRegistry, FieldMeta, FieldReference, FieldType, IndexMeta, Reference, RelationMeta,
};
use querykit_core::query::{Query, Raw};
use querykit_core::schema::ForeignKeyAction;
use querykit_core::Value;
use serde_json::Value as Json;

pub const TAX_CATEGORY_PK: &str = "8c4a3b4e-6c8f-4f55-9a43-3f0e7c1c2d11";
pub const CREATED_AT: i64 = 1_700_000_000_000;

fn id() -> FieldMeta {
    FieldMeta::new(FieldType::Integer).not_null().auto_increment()
}

fn text(length: u32) -> FieldMeta {
    FieldMeta::new(FieldType::String).length(length)
}

fn reference(entity: &str) -> FieldMeta {
    FieldMeta::new(FieldType::Integer).references(FieldReference::new(entity))
}

pub fn user() -> EntityMeta {
    EntityMeta::new("User")
        .field("id", id())
        .field("name", text(100))
        .field("email", text(150).unique())
        .field("password", text(100))
        .field("createdAt", FieldMeta::new(FieldType::BigInt).on_insert(|| Value::Int(CREATED_AT)))
        .relation("profile", RelationMeta::one_to_one("Profile", "id", "creatorId"))
}

pub fn profile() -> EntityMeta {
    EntityMeta::new("Profile")
        .table("user_profile")
        .with_id("pk")
        .field("pk", id())
        .field("picture", text(300).column("image"))
        .field(
            "creatorId",
            FieldMeta::new(FieldType::Integer)
                .references(FieldReference::new("User").on_delete(ForeignKeyAction::Cascade)),
        )
        .relation("creator", RelationMeta::many_to_one("User", "creatorId", "id"))
}

pub fn measure_unit_category() -> EntityMeta {
    EntityMeta::new("MeasureUnitCategory")
        .field("id", id())
        .field("name", text(100).not_null())
        .field("createdAt", FieldMeta::new(FieldType::BigInt))
        .relation("measureUnits", RelationMeta::one_to_many("MeasureUnit", "id", "categoryId"))
}

pub fn measure_unit() -> EntityMeta {
    EntityMeta::new("MeasureUnit")
        .field("id", id())
        .field("name", text(100).not_null())
        .field("categoryId", reference("MeasureUnitCategory"))
        .field("deletedAt", FieldMeta::new(FieldType::BigInt))
        .soft_delete("deletedAt")
        .relation("category", RelationMeta::many_to_one("MeasureUnitCategory", "categoryId", "id"))
}

pub fn item() -> EntityMeta {
    EntityMeta::new("Item")
        .field("id", id())
        .field("name", text(150).not_null())
        .field("description", FieldMeta::new(FieldType::Text))
        .field("code", text(50).unique())
        .field("buyPrice", FieldMeta::new(FieldType::Decimal).precision(8, 2))
        .field("salePrice", FieldMeta::new(FieldType::Decimal).precision(8, 2))
        .field("taxId", reference("Tax"))
        .field("measureUnitId", reference("MeasureUnit"))
        .field("creatorId", reference("User"))
        .field(
            "tagsCount",
            FieldMeta::new(FieldType::Integer).computed(Raw::callback(|ctx| {
                Ok(format!(
                    "(SELECT COUNT(*) FROM {} WHERE {} = {}{})",
                    ctx.dialect.escape_id("ItemTag"),
                    ctx.dialect.escape_id("ItemTag.itemId"),
                    ctx.escaped_prefix,
                    ctx.dialect.escape_id("id")
                ))
            })),
        )
        .relation("tax", RelationMeta::many_to_one("Tax", "taxId", "id"))
        .relation("measureUnit", RelationMeta::many_to_one("MeasureUnit", "measureUnitId", "id"))
        .relation("creator", RelationMeta::many_to_one("User", "creatorId", "id"))
        .relation(
            "tags",
            RelationMeta::many_to_many(
                "Tag",
                "ItemTag",
                Reference::new("itemId", "id"),
                Reference::new("tagId", "id"),
            ),
        )
        .index(IndexMeta {
            name: None,
            fields: vec!["name".into(), "code".into()],
            unique: false,
            index_type: None,
        })
}

pub fn tag() -> EntityMeta {
    EntityMeta::new("Tag").field("id", id()).field("name", text(50).not_null())
}

pub fn item_tag() -> EntityMeta {
    EntityMeta::new("ItemTag")
        .field("id", id())
        .field("itemId", reference("Item"))
        .field("tagId", reference("Tag"))
}

pub fn tax_category() -> EntityMeta {
    EntityMeta::new("TaxCategory")
        .with_id("pk")
        .field("name", text(100).not_null())
        .field("createdAt", FieldMeta::new(FieldType::BigInt).on_insert(|| Value::Int(CREATED_AT)))
        .field(
            "pk",
            FieldMeta::new(FieldType::Uuid).on_insert(|| Value::Text(TAX_CATEGORY_PK.to_string())),
        )
}

pub fn tax() -> EntityMeta {
    EntityMeta::new("Tax")
        .field("id", id())
        .field("name", text(100).not_null())
        .field("percentage", FieldMeta::new(FieldType::Decimal).precision(10, 2))
        .field(
            "categoryId",
            FieldMeta::new(FieldType::Uuid).references(FieldReference {
                field: Some("pk".into()),
                ..FieldReference::new("TaxCategory")
            }),
        )
        .relation("category", RelationMeta::many_to_one("TaxCategory", "categoryId", "pk"))
}

/// Every fixture entity, in declaration order.
pub fn registry() -> EntityRegistry {
    [
        user(),
        profile(),
        measure_unit_category(),
        measure_unit(),
        item(),
        tag(),
        item_tag(),
        tax_category(),
        tax(),
    ]
    .into_iter()
    .collect()
}

pub fn query(json: Json) -> Query {
    Query::from_json(&json).unwrap_or_else(|e| panic!("invalid query {json}: {e}"))
}
