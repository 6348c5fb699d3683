//! Relation joins and deferred to-many loading.

mod common;

use common::{query, registry};
use querykit_core::dialect::{FindOptions, MySqlDialect, PostgresDialect, SqlDialect};
use querykit_core::QueryError;
use querykit_core::Value;
use serde_json::{json, Value as Json};

fn find_with(dialect: &dyn SqlDialect, entity: &str, q: Json) -> String {
    let registry = registry();
    let entity = registry.get(entity).unwrap();
    dialect.find(entity, &query(q), &FindOptions::default()).unwrap()
}

fn find(entity: &str, q: Json) -> String {
    find_with(&MySqlDialect, entity, q)
}

#[test]
fn to_one_relation_is_left_joined() {
    assert_eq!(
        find(
            "Item",
            json!({ "$select": { "id": true, "name": true, "measureUnit": { "$select": { "id": true, "name": true } } } })
        ),
        "SELECT `Item`.`id`, `Item`.`name`, `measureUnit`.`id` `measureUnit.id`, `measureUnit`.`name` \
         `measureUnit.name` FROM `Item` LEFT JOIN `MeasureUnit` `measureUnit` ON `measureUnit`.`id` = \
         `Item`.`measureUnitId`"
    );
}

#[test]
fn required_and_nested_relations() {
    assert_eq!(
        find(
            "Item",
            json!({
                "$select": {
                    "id": true,
                    "measureUnit": {
                        "$select": { "name": true, "category": { "$select": { "name": true } } },
                        "$required": true
                    }
                }
            })
        ),
        "SELECT `Item`.`id`, `measureUnit`.`id` `measureUnit.id`, `measureUnit`.`name` `measureUnit.name`, \
         `measureUnit.category`.`id` `measureUnit.category.id`, `measureUnit.category`.`name` \
         `measureUnit.category.name` FROM `Item` INNER JOIN `MeasureUnit` `measureUnit` ON `measureUnit`.`id` = \
         `Item`.`measureUnitId` LEFT JOIN `MeasureUnitCategory` `measureUnit.category` ON \
         `measureUnit.category`.`id` = `measureUnit`.`categoryId`"
    );
}

#[test]
fn relation_filter_joins_on_condition() {
    assert_eq!(
        find(
            "Item",
            json!({
                "$select": { "id": true, "tax": { "$select": { "name": true }, "$where": { "percentage": { "$gt": 10 } } } },
                "$where": { "name": "a" }
            })
        ),
        "SELECT `Item`.`id`, `tax`.`id` `tax.id`, `tax`.`name` `tax.name` FROM `Item` LEFT JOIN `Tax` `tax` ON \
         `tax`.`id` = `Item`.`taxId` AND `tax`.`percentage` > 10 WHERE `Item`.`name` = 'a'"
    );
}

#[test]
fn compound_relation_filter_is_parenthesized() {
    assert_eq!(
        find(
            "Item",
            json!({
                "$select": {
                    "id": true,
                    "tax": { "$select": { "name": true }, "$where": { "$or": [{ "percentage": { "$gt": 10 } }, { "name": "x" }] } }
                }
            })
        ),
        "SELECT `Item`.`id`, `tax`.`id` `tax.id`, `tax`.`name` `tax.name` FROM `Item` LEFT JOIN `Tax` `tax` ON \
         `tax`.`id` = `Item`.`taxId` AND (`tax`.`percentage` > 10 OR `tax`.`name` = 'x')"
    );
}

#[test]
fn filter_and_sort_by_relation_paths() {
    assert_eq!(
        find(
            "Item",
            json!({
                "$select": { "id": true, "measureUnit": { "$select": { "name": true } } },
                "$where": { "measureUnit.name": "kg" },
                "$sort": { "measureUnit": { "name": -1 }, "id": 1 }
            })
        ),
        "SELECT `Item`.`id`, `measureUnit`.`id` `measureUnit.id`, `measureUnit`.`name` `measureUnit.name` \
         FROM `Item` LEFT JOIN `MeasureUnit` `measureUnit` ON `measureUnit`.`id` = `Item`.`measureUnitId` \
         WHERE `measureUnit`.`name` = 'kg' ORDER BY `measureUnit`.`name` DESC, `Item`.`id`"
    );
}

#[test]
fn joins_in_postgres() {
    assert_eq!(
        find_with(
            &PostgresDialect,
            "Profile",
            json!({ "$select": { "picture": true, "creator": { "$select": { "name": true } } } })
        ),
        "SELECT \"user_profile\".\"pk\", \"user_profile\".\"image\" \"picture\", \"creator\".\"id\" \"creator.id\", \
         \"creator\".\"name\" \"creator.name\" FROM \"user_profile\" LEFT JOIN \"User\" \"creator\" ON \
         \"creator\".\"id\" = \"user_profile\".\"creatorId\""
    );
}

#[test]
fn to_many_relations_are_deferred() {
    let registry = registry();
    let category = registry.get("MeasureUnitCategory").unwrap();
    let q = query(json!({
        "$select": { "id": true, "name": true, "measureUnits": { "$select": ["id", "name"], "$sort": { "name": 1 } } }
    }));

    assert_eq!(
        MySqlDialect.find(category, &q, &FindOptions::default()).unwrap(),
        "SELECT `MeasureUnitCategory`.`id`, `MeasureUnitCategory`.`name` FROM `MeasureUnitCategory`"
    );

    let plan = MySqlDialect.select_relations(category, q.select.as_ref(), None).unwrap();
    assert!(plan.fields.is_empty());
    assert!(plan.tables.is_empty());
    assert_eq!(plan.deferred.len(), 1);
    let deferred = &plan.deferred[0];
    assert_eq!(deferred.path, "measureUnits");
    assert_eq!(deferred.parent_key(&registry).unwrap(), "id");

    let (target, follow_up) = deferred.follow_up(&registry, vec![Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(target, "MeasureUnit");
    let unit = registry.get(&target).unwrap();
    assert_eq!(
        MySqlDialect.find(unit, &follow_up, &FindOptions::default()).unwrap(),
        "SELECT `id`, `name`, `categoryId` FROM `MeasureUnit` WHERE `categoryId` IN (1, 2) AND `deletedAt` IS NULL \
         ORDER BY `name`"
    );
}

#[test]
fn many_to_many_goes_through_the_junction() {
    let registry = registry();
    let item = registry.get("Item").unwrap();
    let q = query(json!({ "$select": { "id": true, "tags": true } }));
    let plan = MySqlDialect.select_relations(item, q.select.as_ref(), None).unwrap();
    let deferred = &plan.deferred[0];
    assert_eq!(deferred.parent_key(&registry).unwrap(), "id");

    let (target, follow_up) = deferred.follow_up(&registry, vec![Value::Int(7)]).unwrap();
    assert_eq!(target, "ItemTag");
    let junction = registry.get(&target).unwrap();
    assert_eq!(
        MySqlDialect.find(junction, &follow_up, &FindOptions::default()).unwrap(),
        "SELECT `id`, `itemId`, `tagId` FROM `ItemTag` WHERE `itemId` IN (7)"
    );
}

#[test]
fn nested_sort_on_unknown_relation_fails() {
    let registry = registry();
    let item = registry.get("Item").unwrap();
    let err = MySqlDialect
        .find(item, &query(json!({ "$sort": { "supplier": { "name": 1 } } })), &FindOptions::default())
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownRelation { relation, .. } if relation == "supplier"));
}
