//! Join planning for relation selections.

use super::{Clause, SqlDialect, WhereOptions};
use crate::entity::{EntityRef, EntityRegistry};
use crate::error::{QueryError, Result};
use crate::query::{
    FieldCondition, FieldOperator, Query, RelationQuery, Select, SelectItem, SelectValue, Where, WhereValue,
};
use crate::value::Value;

/// Result of planning the relations of a selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationJoinPlan {
    /// Projected columns of joined relations, aliased `<alias>.<key>`.
    pub fields: Vec<String>,
    /// `LEFT JOIN`/`INNER JOIN` clauses, each with a leading space.
    pub tables: String,
    /// To-many relations that need a follow-up query.
    pub deferred: Vec<DeferredRelation>,
}

/// A to-many relation left out of the joined statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredRelation {
    /// Dotted alias path of the relation, e.g. `measureUnit.items`.
    pub path: String,
    /// Entity declaring the relation.
    pub owner: String,
    /// Relation key on the owner.
    pub relation: String,
    /// Requested projection and filter.
    pub query: RelationQuery,
}

impl DeferredRelation {
    /// Builds the follow-up query loading this relation for the given
    /// parent keys. Returns the entity to query and the query itself.
    ///
    /// One-to-many relations query the related entity by its foreign key.
    /// Many-to-many relations query the junction entity by the column that
    /// points back at the owner.
    ///
    /// # Errors
    ///
    /// Fails when the owner or relation is unknown or has no references.
    pub fn follow_up(&self, registry: &EntityRegistry, parent_keys: Vec<Value>) -> Result<(String, Query)> {
        let owner = registry.get(&self.owner)?;
        let relation = owner.relation(&self.relation)?;
        let reference = relation.references.first().ok_or_else(|| QueryError::UnknownRelation {
            entity: self.owner.clone(),
            relation: self.relation.clone(),
        })?;

        let (target, key) = match &relation.through {
            Some(through) => (through.clone(), reference.local.clone()),
            None => (relation.entity.clone(), reference.foreign.clone()),
        };

        let mut filter = self.query.filter.clone().unwrap_or_default();
        filter.insert(
            key.clone(),
            WhereValue::Field(FieldCondition::op(FieldOperator::In, Value::List(parent_keys))),
        );

        let select = match (&relation.through, &self.query.select) {
            (None, Some(Select::Fields(items))) => {
                let mut items = items.clone();
                let fk = SelectItem::Field(key);
                if !items.contains(&fk) {
                    items.push(fk);
                }
                Some(Select::Fields(items))
            }
            (None, Some(Select::Map(map))) => {
                let mut select = Select::Map(map.clone());
                if map.values().any(|v| matches!(v, SelectValue::Include(true))) {
                    select = select.include(key);
                }
                Some(select)
            }
            _ => None,
        };

        let query = Query {
            select,
            filter: Some(Where::Map(filter)),
            sort: self.query.sort.clone(),
            limit: self.query.limit,
            skip: self.query.skip,
            ..Query::default()
        };
        Ok((target, query))
    }

    /// Key on the parent rows whose values feed [`DeferredRelation::follow_up`].
    ///
    /// # Errors
    ///
    /// Fails when the owner or relation is unknown.
    pub fn parent_key(&self, registry: &EntityRegistry) -> Result<String> {
        let owner = registry.get(&self.owner)?;
        let relation = owner.relation(&self.relation)?;
        Ok(relation
            .references
            .first()
            .map_or_else(|| owner.id.clone(), |r| if relation.through.is_some() { r.foreign.clone() } else { r.local.clone() }))
    }
}

pub(super) fn plan(
    dialect: &dyn SqlDialect,
    entity: EntityRef<'_>,
    select: Option<&Select>,
    parent_alias: Option<&str>,
) -> Result<RelationJoinPlan> {
    let mut plan = RelationJoinPlan::default();
    let Some(Select::Map(map)) = select else {
        return Ok(plan);
    };

    for (key, value) in map {
        let query = match value {
            SelectValue::Include(false) => continue,
            SelectValue::Include(true) => RelationQuery::default(),
            SelectValue::Relation(query) => query.clone(),
        };
        let Some(relation) = entity.relations.get(key) else {
            continue;
        };
        let alias = parent_alias.map_or_else(|| key.clone(), |parent| format!("{parent}.{key}"));

        if !relation.cardinality.is_to_one() {
            tracing::debug!(entity = %entity.name, relation = %key, "deferring to-many relation");
            plan.deferred.push(DeferredRelation {
                path: alias,
                owner: entity.name.clone(),
                relation: key.clone(),
                query,
            });
            continue;
        }

        let related = entity.related(key)?;
        plan.fields
            .push(dialect.select_fields(related, query.select.as_ref(), Some(&alias), true)?);

        let escaped_alias = dialect.escape_id_with(&alias, true, false);
        let parent = parent_alias.map_or_else(|| entity.table_name(), ToString::to_string);
        let escaped_parent = dialect.escape_id_with(&parent, true, false);
        let on = relation
            .references
            .iter()
            .map(|reference| {
                format!(
                    "{escaped_alias}.{} = {escaped_parent}.{}",
                    dialect.escape_id_with(&related.column_name(&reference.foreign), true, false),
                    dialect.escape_id_with(&entity.column_name(&reference.local), true, false)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        let filter = match &query.filter {
            Some(filter) => dialect.where_map(
                related,
                Some(filter),
                &WhereOptions {
                    prefix: Some(&alias),
                    use_precedence: true,
                    clause: Clause::None,
                    soft_delete: Some(false),
                },
            )?,
            None => String::new(),
        };
        let filter = if filter.is_empty() { filter } else { format!(" AND {filter}") };
        let join = if query.required { "INNER" } else { "LEFT" };
        plan.tables.push_str(&format!(
            " {join} JOIN {} {escaped_alias} ON {on}{filter}",
            dialect.escape_id(&related.table_name())
        ));

        let nested = dialect.select_relations(related, query.select.as_ref(), Some(&alias))?;
        plan.fields.extend(nested.fields);
        plan.tables.push_str(&nested.tables);
        plan.deferred.extend(nested.deferred);
    }
    Ok(plan)
}
