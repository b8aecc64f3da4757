//! # Query Builder
//!
//! Assembles filters and joins into an immutable logical plan, then drives
//! execution and row decoding. Builder calls never touch the adapter; the
//! plan reaches the backend only when `each`/`first`/`all` runs.
//!
//! Alias assignment is positional: the root entity is alias 0 and every
//! `inner_join` takes the next index in call order, so joining an entity to
//! itself is structurally sound. What a self-join does need is labels:
//! type-based column references (`column::<E>("name")`) cannot pick between
//! two aliases of the same type, and resolving one is a reported error, not
//! a guess. Label the aliases (`aliased`, `inner_join_as`) and reference
//! them with [`alias_column`].
//!
//! Builder errors (unknown member, unregistered target, ambiguous column)
//! poison the query and surface at execution, keeping the fluent chain
//! intact and guaranteeing the adapter is never consulted for a broken
//! plan.

use std::any::TypeId;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::metadata::{self, Entity, EntityHeader, EntityMetadata, RelationKind};
use crate::model::PrimaryKey;
use crate::plan::{
    CompareOp, Join, JoinKind, JoinOn, PlanColumn, PlanValue, Predicate, QueryPlan, TableRef,
};
use crate::row::{JoinDecode, RowDecoder};
use crate::{Context, Error, Result};

// ============================================================================
// Column references and conditions
// ============================================================================

/// Reference a registered column of entity `E`, resolved against the query's
/// aliases at `where` time.
pub fn column<E: Entity>(name: &str) -> ColumnExpr {
    ColumnExpr {
        selector: Selector::ByType {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            column: name.to_owned(),
        },
    }
}

/// Reference a column through a caller-supplied alias label (self-joins).
pub fn alias_column(label: &str, name: &str) -> ColumnExpr {
    ColumnExpr {
        selector: Selector::ByLabel { label: label.to_owned(), column: name.to_owned() },
    }
}

#[derive(Debug, Clone)]
enum Selector {
    ByType { type_id: TypeId, type_name: &'static str, column: String },
    ByLabel { label: String, column: String },
    Bound(PlanColumn),
}

/// An unresolved column reference; combine with an operator to get a
/// [`Condition`].
#[derive(Debug, Clone)]
pub struct ColumnExpr {
    selector: Selector,
}

impl ColumnExpr {
    fn compare(self, op: CompareOp, value: impl Into<PlanValue>) -> Condition {
        Condition { selector: self.selector, op, value: value.into() }
    }

    pub fn eq(self, value: impl Into<PlanValue>) -> Condition {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<PlanValue>) -> Condition {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<PlanValue>) -> Condition {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<PlanValue>) -> Condition {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<PlanValue>) -> Condition {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<PlanValue>) -> Condition {
        self.compare(CompareOp::Ge, value)
    }

    /// Case-sensitive pattern match.
    pub fn like(self, pattern: impl Into<String>) -> Condition {
        self.compare(CompareOp::Like, pattern.into())
    }

    /// Case-insensitive pattern match.
    pub fn ilike(self, pattern: impl Into<String>) -> Condition {
        self.compare(CompareOp::ILike, pattern.into())
    }
}

/// One comparison, not yet bound to a table alias.
#[derive(Debug, Clone)]
pub struct Condition {
    selector: Selector,
    op: CompareOp,
    value: PlanValue,
}

impl Condition {
    /// Internal: a condition already bound to an alias (relation lookups).
    pub(crate) fn bound(alias: usize, column: String, op: CompareOp, value: PlanValue) -> Self {
        Condition { selector: Selector::Bound(PlanColumn { alias, column }), op, value }
    }
}

// ============================================================================
// Query
// ============================================================================

/// Open a query rooted at entity `T`, alias 0.
///
/// An unregistered `T` poisons the query; the error surfaces at execution,
/// before any adapter call.
pub fn from<T: Entity>(ctx: &Context) -> Query<'_, T> {
    match metadata::metadata_of::<T>() {
        Ok(meta) => {
            let header = meta.header().clone();
            let plan = QueryPlan {
                root: TableRef {
                    entity: header.entity.clone(),
                    alias: 0,
                    label: None,
                    columns: header.column_names(),
                },
                joins: SmallVec::new(),
                filter: None,
                limit: None,
            };
            let root = AliasBinding {
                alias: 0,
                type_id: header.type_id,
                header,
                label: None,
                attach_member: None,
            };
            Query { ctx, meta: Some(meta), plan, aliases: vec![root], error: None }
        }
        Err(error) => Query {
            ctx,
            meta: None,
            plan: QueryPlan {
                root: TableRef {
                    entity: String::new(),
                    alias: 0,
                    label: None,
                    columns: Vec::new(),
                },
                joins: SmallVec::new(),
                filter: None,
                limit: None,
            },
            aliases: Vec::new(),
            error: Some(error),
        },
    }
}

struct AliasBinding {
    alias: usize,
    type_id: TypeId,
    header: Arc<EntityHeader>,
    label: Option<String>,
    /// Typed-member index of the belongs-to a join came from.
    attach_member: Option<usize>,
}

/// A typed query under construction. Built value-to-value, consumed exactly
/// once by `each`/`first`/`all`.
pub struct Query<'ctx, T: Entity> {
    ctx: &'ctx Context,
    meta: Option<Arc<EntityMetadata<T>>>,
    plan: QueryPlan,
    aliases: Vec<AliasBinding>,
    error: Option<Error>,
}

impl<'ctx, T: Entity> Query<'ctx, T> {
    /// Label the root alias for self-join disambiguation.
    pub fn aliased(mut self, label: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.plan.root.label = Some(label.to_owned());
        self.aliases[0].label = Some(label.to_owned());
        self
    }

    /// Append a conjunct to the filter tree.
    pub fn r#where(mut self, condition: Condition) -> Self {
        if self.error.is_some() {
            return self;
        }
        let column = match self.resolve(condition.selector) {
            Ok(column) => column,
            Err(error) => return self.poison(error),
        };
        let leaf = Predicate::Compare { column, op: condition.op, value: condition.value };
        self.plan.filter = Some(match self.plan.filter.take() {
            Some(filter) => filter.and(leaf),
            None => leaf,
        });
        self
    }

    /// Join the named relation of the root entity under the next alias.
    pub fn inner_join(self, member: &str) -> Self {
        self.join_relation(member, None)
    }

    /// Join with a caller-supplied alias label (self-joins).
    pub fn inner_join_as(self, member: &str, label: &str) -> Self {
        self.join_relation(member, Some(label))
    }

    /// Cap the number of rows the adapter returns.
    pub fn limit(mut self, rows: u64) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.plan.limit = Some(rows);
        self
    }

    /// The plan built so far (inspection; execution consumes the query).
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute the plan and invoke `callback` once per decoded row, in
    /// ResultSet order. A row that fails to decode aborts the loop; rows
    /// already delivered stay delivered.
    pub fn each(self, mut callback: impl FnMut(&T)) -> Result<()> {
        let executed = self.run()?;
        let decoder = executed.decoder();
        for row in &executed.result.rows {
            let entity = decoder.decode(row)?;
            callback(&entity);
        }
        Ok(())
    }

    /// Execute with `limit(1)` and decode at most one row.
    pub fn first(self) -> Result<Option<T>> {
        let executed = self.limit(1).run()?;
        let decoder = executed.decoder();
        executed.result.rows.first().map(|row| decoder.decode(row)).transpose()
    }

    /// Execute and collect every decoded row.
    pub fn all(self) -> Result<Vec<T>> {
        let executed = self.run()?;
        let decoder = executed.decoder();
        executed.result.rows.iter().map(|row| decoder.decode(row)).collect()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn poison(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    fn join_relation(mut self, member: &str, label: Option<&str>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let root_header = self.aliases[0].header.clone();
        let Some(relation) = root_header.relation(member).cloned() else {
            return self.poison(Error::Metadata(format!(
                "{} has no relation {member:?}",
                root_header.entity
            )));
        };
        let target_header =
            match metadata::header_by_id(relation.target, relation.target_type_name) {
                Ok(header) => header,
                Err(error) => return self.poison(error),
            };

        let alias = self.plan.next_alias();
        let on = match relation.kind {
            RelationKind::BelongsTo => {
                let target_pk = match target_header.primary_key_column() {
                    Ok(pk) => pk.name.clone(),
                    Err(error) => return self.poison(error),
                };
                JoinOn {
                    left: PlanColumn { alias: 0, column: relation.fk_column.clone() },
                    right: PlanColumn { alias, column: target_pk },
                }
            }
            RelationKind::HasMany => {
                let root_pk = match root_header.primary_key_column() {
                    Ok(pk) => pk.name.clone(),
                    Err(error) => return self.poison(error),
                };
                JoinOn {
                    left: PlanColumn { alias: 0, column: root_pk },
                    right: PlanColumn { alias, column: relation.fk_column.clone() },
                }
            }
        };

        self.plan.joins.push(Join {
            table: TableRef {
                entity: target_header.entity.clone(),
                alias,
                label: label.map(str::to_owned),
                columns: target_header.column_names(),
            },
            kind: JoinKind::Inner,
            on,
        });
        self.aliases.push(AliasBinding {
            alias,
            type_id: target_header.type_id,
            header: target_header,
            label: label.map(str::to_owned),
            attach_member: (relation.kind == RelationKind::BelongsTo)
                .then_some(relation.member_index),
        });
        self
    }

    fn resolve(&self, selector: Selector) -> Result<PlanColumn> {
        match selector {
            Selector::Bound(column) => Ok(column),
            Selector::ByLabel { label, column } => {
                let binding = self
                    .aliases
                    .iter()
                    .find(|b| b.label.as_deref() == Some(label.as_str()))
                    .ok_or_else(|| {
                        Error::Metadata(format!("no alias labeled {label:?} in this query"))
                    })?;
                Self::check_column(&binding.header, &column)?;
                Ok(PlanColumn { alias: binding.alias, column })
            }
            Selector::ByType { type_id, type_name, column } => {
                let mut matches = self.aliases.iter().filter(|b| b.type_id == type_id);
                let binding = matches.next().ok_or_else(|| {
                    Error::Metadata(format!("entity type {type_name} is not part of this query"))
                })?;
                if matches.next().is_some() {
                    return Err(Error::Metadata(format!(
                        "entity type {type_name} appears under several aliases; \
                         use alias_column with a label"
                    )));
                }
                Self::check_column(&binding.header, &column)?;
                Ok(PlanColumn { alias: binding.alias, column })
            }
        }
    }

    fn check_column(header: &EntityHeader, column: &str) -> Result<()> {
        if header.column_index(column).is_none() {
            return Err(Error::Metadata(format!(
                "{} has no column {column:?}",
                header.entity
            )));
        }
        Ok(())
    }

    fn run(self) -> Result<Executed<T>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let meta = match self.meta {
            Some(meta) => meta,
            None => {
                return Err(Error::Metadata(
                    "query carries no entity metadata".into(),
                ));
            }
        };
        tracing::debug!(
            entity = %self.plan.root.entity,
            joins = self.plan.joins.len(),
            "executing query plan"
        );
        let result = self.ctx.connection().execute(&self.plan)?;
        let joins = self
            .aliases
            .iter()
            .skip(1)
            .map(|binding| JoinDecode {
                alias: binding.alias,
                column_count: binding.header.columns.len(),
                attach_member: binding.attach_member,
            })
            .collect::<Vec<_>>();
        Ok(Executed { meta, result, joins })
    }
}

struct Executed<T: Entity> {
    meta: Arc<EntityMetadata<T>>,
    result: crate::adapter::ResultSet,
    joins: Vec<JoinDecode>,
}

impl<T: Entity> Executed<T> {
    fn decoder(&self) -> RowDecoder<'_, T> {
        RowDecoder::new(&self.meta, &self.result, self.joins.iter().copied())
    }
}

// ============================================================================
// Relation lookups (internal entry points for BelongsTo / HasMany)
// ============================================================================

/// Fetch one entity by primary key on the given context.
pub(crate) fn find_by_key<T: Entity>(ctx: &Context, key: PrimaryKey) -> Result<Option<T>> {
    let header = metadata::header_of::<T>()?;
    let pk = header.primary_key_column()?.name.clone();
    from::<T>(ctx)
        .r#where(Condition::bound(0, pk, CompareOp::Eq, key.into()))
        .first()
}

/// Open a query for all rows whose `fk_column` equals `owner`.
pub(crate) fn find_by_foreign_key<'ctx, T: Entity>(
    ctx: &'ctx Context,
    fk_column: &str,
    owner: PrimaryKey,
) -> Result<Query<'ctx, T>> {
    let header = metadata::header_of::<T>()?;
    if header.column_index(fk_column).is_none() {
        return Err(Error::Metadata(format!(
            "{} has no column {fk_column:?}",
            header.entity
        )));
    }
    Ok(from::<T>(ctx).r#where(Condition::bound(
        0,
        fk_column.to_owned(),
        CompareOp::Eq,
        owner.into(),
    )))
}
