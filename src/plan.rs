//! Backend-agnostic logical query plans.
//!
//! The builder produces these; an adapter translates them into its native
//! query language. Plans are pure data (building one performs no I/O) and
//! serialize cleanly so adapters can log or ship them.
//!
//! Alias indices are positional: the root entity is alias 0, each join takes
//! the next index in declaration order. The adapter must emit result columns
//! named `t{alias}_c{index}` for every column listed in the corresponding
//! [`TableRef`], in that order; this header convention is the contract the
//! row mapper decodes against.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::PrimaryKey;

/// One table/entity occurrence in the plan, under a fixed alias index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    /// Registered entity name (table or collection, the adapter's choice).
    pub entity: String,
    pub alias: usize,
    /// Caller-supplied alias label, if any (self-join disambiguation).
    pub label: Option<String>,
    /// Column names in index order; position `i` is wire column `t{alias}_c{i}`.
    pub columns: Vec<String>,
}

/// A column under a specific alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanColumn {
    pub alias: usize,
    pub column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
}

/// Equi-join condition: `left = right`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinOn {
    pub left: PlanColumn,
    pub right: PlanColumn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub table: TableRef,
    pub kind: JoinKind,
    pub on: JoinOn,
}

/// Comparison operators a predicate leaf can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Case-sensitive pattern match.
    Like,
    /// Case-insensitive pattern match.
    ILike,
}

/// A literal value bound into a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanValue {
    Null,
    Key(i64),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<PrimaryKey> for PlanValue {
    fn from(k: PrimaryKey) -> Self {
        PlanValue::Key(k.0)
    }
}
impl From<i32> for PlanValue {
    fn from(v: i32) -> Self {
        PlanValue::Int(v as i64)
    }
}
impl From<i64> for PlanValue {
    fn from(v: i64) -> Self {
        PlanValue::Int(v)
    }
}
impl From<f64> for PlanValue {
    fn from(v: f64) -> Self {
        PlanValue::Float(v)
    }
}
impl From<&str> for PlanValue {
    fn from(v: &str) -> Self {
        PlanValue::Text(v.to_owned())
    }
}
impl From<String> for PlanValue {
    fn from(v: String) -> Self {
        PlanValue::Text(v)
    }
}

/// Filter predicate tree. `where` calls stack up conjunctively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    And(Vec<Predicate>),
    Compare {
        column: PlanColumn,
        op: CompareOp,
        value: PlanValue,
    },
}

impl Predicate {
    /// Append a conjunct, flattening into an existing `And`.
    pub(crate) fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut terms) => {
                terms.push(other);
                Predicate::And(terms)
            }
            leaf => Predicate::And(vec![leaf, other]),
        }
    }
}

/// The immutable logical plan an adapter executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub root: TableRef,
    pub joins: SmallVec<[Join; 2]>,
    pub filter: Option<Predicate>,
    pub limit: Option<u64>,
}

impl QueryPlan {
    /// The next unused alias index.
    pub fn next_alias(&self) -> usize {
        self.joins.len() + 1
    }
}
