//! # Join Planning
//!
//! Plans a natural join between the current scope and one relation.
//!
//! 1. Split columns three ways: common, left-only, right-only
//! 2. Reject the join when nothing is common
//! 3. Probe a unique index when the relation is a table and its single join
//!    column is exactly a single-column unique index
//! 4. Otherwise scan: `product` + equality `where` + `project`
//!
//! ```text
//! join(R) -> [Join Planning] -> [$call(index probe)]            (indexed)
//!                            -> [product R, where .., project ..] (scan)
//! ```
//!
//! Multi-column indexes are not used; more than one join column always scans.

use crate::ast::{Fragment, Projection, QueryStep, RelationRef};
use crate::environment::{Column, Environment};
use crate::error::{InvariantViolation, QueryError, QueryResult};
use crate::ir::Expr;
use crate::ir_builder as b;
use crate::query::{evaluate, scope_for_relation, Continuation};

/// How a join will be executed
#[derive(Debug, Clone, PartialEq)]
pub enum JoinStrategy {
    /// Hash the join column and look the row up in `this.T._indices[k]`
    IndexProbe { index: Expr },
    /// Nested loop with an equality filter
    Scan,
}

/// Columns of both sides, split by the join comparator
#[derive(Debug, Clone, Default)]
pub struct ColumnVenn {
    /// Left-side entries of the matching pairs
    pub common: Vec<Column>,
    pub left_only: Vec<Column>,
    pub right_only: Vec<Column>,
}

impl ColumnVenn {
    pub fn compute(left: &[Column], right: &[Column]) -> Self {
        let matches_any = |column: &Column, others: &[Column]| {
            others.iter().any(|other| join_comparable(column, other))
        };

        ColumnVenn {
            common: left
                .iter()
                .filter(|c| matches_any(c, right))
                .cloned()
                .collect(),
            left_only: left
                .iter()
                .filter(|c| !matches_any(c, right))
                .cloned()
                .collect(),
            right_only: right
                .iter()
                .filter(|c| !matches_any(c, left))
                .cloned()
                .collect(),
        }
    }
}

/// Same name and, when both types are known, same type and vector length.
/// An unknown type on either side matches on name alone.
pub fn join_comparable(a: &Column, b: &Column) -> bool {
    if a.ty.is_none() || b.ty.is_none() {
        return a.name == b.name;
    }
    a.name == b.name && a.ty == b.ty && a.length == b.length
}

/// A planned natural join
#[derive(Debug, Clone)]
pub struct JoinPlan {
    pub relation: RelationRef,
    pub venn: ColumnVenn,
    pub strategy: JoinStrategy,
}

impl JoinPlan {
    pub fn new(env: &Environment, relation: &RelationRef) -> QueryResult<Self> {
        let right = scope_for_relation(&relation.ident, env)?;
        let venn = ColumnVenn::compute(env.scope(), &right);

        if venn.common.is_empty() {
            return Err(QueryError::NoCommonColumns {
                relation: relation.ident.clone(),
                right: names(&venn.right_only),
                left: names(&venn.left_only),
            });
        }

        let strategy = match env.index_for(&relation.ident, &venn.common)? {
            Some(index) => JoinStrategy::IndexProbe { index },
            None => JoinStrategy::Scan,
        };

        tracing::trace!(
            relation = %relation.ident,
            common = venn.common.len(),
            indexed = matches!(strategy, JoinStrategy::IndexProbe { .. }),
            "join_planned"
        );

        Ok(JoinPlan {
            relation: relation.clone(),
            venn,
            strategy,
        })
    }

    /// Steps that replace the `join` in the query
    pub fn into_steps(self) -> QueryResult<Vec<QueryStep>> {
        match self.strategy {
            JoinStrategy::IndexProbe { ref index } => {
                Ok(vec![index_probe(index.clone(), &self.relation, self.venn)])
            }
            JoinStrategy::Scan => scan_steps(&self.relation, &self.venn),
        }
    }
}

/// Plan a join and return its replacement steps
pub fn join_steps(env: &Environment, relation: &RelationRef) -> QueryResult<Vec<QueryStep>> {
    JoinPlan::new(env, relation)?.into_steps()
}

fn names(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `var hash = idx.hash(col), indexedRow = idx.get(hash); if (indexedRow) {..}`
fn index_probe(index: Expr, relation: &RelationRef, venn: ColumnVenn) -> QueryStep {
    let alias = relation.visible_name().to_string();

    QueryStep::Call(Continuation::new(move |env, rest| {
        let hash = env.unique_name("hash");
        let row = env.unique_name("indexedRow");

        let lookup = b::var_many(vec![
            b::declarator(
                &hash,
                b::call(
                    b::dot(index.clone(), "hash"),
                    venn.common.iter().map(|c| c.reference.clone()).collect(),
                ),
            ),
            b::declarator(
                &row,
                b::call(b::dot(index.clone(), "get"), vec![b::ident(&hash)]),
            ),
        ]);

        let mut scope = venn.common.clone();
        scope.extend(venn.left_only.iter().cloned());
        scope.extend(venn.right_only.iter().map(|column| Column {
            reference: b::dot(b::ident(&row), &column.name),
            row_ref: Some(b::ident(&row)),
            relation: Some(alias.clone()),
            original: None,
            ..column.clone()
        }));

        let body = evaluate(rest, &env.replace_scope(scope))?;
        Ok(b::block(vec![lookup, b::if_then(b::ident(&row), body)]))
    }))
}

fn scan_steps(relation: &RelationRef, venn: &ColumnVenn) -> QueryResult<Vec<QueryStep>> {
    let alias = relation.visible_name();

    let mut conditions = Vec::new();
    for column in &venn.common {
        let left = left_relation(column)?;
        match column.length {
            Some(length) => conditions.extend((0..length).map(|n| {
                format!("{left}.{name}[{n}] === {alias}.{name}[{n}]", name = column.name)
            })),
            None => conditions.push(format!(
                "{left}.{name} === {alias}.{name}",
                name = column.name
            )),
        }
    }

    let mut projections = Vec::new();
    for column in venn.common.iter().chain(&venn.left_only) {
        let left = left_relation(column)?;
        projections.push(Projection::aliased(
            &format!("{left}.{}", column.name),
            &column.name,
        ));
    }
    for column in &venn.right_only {
        projections.push(Projection::aliased(
            &format!("{alias}.{}", column.name),
            &column.name,
        ));
    }

    Ok(vec![
        QueryStep::Product(vec![relation.clone()]),
        QueryStep::Where(vec![Fragment::new(conditions.join(" && "))]),
        QueryStep::Project(projections),
    ])
}

fn left_relation(column: &Column) -> Result<&str, InvariantViolation> {
    column.relation.as_deref().ok_or_else(|| {
        InvariantViolation::new(format!("join column {} has no relation", column.name))
    })
}
