//! Query Evaluator
//!
//! Lowers an ordered list of [`QueryStep`]s into nested procedural IR. The
//! evaluation is continuation-passing: the first step receives the remaining
//! steps and decides where, and under what condition, they run.
//!
//! ```text
//! from A, where p, project q
//!
//! for (var i$0 = 0, len$1 = this.A._data.length; i$0 < len$1; i$0++) {   <- from
//!     var A_x$2 = this.A._data[i$0].x;
//!     if (p) {                                                          <- where
//!         ...                                                           <- project, rest
//!     }
//! }
//! ```
//!
//! Operators:
//! - `from` / `product`: nested loop over a table, one-row inline of a
//!   scalar, or in-place expansion of a view
//! - `join`: natural join planned by [`crate::join_planning`]
//! - `leftJoin`: join plus an `if (!found)` branch with null right columns
//! - `where`, `project`, `set`, `destroy`
//! - `$call`: host-supplied [`Continuation`]

pub mod group;
pub mod project;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ast::{Fragment, Projection, QueryStep, RelationRef, SetTarget};
use crate::environment::{Column, Environment, ScopeEntry};
use crate::error::{InvariantViolation, QueryError, QueryResult};
use crate::ir::Stmt;
use crate::ir_builder as b;
use crate::join_planning;
use crate::resolve::resolve_identifiers;
use crate::syntax::parse_expression;

type ContinuationFn = dyn Fn(&Environment, &[QueryStep]) -> QueryResult<Stmt> + Send + Sync;

/// Code-emitting callback spliced into a step list.
///
/// Receives the environment at its position and the steps after it; it is
/// responsible for evaluating those steps if they should run.
#[derive(Clone)]
pub struct Continuation(Arc<ContinuationFn>);

impl Continuation {
    pub fn new(
        f: impl Fn(&Environment, &[QueryStep]) -> QueryResult<Stmt> + Send + Sync + 'static,
    ) -> Self {
        Continuation(Arc::new(f))
    }

    pub fn call(&self, env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
        (self.0)(env, rest)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continuation(..)")
    }
}

/// Evaluate `steps` in `env`, producing the code for the whole cascade
pub fn evaluate(steps: &[QueryStep], env: &Environment) -> QueryResult<Stmt> {
    let Some((first, rest)) = steps.split_first() else {
        return Ok(Stmt::Empty);
    };

    tracing::trace!(operator = first.func(), remaining = rest.len(), "evaluate_step");

    match first {
        QueryStep::From(args) => from(args, env, rest),
        QueryStep::Product(args) => product(args, env, rest),
        QueryStep::Join(args) => join(args, env, rest),
        QueryStep::LeftJoin(args) => left_join(args, env, rest),
        QueryStep::Where(args) => filter(args, env, rest),
        QueryStep::Project(args) => project(args, env, rest),
        QueryStep::Set(target, value) => set(target, value, env, rest),
        QueryStep::Destroy(args) => destroy(args, env, rest),
        QueryStep::Call(continuation) => continuation.call(env, rest),
        QueryStep::Any(_) | QueryStep::Unknown(_) => {
            Err(QueryError::UnknownOperator(first.func().to_string()))
        }
    }
}

fn single<'a, T>(operator: &'static str, args: &'a [T]) -> QueryResult<&'a T> {
    match args {
        [arg] => Ok(arg),
        _ => Err(QueryError::Arity {
            operator,
            expected: 1,
            got: args.len(),
        }),
    }
}

/// Loop over a relation; must open the query
fn from(args: &[RelationRef], env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    if env.has_scope() {
        return Err(QueryError::FromNotFirst);
    }
    product(args, env, rest)
}

/// Cartesian product: every row so far, combined with every row of the relation
fn product(args: &[RelationRef], env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    if args.len() > 1 {
        let mut steps: Vec<QueryStep> = args
            .iter()
            .map(|arg| QueryStep::Product(vec![arg.clone()]))
            .collect();
        steps.extend_from_slice(rest);
        return evaluate(&steps, env);
    }

    let relation = single("product", args)?;
    let alias = relation.visible_name();
    let catalog = env.catalog();

    if catalog.is_scalar(&relation.ident)? {
        product_var(&relation.ident, alias, env, rest)
    } else if catalog.is_view(&relation.ident)? {
        product_view(&relation.ident, alias, env, rest)
    } else {
        product_table(&relation.ident, alias, env, rest)
    }
}

fn product_table(
    table: &str,
    alias: &str,
    env: &Environment,
    rest: &[QueryStep],
) -> QueryResult<Stmt> {
    ensure_new_relation(env, alias)?;

    let counter = env.unique_name("i");
    let length = env.unique_name("len");
    let data = env.table_data(table)?;
    let row = b::index(data.clone(), b::ident(&counter));

    let mut added = env.columns_with_ref(table, Some(&row))?;
    relabel(&mut added, alias);
    let names = qualified_names(&added);

    let env = env.extend_scope(added);
    let (cached, child) = env.cache_names(&names);

    Ok(b::simple_for(
        &counter,
        &length,
        b::dot(data, "length"),
        b::block(vec![cached, evaluate(rest, &child)?]),
    ))
}

/// A scalar is a relation with exactly one row and one column; no loop
fn product_var(name: &str, alias: &str, env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    let mut column = env.var_column(name)?;
    column.name = alias.to_string();
    evaluate(rest, &env.extend_scope(vec![column]))
}

/// Inline a view: evaluate its steps from the root, then resume this query
/// inside the view's innermost block with the view's output columns
fn product_view(view: &str, alias: &str, env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    let outer = env.clone();
    let alias = alias.to_string();
    let rest = rest.to_vec();

    let mut steps = env.catalog().view_steps(view)?.to_vec();
    steps.push(QueryStep::Call(Continuation::new(move |inner, _| {
        ensure_new_relation(&outer, &alias)?;
        let mut output = inner.scope().to_vec();
        relabel(&mut output, &alias);
        let names = qualified_names(&output);

        let env = outer.extend_scope(output);
        let (cached, child) = env.cache_names(&names);
        Ok(b::block(vec![cached, evaluate(&rest, &child)?]))
    })));

    evaluate(&steps, &env.root())
}

/// Output columns of a relation, qualified with its name, without emitting
/// code for it. Used to plan joins.
pub fn scope_for_relation(relation: &str, env: &Environment) -> QueryResult<Vec<Column>> {
    let catalog = env.catalog();

    if catalog.is_view(relation)? {
        let captured: Arc<Mutex<Option<Vec<Column>>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&captured);

        let mut steps = catalog.view_steps(relation)?.to_vec();
        steps.push(QueryStep::Call(Continuation::new(move |inner, _| {
            *sink.lock() = Some(inner.scope().to_vec());
            Ok(Stmt::Empty)
        })));
        evaluate(&steps, &env.root())?;

        let mut scope = captured.lock().take().ok_or_else(|| {
            InvariantViolation::new(format!("view {relation} produced no scope"))
        })?;
        relabel(&mut scope, relation);
        return Ok(scope);
    }

    if catalog.is_scalar(relation)? {
        return Ok(Vec::new());
    }

    Ok(env.columns(relation)?)
}

/// Natural join on every identically named and typed column
fn join(args: &[RelationRef], env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    let relation = single("join", args)?;
    let mut steps = join_planning::join_steps(env, relation)?;
    steps.extend_from_slice(rest);
    evaluate(&steps, env)
}

/// Join that keeps left rows without a partner, with the right relation's
/// columns reading `null`. Per left row exactly one branch runs.
fn left_join(args: &[RelationRef], env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    let relation = single("leftJoin", args)?;
    let alias = relation.visible_name().to_string();
    let found = env.unique_name(&format!("lj${}$found", relation.ident));

    let joined: Arc<Mutex<Option<Vec<Column>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&joined);
    let found_flag = found.clone();
    let found_case = Continuation::new(move |env, rest| {
        *sink.lock() = Some(env.scope().to_vec());
        Ok(b::block(vec![
            b::assign(b::ident(&found_flag), b::boolean(true)),
            evaluate(rest, env)?,
        ]))
    });

    let mut join_steps = join_planning::join_steps(env, relation)?;
    join_steps.push(QueryStep::Call(found_case));
    join_steps.extend_from_slice(rest);
    let found_code = evaluate(&join_steps, env)?;

    let joined_scope = joined.lock().take().ok_or_else(|| {
        InvariantViolation::new(format!("leftJoin on {} never reached its rows", relation.ident))
    })?;
    let nulled = joined_scope
        .into_iter()
        .map(|column| {
            if column.relation.as_deref() == Some(alias.as_str()) {
                Column {
                    reference: b::null(),
                    row_ref: None,
                    original: None,
                    ..column
                }
            } else {
                column
            }
        })
        .collect();
    let missing_code = evaluate(rest, &env.replace_scope(nulled))?;

    Ok(b::block(vec![
        b::var(&found, b::boolean(false)),
        found_code,
        b::if_then(b::not(b::ident(&found)), missing_code),
    ]))
}

/// Guard the rest of the query with a condition
fn filter(args: &[Fragment], env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    let fragment = single("where", args)?;
    let condition = resolve_identifiers(&parse_expression(&fragment.javascript)?, env)?;
    Ok(b::if_then(condition, evaluate(rest, env)?))
}

/// Replace the scope with projected, renamed or derived columns
fn project(args: &[Projection], env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    let prerequisites = project::prerequisites(args, env)?;
    if !prerequisites.is_empty() {
        let mut steps = prerequisites;
        steps.push(QueryStep::Project(args.to_vec()));
        steps.extend_from_slice(rest);
        return evaluate(&steps, env);
    }

    let mut scope = Vec::with_capacity(args.len());
    let mut to_cache = Vec::new();

    for projection in args {
        match projection {
            Projection::Column { ident, alias } => {
                let (relation, column) = match ident.rsplit_once('.') {
                    Some((relation, column)) => (Some(relation), column),
                    None => (None, ident.as_str()),
                };
                if column == "*" {
                    if alias.is_some() {
                        return Err(QueryError::AliasedStar);
                    }
                    scope.extend(project::project_all(env, relation)?);
                } else {
                    scope.push(project::project_column(env, ident, alias.as_deref())?);
                }
            }
            Projection::Derived {
                javascript,
                vars,
                alias,
            } => {
                let column = project::project_derived(env, javascript, vars, alias.as_deref())?;
                to_cache.push(column.qualified_name());
                scope.push(column);
            }
        }
    }

    let (cached, child) = env.replace_scope(scope).cache_names(&to_cache);
    Ok(b::block(vec![cached, evaluate(rest, &child)?]))
}

/// Assign to a column in scope
fn set(target: &SetTarget, value: &Fragment, env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    let value = resolve_identifiers(&parse_expression(&value.javascript)?, env)?;
    let column = match env.entry(&target.ident) {
        Some(ScopeEntry::Column(column)) => column,
        _ => return Err(QueryError::CannotSet(target.ident.clone())),
    };
    let place = column.original.clone().unwrap_or_else(|| column.reference.clone());

    Ok(b::block(vec![b::assign(place, value), evaluate(rest, env)?]))
}

/// Queue every in-scope row of the named tables for deletion
fn destroy(args: &[RelationRef], env: &Environment, rest: &[QueryStep]) -> QueryResult<Stmt> {
    if args.is_empty() {
        return Err(QueryError::DestroyWithoutTables);
    }
    let tables: HashSet<&str> = args.iter().map(|t| t.ident.as_str()).collect();

    let mut deletes: Vec<Stmt> = Vec::new();
    let mut padded = false;
    for column in env.scope() {
        let Some(table) = &column.table else {
            continue;
        };
        if !tables.contains(table.as_str()) {
            continue;
        }
        let Some(row) = &column.row_ref else {
            // leftJoin without a partner: nothing to delete on this branch
            padded |= column.reference == b::null();
            continue;
        };
        let enqueue = b::call_stmt(
            b::dot(b::ident("queuedDeletes"), "push"),
            vec![b::object(vec![("t", b::string(table)), ("r", row.clone())])],
        );
        if !deletes.contains(&enqueue) {
            deletes.push(enqueue);
        }
    }

    if deletes.is_empty() && !padded {
        return Err(QueryError::DestroyNoRows(
            args.iter().map(|t| t.ident.clone()).collect(),
        ));
    }
    deletes.push(evaluate(rest, env)?);
    Ok(b::block(deletes))
}

fn ensure_new_relation(env: &Environment, alias: &str) -> QueryResult<()> {
    if env.scope().iter().any(|c| c.relation.as_deref() == Some(alias)) {
        return Err(QueryError::DuplicateRelation(alias.to_string()));
    }
    Ok(())
}

fn relabel(columns: &mut [Column], relation: &str) {
    for column in columns {
        column.relation = Some(relation.to_string());
    }
}

fn qualified_names(columns: &[Column]) -> Vec<String> {
    columns.iter().map(Column::qualified_name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{ProgramBuilder, QueryBuilder, TableBuilder, ViewBuilder};
    use crate::ast::Program;
    use crate::catalog::Catalog;
    use crate::ir::printer::print_stmt;

    fn program() -> Program {
        ProgramBuilder::new()
            .table(
                TableBuilder::new("Users")
                    .column("id", "int")
                    .column("name", "string")
                    .unique(&["id"]),
            )
            .table(
                TableBuilder::new("Orders")
                    .column("oid", "int")
                    .column("id", "int")
                    .column("total", "float"),
            )
            .table(TableBuilder::new("Tags").column("label", "string"))
            .view(ViewBuilder::private("named").from("Users").filter("name != \"\""))
            .var("target", "string", "\"b\"")
            .build()
    }

    fn compile(steps: Vec<QueryStep>) -> QueryResult<String> {
        let catalog = Catalog::from_program(&program()).unwrap();
        let env = Environment::new(Arc::new(catalog), &[]);
        evaluate(&steps, &env).map(|s| print_stmt(&s))
    }

    #[test]
    fn test_from_emits_loop_and_caches_columns() {
        let code = compile(QueryBuilder::new().from("Users").build()).unwrap();
        assert!(code.starts_with("for (var i$0 = 0, len$1 = this.Users._data.length;"));
        assert!(code.contains("var Users_id$2 = this.Users._data[i$0].id"));
    }

    #[test]
    fn test_from_must_come_first() {
        let err = compile(QueryBuilder::new().from("Users").from("Tags").build()).unwrap_err();
        assert_eq!(err, QueryError::FromNotFirst);
    }

    #[test]
    fn test_product_of_two_tables_nests_loops() {
        let code = compile(QueryBuilder::new().product(&["Users", "Tags"]).build()).unwrap();
        assert_eq!(code.matches("for (").count(), 2);
    }

    #[test]
    fn test_product_with_same_relation_needs_alias() {
        let err = compile(QueryBuilder::new().from("Tags").product(&["Tags"]).build()).unwrap_err();
        assert_eq!(err, QueryError::DuplicateRelation("Tags".to_string()));

        let aliased = QueryBuilder::new()
            .from("Tags")
            .step(QueryStep::Product(vec![RelationRef::aliased("Tags", "t2")]))
            .build();
        assert!(compile(aliased).is_ok());
    }

    #[test]
    fn test_where_guards_continuation() {
        let code = compile(QueryBuilder::new().from("Users").filter("name == target").build()).unwrap();
        assert!(code.contains("if (Users_name$3 == this.$target) {"));
    }

    #[test]
    fn test_scalar_product_emits_no_loop() {
        let code = compile(
            QueryBuilder::new()
                .from("target")
                .filter("target != null")
                .build(),
        )
        .unwrap();
        assert!(!code.contains("for ("));
        assert!(code.starts_with("if (this.$target != null)"));
    }

    #[test]
    fn test_view_is_inlined() {
        let code = compile(QueryBuilder::new().from("named").filter("named.id > 1").build()).unwrap();
        assert_eq!(code.matches("for (").count(), 1);
        assert!(code.contains("!= \"\""));
        assert!(code.contains("> 1"));
    }

    #[test]
    fn test_unknown_operator() {
        let err = compile(vec![QueryStep::from("Users"), QueryStep::Unknown("pivot".to_string())])
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown query command: pivot");
    }

    #[test]
    fn test_unknown_relation_is_invariant_violation() {
        let err = compile(QueryBuilder::new().from("Nope").build()).unwrap_err();
        assert!(matches!(err, QueryError::Invariant(_)));
    }

    #[test]
    fn test_set_assigns_original_reference() {
        let code = compile(
            QueryBuilder::new()
                .from("Users")
                .set("name", "\"x\"")
                .build(),
        )
        .unwrap();
        assert!(code.contains("this.Users._data[i$0].name = \"x\";"));

        let err = compile(QueryBuilder::new().from("Users").set("nope", "1").build()).unwrap_err();
        assert_eq!(err, QueryError::CannotSet("nope".to_string()));
    }

    #[test]
    fn test_destroy() {
        let code = compile(QueryBuilder::new().from("Users").destroy(&["Users"]).build()).unwrap();
        assert_eq!(code.matches("queuedDeletes.push").count(), 1);
        assert!(code.contains("queuedDeletes.push({t: \"Users\", r: this.Users._data[i$0]});"));

        let err = compile(QueryBuilder::new().from("Users").destroy(&["Tags"]).build()).unwrap_err();
        assert_eq!(err.to_string(), "destroy: no rows in specified tables: Tags");

        let err = compile(QueryBuilder::new().from("Users").destroy(&[]).build()).unwrap_err();
        assert_eq!(err, QueryError::DestroyWithoutTables);
    }

    #[test]
    fn test_left_join_has_both_branches() {
        let code = compile(QueryBuilder::new().from("Orders").left_join("Users").build()).unwrap();
        assert!(code.contains("var lj$Users$found$"));
        assert!(code.contains("if (!lj$Users$found$"));
    }

    #[test]
    fn test_destroy_after_left_join_skips_unmatched_rows() {
        let code = compile(
            QueryBuilder::new()
                .from("Orders")
                .left_join("Users")
                .destroy(&["Users"])
                .build(),
        )
        .unwrap();
        assert_eq!(code.matches("queuedDeletes.push").count(), 1);
        assert!(!code.contains("t: \"Orders\""));
    }

    #[test]
    fn test_call_step_receives_remaining_steps() {
        let steps = vec![
            QueryStep::from("Tags"),
            QueryStep::Call(Continuation::new(|env, rest| {
                assert!(rest.is_empty());
                Ok(b::call_stmt(b::ident("emit"), vec![env.scope()[0].reference.clone()]))
            })),
        ];
        let code = compile(steps).unwrap();
        assert!(code.contains("emit(Tags_label$2);"));
    }
}
