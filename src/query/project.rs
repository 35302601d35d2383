//! Projection helpers: the column entries each kind of projection produces,
//! and the ordering fix-up for projection lists whose derived expressions
//! use names that sibling projections introduce.

use crate::ast::{LocalVar, Projection, QueryStep};
use crate::environment::{Column, Environment, Lookup, ScopeEntry};
use crate::error::{QueryError, QueryResult, ResolveError};
use crate::resolve::{find_names, resolve_identifiers};
use crate::syntax::parse_expression;

/// Placeholder relation for derived columns, so they can be qualified and
/// joined against later
pub const DERIVED_RELATION: &str = "$derived";

/// Existing column under a new name (the last path segment by default)
pub fn project_column(env: &Environment, ident: &str, alias: Option<&str>) -> QueryResult<Column> {
    let name = alias.unwrap_or_else(|| ident.rsplit('.').next().unwrap_or(ident));
    match env.entry(ident) {
        Some(ScopeEntry::Column(column)) => Ok(Column {
            name: name.to_string(),
            ..column.clone()
        }),
        Some(ScopeEntry::Ambiguous) => Err(ResolveError::Ambiguous(ident.to_string()).into()),
        None if ident.contains('.') => Err(ResolveError::UnknownReference(ident.to_string()).into()),
        None => Err(ResolveError::UnknownName(ident.to_string()).into()),
    }
}

/// `*` or `relation.*`
pub fn project_all(env: &Environment, relation: Option<&str>) -> QueryResult<Vec<Column>> {
    match relation {
        Some(relation) => {
            let columns: Vec<Column> = env
                .scope()
                .iter()
                .filter(|c| c.relation.as_deref() == Some(relation))
                .cloned()
                .collect();
            if columns.is_empty() {
                return Err(QueryError::NoColumns(relation.to_string()));
            }
            Ok(columns)
        }
        None => Ok(env.scope().to_vec()),
    }
}

/// Column computed from an expression fragment.
///
/// Captured `vars` are bound to instance-private typed arrays; at most one is
/// supported and it gives the column its type.
pub fn project_derived(
    env: &Environment,
    javascript: &str,
    vars: &[LocalVar],
    alias: Option<&str>,
) -> QueryResult<Column> {
    let name = match alias {
        Some(alias) => alias.to_string(),
        None => env.unique_name("$calc"),
    };
    let expr = parse_expression(javascript)?;

    let (ty, length, expr) = match vars {
        [] => (None, None, resolve_identifiers(&expr, env)?),
        [var] => {
            let local = Column {
                name: var.name.clone(),
                ty: Some(var.ty.base.clone()),
                length: var.ty.length,
                relation: None,
                table: None,
                reference: env.new_closure(&var.name, &var.ty)?,
                row_ref: None,
                original: None,
            };
            let scoped = env.with_locals(vec![local]);
            (
                Some(var.ty.base.clone()),
                var.ty.length,
                resolve_identifiers(&expr, &scoped)?,
            )
        }
        _ => {
            return Err(QueryError::Arity {
                operator: "derived projection vars",
                expected: 1,
                got: vars.len(),
            })
        }
    };

    Ok(Column {
        name,
        ty,
        length,
        relation: Some(DERIVED_RELATION.to_string()),
        table: None,
        reference: expr,
        row_ref: None,
        original: None,
    })
}

fn requires(projection: &Projection) -> QueryResult<Vec<String>> {
    match projection {
        Projection::Column { ident, .. } if ident == "*" || ident.ends_with(".*") => Ok(Vec::new()),
        Projection::Column { ident, .. } => Ok(vec![ident.clone()]),
        Projection::Derived { javascript, .. } => Ok(find_names(&parse_expression(javascript)?)),
    }
}

/// Names a projection needs from its environment; captured vars excluded
fn dependencies(projection: &Projection) -> QueryResult<Vec<String>> {
    let mut names = requires(projection)?;
    if let Projection::Derived { vars, .. } = projection {
        names.retain(|name| !vars.iter().any(|v| &v.name == name));
    }
    Ok(names)
}

fn summary(projection: &Projection) -> String {
    match projection {
        Projection::Column { ident, .. } => ident.clone(),
        Projection::Derived { javascript, .. } => javascript.trim().to_string(),
    }
}

/// `project(*, p)` steps that must run before `args` so every dependency
/// is satisfied. Empty when nothing needs reordering.
pub fn prerequisites(args: &[Projection], env: &Environment) -> QueryResult<Vec<QueryStep>> {
    let mut available = env.available_names();
    let is_met = |projection: &Projection, available: &[String]| -> QueryResult<bool> {
        Ok(dependencies(projection)?.iter().all(|name| {
            available.contains(name) || !matches!(env.get(name), Lookup::Missing)
        }))
    };

    let mut steps = Vec::new();
    let mut added: Vec<usize> = Vec::new();

    loop {
        let mut unmet = Vec::new();
        let mut met = Vec::new();
        for (position, projection) in args.iter().enumerate() {
            if is_met(projection, &available)? {
                met.push(position);
            } else {
                unmet.push(position);
            }
        }
        if unmet.is_empty() {
            break;
        }

        let mut progressed = false;
        for position in met {
            if added.contains(&position) {
                continue;
            }
            let Some(provides) = args[position].provides() else {
                continue;
            };
            if available.iter().any(|name| name == provides) {
                continue;
            }
            available.push(provides.to_string());
            added.push(position);
            progressed = true;
            steps.push(QueryStep::Project(vec![
                Projection::all(),
                args[position].clone(),
            ]));
        }

        if !progressed {
            let stuck = &args[unmet[0]];
            let missing: Vec<String> = dependencies(stuck)?
                .into_iter()
                .filter(|name| !available.contains(name))
                .collect();
            return Err(QueryError::MissingNames {
                summary: summary(stuck),
                missing: missing.join(", "),
            });
        }
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{ProgramBuilder, TableBuilder};
    use crate::ast::TypeSpec;
    use crate::catalog::Catalog;
    use crate::ir::printer::print_expr;
    use crate::ir_builder as b;
    use std::sync::Arc;

    fn scoped() -> Environment {
        let program = ProgramBuilder::new()
            .table(TableBuilder::new("P").column("x", "int").column("y", "int"))
            .build();
        let root = Environment::new(Arc::new(Catalog::from_program(&program).unwrap()), &[]);
        let row = b::ident("row");
        root.extend_scope(root.columns_with_ref("P", Some(&row)).unwrap())
    }

    #[test]
    fn test_project_column_renames() {
        let column = project_column(&scoped(), "P.x", None).unwrap();
        assert_eq!(column.name, "x");
        assert_eq!(column.relation.as_deref(), Some("P"));

        let column = project_column(&scoped(), "x", Some("px")).unwrap();
        assert_eq!(column.name, "px");

        assert!(project_column(&scoped(), "Q.x", None).is_err());
    }

    #[test]
    fn test_project_all_by_relation() {
        let env = scoped();
        assert_eq!(project_all(&env, Some("P")).unwrap().len(), 2);
        assert_eq!(project_all(&env, None).unwrap().len(), 2);
        assert_eq!(
            project_all(&env, Some("Q")).unwrap_err(),
            QueryError::NoColumns("Q".to_string())
        );
    }

    #[test]
    fn test_project_derived() {
        let column = project_derived(&scoped(), "x + y", &[], Some("sum")).unwrap();
        assert_eq!(column.relation.as_deref(), Some(DERIVED_RELATION));
        assert_eq!(print_expr(&column.reference), "row.x + row.y");
        assert!(column.ty.is_none());

        let unnamed = project_derived(&scoped(), "x * 2", &[], None).unwrap();
        assert!(unnamed.name.starts_with("$calc$"));
    }

    #[test]
    fn test_project_derived_with_captured_var() {
        let env = scoped();
        let vars = vec![LocalVar {
            name: "acc".to_string(),
            ty: TypeSpec::vector("float", 2),
        }];
        let column = project_derived(&env, "acc[0] + x", &vars, Some("total")).unwrap();
        assert_eq!(column.ty.as_deref(), Some("float"));
        assert_eq!(column.length, Some(2));
        assert!(print_expr(&column.reference).starts_with("$priv$acc$"));
        assert_eq!(env.private_vars().len(), 1);

        let two = vec![vars[0].clone(), vars[0].clone()];
        assert!(project_derived(&env, "acc", &two, None).is_err());
    }

    #[test]
    fn test_prerequisites_order_dependent_projections() {
        let args = vec![
            Projection::derived("double * 2", Some("quad")),
            Projection::derived("x * 2", Some("double")),
        ];
        let steps = prerequisites(&args, &scoped()).unwrap();
        assert_eq!(steps.len(), 1);
        assert!(matches!(&steps[0], QueryStep::Project(p) if p[1].provides() == Some("double")));

        let independent = vec![Projection::column("x"), Projection::derived("y + 1", Some("z"))];
        assert!(prerequisites(&independent, &scoped()).unwrap().is_empty());
    }

    #[test]
    fn test_prerequisites_missing_names() {
        let args = vec![Projection::derived("ghost + 1", Some("g"))];
        let err = prerequisites(&args, &scoped()).unwrap_err();
        assert_eq!(err.to_string(), "Missing names for 'ghost + 1': ghost");
    }
}
