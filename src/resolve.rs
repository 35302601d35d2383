//! Identifier resolution for expression fragments.
//!
//! [`resolve_identifiers`] rewrites a parsed fragment against an
//! [`Environment`], replacing every bare name and every `relation.column`
//! with the column's reference expression. The input tree is left untouched;
//! a new tree is returned. Replaced subtrees are not descended into.
//!
//! [`find_names`] is the read-only counterpart used to work out which names a
//! projection depends on.

use crate::environment::{Environment, Lookup, ScopeEntry};
use crate::error::ResolveError;
use crate::ir::{Expr, Property};

/// Rewrite `expr` so every name reads from the environment's scope
pub fn resolve_identifiers(expr: &Expr, env: &Environment) -> Result<Expr, ResolveError> {
    let resolve = |e: &Expr| resolve_identifiers(e, env).map(Box::new);

    match expr {
        Expr::Ident(name) => match env.entry(name) {
            Some(ScopeEntry::Column(column)) => Ok(column.reference.clone()),
            Some(ScopeEntry::Ambiguous) => Err(ResolveError::Ambiguous(name.clone())),
            None if env.is_import(name) => Ok(expr.clone()),
            None => Err(ResolveError::UnknownName(name.clone())),
        },
        Expr::Member {
            object,
            property: Property::Named(property),
        } => match object.as_ref() {
            Expr::Ident(relation) => {
                let dotted = format!("{relation}.{property}");
                match env.get(&dotted) {
                    Lookup::Column(column) => Ok(column.reference.clone()),
                    Lookup::Ambiguous => Err(ResolveError::Ambiguous(dotted)),
                    Lookup::Import => Ok(expr.clone()),
                    Lookup::Missing => Err(ResolveError::UnknownReference(dotted)),
                }
            }
            _ => Ok(Expr::Member {
                object: resolve(object)?,
                property: Property::Named(property.clone()),
            }),
        },
        Expr::Member {
            object,
            property: Property::Computed(index),
        } => Ok(Expr::Member {
            object: resolve(object)?,
            property: Property::Computed(resolve(index)?),
        }),
        Expr::Literal(_) | Expr::This => Ok(expr.clone()),
        Expr::Unary { op, arg } => Ok(Expr::Unary {
            op: *op,
            arg: resolve(arg)?,
        }),
        Expr::Binary { op, left, right } => Ok(Expr::Binary {
            op: *op,
            left: resolve(left)?,
            right: resolve(right)?,
        }),
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => Ok(Expr::Conditional {
            test: resolve(test)?,
            consequent: resolve(consequent)?,
            alternate: resolve(alternate)?,
        }),
        Expr::Call { callee, args } => Ok(Expr::Call {
            callee: resolve(callee)?,
            args: resolve_all(args, env)?,
        }),
        Expr::New { class, args } => Ok(Expr::New {
            class: class.clone(),
            args: resolve_all(args, env)?,
        }),
        Expr::Object(fields) => Ok(Expr::Object(
            fields
                .iter()
                .map(|(key, value)| Ok((key.clone(), resolve_identifiers(value, env)?)))
                .collect::<Result<_, ResolveError>>()?,
        )),
        Expr::Array(items) => Ok(Expr::Array(resolve_all(items, env)?)),
    }
}

fn resolve_all(exprs: &[Expr], env: &Environment) -> Result<Vec<Expr>, ResolveError> {
    exprs.iter().map(|e| resolve_identifiers(e, env)).collect()
}

/// Every bare name and `relation.column` reference in `expr`, in source order
pub fn find_names(expr: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    collect_names(expr, &mut names);
    names
}

fn collect_names(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Ident(name) => names.push(name.clone()),
        Expr::Member {
            object,
            property: Property::Named(property),
        } => match object.as_ref() {
            Expr::Ident(relation) => names.push(format!("{relation}.{property}")),
            other => collect_names(other, names),
        },
        Expr::Member {
            object,
            property: Property::Computed(index),
        } => {
            collect_names(object, names);
            collect_names(index, names);
        }
        Expr::Literal(_) | Expr::This => {}
        Expr::Unary { arg, .. } => collect_names(arg, names),
        Expr::Binary { left, right, .. } => {
            collect_names(left, names);
            collect_names(right, names);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            collect_names(test, names);
            collect_names(consequent, names);
            collect_names(alternate, names);
        }
        Expr::Call { callee, args } => {
            collect_names(callee, names);
            args.iter().for_each(|a| collect_names(a, names));
        }
        Expr::New { args, .. } | Expr::Array(args) => {
            args.iter().for_each(|a| collect_names(a, names));
        }
        Expr::Object(fields) => fields.iter().for_each(|(_, v)| collect_names(v, names)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{ProgramBuilder, TableBuilder};
    use crate::catalog::Catalog;
    use crate::ir::printer::print_expr;
    use crate::ir_builder as b;
    use crate::syntax::parse_expression;
    use std::sync::Arc;

    fn scoped() -> Environment {
        let program = ProgramBuilder::new()
            .table(TableBuilder::new("A").column("id", "int").column("x", "int"))
            .table(TableBuilder::new("B").column("id", "int").column("y", "int"))
            .var("limit", "int", "3")
            .build();
        let root = Environment::new(Arc::new(Catalog::from_program(&program).unwrap()), &[]);
        let a_row = b::ident("a");
        let b_row = b::ident("b");
        let a = root.columns_with_ref("A", Some(&a_row)).unwrap();
        let b_cols = root.columns_with_ref("B", Some(&b_row)).unwrap();
        root.extend_scope(a).extend_scope(b_cols)
    }

    fn resolved(source: &str) -> Result<String, ResolveError> {
        let expr = parse_expression(source)?;
        resolve_identifiers(&expr, &scoped()).map(|e| print_expr(&e))
    }

    #[test]
    fn test_resolves_bare_and_qualified_names() {
        assert_eq!(resolved("x + B.id").unwrap(), "a.x + b.id");
        assert_eq!(resolved("y > limit").unwrap(), "b.y > this.$limit");
    }

    #[test]
    fn test_imports_are_left_alone() {
        assert_eq!(resolved("Math.max(x, y)").unwrap(), "Math.max(a.x, b.y)");
    }

    #[test]
    fn test_ambiguous_and_unknown() {
        assert_eq!(resolved("id == 1"), Err(ResolveError::Ambiguous("id".to_string())));
        assert_eq!(resolved("z"), Err(ResolveError::UnknownName("z".to_string())));
        assert_eq!(
            resolved("C.id"),
            Err(ResolveError::UnknownReference("C.id".to_string()))
        );
    }

    #[test]
    fn test_input_is_not_mutated() {
        let expr = parse_expression("x").unwrap();
        let _ = resolve_identifiers(&expr, &scoped()).unwrap();
        assert_eq!(expr, b::ident("x"));
    }

    #[test]
    fn test_find_names() {
        let expr = parse_expression("Math.pow(u.pos[i], 2) + total").unwrap();
        assert_eq!(find_names(&expr), vec!["Math.pow", "u.pos", "i", "total"]);
    }
}
