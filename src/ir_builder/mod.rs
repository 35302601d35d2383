//! # IR Builder
//!
//! Constructors for the procedural IR. Every stage that emits code goes
//! through these so the tree keeps a few shape guarantees:
//!
//! - [`block`] flattens nested blocks and drops empty statements, and a
//!   single statement is returned as-is rather than wrapped
//! - [`simple_for`] always produces the counted-loop shape
//!   `for (var i = 0, len = n; i < len; i++) body`
//!
//! ```text
//! Query Evaluator -> [IR Builder] -> Stmt/Expr tree -> Pruning -> Printer
//! ```

use crate::ir::{BinaryOp, Declarator, Expr, ForLoop, Literal, Property, Stmt, UnaryOp};

// Expressions

pub fn literal(value: Literal) -> Expr {
    Expr::Literal(value)
}

pub fn null() -> Expr {
    Expr::Literal(Literal::Null)
}

pub fn boolean(value: bool) -> Expr {
    Expr::Literal(Literal::Bool(value))
}

pub fn int(value: i64) -> Expr {
    Expr::Literal(Literal::Int(value))
}

pub fn string(value: &str) -> Expr {
    Expr::Literal(Literal::Str(value.to_string()))
}

pub fn ident(name: &str) -> Expr {
    Expr::Ident(name.to_string())
}

pub fn this() -> Expr {
    Expr::This
}

/// `object.property`
pub fn dot(object: Expr, property: &str) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: Property::Named(property.to_string()),
    }
}

/// `object[index]`
pub fn index(object: Expr, index: Expr) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: Property::Computed(Box::new(index)),
    }
}

pub fn not(arg: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::Not,
        arg: Box::new(arg),
    }
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Left-folded `a && b && c`; `true` for an empty list
pub fn and_all(terms: Vec<Expr>) -> Expr {
    terms
        .into_iter()
        .reduce(|acc, term| binary(BinaryOp::And, acc, term))
        .unwrap_or_else(|| boolean(true))
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        args,
    }
}

pub fn new_instance(class: &str, args: Vec<Expr>) -> Expr {
    Expr::New {
        class: class.to_string(),
        args,
    }
}

pub fn object(fields: Vec<(&str, Expr)>) -> Expr {
    Expr::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

// Statements

pub fn empty() -> Stmt {
    Stmt::Empty
}

/// Expression evaluated for its effect
pub fn stmt(expr: Expr) -> Stmt {
    Stmt::Expr(expr)
}

pub fn call_stmt(callee: Expr, args: Vec<Expr>) -> Stmt {
    Stmt::Expr(call(callee, args))
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::Assign { target, value }
}

pub fn declarator(name: &str, init: Expr) -> Declarator {
    Declarator {
        name: name.to_string(),
        init,
    }
}

/// `var name = init;`
pub fn var(name: &str, init: Expr) -> Stmt {
    Stmt::Var(vec![declarator(name, init)])
}

/// `var a = x, b = y;`, or nothing when there are no declarators
pub fn var_many(decls: Vec<Declarator>) -> Stmt {
    if decls.is_empty() {
        Stmt::Empty
    } else {
        Stmt::Var(decls)
    }
}

pub fn if_then(test: Expr, consequent: Stmt) -> Stmt {
    Stmt::If {
        test,
        consequent: Box::new(consequent),
        alternate: None,
    }
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return(value)
}

/// Combine statements into one
///
/// Nested blocks are spliced in and empty statements dropped. Zero statements
/// give [`Stmt::Empty`], exactly one is returned unchanged.
pub fn block(stmts: Vec<Stmt>) -> Stmt {
    match stmts.len() {
        0 => Stmt::Empty,
        1 => stmts.into_iter().next().unwrap_or(Stmt::Empty),
        _ => {
            let mut body = Vec::with_capacity(stmts.len());
            for stmt in stmts {
                match stmt {
                    Stmt::Block(inner) => body.extend(inner),
                    Stmt::Empty => {}
                    other => body.push(other),
                }
            }
            Stmt::Block(body)
        }
    }
}

/// Counted loop over `0..iterations`, caching the bound in `length`
pub fn simple_for(counter: &str, length: &str, iterations: Expr, body: Stmt) -> Stmt {
    Stmt::For(Box::new(ForLoop {
        init: vec![declarator(counter, int(0)), declarator(length, iterations)],
        test: binary(BinaryOp::Lt, ident(counter), ident(length)),
        counter: counter.to_string(),
        body,
    }))
}
