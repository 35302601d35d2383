//! Procedural IR emitted by query compilation.
//!
//! A deliberately small imperative grammar: expressions (literals, names,
//! member access, operators, calls) and statements (declarations, assignment,
//! blocks, conditionals, counted loops). Every compiler stage builds it through
//! [`crate::ir_builder`]; [`printer`] renders it as procedure text.

pub mod printer;

use std::collections::HashMap;

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::NotEq,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNotEq,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::LtEq,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::GtEq,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    /// Binding strength, higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 4,
            BinaryOp::And => 5,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => 9,
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => 10,
            BinaryOp::Add | BinaryOp::Sub => 12,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 13,
        }
    }
}

/// Property side of a member access
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// `object.name`
    Named(String),
    /// `object[expr]`
    Computed(Box<Expr>),
}

/// Expression nodes
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    This,
    Member {
        object: Box<Expr>,
        property: Property,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `new Class(args)`
    New {
        class: String,
        args: Vec<Expr>,
    },
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
}

impl Expr {
    pub fn is_ident(&self) -> bool {
        matches!(self, Expr::Ident(_))
    }

    /// `a.b` when both sides are plain names
    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Expr::Member {
                object,
                property: Property::Named(property),
            } => match object.as_ref() {
                Expr::Ident(object) => Some(format!("{object}.{property}")),
                _ => None,
            },
            _ => None,
        }
    }

    /// Visit every identifier occurrence; named member properties and object
    /// keys are not identifiers
    pub fn for_each_ident<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Expr::Ident(name) => f(name),
            Expr::Literal(_) | Expr::This => {}
            Expr::Member { object, property } => {
                object.for_each_ident(f);
                if let Property::Computed(index) = property {
                    index.for_each_ident(f);
                }
            }
            Expr::Unary { arg, .. } => arg.for_each_ident(f),
            Expr::Binary { left, right, .. } => {
                left.for_each_ident(f);
                right.for_each_ident(f);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                test.for_each_ident(f);
                consequent.for_each_ident(f);
                alternate.for_each_ident(f);
            }
            Expr::Call { callee, args } => {
                callee.for_each_ident(f);
                for arg in args {
                    arg.for_each_ident(&mut *f);
                }
            }
            Expr::New { args, .. } | Expr::Array(args) => {
                for arg in args {
                    arg.for_each_ident(&mut *f);
                }
            }
            Expr::Object(fields) => {
                for (_, value) in fields {
                    value.for_each_ident(&mut *f);
                }
            }
        }
    }
}

/// One `name = init` inside a declaration statement
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub init: Expr,
}

/// `for (init; test; counter++) body`
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub init: Vec<Declarator>,
    pub test: Expr,
    pub counter: String,
    pub body: Stmt,
}

/// Statement nodes
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Empty,
    Expr(Expr),
    Assign {
        target: Expr,
        value: Expr,
    },
    Var(Vec<Declarator>),
    Block(Vec<Stmt>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    For(Box<ForLoop>),
    Return(Option<Expr>),
}

impl Stmt {
    pub fn is_empty(&self) -> bool {
        matches!(self, Stmt::Empty)
    }

    /// Visit every identifier occurrence, declared names included
    pub fn for_each_ident<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Stmt::Empty | Stmt::Return(None) => {}
            Stmt::Expr(e) | Stmt::Return(Some(e)) => e.for_each_ident(f),
            Stmt::Assign { target, value } => {
                target.for_each_ident(f);
                value.for_each_ident(f);
            }
            Stmt::Var(decls) => {
                for decl in decls {
                    f(&decl.name);
                    decl.init.for_each_ident(f);
                }
            }
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    stmt.for_each_ident(&mut *f);
                }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                test.for_each_ident(f);
                consequent.for_each_ident(f);
                if let Some(alt) = alternate {
                    alt.for_each_ident(f);
                }
            }
            Stmt::For(lp) => {
                for decl in &lp.init {
                    f(&decl.name);
                    decl.init.for_each_ident(f);
                }
                lp.test.for_each_ident(f);
                f(&lp.counter);
                lp.body.for_each_ident(f);
            }
        }
    }
}

/// A generated procedure
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn new(params: Vec<String>, body: Vec<Stmt>) -> Self {
        Function { params, body }
    }

    /// Occurrence count of every identifier in the body
    pub fn ident_counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for param in &self.params {
            *counts.entry(param.as_str()).or_insert(0) += 1;
        }
        for stmt in &self.body {
            stmt.for_each_ident(&mut |name| *counts.entry(name).or_insert(0) += 1);
        }
        counts
    }

    /// Render as procedure text
    pub fn to_source(&self) -> String {
        printer::print_function(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_builder as b;

    #[test]
    fn test_ident_counts_skip_member_properties() {
        let row = b::index(b::dot(b::this(), "_data"), b::ident("i$0"));
        let func = Function::new(
            vec![],
            vec![
                b::var("name$1", b::dot(row.clone(), "name")),
                b::call_stmt(b::ident("emit"), vec![b::ident("name$1")]),
            ],
        );
        let counts = func.ident_counts();
        assert_eq!(counts.get("name$1"), Some(&2));
        assert_eq!(counts.get("i$0"), Some(&1));
        assert_eq!(counts.get("_data"), None);
    }

    #[test]
    fn test_dotted_name() {
        assert_eq!(b::dot(b::ident("u"), "id").dotted_name(), Some("u.id".to_string()));
        assert_eq!(b::dot(b::this(), "id").dotted_name(), None);
    }

    #[test]
    fn test_binary_op_symbols_round_trip() {
        for op in [BinaryOp::StrictEq, BinaryOp::LtEq, BinaryOp::Or, BinaryOp::Rem] {
            assert_eq!(BinaryOp::from_symbol(op.symbol()), Some(op));
        }
    }
}
