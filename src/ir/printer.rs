//! Render procedural IR as procedure text.
//!
//! Output is what the rendering stage splices after
//! `Owner.prototype.name = `. Parentheses are only emitted where precedence
//! requires them, so printed fragments parse back to the same tree.

use super::{BinaryOp, Declarator, Expr, Function, Literal, Property, Stmt, UnaryOp};

const INDENT: &str = "    ";

const PREC_CONDITIONAL: u8 = 3;
const PREC_UNARY: u8 = 15;
const PREC_POSTFIX: u8 = 19;
const PREC_PRIMARY: u8 = 20;

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Literal(Literal::Int(v)) if *v < 0 => PREC_UNARY,
        Expr::Literal(Literal::Float(v)) if *v < 0.0 => PREC_UNARY,
        Expr::Literal(_) | Expr::Ident(_) | Expr::This | Expr::Object(_) | Expr::Array(_) => {
            PREC_PRIMARY
        }
        Expr::Member { .. } | Expr::Call { .. } | Expr::New { .. } => PREC_POSTFIX,
        Expr::Unary { .. } => PREC_UNARY,
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Conditional { .. } => PREC_CONDITIONAL,
    }
}

/// Render a single expression
pub fn print_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_child(out: &mut String, expr: &Expr, min: u8) {
    if precedence(expr) < min {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_literal(out: &mut String, literal: &Literal) {
    match literal {
        Literal::Null => out.push_str("null"),
        Literal::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Literal::Int(v) => out.push_str(&v.to_string()),
        Literal::Float(v) => out.push_str(&format!("{v:?}")),
        Literal::Str(s) => out.push_str(&serde_json::Value::String(s.clone()).to_string()),
    }
}

fn write_list(out: &mut String, items: &[Expr]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_child(out, item, PREC_CONDITIONAL);
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Literal(literal) => write_literal(out, literal),
        Expr::Ident(name) => out.push_str(name),
        Expr::This => out.push_str("this"),
        Expr::Member { object, property } => {
            write_child(out, object, PREC_POSTFIX);
            match property {
                Property::Named(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                Property::Computed(index) => {
                    out.push('[');
                    write_expr(out, index);
                    out.push(']');
                }
            }
        }
        Expr::Unary { op, arg } => {
            out.push_str(match op {
                UnaryOp::Not => "!",
                UnaryOp::Neg => "-",
                UnaryOp::Plus => "+",
            });
            write_child(out, arg, PREC_UNARY);
        }
        Expr::Binary { op, left, right } => {
            let prec = op.precedence();
            write_child(out, left, prec);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            // left-associative: an equal-precedence right operand needs parens
            write_child(out, right, prec + 1);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            write_child(out, test, PREC_CONDITIONAL + 1);
            out.push_str(" ? ");
            write_child(out, consequent, PREC_CONDITIONAL);
            out.push_str(" : ");
            write_child(out, alternate, PREC_CONDITIONAL);
        }
        Expr::Call { callee, args } => {
            write_child(out, callee, PREC_POSTFIX);
            out.push('(');
            write_list(out, args);
            out.push(')');
        }
        Expr::New { class, args } => {
            out.push_str("new ");
            out.push_str(class);
            out.push('(');
            write_list(out, args);
            out.push(')');
        }
        Expr::Object(fields) => {
            out.push('{');
            for (i, (key, value)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                write_child(out, value, PREC_CONDITIONAL);
            }
            out.push('}');
        }
        Expr::Array(items) => {
            out.push('[');
            write_list(out, items);
            out.push(']');
        }
    }
}

fn write_declarators(out: &mut String, decls: &[Declarator]) {
    out.push_str("var ");
    for (i, decl) in decls.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&decl.name);
        out.push_str(" = ");
        write_child(out, &decl.init, PREC_CONDITIONAL);
    }
}

struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Statements of a nested body, one level deeper
    fn body(&mut self, stmt: &Stmt) {
        self.depth += 1;
        match stmt {
            Stmt::Block(stmts) => stmts.iter().for_each(|s| self.stmt(s)),
            other => self.stmt(other),
        }
        self.depth -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Empty => {}
            Stmt::Expr(expr) => self.line(&format!("{};", print_expr(expr))),
            Stmt::Assign { target, value } => {
                self.line(&format!("{} = {};", print_expr(target), print_expr(value)));
            }
            Stmt::Var(decls) => {
                let mut text = String::new();
                write_declarators(&mut text, decls);
                text.push(';');
                self.line(&text);
            }
            Stmt::Block(stmts) => {
                self.line("{");
                self.depth += 1;
                stmts.iter().for_each(|s| self.stmt(s));
                self.depth -= 1;
                self.line("}");
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.line(&format!("if ({}) {{", print_expr(test)));
                self.body(consequent);
                match alternate {
                    Some(alt) => {
                        self.line("} else {");
                        self.body(alt);
                        self.line("}");
                    }
                    None => self.line("}"),
                }
            }
            Stmt::For(lp) => {
                let mut init = String::new();
                write_declarators(&mut init, &lp.init);
                self.line(&format!(
                    "for ({init}; {}; {}++) {{",
                    print_expr(&lp.test),
                    lp.counter
                ));
                self.body(&lp.body);
                self.line("}");
            }
            Stmt::Return(None) => self.line("return;"),
            Stmt::Return(Some(expr)) => self.line(&format!("return {};", print_expr(expr))),
        }
    }
}

/// Render a whole procedure as `function (params) { ... }`
pub fn print_function(function: &Function) -> String {
    let mut printer = Printer {
        out: format!("function ({}) {{\n", function.params.join(", ")),
        depth: 1,
    };
    function.body.iter().for_each(|s| printer.stmt(s));
    printer.out.push('}');
    printer.out
}

/// Render a statement at top level
pub fn print_stmt(stmt: &Stmt) -> String {
    let mut printer = Printer {
        out: String::new(),
        depth: 0,
    };
    printer.stmt(stmt);
    printer.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_builder as b;

    #[test]
    fn test_precedence_parenthesizes_only_where_needed() {
        let sum = b::binary(BinaryOp::Add, b::ident("a"), b::ident("b"));
        let product = b::binary(BinaryOp::Mul, sum.clone(), b::ident("c"));
        assert_eq!(print_expr(&product), "(a + b) * c");

        let chained = b::binary(BinaryOp::Add, sum, b::ident("c"));
        assert_eq!(print_expr(&chained), "a + b + c");

        let right = b::binary(
            BinaryOp::Sub,
            b::ident("a"),
            b::binary(BinaryOp::Sub, b::ident("b"), b::ident("c")),
        );
        assert_eq!(print_expr(&right), "a - (b - c)");
    }

    #[test]
    fn test_member_and_call() {
        let expr = b::call(
            b::dot(b::index(b::dot(b::this(), "_indices"), b::int(0)), "get"),
            vec![b::ident("hash$1")],
        );
        assert_eq!(print_expr(&expr), "this._indices[0].get(hash$1)");
        assert_eq!(print_expr(&b::not(b::ident("found$2"))), "!found$2");
    }

    #[test]
    fn test_strings_are_escaped() {
        assert_eq!(print_expr(&b::string("a\"b")), "\"a\\\"b\"");
    }

    #[test]
    fn test_for_loop_layout() {
        let stmt = b::simple_for(
            "i$0",
            "len$1",
            b::dot(b::ident("rows"), "length"),
            b::call_stmt(b::ident("f"), vec![b::ident("i$0")]),
        );
        assert_eq!(
            print_stmt(&stmt),
            "for (var i$0 = 0, len$1 = rows.length; i$0 < len$1; i$0++) {\n    f(i$0);\n}\n"
        );
    }

    #[test]
    fn test_function_layout() {
        let func = Function::new(
            vec!["$callback".to_string()],
            vec![b::if_then(b::ident("x"), b::ret(Some(b::boolean(true))))],
        );
        assert_eq!(
            func.to_source(),
            "function ($callback) {\n    if (x) {\n        return true;\n    }\n}"
        );
    }
}
