//! Expression fragment parser.
//!
//! Uses a PEG grammar (`fragment.pest`) for the small expression language
//! embedded in queries, then folds the parse tree into [`ir::Expr`] so that
//! fragments and generated code share one representation. Binary operators
//! associate to the left; precedence follows the grammar's rule nesting.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::error::ResolveError;
use crate::ir::{BinaryOp, Expr, Literal, Property, UnaryOp};
use crate::ir_builder as b;

#[derive(Parser)]
#[grammar = "syntax/fragment.pest"]
struct FragmentParser;

/// Parse one expression fragment such as `u.age >= 18 && name != ""`.
pub fn parse_expression(source: &str) -> Result<Expr, ResolveError> {
    let malformed = |message: String| ResolveError::Malformed {
        fragment: source.trim().to_string(),
        message,
    };

    let mut pairs = FragmentParser::parse(Rule::fragment, source)
        .map_err(|e| malformed(e.variant.message().into_owned()))?;

    let expression = pairs
        .next()
        .and_then(|fragment| fragment.into_inner().next())
        .ok_or_else(|| malformed("empty expression".to_string()))?;

    build(expression).map_err(malformed)
}

fn build(pair: Pair<'_, Rule>) -> Result<Expr, String> {
    match pair.as_rule() {
        Rule::expression => {
            let mut inner = pair.into_inner();
            let test = build(next(&mut inner)?)?;
            match inner.next() {
                Some(consequent) => Ok(Expr::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(build(consequent)?),
                    alternate: Box::new(build(next(&mut inner)?)?),
                }),
                None => Ok(test),
            }
        }
        Rule::logical_or
        | Rule::logical_and
        | Rule::equality
        | Rule::relational
        | Rule::additive
        | Rule::multiplicative => {
            let mut inner = pair.into_inner();
            let mut left = build(next(&mut inner)?)?;
            while let Some(op) = inner.next() {
                let op = BinaryOp::from_symbol(op.as_str())
                    .ok_or_else(|| format!("unknown operator {}", op.as_str()))?;
                let right = build(next(&mut inner)?)?;
                left = b::binary(op, left, right);
            }
            Ok(left)
        }
        Rule::unary => {
            let mut ops = Vec::new();
            let mut operand = None;
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::unary_op => ops.push(match part.as_str() {
                        "!" => UnaryOp::Not,
                        "-" => UnaryOp::Neg,
                        _ => UnaryOp::Plus,
                    }),
                    _ => operand = Some(build(part)?),
                }
            }
            let mut expr = operand.ok_or("missing operand")?;
            for op in ops.into_iter().rev() {
                expr = Expr::Unary {
                    op,
                    arg: Box::new(expr),
                };
            }
            Ok(expr)
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let mut expr = build(next(&mut inner)?)?;
            for suffix in inner {
                expr = match suffix.as_rule() {
                    Rule::member => {
                        let name = next(&mut suffix.into_inner())?;
                        b::dot(expr, name.as_str())
                    }
                    Rule::index => {
                        let index = build(next(&mut suffix.into_inner())?)?;
                        Expr::Member {
                            object: Box::new(expr),
                            property: Property::Computed(Box::new(index)),
                        }
                    }
                    Rule::call_args => {
                        let args = suffix.into_inner().map(build).collect::<Result<_, _>>()?;
                        b::call(expr, args)
                    }
                    other => return Err(format!("unexpected {other:?}")),
                };
            }
            Ok(expr)
        }
        Rule::paren => build(next(&mut pair.into_inner())?),
        Rule::array => Ok(Expr::Array(
            pair.into_inner().map(build).collect::<Result<_, _>>()?,
        )),
        Rule::keyword => Ok(match pair.as_str() {
            "true" => b::boolean(true),
            "false" => b::boolean(false),
            "this" => b::this(),
            _ => b::null(),
        }),
        Rule::identifier => Ok(b::ident(pair.as_str())),
        Rule::number => parse_number(pair.as_str()),
        Rule::string => {
            let inner = next(&mut pair.into_inner())?;
            Ok(Expr::Literal(Literal::Str(unescape(inner.as_str()))))
        }
        other => Err(format!("unexpected {other:?}")),
    }
}

fn next<'i>(pairs: &mut pest::iterators::Pairs<'i, Rule>) -> Result<Pair<'i, Rule>, String> {
    pairs.next().ok_or_else(|| "truncated expression".to_string())
}

fn parse_number(text: &str) -> Result<Expr, String> {
    if let Ok(value) = text.parse::<i64>() {
        return Ok(b::int(value));
    }
    text.parse::<f64>()
        .map(|value| Expr::Literal(Literal::Float(value)))
        .map_err(|e| format!("bad number {text}: {e}"))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
