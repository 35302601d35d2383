//! Group steps: operators that reduce all rows of a query to one result.

use crate::ast::QueryStep;
use crate::environment::Environment;
use crate::error::QueryResult;
use crate::ir::Stmt;
use crate::ir_builder as b;

use super::{evaluate, Continuation};

/// Existence check: return `true` at the first row `steps` produce, `false`
/// once they are exhausted
pub fn any(steps: &[QueryStep], env: &Environment) -> QueryResult<Stmt> {
    let mut steps = steps.to_vec();
    steps.push(QueryStep::Call(Continuation::new(|_, _| {
        Ok(b::ret(Some(b::boolean(true))))
    })));

    Ok(b::block(vec![
        evaluate(&steps, env)?,
        b::ret(Some(b::boolean(false))),
    ]))
}
