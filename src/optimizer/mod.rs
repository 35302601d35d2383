//! # Dead-Temporary Pruning
//!
//! Query compilation caches column reads into temporaries generously. Many end
//! up unused, and a downstream minifier cannot drop `var t = row.x` because it
//! cannot rule out a getter on `x`. The generated reads have no side effects,
//! so they are removed here, applied to fixpoint:
//!
//! 1. Count every identifier occurrence in the procedure
//! 2. Drop each declarator whose name occurs exactly once (its declaration)
//! 3. Drop declaration statements left with no declarators
//! 4. Repeat until a pass removes nothing
//!
//! Removing a declarator also removes the names in its initializer, which can
//! leave another temporary with a single occurrence, hence the repetition.
//!
//! ```text
//! Function (from Query Evaluator) -> [Pruning] -> Function -> Printer
//! ```

use std::collections::HashSet;

use crate::ir::{Function, Stmt};

/// Outcome of pruning one procedure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Passes run, including the final one that removed nothing
    pub passes: usize,
    /// Declarators removed in total
    pub removed: usize,
}

/// Prune dead temporaries from `function` in place
pub fn prune_function(function: &mut Function) -> PruneStats {
    let mut stats = PruneStats::default();

    loop {
        stats.passes += 1;
        let dead: HashSet<String> = function
            .ident_counts()
            .into_iter()
            .filter(|&(_, count)| count == 1)
            .map(|(name, _)| name.to_string())
            .collect();

        let mut removed = 0;
        for stmt in &mut function.body {
            removed += remove_declarators(stmt, &dead);
        }
        function.body.retain(|stmt| !stmt.is_empty());

        tracing::trace!(pass = stats.passes, removed, "prune_pass");

        if removed == 0 {
            return stats;
        }
        stats.removed += removed;
    }
}

/// Remove declarators named in `dead`; returns how many were removed
fn remove_declarators(stmt: &mut Stmt, dead: &HashSet<String>) -> usize {
    match stmt {
        Stmt::Var(decls) => {
            let before = decls.len();
            decls.retain(|decl| !dead.contains(&decl.name));
            let removed = before - decls.len();
            if decls.is_empty() {
                *stmt = Stmt::Empty;
            }
            removed
        }
        Stmt::Block(stmts) => {
            let removed = stmts.iter_mut().map(|s| remove_declarators(s, dead)).sum();
            stmts.retain(|s| !s.is_empty());
            if stmts.is_empty() {
                *stmt = Stmt::Empty;
            }
            removed
        }
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            let mut removed = remove_declarators(consequent, dead);
            if let Some(alternate) = alternate {
                removed += remove_declarators(alternate, dead);
            }
            removed
        }
        // loop headers keep their shape; only the body is pruned
        Stmt::For(lp) => remove_declarators(&mut lp.body, dead),
        Stmt::Empty | Stmt::Expr(_) | Stmt::Assign { .. } | Stmt::Return(_) => 0,
    }
}
