//! # Code Generator
//!
//! Compiles a whole program into an [`OutputBundle`]: everything the rendering
//! stage needs to assemble a loadable module.
//!
//! ## Pipeline Position
//!
//! ```text
//! Program -> Catalog -> [Code Generator] -> OutputBundle -> rendering / Instance
//!                            |
//!                            |-- scalars     -> constructor properties
//!                            |-- tables      -> code chunks (+ seed rows)
//!                            |-- views       -> procedures (public only)
//!                            |-- commands    -> procedures + flushDeletes
//!                            `-- enums       -> {name, values}
//! ```
//!
//! ## Procedure shapes
//!
//! - view: `function ($callback, $empty)`; every result row calls
//!   `$callback(col..)`, and `$empty()` runs once when no row was produced
//! - view ending in `any`: `function ()` returning a boolean
//! - command: `function ()` followed by `flushDeletes(this)`
//!
//! All procedures of one program share one [`Environment`] root, so
//! temporary names are unique across the bundle.

mod table;

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::ast::{CommandDef, Import, Program, QueryStep, ScalarDef, ScalarKind, ViewDef, Visibility};
use crate::catalog::Catalog;
use crate::config::CompilerConfig;
use crate::environment::{Environment, PrivateVar};
use crate::error::{CompileError, CompileResult, QueryError, QueryResult};
use crate::ir::{BinaryOp, Function, Stmt};
use crate::ir_builder as b;
use crate::optimizer::prune_function;
use crate::query::{evaluate, group, Continuation};
use crate::storage::DataProvider;

pub use table::{ChunkColumn, ExpandedColumn, IndexChunk, InsertArgs, TableChunk};

/// Constructor property for one scalar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalarProp {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub mutable: bool,
    /// Initializer fragment, `null` when none was declared
    pub init: String,
    /// Instance property holding the value, `$<name>`
    #[serde(rename = "privateName")]
    pub priv_name: String,
}

/// Declared enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

/// What a generated procedure does when invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureKind {
    /// Streams rows to `$callback`
    View,
    /// Existence check returning a boolean
    Check,
    /// Mutates tables, then flushes queued deletes
    Command,
}

impl ProcedureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcedureKind::View => "view",
            ProcedureKind::Check => "check",
            ProcedureKind::Command => "command",
        }
    }
}

/// One generated procedure
#[derive(Debug, Clone, Serialize)]
pub struct Procedure {
    pub name: String,
    pub kind: ProcedureKind,
    /// Printed procedure text
    pub source: String,
    #[serde(skip)]
    pub function: Function,
}

/// Everything the rendering stage consumes
#[derive(Debug, Clone, Serialize)]
pub struct OutputBundle {
    pub private_vars: Vec<PrivateVar>,
    pub scalars: Vec<ScalarProp>,
    pub code_chunks: Vec<TableChunk>,
    pub constructor_props: Vec<String>,
    pub imports: Vec<Import>,
    /// `Owner.prototype.name = function (..) {..}` for every procedure,
    /// separated by blank lines
    pub prototype: String,
    pub enum_types: Vec<EnumType>,
    pub tables: Vec<String>,
    pub procedures: Vec<Procedure>,
}

impl OutputBundle {
    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }

    pub fn table(&self, name: &str) -> Option<&TableChunk> {
        self.code_chunks.iter().find(|chunk| chunk.name == name)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Internal class name of a table's storage
pub fn internal_name_for_table(name: &str) -> String {
    format!("Table${name}")
}

/// Compiles one program
pub struct CodeGenerator<'a> {
    config: &'a CompilerConfig,
    provider: &'a dyn DataProvider,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(config: &'a CompilerConfig, provider: &'a dyn DataProvider) -> Self {
        CodeGenerator { config, provider }
    }

    /// Compile every declaration of `program`
    pub fn generate(&self, program: &Program) -> CompileResult<OutputBundle> {
        let catalog = Arc::new(Catalog::from_program(program)?);
        let env = Environment::new(Arc::clone(&catalog), &self.config.extra_imports);

        let scalars = catalog
            .scalars()
            .map(|(name, def)| scalar_prop(name, def))
            .collect::<CompileResult<Vec<_>>>()?;

        let code_chunks = catalog
            .tables()
            .map(|(name, def)| table::code_for_table(name, def, &catalog, self.provider))
            .collect::<CompileResult<Vec<_>>>()?;

        let enum_types = catalog
            .enums()
            .map(|(name, def)| EnumType {
                name: name.to_string(),
                values: def.ty.args.iter().map(|arg| arg.ident.clone()).collect(),
            })
            .collect();

        let procedures = self.procedures(&catalog, &env)?;

        let prototype = procedures
            .iter()
            .map(|p| format!("{}.prototype.{} = {}", self.config.owner_type, p.name, p.source))
            .collect::<Vec<_>>()
            .join("\n\n");

        let tables: Vec<String> = catalog.tables().map(|(name, _)| name.to_string()).collect();
        let constructor_props = tables
            .iter()
            .map(|name| format!("this.{name} = new {}()", internal_name_for_table(name)))
            .collect();

        let bundle = OutputBundle {
            private_vars: env.private_vars(),
            scalars,
            code_chunks,
            constructor_props,
            imports: catalog.imports().to_vec(),
            prototype,
            enum_types,
            tables,
            procedures,
        };

        tracing::info!(
            tables = bundle.tables.len(),
            scalars = bundle.scalars.len(),
            procedures = bundle.procedures.len(),
            private_vars = bundle.private_vars.len(),
            "bundle_compiled"
        );
        Ok(bundle)
    }

    fn procedures(&self, catalog: &Catalog, env: &Environment) -> CompileResult<Vec<Procedure>> {
        let mut jobs: Vec<Job<'_>> = catalog
            .views()
            .filter(|(_, def)| def.visibility == Visibility::Public)
            .map(|(name, def)| Job::View(name, def))
            .collect();
        jobs.extend(catalog.commands().map(|(name, def)| Job::Command(name, def)));

        if self.config.parallel {
            jobs.par_iter().map(|job| self.compile_job(job, env)).collect()
        } else {
            jobs.iter().map(|job| self.compile_job(job, env)).collect()
        }
    }

    fn compile_job(&self, job: &Job<'_>, env: &Environment) -> CompileResult<Procedure> {
        let (name, result, prune) = match job {
            Job::View(name, def) => (*name, code_for_view(def, env), self.config.prune_views),
            Job::Command(name, def) => (
                *name,
                code_for_command(def, env).map(|f| (ProcedureKind::Command, f)),
                self.config.prune_commands,
            ),
        };
        let (kind, mut function) = result.map_err(|e| CompileError::in_declaration(name, e))?;

        let removed = if prune {
            prune_function(&mut function).removed
        } else {
            0
        };
        tracing::debug!(name, kind = ?kind, removed, "procedure_compiled");

        Ok(Procedure {
            name: name.to_string(),
            kind,
            source: function.to_source(),
            function,
        })
    }
}

enum Job<'c> {
    View(&'c str, &'c ViewDef),
    Command(&'c str, &'c CommandDef),
}

/// Compile `program` with the given settings and seed-data provider
pub fn compile(
    program: &Program,
    provider: &dyn DataProvider,
    config: &CompilerConfig,
) -> CompileResult<OutputBundle> {
    CodeGenerator::new(config, provider).generate(program)
}

fn scalar_prop(name: &str, def: &ScalarDef) -> CompileResult<ScalarProp> {
    if def.ty.is_vector() {
        return Err(CompileError::VectorScalar(name.to_string()));
    }
    Ok(ScalarProp {
        name: name.to_string(),
        ty: def.ty.base.clone(),
        mutable: def.scalar == ScalarKind::Var,
        init: def.init.clone().unwrap_or_else(|| "null".to_string()),
        priv_name: format!("${name}"),
    })
}

/// Body of a view; steps up to each `any` become an existence check
fn code_for_view(def: &ViewDef, env: &Environment) -> QueryResult<(ProcedureKind, Function)> {
    let mut body = Vec::new();
    let mut pending: Vec<QueryStep> = Vec::new();

    for step in &def.view {
        if let QueryStep::Any(_) = step {
            body.push(group::any(&pending, env)?);
            pending.clear();
        } else {
            pending.push(step.clone());
        }
    }

    if body.is_empty() {
        let (params, stmts) = code_to_return_relation(pending, env)?;
        return Ok((ProcedureKind::View, Function::new(params, stmts)));
    }
    if !pending.is_empty() {
        return Err(QueryError::StepsAfterGroup("any"));
    }
    Ok((ProcedureKind::Check, Function::new(Vec::new(), body)))
}

/// `var found = false; <query calling $callback>; if ($empty && !found) $empty();`
fn code_to_return_relation(
    mut steps: Vec<QueryStep>,
    env: &Environment,
) -> QueryResult<(Vec<String>, Vec<Stmt>)> {
    let found = env.unique_name("found");
    let flag = found.clone();

    steps.push(QueryStep::Call(Continuation::new(move |env, _| {
        let row = env.scope().iter().map(|c| c.reference.clone()).collect();
        Ok(b::block(vec![
            b::assign(b::ident(&flag), b::boolean(true)),
            b::call_stmt(b::ident("$callback"), row),
        ]))
    })));

    let body = vec![
        b::var(&found, b::boolean(false)),
        evaluate(&steps, env)?,
        b::if_then(
            b::binary(BinaryOp::And, b::ident("$empty"), b::not(b::ident(&found))),
            b::call_stmt(b::ident("$empty"), Vec::new()),
        ),
    ];
    Ok((vec!["$callback".to_string(), "$empty".to_string()], body))
}

fn code_for_command(def: &CommandDef, env: &Environment) -> QueryResult<Function> {
    let body = evaluate(&def.command, env)?;
    Ok(Function::new(
        Vec::new(),
        vec![body, b::call_stmt(b::ident("flushDeletes"), vec![b::this()])],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{ProgramBuilder, QueryBuilder, TableBuilder, ViewBuilder};
    use crate::ast::{Projection, TypeSpec};
    use crate::storage::NoFiles;

    fn users() -> TableBuilder {
        TableBuilder::new("Users")
            .column("id", "int")
            .column("name", "string")
            .unique(&["id"])
    }

    fn generate(program: &Program) -> CompileResult<OutputBundle> {
        compile(program, &NoFiles, &CompilerConfig::default())
    }

    #[test]
    fn test_view_calls_back_with_scope() {
        let program = ProgramBuilder::new()
            .table(users())
            .view(ViewBuilder::public("names").from("Users").project(vec![Projection::column("name")]))
            .build();
        let bundle = generate(&program).unwrap();

        let proc = bundle.procedure("names").unwrap();
        assert_eq!(proc.kind, ProcedureKind::View);
        assert!(proc.source.starts_with("function ($callback, $empty) {"));
        assert!(proc.source.contains("$callback(Users_name$"));
        assert!(proc.source.contains("if ($empty && !found$"));
        // the id column is never read, so its temporary is pruned
        assert!(!proc.source.contains("Users_id$"));
        assert!(bundle.prototype.starts_with("Bucket.prototype.names = function"));
    }

    #[test]
    fn test_private_views_are_not_emitted() {
        let program = ProgramBuilder::new()
            .table(users())
            .view(ViewBuilder::private("hidden").from("Users"))
            .view(ViewBuilder::public("shown").from("hidden"))
            .build();
        let bundle = generate(&program).unwrap();
        assert!(bundle.procedure("hidden").is_none());
        assert!(bundle.procedure("shown").is_some());
    }

    #[test]
    fn test_any_view_is_a_check() {
        let program = ProgramBuilder::new()
            .table(users())
            .view(ViewBuilder::public("hasUsers").from("Users").any())
            .build();
        let proc = generate(&program).unwrap().procedure("hasUsers").cloned().unwrap();
        assert_eq!(proc.kind, ProcedureKind::Check);
        assert!(proc.function.params.is_empty());
        assert!(proc.source.contains("return true;"));
        assert!(proc.source.contains("return false;"));
    }

    #[test]
    fn test_steps_after_any_are_rejected() {
        let program = ProgramBuilder::new()
            .table(users())
            .view(ViewBuilder::public("odd").from("Users").any().filter("id > 1"))
            .build();
        let err = generate(&program).unwrap_err();
        assert_eq!(err.to_string(), "while evaluating odd: steps after any() are not supported");
    }

    #[test]
    fn test_command_flushes_deletes() {
        let program = ProgramBuilder::new()
            .table(users())
            .command("purge", QueryBuilder::new().from("Users").filter("id > 1").destroy(&["Users"]))
            .build();
        let proc = generate(&program).unwrap().procedure("purge").cloned().unwrap();
        assert_eq!(proc.kind, ProcedureKind::Command);
        assert!(proc.source.trim_end_matches('}').trim_end().ends_with("flushDeletes(this);"));
    }

    #[test]
    fn test_scalar_props() {
        let program = ProgramBuilder::new()
            .var("count", "int", "0")
            .scalar("limit", ScalarKind::Val, TypeSpec::scalar("int"), None)
            .build();
        let bundle = generate(&program).unwrap();
        assert_eq!(
            bundle.scalars[0],
            ScalarProp {
                name: "count".to_string(),
                ty: "int".to_string(),
                mutable: true,
                init: "0".to_string(),
                priv_name: "$count".to_string(),
            }
        );
        assert!(!bundle.scalars[1].mutable);
        assert_eq!(bundle.scalars[1].init, "null");
    }

    #[test]
    fn test_vector_scalar_is_rejected() {
        let program = ProgramBuilder::new()
            .scalar("v", ScalarKind::Var, TypeSpec::vector("float", 3), None)
            .build();
        let err = generate(&program).unwrap_err();
        assert_eq!(err.to_string(), "Scalar v is a vector; this is unsupported");
    }

    #[test]
    fn test_query_errors_name_the_declaration() {
        let program = ProgramBuilder::new()
            .table(users())
            .view(ViewBuilder::public("broken").from("Users").filter("nope > 1"))
            .build();
        match generate(&program).unwrap_err() {
            CompileError::InDeclaration { name, source } => {
                assert_eq!(name, "broken");
                assert!(matches!(source, QueryError::Resolve(_)));
            }
            other => panic!("expected InDeclaration, got {other:?}"),
        }
    }

    #[test]
    fn test_constructor_props_enums_and_prune_switch() {
        let program = ProgramBuilder::new()
            .table(users())
            .enumeration("Color", &["red", "blue"])
            .view(ViewBuilder::public("all").from("Users"))
            .build();
        let config = CompilerConfig {
            prune_views: false,
            owner_type: "Store".to_string(),
            ..CompilerConfig::default()
        };
        let bundle = compile(&program, &NoFiles, &config).unwrap();

        assert_eq!(bundle.constructor_props, vec!["this.Users = new Table$Users()"]);
        assert_eq!(bundle.enum_types[0].values, vec!["red", "blue"]);
        assert!(bundle.prototype.starts_with("Store.prototype.all"));
        assert!(bundle.procedure("all").unwrap().source.contains("Users_id$"));
    }

    #[test]
    fn test_parallel_matches_sequential_shape() {
        let program = ProgramBuilder::new()
            .table(users())
            .view(ViewBuilder::public("a").from("Users"))
            .view(ViewBuilder::public("b").from("Users").filter("id > 2"))
            .command("c", QueryBuilder::new().from("Users").destroy(&["Users"]))
            .build();
        let config = CompilerConfig {
            parallel: true,
            ..CompilerConfig::default()
        };
        let bundle = compile(&program, &NoFiles, &config).unwrap();
        let names: Vec<&str> = bundle.procedures.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_bundle_serializes() {
        let program = ProgramBuilder::new()
            .table(users())
            .view(ViewBuilder::public("all").from("Users"))
            .build();
        let json: serde_json::Value =
            serde_json::from_str(&generate(&program).unwrap().to_json().unwrap()).unwrap();
        assert_eq!(json["tables"][0], "Users");
        assert_eq!(json["procedures"][0]["kind"], "view");
        assert_eq!(json["code_chunks"][0]["klass"], "Table$Users");
    }
}
