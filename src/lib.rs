//! # Bucket
//!
//! Compiler for the Bucket relational schema-and-query language. A program
//! declares typed tables, scalars, enums, views and commands; every public
//! view and command is lowered to a loop-based procedure over in-memory
//! tables, with natural joins turned into unique-index probes where the
//! schema allows it.
//!
//! ## Pipeline
//!
//! ```text
//! Program (JSON)
//!     ↓
//! [Catalog]                 → name → definition, duplicate check
//!     ↓
//! [Environment]             → scope chain, name generator, private vars
//!     ↓
//! [Query evaluator]         → continuation-passing cascade of steps
//!     ├── [Resolver]        → identifiers in fragments → column references
//!     └── [Join planning]   → index probe or nested scan
//!     ↓
//! [IR builder]              → Stmt / Expr trees
//!     ↓
//! [Optimizer]               → fixed-point dead-temporary pruning
//!     ↓
//! [Code generator]          → OutputBundle (tables, scalars, procedures)
//!     ↓
//! [Execution]               → reference interpreter over the bundle
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bucket::{compile, Config, Instance, Program};
//! use bucket::storage::NoFiles;
//!
//! let program = Program::from_json(&std::fs::read_to_string("schema.json")?)?;
//! let bundle = compile(&program, &NoFiles, &Config::default())?;
//! println!("{}", bundle.prototype);
//!
//! let mut instance = Instance::new(&bundle)?;
//! instance.call_view("findByName", |row| println!("{row:?}"))?;
//! ```
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ast` | Input declarations and query steps |
//! | `catalog` | Declaration lookup |
//! | `syntax` | Expression fragment grammar |
//! | `environment` | Compile-time scopes |
//! | `resolve` | Identifier resolution |
//! | `query` | Query evaluator |
//! | `join_planning` | Index probe vs. scan |
//! | `ir` / `ir_builder` | Procedural IR, printer and constructors |
//! | `optimizer` | Dead-temporary pruning |
//! | `code_generator` | Whole-program compilation |
//! | `storage` | Seed data ingestion |
//! | `execution` | Reference interpreter |

pub mod ast;
pub mod catalog;
pub mod config;
pub mod environment;
pub mod error;
pub mod ir;
pub mod ir_builder;
pub mod join_planning;
pub mod optimizer;
pub mod query;
pub mod resolve;
pub mod storage;
pub mod syntax;
pub mod value;

pub mod code_generator; // Whole-program compilation
pub mod execution; // Reference interpreter

pub use ast::Program;
pub use catalog::Catalog;
pub use code_generator::{CodeGenerator, OutputBundle, Procedure, ProcedureKind};
pub use config::Config;
pub use error::{CompileError, InvariantViolation, QueryError, ResolveError};
pub use execution::{ExecutionError, Instance};
pub use storage::{DataProvider, DirectoryProvider, NoFiles, StorageError};
pub use value::Value;

/// Compile `program` with the compiler section of `config`
pub fn compile(
    program: &Program,
    provider: &dyn DataProvider,
    config: &Config,
) -> error::CompileResult<OutputBundle> {
    code_generator::compile(program, provider, &config.compiler)
}
