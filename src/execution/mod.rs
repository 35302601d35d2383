//! Reference execution of compiled bundles.
//!
//! An [`Instance`] is the runtime object the generated prototype methods are
//! attached to: one store per table, the unique indexes over it, the scalar
//! properties and the private closure variables. Procedures run through a
//! tree-walking interpreter over the same IR the printer renders, so the
//! behavior observed here is the behavior of the emitted text.
//!
//! ```rust,ignore
//! let bundle = bucket::compile(&program, &NoFiles, &Config::default())?;
//! let mut instance = Instance::new(&bundle)?;
//! instance.call_view("findByName", |row| println!("{row:?}"))?;
//! instance.run_command("removeAll")?;
//! ```

mod index;
mod interpreter;
mod ops;

use std::collections::HashMap;

pub use index::{hash_values, IndexKey, UniqueIndex};

use crate::code_generator::{OutputBundle, ProcedureKind};
use crate::error::ResolveError;
use crate::ir::Function;
use crate::syntax::parse_expression;
use crate::value::{Row, Value};

use interpreter::{Frame, Host};

/// Runtime error raised while executing generated code
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("No procedure named {0}")]
    UnknownProcedure(String),

    #[error("{name} is not a {expected}")]
    WrongKind { name: String, expected: &'static str },

    #[error("{0} is not defined")]
    UnknownName(String),

    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("Duplicate key in {table} unique({columns})")]
    UniqueViolation { table: String, columns: String },

    /// A scalar initializer did not parse
    #[error("Parse error: {0}")]
    Parse(#[from] ResolveError),
}

/// Result type for execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Rows of one table plus its unique indexes
#[derive(Debug, Clone)]
pub(crate) struct TableStore {
    pub data: Vec<Row>,
    pub indices: Vec<UniqueIndex>,
}

impl TableStore {
    fn reindex(&mut self) -> ExecutionResult<()> {
        for index in &mut self.indices {
            index.rebuild(&self.data)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CompiledProcedure {
    kind: ProcedureKind,
    function: Function,
}

/// A live object built from an [`OutputBundle`]
#[derive(Debug)]
pub struct Instance {
    pub(crate) tables: HashMap<String, TableStore>,
    /// Keyed by property name, `$x` for scalar `x`
    pub(crate) scalars: HashMap<String, Value>,
    pub(crate) private_vars: HashMap<String, Value>,
    pub(crate) imports: Vec<String>,
    pub(crate) queued_deletes: Vec<Value>,
    procedures: HashMap<String, CompiledProcedure>,
}

impl Instance {
    /// Build tables from seed rows, then evaluate scalar initializers
    pub fn new(bundle: &OutputBundle) -> ExecutionResult<Self> {
        let mut tables = HashMap::new();
        for chunk in &bundle.code_chunks {
            let data: Vec<Row> = chunk
                .seed_rows
                .iter()
                .map(|seed| {
                    let fields = seed
                        .fields
                        .iter()
                        .map(|field| (field.name.clone(), detach(&field.value)))
                        .collect();
                    Row::new(&chunk.name, fields)
                })
                .collect();
            let indices = chunk
                .indices
                .iter()
                .map(|index| UniqueIndex::new(&chunk.name, index.columns.clone()))
                .collect();
            let mut store = TableStore { data, indices };
            store.reindex()?;
            tables.insert(chunk.name.clone(), store);
        }

        let private_vars = bundle
            .private_vars
            .iter()
            .map(|var| (var.name.clone(), Value::vector(vec![0.0; var.length])))
            .collect();

        let mut instance = Instance {
            tables,
            scalars: HashMap::new(),
            private_vars,
            imports: bundle.imports.iter().map(|i| i.localname.clone()).collect(),
            queued_deletes: Vec::new(),
            procedures: bundle
                .procedures
                .iter()
                .map(|p| {
                    let compiled = CompiledProcedure {
                        kind: p.kind,
                        function: p.function.clone(),
                    };
                    (p.name.clone(), compiled)
                })
                .collect(),
        };

        for scalar in &bundle.scalars {
            let expr = parse_expression(&scalar.init)?;
            let value = Frame::new(&mut instance, Host::none()).value_of(&expr)?;
            instance.scalars.insert(scalar.priv_name.clone(), value);
        }

        tracing::debug!(
            tables = instance.tables.len(),
            scalars = instance.scalars.len(),
            procedures = instance.procedures.len(),
            "instance_created"
        );
        Ok(instance)
    }

    /// Run a public view, handing each result row to `on_row`.
    /// Returns whether any row was produced.
    pub fn call_view(
        &mut self,
        name: &str,
        mut on_row: impl FnMut(&[Value]),
    ) -> ExecutionResult<bool> {
        let mut produced = false;
        let mut on_row = |row: &[Value]| {
            produced = true;
            on_row(row);
        };
        self.invoke(
            name,
            ProcedureKind::View,
            Host {
                on_row: Some(&mut on_row),
                on_empty: None,
            },
        )?;
        Ok(produced)
    }

    /// Like [`Instance::call_view`], with `on_empty` passed as `$empty`
    pub fn call_view_or_else(
        &mut self,
        name: &str,
        mut on_row: impl FnMut(&[Value]),
        mut on_empty: impl FnMut(),
    ) -> ExecutionResult<()> {
        self.invoke(
            name,
            ProcedureKind::View,
            Host {
                on_row: Some(&mut on_row),
                on_empty: Some(&mut on_empty),
            },
        )?;
        Ok(())
    }

    /// Run an existence check
    pub fn check(&mut self, name: &str) -> ExecutionResult<bool> {
        let value = self.invoke(name, ProcedureKind::Check, Host::none())?;
        Ok(value.truthy())
    }

    /// Run a command; queued deletes are applied by the command itself
    pub fn run_command(&mut self, name: &str) -> ExecutionResult<()> {
        self.invoke(name, ProcedureKind::Command, Host::none())?;
        for store in self.tables.values_mut() {
            store.reindex()?;
        }
        Ok(())
    }

    /// Current rows of a table
    pub fn rows(&self, table: &str) -> ExecutionResult<&[Row]> {
        Ok(&self.table(table)?.data)
    }

    /// Current value of scalar `name`
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        self.scalars.get(&format!("${name}"))
    }

    /// Overwrite scalar `name`, as assigning `this.$name` would
    pub fn set_scalar(&mut self, name: &str, value: Value) -> ExecutionResult<()> {
        match self.scalars.get_mut(&format!("${name}")) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ExecutionError::UnknownName(name.to_string())),
        }
    }

    pub(crate) fn table(&self, name: &str) -> ExecutionResult<&TableStore> {
        self.tables
            .get(name)
            .ok_or_else(|| ExecutionError::UnknownName(format!("this.{name}")))
    }

    /// Remove every queued `{t, r}` row from its table
    pub(crate) fn flush_deletes(&mut self) -> ExecutionResult<()> {
        let queued = std::mem::take(&mut self.queued_deletes);
        let mut removed = 0usize;
        for entry in &queued {
            let (table, row) = match entry {
                Value::Record(fields) => {
                    let field = |key: &str| {
                        fields
                            .iter()
                            .find(|(k, _)| k == key)
                            .map(|(_, v)| v.clone())
                    };
                    match (field("t"), field("r")) {
                        (Some(Value::String(table)), Some(Value::Row(row))) => (table, row),
                        _ => {
                            return Err(ExecutionError::TypeError(format!(
                                "malformed queued delete {entry}"
                            )))
                        }
                    }
                }
                other => {
                    return Err(ExecutionError::TypeError(format!(
                        "malformed queued delete {other}"
                    )))
                }
            };
            let store = self
                .tables
                .get_mut(table.as_ref())
                .ok_or_else(|| ExecutionError::UnknownName(format!("this.{table}")))?;
            let before = store.data.len();
            store.data.retain(|r| !r.same_row(&row));
            removed += before - store.data.len();
        }
        tracing::trace!(queued = queued.len(), removed, "deletes_flushed");
        Ok(())
    }

    fn invoke(&mut self, name: &str, kind: ProcedureKind, host: Host<'_>) -> ExecutionResult<Value> {
        let procedure = self
            .procedures
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownProcedure(name.to_string()))?;
        if procedure.kind != kind {
            return Err(ExecutionError::WrongKind {
                name: name.to_string(),
                expected: kind.as_str(),
            });
        }
        let mut frame = Frame::new(self, host);
        frame.bind_params(&procedure.function.params);
        frame.run(&procedure.function.body)
    }
}

/// Vectors are shared by reference; give each instance its own copy
fn detach(value: &Value) -> Value {
    match value {
        Value::Vector(data) => Value::vector(data.lock().clone()),
        other => other.clone(),
    }
}
