//! Environment / scope model
//!
//! An [`Environment`] records which columns are visible at one point while a
//! query is compiled. Nodes are immutable and chained to their parent:
//! [`Environment::replace_scope`] and [`Environment::extend_scope`] always
//! build a new child, so sibling branches (the two arms of a left join, say)
//! never observe each other's changes.
//!
//! Each node carries a merged scope index:
//!
//! ```text
//!   scalars           (base layer)
//!   scope columns     overrides scalars
//!     rel.col         always set
//!     col             Column, or Ambiguous when two relations provide it
//! ```
//!
//! Compilation-wide services (catalog, imports, the temporary-name counter,
//! private closure variables) live in a shared [`Globals`] block owned by the
//! root of the chain.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::ast::{native_array, TypeSpec};
use crate::catalog::Catalog;
use crate::error::InvariantViolation;
use crate::ir::{Declarator, Expr, Stmt};
use crate::ir_builder as b;

/// One visible column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Base type; unknown for derived columns without captured variables
    pub ty: Option<String>,
    /// Element count of a fixed-length vector column
    pub length: Option<usize>,
    /// Relation the column is currently qualified with; renamed by aliasing
    pub relation: Option<String>,
    /// Table the column originally came from, kept across renames
    pub table: Option<String>,
    /// How generated code reads the column's current value
    pub reference: Expr,
    /// Row the value was read from, when it came from a table row
    pub row_ref: Option<Expr>,
    /// Reference before the value was cached into a temporary
    pub original: Option<Expr>,
}

impl Column {
    /// `relation.name`, or the bare name for unqualified columns
    pub fn qualified_name(&self) -> String {
        match &self.relation {
            Some(relation) => format!("{relation}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_vector(&self) -> bool {
        self.length.is_some()
    }
}

/// Scope index entry
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeEntry {
    Column(Column),
    /// Unqualified name provided by more than one relation
    Ambiguous,
}

/// Result of [`Environment::get`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Column(&'a Column),
    Ambiguous,
    /// Externally provided name such as `Math`
    Import,
    Missing,
}

/// Monotonic counter minting unique temporary names within one compilation
#[derive(Debug, Default)]
pub struct NameGen {
    next: AtomicUsize,
}

impl NameGen {
    pub fn new() -> Self {
        NameGen::default()
    }

    /// `stem$N`, unique for the lifetime of this generator
    pub fn unique(&self, stem: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{stem}${n}")
    }
}

/// Instance-private variable backing a captured closure variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivateVar {
    pub name: String,
    /// Initializer text, e.g. `new Float64Array(3)`
    pub init: String,
    /// Typed-array constructor and length, for the interpreter
    #[serde(skip)]
    pub native: &'static str,
    #[serde(skip)]
    pub length: usize,
}

/// State shared by every environment of one compilation
#[derive(Debug)]
pub struct Globals {
    catalog: Arc<Catalog>,
    imports: Vec<String>,
    names: NameGen,
    private_vars: Mutex<Vec<PrivateVar>>,
    scalars: Vec<Column>,
}

struct Node {
    globals: Arc<Globals>,
    parent: Option<Environment>,
    /// `None` until the first relation is brought into scope
    scope: Option<Arc<[Column]>>,
    index: HashMap<String, ScopeEntry>,
}

/// Immutable, chained compilation scope
#[derive(Clone)]
pub struct Environment {
    node: Arc<Node>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.scope().iter().map(Column::qualified_name).collect();
        f.debug_struct("Environment").field("scope", &names).finish()
    }
}

impl Environment {
    /// Root environment: no scope, scalars and imports visible
    pub fn new(catalog: Arc<Catalog>, extra_imports: &[String]) -> Self {
        let mut imports: Vec<String> = catalog
            .imports()
            .iter()
            .map(|import| import.localname.clone())
            .collect();
        imports.extend(extra_imports.iter().cloned());
        imports.push("Math".to_string());

        let scalars = catalog
            .scalars()
            .map(|(name, def)| scalar_column(name, &def.ty))
            .collect::<Vec<_>>();

        let globals = Arc::new(Globals {
            catalog,
            imports,
            names: NameGen::new(),
            private_vars: Mutex::new(Vec::new()),
            scalars,
        });

        let mut index = HashMap::new();
        for column in &globals.scalars {
            index.insert(column.name.clone(), ScopeEntry::Column(column.clone()));
        }

        Environment {
            node: Arc::new(Node {
                globals,
                parent: None,
                scope: None,
                index,
            }),
        }
    }

    fn child(&self, scope: Option<Arc<[Column]>>, index: HashMap<String, ScopeEntry>) -> Self {
        Environment {
            node: Arc::new(Node {
                globals: Arc::clone(&self.node.globals),
                parent: Some(self.clone()),
                scope,
                index,
            }),
        }
    }

    /// Child whose scope is exactly `columns`
    pub fn replace_scope(&self, columns: Vec<Column>) -> Self {
        let index = self.build_index(&columns);
        self.child(Some(columns.into()), index)
    }

    /// Child whose scope is this scope followed by `columns`
    pub fn extend_scope(&self, columns: Vec<Column>) -> Self {
        let mut scope = self.scope().to_vec();
        scope.extend(columns);
        self.replace_scope(scope)
    }

    /// Child with extra unqualified names that are not part of the scope,
    /// such as captured closure variables
    pub fn with_locals(&self, locals: Vec<Column>) -> Self {
        let mut index = self.node.index.clone();
        for local in locals {
            index.insert(local.name.clone(), ScopeEntry::Column(local));
        }
        self.child(self.node.scope.clone(), index)
    }

    fn build_index(&self, scope: &[Column]) -> HashMap<String, ScopeEntry> {
        let mut layer: HashMap<String, ScopeEntry> = HashMap::new();
        for column in scope {
            match &column.relation {
                Some(relation) => {
                    let entry = if layer.contains_key(&column.name) {
                        ScopeEntry::Ambiguous
                    } else {
                        ScopeEntry::Column(column.clone())
                    };
                    layer.insert(column.name.clone(), entry);
                    layer.insert(
                        format!("{relation}.{}", column.name),
                        ScopeEntry::Column(column.clone()),
                    );
                }
                // unqualified columns are local and clobber whatever is there
                None => {
                    layer.insert(column.name.clone(), ScopeEntry::Column(column.clone()));
                }
            }
        }

        let mut index: HashMap<String, ScopeEntry> = self
            .node
            .globals
            .scalars
            .iter()
            .map(|c| (c.name.clone(), ScopeEntry::Column(c.clone())))
            .collect();
        index.extend(layer);
        index
    }

    /// The root of this environment's chain
    pub fn root(&self) -> Environment {
        let mut env = self;
        while let Some(parent) = &env.node.parent {
            env = parent;
        }
        env.clone()
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.node.parent.as_ref()
    }

    /// Columns in scope, in order; empty before the first relation
    pub fn scope(&self) -> &[Column] {
        self.node.scope.as_deref().unwrap_or(&[])
    }

    /// True until some operator has brought a relation into scope
    pub fn has_scope(&self) -> bool {
        self.node.scope.is_some()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.node.globals.catalog
    }

    /// Scope index entry for a name, without the import fallback
    pub fn entry(&self, name: &str) -> Option<&ScopeEntry> {
        self.node.index.get(name)
    }

    /// Resolve a possibly dotted name against the scope, then imports
    pub fn get(&self, name: &str) -> Lookup<'_> {
        match self.node.index.get(name) {
            Some(ScopeEntry::Column(column)) => Lookup::Column(column),
            Some(ScopeEntry::Ambiguous) => Lookup::Ambiguous,
            None => {
                let head = name.split('.').next().unwrap_or(name);
                if self.is_import(head) {
                    Lookup::Import
                } else {
                    Lookup::Missing
                }
            }
        }
    }

    pub fn is_import(&self, name: &str) -> bool {
        self.node.globals.imports.iter().any(|import| import == name)
    }

    /// Every name resolvable in this environment
    pub fn available_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.node.index.keys().cloned().collect();
        names.extend(self.node.globals.imports.iter().cloned());
        names
    }

    /// Fully qualified spelling of a name in scope
    pub fn canonicalize(&self, name: &str) -> Option<String> {
        match self.entry(name)? {
            ScopeEntry::Column(column) => Some(column.qualified_name()),
            ScopeEntry::Ambiguous => None,
        }
    }

    /// Mint a unique temporary name
    pub fn unique_name(&self, stem: &str) -> String {
        self.node.globals.names.unique(stem)
    }

    /// Store each named column's reference in a fresh temporary.
    ///
    /// Names that are unknown, ambiguous, outside the scope, or whose
    /// reference is already a bare identifier are skipped. Returns the
    /// declaration (empty when nothing was cached) and the environment whose
    /// columns read the temporaries.
    pub fn cache_names(&self, names: &[String]) -> (Stmt, Environment) {
        let mut scope = self.scope().to_vec();
        let mut declarators: Vec<Declarator> = Vec::new();
        let mut seen = HashSet::new();

        for name in names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let Some(ScopeEntry::Column(target)) = self.entry(name) else {
                continue;
            };
            if target.reference.is_ident() {
                continue;
            }
            let Some(column) = scope.iter_mut().find(|c| *c == target) else {
                continue;
            };

            let temp = self.unique_name(&format!(
                "{}_{}",
                column.relation.as_deref().unwrap_or(""),
                column.name
            ));
            let reference = std::mem::replace(&mut column.reference, b::ident(&temp));
            if column.original.is_none() {
                column.original = Some(reference.clone());
            }
            declarators.push(b::declarator(&temp, reference));
        }

        if declarators.is_empty() {
            (Stmt::Empty, self.clone())
        } else {
            (b::var_many(declarators), self.replace_scope(scope))
        }
    }

    /// `this.<table>._data`
    pub fn table_data(&self, table: &str) -> Result<Expr, InvariantViolation> {
        self.catalog().table(table)?;
        Ok(b::dot(b::dot(b::this(), table), "_data"))
    }

    /// Declared columns of a table, qualified with the table's name
    pub fn columns(&self, table: &str) -> Result<Vec<Column>, InvariantViolation> {
        self.columns_with_ref(table, None)
    }

    /// Columns of a table read through `row_ref.<column>`; without a row the
    /// references are placeholders for comparing shapes
    pub fn columns_with_ref(
        &self,
        table: &str,
        row_ref: Option<&Expr>,
    ) -> Result<Vec<Column>, InvariantViolation> {
        self.catalog()
            .table_columns(table)?
            .iter()
            .map(|decl| {
                if decl.ty.is_vector() && decl.ty.native_array().is_none() {
                    return Err(InvariantViolation::new(format!(
                        "Invalid type: {}",
                        decl.ty.base
                    )));
                }
                let reference = match row_ref {
                    Some(row) => b::dot(row.clone(), &decl.name),
                    None => b::dot(b::ident(table), &decl.name),
                };
                Ok(Column {
                    name: decl.name.clone(),
                    ty: Some(decl.ty.base.clone()),
                    length: decl.ty.length,
                    relation: Some(table.to_string()),
                    table: Some(table.to_string()),
                    reference,
                    row_ref: row_ref.cloned(),
                    original: None,
                })
            })
            .collect()
    }

    /// Pseudo-column reading a scalar, `this.$<name>`
    pub fn var_column(&self, name: &str) -> Result<Column, InvariantViolation> {
        let def = self.catalog().scalar(name)?;
        Ok(scalar_column(name, &def.ty))
    }

    /// Index usable for probing `table` on `join_columns`.
    ///
    /// Only a single join column matched by a single-column unique index
    /// qualifies; returns `this.<table>._indices[k]`.
    pub fn index_for(
        &self,
        table: &str,
        join_columns: &[Column],
    ) -> Result<Option<Expr>, InvariantViolation> {
        let [column] = join_columns else {
            return Ok(None);
        };
        if !matches!(
            self.catalog().definition(table)?,
            crate::ast::Definition::Table(_)
        ) {
            return Ok(None);
        }
        let slot = self
            .catalog()
            .unique_indexes(table)?
            .iter()
            .position(|index| index.len() == 1 && index[0] == column.name);

        Ok(slot.map(|k| {
            b::index(
                b::dot(b::dot(b::this(), table), "_indices"),
                b::int(k as i64),
            )
        }))
    }

    /// Allocate an instance-private typed array for a captured variable
    pub fn new_closure(&self, name: &str, ty: &TypeSpec) -> Result<Expr, InvariantViolation> {
        let native = native_array(&ty.base)
            .ok_or_else(|| InvariantViolation::new(format!("Unknown type: {}", ty.base)))?;
        let length = ty.length.unwrap_or(1);
        let private_name = format!("$priv${}", self.unique_name(name));
        self.node.globals.private_vars.lock().push(PrivateVar {
            name: private_name.clone(),
            init: format!("new {native}({length})"),
            native,
            length,
        });
        Ok(b::ident(&private_name))
    }

    /// Private variables allocated so far by this compilation
    pub fn private_vars(&self) -> Vec<PrivateVar> {
        self.node.globals.private_vars.lock().clone()
    }
}

fn scalar_column(name: &str, ty: &TypeSpec) -> Column {
    Column {
        name: name.to_string(),
        ty: Some(ty.base.clone()),
        length: ty.length,
        relation: None,
        table: None,
        reference: b::dot(b::this(), &format!("${name}")),
        row_ref: None,
        original: None,
    }
}
