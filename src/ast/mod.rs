//! Abstract Syntax Tree for Bucket programs
//!
//! The front-end hands the compiler an ordered list of `{declaration,
//! definition}` pairs plus import descriptors. This module is the typed, serde
//! model of that hand-off:
//!
//! - **Declaration**: a unique name bound to a [`Definition`]
//! - **Definition**: scalar, table, view, command or enumeration
//! - **QueryStep**: one relational operator in a view or command body
//!
//! ## Example
//!
//! ```rust
//! use bucket::ast::Program;
//!
//! let program = Program::from_json(r#"{
//!     "declarations": [
//!         {"declaration": "Users", "definition": {
//!             "table": [{"name": "id", "type": ["int"]}, {"name": "name", "type": ["string"]}],
//!             "meta": [{"func": "unique", "args": [{"ident": "id"}]}]
//!         }},
//!         {"declaration": "all", "definition": {
//!             "view": [{"func": "from", "args": [{"ident": "Users"}]}],
//!             "visibility": "public"
//!         }}
//!     ]
//! }"#).unwrap();
//! assert_eq!(program.declarations.len(), 2);
//! ```

pub mod builders;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::query::Continuation;

/// A whole program as delivered by the front-end
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Program {
    pub declarations: Vec<Declaration>,
    #[serde(default)]
    pub imports: Vec<Import>,
}

impl Program {
    pub fn new(declarations: Vec<Declaration>, imports: Vec<Import>) -> Self {
        Program {
            declarations,
            imports,
        }
    }

    /// Decode the front-end's JSON hand-off
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}

/// A named declaration
#[derive(Debug, Clone, Deserialize)]
pub struct Declaration {
    #[serde(rename = "declaration")]
    pub name: String,
    pub definition: Definition,
}

impl Declaration {
    pub fn new(name: impl Into<String>, definition: Definition) -> Self {
        Declaration {
            name: name.into(),
            definition,
        }
    }
}

/// An externally provided name usable inside expression fragments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub localname: String,
}

/// What a declaration binds its name to
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Definition {
    Scalar(ScalarDef),
    Table(TableDef),
    View(ViewDef),
    Command(CommandDef),
    Enum(EnumDef),
}

impl Definition {
    pub fn kind(&self) -> DeclarationKind {
        match self {
            Definition::Scalar(_) => DeclarationKind::Scalar,
            Definition::Table(_) => DeclarationKind::Table,
            Definition::View(_) => DeclarationKind::View,
            Definition::Command(_) => DeclarationKind::Command,
            Definition::Enum(_) => DeclarationKind::Enum,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Scalar,
    Table,
    View,
    Command,
    Enum,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeclarationKind::Scalar => "scalar",
            DeclarationKind::Table => "table",
            DeclarationKind::View => "view",
            DeclarationKind::Command => "command",
            DeclarationKind::Enum => "enum",
        };
        write!(f, "{name}")
    }
}

/// `val`/`var` scalar
#[derive(Debug, Clone, Deserialize)]
pub struct ScalarDef {
    pub scalar: ScalarKind,
    #[serde(rename = "type")]
    pub ty: TypeSpec,
    /// Initializer as an expression fragment
    #[serde(default)]
    pub init: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Val,
    Var,
}

/// `[baseType, vectorLength?]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "TypeSpecRepr")]
pub struct TypeSpec {
    pub base: String,
    pub length: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TypeSpecRepr {
    Sized(String, Option<usize>),
    Plain((String,)),
    Bare(String),
}

impl From<TypeSpecRepr> for TypeSpec {
    fn from(repr: TypeSpecRepr) -> Self {
        match repr {
            TypeSpecRepr::Sized(base, length) => TypeSpec { base, length },
            TypeSpecRepr::Plain((base,)) | TypeSpecRepr::Bare(base) => TypeSpec { base, length: None },
        }
    }
}

impl TypeSpec {
    pub fn scalar(base: &str) -> Self {
        TypeSpec {
            base: base.to_string(),
            length: None,
        }
    }

    pub fn vector(base: &str, length: usize) -> Self {
        TypeSpec {
            base: base.to_string(),
            length: Some(length),
        }
    }

    pub fn is_vector(&self) -> bool {
        self.length.is_some()
    }

    /// Typed-array constructor backing a vector of this base type
    pub fn native_array(&self) -> Option<&'static str> {
        native_array(&self.base)
    }
}

/// Typed-array constructor for a base type, if it has one
pub fn native_array(base: &str) -> Option<&'static str> {
    match base {
        "int8" => Some("Int8Array"),
        "uint8" => Some("Uint8Array"),
        "int16" => Some("Int16Array"),
        "uint16" => Some("Uint16Array"),
        "int" | "int32" => Some("Int32Array"),
        "uint32" => Some("Uint32Array"),
        "float32" => Some("Float32Array"),
        "float" | "float64" | "double" => Some("Float64Array"),
        _ => None,
    }
}

/// Table definition: typed columns plus metadata
#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    pub table: Vec<ColumnDecl>,
    #[serde(default)]
    pub meta: Vec<Meta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeSpec,
}

/// Table metadata such as `source("users.csv")` or `unique(id)`
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub func: String,
    #[serde(default)]
    pub args: Vec<MetaArg>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetaArg {
    Ident(RelationRef),
    Path(String),
}

/// View definition
#[derive(Debug, Clone, Deserialize)]
pub struct ViewDef {
    pub view: Vec<QueryStep>,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    #[serde(other)]
    Private,
}

/// Command definition
#[derive(Debug, Clone, Deserialize)]
pub struct CommandDef {
    pub command: Vec<QueryStep>,
}

/// Enumeration definition
#[derive(Debug, Clone, Deserialize)]
pub struct EnumDef {
    #[serde(rename = "type")]
    pub ty: EnumType,
    #[serde(rename = "enum")]
    pub is_enum: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnumType {
    pub args: Vec<Ident>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ident {
    pub ident: String,
}

/// A relation named in a query, optionally aliased
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationRef {
    pub ident: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl RelationRef {
    pub fn new(ident: &str) -> Self {
        RelationRef {
            ident: ident.to_string(),
            alias: None,
        }
    }

    pub fn aliased(ident: &str, alias: &str) -> Self {
        RelationRef {
            ident: ident.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    /// The name the relation's columns are qualified with
    pub fn visible_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.ident)
    }
}

/// Raw expression fragment text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Fragment {
    pub javascript: String,
}

impl Fragment {
    pub fn new(source: impl Into<String>) -> Self {
        Fragment {
            javascript: source.into(),
        }
    }
}

/// Target column of a `set`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SetTarget {
    pub ident: String,
}

/// Variable captured by a derived projection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalVar {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeSpec,
}

/// One entry of a `project` list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Projection {
    /// Existing column, `*` or `rel.*`
    Column {
        ident: String,
        #[serde(default)]
        alias: Option<String>,
    },
    /// Column computed from an expression
    Derived {
        javascript: String,
        #[serde(default)]
        vars: Vec<LocalVar>,
        #[serde(default)]
        alias: Option<String>,
    },
}

impl Projection {
    pub fn column(ident: &str) -> Self {
        Projection::Column {
            ident: ident.to_string(),
            alias: None,
        }
    }

    pub fn aliased(ident: &str, alias: &str) -> Self {
        Projection::Column {
            ident: ident.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    pub fn all() -> Self {
        Projection::column("*")
    }

    pub fn derived(javascript: &str, alias: Option<&str>) -> Self {
        Projection::Derived {
            javascript: javascript.to_string(),
            vars: Vec::new(),
            alias: alias.map(str::to_string),
        }
    }

    /// Name this projection makes available
    pub fn provides(&self) -> Option<&str> {
        match self {
            Projection::Column { ident, alias } => Some(alias.as_deref().unwrap_or(ident)),
            Projection::Derived { alias, .. } => alias.as_deref(),
        }
    }
}

/// One relational operator in a query
#[derive(Clone, Deserialize)]
#[serde(try_from = "RawStep")]
pub enum QueryStep {
    From(Vec<RelationRef>),
    Product(Vec<RelationRef>),
    Join(Vec<RelationRef>),
    LeftJoin(Vec<RelationRef>),
    Where(Vec<Fragment>),
    Project(Vec<Projection>),
    Set(SetTarget, Fragment),
    Destroy(Vec<RelationRef>),
    /// Existence check: the query yields `true` at its first row
    Any(Vec<RelationRef>),
    /// Host-supplied continuation spliced into the cascade
    Call(Continuation),
    /// Operator name the front-end produced but the compiler does not know
    Unknown(String),
}

impl QueryStep {
    /// Operator name as written in source
    pub fn func(&self) -> &str {
        match self {
            QueryStep::From(_) => "from",
            QueryStep::Product(_) => "product",
            QueryStep::Join(_) => "join",
            QueryStep::LeftJoin(_) => "leftJoin",
            QueryStep::Where(_) => "where",
            QueryStep::Project(_) => "project",
            QueryStep::Set(..) => "set",
            QueryStep::Destroy(_) => "destroy",
            QueryStep::Any(_) => "any",
            QueryStep::Call(_) => "$call",
            QueryStep::Unknown(func) => func,
        }
    }

    pub fn from(ident: &str) -> Self {
        QueryStep::From(vec![RelationRef::new(ident)])
    }

    pub fn filter(javascript: &str) -> Self {
        QueryStep::Where(vec![Fragment::new(javascript)])
    }
}

impl fmt::Debug for QueryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStep::From(args)
            | QueryStep::Product(args)
            | QueryStep::Join(args)
            | QueryStep::LeftJoin(args)
            | QueryStep::Destroy(args)
            | QueryStep::Any(args) => f.debug_tuple(self.func()).field(args).finish(),
            QueryStep::Where(args) => f.debug_tuple("where").field(args).finish(),
            QueryStep::Project(args) => f.debug_tuple("project").field(args).finish(),
            QueryStep::Set(target, value) => {
                f.debug_tuple("set").field(target).field(value).finish()
            }
            QueryStep::Call(_) => write!(f, "$call(..)"),
            QueryStep::Unknown(func) => write!(f, "{func}(?)"),
        }
    }
}

#[derive(Deserialize)]
struct RawStep {
    func: String,
    #[serde(default)]
    args: serde_json::Value,
}

impl TryFrom<RawStep> for QueryStep {
    type Error = serde_json::Error;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let args = raw.args;
        let step = match raw.func.as_str() {
            "from" => QueryStep::From(serde_json::from_value(args)?),
            "product" => QueryStep::Product(serde_json::from_value(args)?),
            "join" => QueryStep::Join(serde_json::from_value(args)?),
            "leftJoin" => QueryStep::LeftJoin(serde_json::from_value(args)?),
            "where" => QueryStep::Where(serde_json::from_value(args)?),
            "project" => QueryStep::Project(serde_json::from_value(args)?),
            "set" => {
                let (target, value) = serde_json::from_value(args)?;
                QueryStep::Set(target, value)
            }
            "destroy" => QueryStep::Destroy(serde_json::from_value(args)?),
            "any" => QueryStep::Any(if args.is_null() {
                Vec::new()
            } else {
                serde_json::from_value(args)?
            }),
            _ => QueryStep::Unknown(raw.func),
        };
        Ok(step)
    }
}
