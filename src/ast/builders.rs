//! Builder Patterns for AST Construction
//!
//! Fluent APIs for assembling programs without going through JSON, mostly
//! used by tests and benchmarks.
//!
//! ## Example
//!
//! ```rust
//! use bucket::ast::builders::{ProgramBuilder, TableBuilder, ViewBuilder};
//!
//! let program = ProgramBuilder::new()
//!     .table(
//!         TableBuilder::new("Users")
//!             .column("id", "int")
//!             .column("name", "string")
//!             .unique(&["id"]),
//!     )
//!     .view(ViewBuilder::public("byName").from("Users").filter("name == target"))
//!     .var("target", "string", "\"b\"")
//!     .build();
//!
//! assert_eq!(program.declarations.len(), 3);
//! ```

use super::{
    ColumnDecl, CommandDef, Declaration, Definition, EnumDef, EnumType, Fragment, Ident, Import,
    Meta, MetaArg, Program, Projection, QueryStep, RelationRef, ScalarDef, ScalarKind, SetTarget,
    TableDef, TypeSpec, ViewDef, Visibility,
};

// TableBuilder
/// Builder for table declarations
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: Vec<ColumnDecl>,
    meta: Vec<Meta>,
}

impl TableBuilder {
    pub fn new(name: &str) -> Self {
        TableBuilder {
            name: name.to_string(),
            columns: Vec::new(),
            meta: Vec::new(),
        }
    }

    pub fn column(mut self, name: &str, base: &str) -> Self {
        self.columns.push(ColumnDecl {
            name: name.to_string(),
            ty: TypeSpec::scalar(base),
        });
        self
    }

    pub fn vector_column(mut self, name: &str, base: &str, length: usize) -> Self {
        self.columns.push(ColumnDecl {
            name: name.to_string(),
            ty: TypeSpec::vector(base, length),
        });
        self
    }

    /// Declare a uniqueness constraint over `columns`
    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.meta.push(Meta {
            func: "unique".to_string(),
            args: columns
                .iter()
                .map(|c| MetaArg::Ident(RelationRef::new(c)))
                .collect(),
        });
        self
    }

    /// Seed the table from a file served by the data provider
    pub fn source(mut self, file: &str) -> Self {
        self.meta.push(Meta {
            func: "source".to_string(),
            args: vec![MetaArg::Path(file.to_string())],
        });
        self
    }

    pub fn build(self) -> Declaration {
        Declaration::new(
            self.name,
            Definition::Table(TableDef {
                table: self.columns,
                meta: self.meta,
            }),
        )
    }
}

// QueryBuilder
/// Accumulates query steps for views and commands
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    steps: Vec<QueryStep>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder::default()
    }

    pub fn step(mut self, step: QueryStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn from(self, relation: &str) -> Self {
        self.step(QueryStep::From(vec![RelationRef::new(relation)]))
    }

    pub fn from_as(self, relation: &str, alias: &str) -> Self {
        self.step(QueryStep::From(vec![RelationRef::aliased(relation, alias)]))
    }

    pub fn product(self, relations: &[&str]) -> Self {
        self.step(QueryStep::Product(
            relations.iter().map(|r| RelationRef::new(r)).collect(),
        ))
    }

    pub fn join(self, relation: &str) -> Self {
        self.step(QueryStep::Join(vec![RelationRef::new(relation)]))
    }

    pub fn left_join(self, relation: &str) -> Self {
        self.step(QueryStep::LeftJoin(vec![RelationRef::new(relation)]))
    }

    pub fn filter(self, javascript: &str) -> Self {
        self.step(QueryStep::Where(vec![Fragment::new(javascript)]))
    }

    pub fn project(self, projections: Vec<Projection>) -> Self {
        self.step(QueryStep::Project(projections))
    }

    pub fn set(self, column: &str, javascript: &str) -> Self {
        self.step(QueryStep::Set(
            SetTarget {
                ident: column.to_string(),
            },
            Fragment::new(javascript),
        ))
    }

    pub fn destroy(self, tables: &[&str]) -> Self {
        self.step(QueryStep::Destroy(
            tables.iter().map(|t| RelationRef::new(t)).collect(),
        ))
    }

    pub fn any(self) -> Self {
        self.step(QueryStep::Any(Vec::new()))
    }

    pub fn build(self) -> Vec<QueryStep> {
        self.steps
    }
}

// ViewBuilder
/// Builder for view declarations
#[derive(Debug, Clone)]
pub struct ViewBuilder {
    name: String,
    visibility: Visibility,
    query: QueryBuilder,
}

impl ViewBuilder {
    pub fn public(name: &str) -> Self {
        ViewBuilder {
            name: name.to_string(),
            visibility: Visibility::Public,
            query: QueryBuilder::new(),
        }
    }

    pub fn private(name: &str) -> Self {
        ViewBuilder {
            visibility: Visibility::Private,
            ..ViewBuilder::public(name)
        }
    }

    pub fn from(mut self, relation: &str) -> Self {
        self.query = self.query.from(relation);
        self
    }

    pub fn from_as(mut self, relation: &str, alias: &str) -> Self {
        self.query = self.query.from_as(relation, alias);
        self
    }

    pub fn product(mut self, relations: &[&str]) -> Self {
        self.query = self.query.product(relations);
        self
    }

    pub fn join(mut self, relation: &str) -> Self {
        self.query = self.query.join(relation);
        self
    }

    pub fn left_join(mut self, relation: &str) -> Self {
        self.query = self.query.left_join(relation);
        self
    }

    pub fn filter(mut self, javascript: &str) -> Self {
        self.query = self.query.filter(javascript);
        self
    }

    pub fn project(mut self, projections: Vec<Projection>) -> Self {
        self.query = self.query.project(projections);
        self
    }

    pub fn any(mut self) -> Self {
        self.query = self.query.any();
        self
    }

    pub fn step(mut self, step: QueryStep) -> Self {
        self.query = self.query.step(step);
        self
    }

    pub fn build(self) -> Declaration {
        Declaration::new(
            self.name,
            Definition::View(ViewDef {
                view: self.query.build(),
                visibility: self.visibility,
            }),
        )
    }
}

// ProgramBuilder
/// Builder for whole programs
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    declarations: Vec<Declaration>,
    imports: Vec<Import>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        ProgramBuilder::default()
    }

    pub fn declaration(mut self, declaration: Declaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn table(self, table: TableBuilder) -> Self {
        self.declaration(table.build())
    }

    pub fn view(self, view: ViewBuilder) -> Self {
        self.declaration(view.build())
    }

    pub fn command(self, name: &str, query: QueryBuilder) -> Self {
        self.declaration(Declaration::new(
            name,
            Definition::Command(CommandDef {
                command: query.build(),
            }),
        ))
    }

    /// Mutable scalar with an initializer fragment
    pub fn var(self, name: &str, base: &str, init: &str) -> Self {
        self.scalar(name, ScalarKind::Var, TypeSpec::scalar(base), Some(init))
    }

    /// Immutable scalar with an initializer fragment
    pub fn val(self, name: &str, base: &str, init: &str) -> Self {
        self.scalar(name, ScalarKind::Val, TypeSpec::scalar(base), Some(init))
    }

    pub fn scalar(self, name: &str, kind: ScalarKind, ty: TypeSpec, init: Option<&str>) -> Self {
        self.declaration(Declaration::new(
            name,
            Definition::Scalar(ScalarDef {
                scalar: kind,
                ty,
                init: init.map(str::to_string),
            }),
        ))
    }

    pub fn enumeration(self, name: &str, values: &[&str]) -> Self {
        self.declaration(Declaration::new(
            name,
            Definition::Enum(EnumDef {
                ty: EnumType {
                    args: values
                        .iter()
                        .map(|v| Ident {
                            ident: (*v).to_string(),
                        })
                        .collect(),
                },
                is_enum: true,
            }),
        ))
    }

    pub fn import(mut self, localname: &str) -> Self {
        self.imports.push(Import {
            localname: localname.to_string(),
        });
        self
    }

    pub fn build(self) -> Program {
        Program::new(self.declarations, self.imports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DeclarationKind;

    #[test]
    fn test_table_builder() {
        let decl = TableBuilder::new("Points")
            .column("id", "int")
            .vector_column("pos", "float", 3)
            .unique(&["id"])
            .build();

        assert_eq!(decl.name, "Points");
        match decl.definition {
            Definition::Table(def) => {
                assert_eq!(def.table.len(), 2);
                assert_eq!(def.table[1].ty.length, Some(3));
                assert_eq!(def.meta[0].func, "unique");
            }
            other => panic!("expected table, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_program_builder_preserves_order() {
        let program = ProgramBuilder::new()
            .var("limit", "int", "10")
            .enumeration("Color", &["red", "green"])
            .command("wipe", QueryBuilder::new().from("T").destroy(&["T"]))
            .build();

        let kinds: Vec<_> = program
            .declarations
            .iter()
            .map(|d| d.definition.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                DeclarationKind::Scalar,
                DeclarationKind::Enum,
                DeclarationKind::Command
            ]
        );
    }
}
