//! Catalog: name → definition map for one program
//!
//! Built once, before any query is compiled, after checking that no name is
//! declared twice. Declaration order is kept so generated output is stable.
//! Lookups of names that should exist (the declaration structure guarantees
//! them) fail with [`InvariantViolation`] rather than a user error.

use std::collections::HashMap;

use crate::ast::{
    ColumnDecl, CommandDef, Declaration, Definition, EnumDef, Import, MetaArg, Program, QueryStep,
    ScalarDef, TableDef, ViewDef,
};
use crate::error::{CompileError, CompileResult, InvariantViolation};

/// Catalog tracks every declaration in a program
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Declarations in source order
    declarations: Vec<Declaration>,
    /// Map from name to position in `declarations`
    by_name: HashMap<String, usize>,
    imports: Vec<Import>,
}

impl Catalog {
    /// Build the catalog, rejecting the first duplicated name
    pub fn from_program(program: &Program) -> CompileResult<Self> {
        let mut by_name = HashMap::with_capacity(program.declarations.len());
        for (position, decl) in program.declarations.iter().enumerate() {
            if by_name.insert(decl.name.clone(), position).is_some() {
                return Err(CompileError::DuplicateDeclaration(decl.name.clone()));
            }
        }

        Ok(Catalog {
            declarations: program.declarations.clone(),
            by_name,
            imports: program.imports.clone(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.by_name
            .get(name)
            .map(|&position| &self.declarations[position].definition)
    }

    /// Definition of a name that must exist
    pub fn definition(&self, name: &str) -> Result<&Definition, InvariantViolation> {
        self.get(name)
            .ok_or_else(|| InvariantViolation::new(format!("No relation named {name}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn is_scalar(&self, name: &str) -> Result<bool, InvariantViolation> {
        Ok(matches!(self.definition(name)?, Definition::Scalar(_)))
    }

    pub fn is_view(&self, name: &str) -> Result<bool, InvariantViolation> {
        Ok(matches!(self.definition(name)?, Definition::View(_)))
    }

    pub fn scalar(&self, name: &str) -> Result<&ScalarDef, InvariantViolation> {
        match self.definition(name)? {
            Definition::Scalar(def) => Ok(def),
            _ => Err(InvariantViolation::new(format!("{name} is not a scalar"))),
        }
    }

    pub fn table(&self, name: &str) -> Result<&TableDef, InvariantViolation> {
        match self.definition(name)? {
            Definition::Table(def) => Ok(def),
            _ => Err(InvariantViolation::new(format!("Unknown table: {name}"))),
        }
    }

    /// Steps of a view, for inlining it as a relation
    pub fn view_steps(&self, name: &str) -> Result<&[QueryStep], InvariantViolation> {
        match self.definition(name)? {
            Definition::View(def) => Ok(&def.view),
            _ => Err(InvariantViolation::new(format!("{name} is not a view"))),
        }
    }

    /// Declared columns of a table
    pub fn table_columns(&self, name: &str) -> Result<&[ColumnDecl], InvariantViolation> {
        Ok(&self.table(name)?.table)
    }

    /// Unique indexes declared on a table, as column lists, duplicates removed.
    ///
    /// Position in the returned list is the index's slot in the table's
    /// `_indices` array.
    pub fn unique_indexes(&self, name: &str) -> Result<Vec<Vec<String>>, InvariantViolation> {
        let mut indexes: Vec<Vec<String>> = Vec::new();
        for meta in &self.table(name)?.meta {
            if meta.func != "unique" {
                continue;
            }
            let columns: Vec<String> = meta
                .args
                .iter()
                .map(|arg| match arg {
                    MetaArg::Ident(relation) => relation.ident.clone(),
                    MetaArg::Path(path) => path.clone(),
                })
                .collect();
            if !indexes.contains(&columns) {
                indexes.push(columns);
            }
        }
        Ok(indexes)
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableDef)> {
        self.declarations.iter().filter_map(|d| match &d.definition {
            Definition::Table(def) => Some((d.name.as_str(), def)),
            _ => None,
        })
    }

    pub fn scalars(&self) -> impl Iterator<Item = (&str, &ScalarDef)> {
        self.declarations.iter().filter_map(|d| match &d.definition {
            Definition::Scalar(def) => Some((d.name.as_str(), def)),
            _ => None,
        })
    }

    pub fn views(&self) -> impl Iterator<Item = (&str, &ViewDef)> {
        self.declarations.iter().filter_map(|d| match &d.definition {
            Definition::View(def) => Some((d.name.as_str(), def)),
            _ => None,
        })
    }

    pub fn commands(&self) -> impl Iterator<Item = (&str, &CommandDef)> {
        self.declarations.iter().filter_map(|d| match &d.definition {
            Definition::Command(def) => Some((d.name.as_str(), def)),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = (&str, &EnumDef)> {
        self.declarations.iter().filter_map(|d| match &d.definition {
            Definition::Enum(def) => Some((d.name.as_str(), def)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{ProgramBuilder, TableBuilder, ViewBuilder};

    fn users() -> Program {
        ProgramBuilder::new()
            .table(
                TableBuilder::new("Users")
                    .column("id", "int")
                    .column("name", "string")
                    .unique(&["id"])
                    .unique(&["id"]),
            )
            .view(ViewBuilder::private("named").from("Users"))
            .var("limit", "int", "10")
            .build()
    }

    #[test]
    fn test_catalog_basic() {
        let catalog = Catalog::from_program(&users()).unwrap();

        assert!(catalog.contains("Users"));
        assert!(!catalog.contains("Orders"));
        assert!(catalog.is_view("named").unwrap());
        assert!(catalog.is_scalar("limit").unwrap());
        assert_eq!(catalog.table_columns("Users").unwrap().len(), 2);
        assert_eq!(catalog.tables().count(), 1);
    }

    #[test]
    fn test_duplicate_declaration() {
        let program = ProgramBuilder::new()
            .var("x", "int", "1")
            .val("x", "int", "2")
            .build();
        let err = Catalog::from_program(&program).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate definition of x");
    }

    #[test]
    fn test_unique_indexes_are_deduplicated() {
        let catalog = Catalog::from_program(&users()).unwrap();
        assert_eq!(
            catalog.unique_indexes("Users").unwrap(),
            vec![vec!["id".to_string()]]
        );
    }

    #[test]
    fn test_unknown_name_is_invariant_violation() {
        let catalog = Catalog::from_program(&users()).unwrap();
        let err = catalog.is_view("Nope").unwrap_err();
        assert_eq!(err.to_string(), "internal invariant violated: No relation named Nope");
        assert!(catalog.table("named").is_err());
    }
}
