//! Table code chunks: storage class, column layout, indexes and seed rows.

use serde::Serialize;

use crate::ast::{ColumnDecl, MetaArg, TableDef};
use crate::catalog::Catalog;
use crate::error::{CompileError, CompileResult, InvariantViolation};
use crate::storage::{load_seed, DataProvider, SeedRow};

use super::internal_name_for_table;

/// Declared column with its storage details
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub length: Option<usize>,
    pub is_vector: bool,
    /// Typed-array constructor for vector columns
    pub constructor: Option<&'static str>,
}

/// One insert slot; vector columns expand to `name0..nameN-1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpandedColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub idx: Option<usize>,
    /// Vector column this slot belongs to
    pub vector: Option<String>,
}

/// A unique index; `cols` is the literal column list, e.g. `['id']`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexChunk {
    pub cols: String,
    #[serde(skip)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertArgs {
    pub args: Vec<String>,
}

/// Everything the rendering stage needs for one table
#[derive(Debug, Clone, Serialize)]
pub struct TableChunk {
    pub name: String,
    pub klass: String,
    pub columns: Vec<ChunkColumn>,
    pub expanded_cols: Vec<ExpandedColumn>,
    /// Slot order matches `this.<table>._indices[k]` in generated code
    pub indices: Vec<IndexChunk>,
    pub insert: InsertArgs,
    pub callback_args: Vec<String>,
    /// Seed rows as object-literal bodies
    pub initial_data: Vec<String>,
    pub seed_rows: Vec<SeedRow>,
}

pub(super) fn code_for_table(
    name: &str,
    def: &TableDef,
    catalog: &Catalog,
    provider: &dyn DataProvider,
) -> CompileResult<TableChunk> {
    let columns = def
        .table
        .iter()
        .map(chunk_column)
        .collect::<Result<Vec<_>, _>>()?;

    let expanded_cols: Vec<ExpandedColumn> = columns
        .iter()
        .flat_map(|column| match column.length {
            None => vec![ExpandedColumn {
                name: column.name.clone(),
                ty: column.ty.clone(),
                idx: None,
                vector: None,
            }],
            Some(length) => (0..length)
                .map(|idx| ExpandedColumn {
                    name: format!("{}{idx}", column.name),
                    ty: column.ty.clone(),
                    idx: Some(idx),
                    vector: Some(column.name.clone()),
                })
                .collect(),
        })
        .collect();

    let mut seed_rows = Vec::new();
    for meta in &def.meta {
        match meta.func.as_str() {
            "source" => {
                let file = match meta.args.first() {
                    Some(MetaArg::Path(file)) => file.as_str(),
                    Some(MetaArg::Ident(relation)) => relation.ident.as_str(),
                    None => {
                        return Err(InvariantViolation::new(format!(
                            "source() on {name} names no file"
                        ))
                        .into())
                    }
                };
                seed_rows = load_seed(provider, file, &def.table)?;
            }
            "unique" => {
                for arg in &meta.args {
                    if let MetaArg::Ident(relation) = arg {
                        if let Some(alias) = &relation.alias {
                            return Err(CompileError::IndexAlias {
                                alias: alias.clone(),
                                ident: relation.ident.clone(),
                            });
                        }
                    }
                }
            }
            other => {
                return Err(CompileError::UnknownMeta {
                    table: name.to_string(),
                    func: other.to_string(),
                })
            }
        }
    }

    let indices = catalog
        .unique_indexes(name)?
        .into_iter()
        .map(|columns| IndexChunk {
            cols: format!("['{}']", columns.join("','")),
            columns,
        })
        .collect();

    tracing::debug!(
        table = name,
        columns = columns.len(),
        seed_rows = seed_rows.len(),
        "table_compiled"
    );

    Ok(TableChunk {
        name: name.to_string(),
        klass: internal_name_for_table(name),
        insert: InsertArgs {
            args: expanded_cols.iter().map(|c| c.name.clone()).collect(),
        },
        callback_args: columns.iter().map(|c| format!("row.{}", c.name)).collect(),
        initial_data: seed_rows.iter().map(SeedRow::render).collect(),
        columns,
        expanded_cols,
        indices,
        seed_rows,
    })
}

fn chunk_column(decl: &ColumnDecl) -> Result<ChunkColumn, InvariantViolation> {
    let constructor = match decl.ty.length {
        Some(_) => Some(
            decl.ty
                .native_array()
                .ok_or_else(|| InvariantViolation::new(format!("Invalid type: {}", decl.ty.base)))?,
        ),
        None => None,
    };
    Ok(ChunkColumn {
        name: decl.name.clone(),
        ty: decl.ty.base.clone(),
        length: decl.ty.length,
        is_vector: decl.ty.is_vector(),
        constructor,
    })
}
