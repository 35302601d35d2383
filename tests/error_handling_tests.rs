//! Error reporting across compilation stages.
//!
//! Query errors are reported with the declaration they occurred in;
//! internal invariant violations are propagated unwrapped.

use bucket::ast::builders::{ProgramBuilder, QueryBuilder, TableBuilder, ViewBuilder};
use bucket::ast::{Projection, QueryStep, RelationRef, ScalarKind, TypeSpec};
use bucket::storage::NoFiles;
use bucket::{compile, CompileError, Config, Program, QueryError, ResolveError};

fn schema() -> ProgramBuilder {
    ProgramBuilder::new()
        .table(
            TableBuilder::new("Users")
                .column("id", "int")
                .column("name", "string")
                .unique(&["id"]),
        )
        .table(TableBuilder::new("Tags").column("id", "int").column("label", "string"))
        .table(TableBuilder::new("Notes").column("text", "string"))
}

fn compile_err(program: ProgramBuilder) -> CompileError {
    compile(&program.build(), &NoFiles, &Config::default()).unwrap_err()
}

fn query_err(err: CompileError) -> (String, QueryError) {
    match err {
        CompileError::InDeclaration { name, source } => (name, source),
        other => panic!("expected a declaration error, got {other:?}"),
    }
}

#[test]
fn test_ambiguous_reference() {
    let err = compile_err(
        schema().view(
            ViewBuilder::public("clash")
                .from("Users")
                .product(&["Tags"])
                .filter("id > 1"),
        ),
    );
    let (name, err) = query_err(err);
    assert_eq!(name, "clash");
    assert_eq!(err, QueryError::Resolve(ResolveError::Ambiguous("id".to_string())));
}

#[test]
fn test_unknown_names() {
    let (_, err) = query_err(compile_err(
        schema().view(ViewBuilder::public("v").from("Users").filter("nickname == 1")),
    ));
    assert_eq!(err, QueryError::Resolve(ResolveError::UnknownName("nickname".to_string())));

    let (_, err) = query_err(compile_err(
        schema().view(ViewBuilder::public("v").from("Users").filter("Users.nickname == 1")),
    ));
    assert_eq!(
        err,
        QueryError::Resolve(ResolveError::UnknownReference("Users.nickname".to_string()))
    );
}

#[test]
fn test_malformed_fragment() {
    let (_, err) = query_err(compile_err(
        schema().view(ViewBuilder::public("v").from("Users").filter("id >")),
    ));
    assert!(matches!(err, QueryError::Resolve(ResolveError::Malformed { .. })));
}

#[test]
fn test_join_without_common_columns() {
    let (name, err) = query_err(compile_err(
        schema().view(ViewBuilder::public("lonely").from("Users").join("Notes")),
    ));
    assert_eq!(name, "lonely");
    assert!(matches!(err, QueryError::NoCommonColumns { ref relation, .. } if relation == "Notes"));
}

#[test]
fn test_from_not_first() {
    let (_, err) = query_err(compile_err(
        schema().view(ViewBuilder::public("twice").from("Users").from("Tags")),
    ));
    assert_eq!(err, QueryError::FromNotFirst);
}

#[test]
fn test_destroy_errors() {
    let (name, err) = query_err(compile_err(
        schema().command("wipe", QueryBuilder::new().from("Users").destroy(&["Notes"])),
    ));
    assert_eq!(name, "wipe");
    assert_eq!(err, QueryError::DestroyNoRows(vec!["Notes".to_string()]));
}

#[test]
fn test_set_unknown_column() {
    let (_, err) = query_err(compile_err(
        schema().command("rename", QueryBuilder::new().from("Users").set("nick", "\"x\"")),
    ));
    assert_eq!(err, QueryError::CannotSet("nick".to_string()));
}

#[test]
fn test_projection_missing_names() {
    let (_, err) = query_err(compile_err(
        schema().view(
            ViewBuilder::public("v")
                .from("Users")
                .project(vec![Projection::derived("twice + 1", Some("thrice"))]),
        ),
    ));
    assert!(matches!(err, QueryError::MissingNames { .. }));
    assert!(err.to_string().starts_with("Missing names for"));
}

#[test]
fn test_steps_after_any() {
    let (_, err) = query_err(compile_err(
        schema().view(
            ViewBuilder::public("v")
                .from("Users")
                .any()
                .step(QueryStep::filter("id > 1")),
        ),
    ));
    assert_eq!(err, QueryError::StepsAfterGroup("any"));
}

#[test]
fn test_unknown_relation_is_internal() {
    let err = compile_err(
        schema().view(
            ViewBuilder::public("v").step(QueryStep::From(vec![RelationRef::new("Nowhere")])),
        ),
    );
    assert!(err.is_internal());
}

#[test]
fn test_vector_scalar_is_rejected() {
    let err = compile_err(schema().scalar(
        "origin",
        ScalarKind::Val,
        TypeSpec::vector("float", 2),
        None,
    ));
    assert_eq!(err.to_string(), "Scalar origin is a vector; this is unsupported");
}

#[test]
fn test_malformed_json_input() {
    assert!(Program::from_json("{\"declarations\": [{\"declaration\": \"x\"}]}").is_err());
    assert!(Program::from_json("not json").is_err());
}
