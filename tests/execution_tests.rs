//! Generated procedures run against seeded tables through `Instance`.

use bucket::ast::builders::{ProgramBuilder, QueryBuilder, TableBuilder, ViewBuilder};
use bucket::ast::Projection;
use bucket::storage::{StorageError, StorageResult};
use bucket::{compile, Config, ExecutionError, Instance, Value};

fn seed(file: &str) -> StorageResult<Vec<u8>> {
    match file {
        "users.csv" => Ok(b"id,name\n1,a\n2,b\n3,c\n".to_vec()),
        "orders.csv" => Ok(b"oid,id,total\n10,1,5.5\n11,2,7\n12,9,1\n".to_vec()),
        "points.csv" => Ok(b"pid,pos\n1,0.5,1\n2,3,4\n".to_vec()),
        other => Err(StorageError::MissingFile(other.to_string())),
    }
}

fn schema() -> ProgramBuilder {
    ProgramBuilder::new()
        .table(
            TableBuilder::new("Users")
                .column("id", "int")
                .column("name", "string")
                .unique(&["id"])
                .source("users.csv"),
        )
        .table(
            TableBuilder::new("Orders")
                .column("oid", "int")
                .column("id", "int")
                .column("total", "float")
                .source("orders.csv"),
        )
        .table(
            TableBuilder::new("Points")
                .column("pid", "int")
                .vector_column("pos", "float", 2)
                .source("points.csv"),
        )
}

fn instance(program: ProgramBuilder) -> Instance {
    let bundle = compile(&program.build(), &seed, &Config::default()).unwrap();
    Instance::new(&bundle).unwrap()
}

fn collect(instance: &mut Instance, view: &str) -> Vec<Vec<Value>> {
    let mut rows = Vec::new();
    instance.call_view(view, |row| rows.push(row.to_vec())).unwrap();
    rows
}

#[test]
fn test_left_join_keeps_unmatched_rows() {
    let mut instance = instance(
        schema().view(
            ViewBuilder::public("orderOwners")
                .from("Orders")
                .left_join("Users")
                .project(vec![Projection::column("oid"), Projection::column("name")]),
        ),
    );
    assert_eq!(
        collect(&mut instance, "orderOwners"),
        vec![
            vec![Value::Int(10), Value::string("a")],
            vec![Value::Int(11), Value::string("b")],
            vec![Value::Int(12), Value::Null],
        ]
    );
}

#[test]
fn test_destroy_through_left_join_keeps_unmatched_side() {
    let mut instance = instance(schema().command(
        "dropCustomers",
        QueryBuilder::new().from("Orders").left_join("Users").destroy(&["Users"]),
    ));
    instance.run_command("dropCustomers").unwrap();

    let ids: Vec<Value> = instance
        .rows("Users")
        .unwrap()
        .iter()
        .map(|row| row.get("id"))
        .collect();
    assert_eq!(ids, vec![Value::Int(3)]);
    assert_eq!(instance.rows("Orders").unwrap().len(), 3);
}

#[test]
fn test_destroy_removes_rows_and_updates_index() {
    let mut instance = instance(
        schema()
            .command(
                "dropSecond",
                QueryBuilder::new().from("Users").filter("id === 2").destroy(&["Users"]),
            )
            .view(
                ViewBuilder::public("orderNames")
                    .from("Orders")
                    .join("Users")
                    .project(vec![Projection::column("oid")]),
            ),
    );
    assert_eq!(collect(&mut instance, "orderNames").len(), 2);

    instance.run_command("dropSecond").unwrap();
    let names: Vec<Value> = instance
        .rows("Users")
        .unwrap()
        .iter()
        .map(|row| row.get("name"))
        .collect();
    assert_eq!(names, vec![Value::string("a"), Value::string("c")]);
    assert_eq!(collect(&mut instance, "orderNames"), vec![vec![Value::Int(10)]]);
}

#[test]
fn test_set_updates_rows_in_place() {
    let mut instance = instance(
        schema()
            .command(
                "rename",
                QueryBuilder::new().from("Users").filter("id > 1").set("name", "name + \"!\""),
            )
            .view(ViewBuilder::public("names").from("Users").project(vec![Projection::column("name")])),
    );
    instance.run_command("rename").unwrap();
    assert_eq!(
        collect(&mut instance, "names"),
        vec![
            vec![Value::string("a")],
            vec![Value::string("b!")],
            vec![Value::string("c!")],
        ]
    );
}

#[test]
fn test_any_check() {
    let mut instance = instance(
        schema()
            .view(ViewBuilder::public("hasBig").from("Orders").filter("total > 6").any())
            .view(ViewBuilder::public("hasHuge").from("Orders").filter("total > 600").any()),
    );
    assert!(instance.check("hasBig").unwrap());
    assert!(!instance.check("hasHuge").unwrap());
}

#[test]
fn test_empty_handler_runs_once() {
    let mut instance = instance(schema().view(ViewBuilder::public("nobody").from("Users").filter("id < 0")));
    let mut calls = 0;
    instance
        .call_view_or_else("nobody", |_| panic!("no rows"), || calls += 1)
        .unwrap();
    assert_eq!(calls, 1);
}

#[test]
fn test_derived_projection_with_math() {
    let mut instance = instance(
        schema().view(
            ViewBuilder::public("scaled")
                .from("Orders")
                .project(vec![Projection::derived("Math.max(total, 6) * 2", Some("v"))]),
        ),
    );
    assert_eq!(
        collect(&mut instance, "scaled"),
        vec![
            vec![Value::Float(12.0)],
            vec![Value::Int(14)],
            vec![Value::Int(12)],
        ]
    );
}

#[test]
fn test_vector_columns_are_seeded() {
    let mut instance = instance(
        schema().view(
            ViewBuilder::public("firstCoord")
                .from("Points")
                .project(vec![Projection::derived("pos[1] - pos[0]", Some("d"))]),
        ),
    );
    assert_eq!(
        collect(&mut instance, "firstCoord"),
        vec![vec![Value::Float(0.5)], vec![Value::Float(1.0)]]
    );
}

#[test]
fn test_instances_do_not_share_rows() {
    let program = schema()
        .command("dropAll", QueryBuilder::new().from("Users").destroy(&["Users"]))
        .build();
    let bundle = compile(&program, &seed, &Config::default()).unwrap();

    let mut first = Instance::new(&bundle).unwrap();
    let second = Instance::new(&bundle).unwrap();
    first.run_command("dropAll").unwrap();
    assert!(first.rows("Users").unwrap().is_empty());
    assert_eq!(second.rows("Users").unwrap().len(), 3);
}

#[test]
fn test_duplicate_seed_key_fails_instance() {
    let provider = |file: &str| -> StorageResult<Vec<u8>> {
        assert_eq!(file, "dupes.csv");
        Ok(b"id\n1\n1\n".to_vec())
    };
    let program = ProgramBuilder::new()
        .table(
            TableBuilder::new("Dupes")
                .column("id", "int")
                .unique(&["id"])
                .source("dupes.csv"),
        )
        .build();
    let bundle = compile(&program, &provider, &Config::default()).unwrap();
    let err = Instance::new(&bundle).unwrap_err();
    assert!(matches!(err, ExecutionError::UniqueViolation { .. }));
    assert_eq!(err.to_string(), "Duplicate key in Dupes unique(id)");
}
