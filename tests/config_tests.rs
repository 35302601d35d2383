//! Config loading and TOML parsing tests.

use bucket::ast::builders::{ProgramBuilder, QueryBuilder, TableBuilder, ViewBuilder};
use bucket::storage::NoFiles;
use bucket::{compile, Config};
use std::fs;
use tempfile::TempDir;

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bucket.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.compiler.owner_type, "Bucket");
    assert!(config.compiler.prune_views);
    assert!(config.compiler.prune_commands);
    assert!(!config.compiler.parallel);
    assert!(config.compiler.extra_imports.is_empty());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_config_from_file() {
    let (_dir, path) = write_config(
        r#"
[compiler]
owner_type = "Store"
prune_commands = false
extra_imports = ["moment"]

[logging]
format = "json"
"#,
    );
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.compiler.owner_type, "Store");
    assert!(config.compiler.prune_views);
    assert!(!config.compiler.prune_commands);
    assert_eq!(config.compiler.extra_imports, vec!["moment"]);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_value_is_an_error() {
    let (_dir, path) = write_config("[compiler]\nparallel = \"sometimes\"\n");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_roundtrip_through_toml() {
    let mut config = Config::default();
    config.compiler.parallel = true;
    config.logging.level = "trace".to_string();
    let text = toml::to_string(&config).unwrap();
    let (_dir, path) = write_config(&text);
    assert_eq!(Config::from_file(&path).unwrap(), config);
}

#[test]
fn test_extra_imports_reach_the_resolver() {
    let program = ProgramBuilder::new()
        .table(TableBuilder::new("Events").column("at", "int"))
        .view(
            ViewBuilder::public("recent")
                .from("Events")
                .filter("at > moment.now()"),
        )
        .build();

    assert!(compile(&program, &NoFiles, &Config::default()).is_err());

    let (_dir, path) = write_config("[compiler]\nextra_imports = [\"moment\"]\n");
    let config = Config::from_file(&path).unwrap();
    let bundle = compile(&program, &NoFiles, &config).unwrap();
    assert!(bundle.prototype.contains("moment.now()"));
}

#[test]
fn test_prune_switches() {
    let program = ProgramBuilder::new()
        .table(TableBuilder::new("Users").column("id", "int").column("name", "string"))
        .command("touch", QueryBuilder::new().from("Users").set("name", "\"x\""))
        .build();

    let pruned = compile(&program, &NoFiles, &Config::default()).unwrap();
    let (_dir, path) = write_config("[compiler]\nprune_commands = false\n");
    let unpruned = compile(&program, &NoFiles, &Config::from_file(&path).unwrap()).unwrap();

    let source = |bundle: &bucket::OutputBundle| bundle.procedure("touch").unwrap().source.clone();
    assert!(source(&unpruned).contains("Users_id$"));
    assert!(!source(&pruned).contains("Users_id$"));
}
