use std::path::Path;

use jsref::{CircularPolicy, Options};
use jsref_cli::cli::{Operation, OutputFormat, execute, render};
use serde_json::json;

fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> String {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).expect("serialize")).expect("write");
    path.to_string_lossy().to_string()
}

fn write_pet_schemas(dir: &Path) -> String {
    write_json(dir, "pet.json", &json!({"Pet": {"type": "object"}}));
    write_json(
        dir,
        "root.json",
        &json!({"properties": {"pet": {"$ref": "pet.json#/Pet"}}}),
    )
}

#[tokio::test]
async fn test_execute_parse_leaves_refs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = write_pet_schemas(dir.path());

    let value = execute(Operation::Parse, &root, &Options::default())
        .await
        .expect("parse");
    assert_eq!(value, json!({"properties": {"pet": {"$ref": "pet.json#/Pet"}}}));
}

#[tokio::test]
async fn test_execute_resolve_lists_documents() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = write_pet_schemas(dir.path());
    let pet = dir.path().join("pet.json").to_string_lossy().to_string();

    let value = execute(Operation::Resolve, &root, &Options::default())
        .await
        .expect("resolve");
    let documents = value.as_object().expect("object");
    let keys: Vec<&String> = documents.keys().collect();
    assert_eq!(keys, vec![&root, &pet]);
    assert_eq!(documents[&pet], json!({"Pet": {"type": "object"}}));
}

#[tokio::test]
async fn test_execute_dereference_and_bundle() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = write_pet_schemas(dir.path());

    let value = execute(Operation::Dereference, &root, &Options::default())
        .await
        .expect("dereference");
    assert_eq!(value, json!({"properties": {"pet": {"type": "object"}}}));

    let value = execute(Operation::Bundle, &root, &Options::default())
        .await
        .expect("bundle");
    assert_eq!(
        value,
        json!({
            "properties": {"pet": {"$ref": "#/definitions/Pet"}},
            "definitions": {"Pet": {"type": "object"}}
        })
    );
    let yaml = render(&value, OutputFormat::Yaml).expect("yaml");
    assert!(yaml.starts_with("properties:\n"), "{yaml}");
    let reparsed: serde_json::Value = serde_yaml::from_str(&yaml).expect("reparse yaml");
    assert_eq!(reparsed, value);
}

#[tokio::test]
async fn test_execute_refuses_cyclic_output() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = write_json(
        dir.path(),
        "tree.json",
        &json!({"properties": {"children": {"items": {"$ref": "#"}}}}),
    );

    let err = execute(Operation::Dereference, &root, &Options::default())
        .await
        .expect_err("cyclic output");
    let message = err.to_string();
    assert!(message.starts_with("Circular $ref pointer found at #/properties/children/items"), "{message}");
    assert!(message.contains("--circular ignore"), "{message}");

    let mut options = Options::default();
    options.dereference.circular = CircularPolicy::Ignore;
    let value = execute(Operation::Dereference, &root, &options)
        .await
        .expect("ignore circular");
    assert_eq!(value, json!({"properties": {"children": {"items": {"$ref": "#"}}}}));
}

#[tokio::test]
async fn test_execute_reports_every_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = write_json(
        dir.path(),
        "root.json",
        &json!({"properties": {"a": {"$ref": "missing.json"}, "b": {"$ref": "#/nope"}}}),
    );

    let mut options = Options::default();
    options.continue_on_error = true;
    let err = execute(Operation::Dereference, &root, &options)
        .await
        .expect_err("errors");
    let lines: Vec<String> = err.to_string().lines().map(str::to_string).collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], format!("2 errors occurred while reading '{root}'"));
    assert!(lines[1].starts_with("  ResolverError: Error opening file"), "{}", lines[1]);
    assert!(lines[1].ends_with(&format!("(at {root}#/properties/a)")), "{}", lines[1]);
    assert!(lines[2].starts_with("  MissingPointerError: Missing $ref pointer"), "{}", lines[2]);
}

#[test]
fn test_render_json_is_pretty() {
    let rendered = render(&json!({"a": [1, 2]}), OutputFormat::Json).expect("json");
    assert_eq!(rendered, "{\n  \"a\": [\n    1,\n    2\n  ]\n}\n");
}
