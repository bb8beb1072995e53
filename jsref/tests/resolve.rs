
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsref::{Options, PathType, RefParser, Source};
use refio::{ReadError, ReadRequest, Reader};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schema_fixture::SchemaDir;

fn write_pet_schemas(dir: &SchemaDir) {
    dir.write_json(
        "root.json",
        &json!({
            "type": "object",
            "properties": {
                "pet": {"$ref": "defs/pet.yaml#/Pet"},
                "pets": {"type": "array", "items": {"$ref": "defs/pet.yaml#/Pet"}},
                "all": {"$ref": "defs/pet.yaml"}
            }
        }),
    );
    dir.write(
        "defs/pet.yaml",
        "Pet:\n  type: object\n  properties:\n    id:\n      $ref: '../common.json#/Id'\n",
    );
    dir.write_json("common.json", &json!({"Id": {"type": "integer"}}));
}

#[tokio::test]
async fn test_resolve_loads_every_document_once() {
    let dir = SchemaDir::new();
    write_pet_schemas(&dir);

    let parser = jsref::resolve(dir.path_str("root.json"), &Options::default())
        .await
        .unwrap();
    let refs = parser.refs();
    assert_eq!(
        refs.paths(&[]),
        vec![
            dir.path_str("root.json"),
            dir.path_str("defs/pet.yaml"),
            dir.path_str("common.json"),
        ]
    );

    let values = refs.values(&[PathType::File]).unwrap();
    assert_eq!(values[&dir.path_str("common.json")], json!({"Id": {"type": "integer"}}));
    assert_eq!(
        values[&dir.path_str("defs/pet.yaml")]["Pet"]["properties"]["id"],
        json!({"$ref": "../common.json#/Id"})
    );

    let pet = refs.entry(&dir.url("defs/pet.yaml")).unwrap();
    assert_eq!(pet.content_type(), Some("yaml"));
    assert_eq!(pet.path_type(), &PathType::File);
    assert!(!refs.circular());
}

#[tokio::test]
async fn test_resolve_is_idempotent() {
    let dir = SchemaDir::new();
    write_pet_schemas(&dir);

    let mut parser = RefParser::new();
    let first = parser
        .resolve(dir.path_str("root.json"), &Options::default())
        .await
        .unwrap()
        .to_json()
        .unwrap();
    let second = parser
        .resolve(dir.path_str("root.json"), &Options::default())
        .await
        .unwrap()
        .to_json()
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_resolve_without_external() {
    let dir = SchemaDir::new();
    write_pet_schemas(&dir);

    let mut options = Options::default();
    options.resolve.external = false;
    let parser = jsref::resolve(dir.path_str("root.json"), &options).await.unwrap();
    assert_eq!(parser.refs().paths(&[]), vec![dir.path_str("root.json")]);
}

#[tokio::test]
async fn test_refs_get_and_set_across_documents() {
    let dir = SchemaDir::new();
    write_pet_schemas(&dir);

    let mut parser = jsref::resolve(dir.path_str("root.json"), &Options::default())
        .await
        .unwrap();
    let refs = parser.refs_mut();

    assert_eq!(
        refs.get_value("#/properties/pet/properties/id").unwrap(),
        json!({"type": "integer"})
    );
    assert!(refs.exists("defs/pet.yaml#/Pet"));
    assert!(!refs.exists("defs/pet.yaml#/Cat"));

    refs.set_value("common.json#/Id/minimum", &json!(1)).unwrap();
    assert_eq!(
        refs.get_value("defs/pet.yaml#/Pet/properties/id").unwrap(),
        json!({"type": "integer", "minimum": 1})
    );
}

#[tokio::test]
async fn test_resolve_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schemas/root.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"properties": {"item": {"$ref": "item.json"}}}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/schemas/item.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"type": "string"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let root = format!("{}/schemas/root.json", server.uri());
    let parser = jsref::dereference(root.as_str(), &Options::default())
        .await
        .unwrap();
    assert_eq!(
        parser.to_value().unwrap(),
        json!({"properties": {"item": {"type": "string"}}})
    );
    assert_eq!(
        parser.refs().paths(&[PathType::Http]),
        vec![root.clone(), format!("{}/schemas/item.json", server.uri())]
    );
}

#[tokio::test]
async fn test_http_failure_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = Source::Value {
        value: json!({"a": {"$ref": "missing.json"}}),
        path: Some(format!("{}/root.json", server.uri())),
    };
    let err = jsref::resolve(source, &Options::default())
        .await
        .expect_err("404 should fail");
    assert_eq!(err.name(), "ResolverError");
    assert_eq!(
        err.to_string(),
        format!("Error downloading {}/missing.json: HTTP ERROR 404", server.uri())
    );
}

#[tokio::test]
async fn test_http_timeout_is_recorded_with_continue_on_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"type": "string"}"#)
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let source = Source::Value {
        value: json!({"a": {"$ref": "slow.json"}, "b": {"type": "integer"}}),
        path: Some(format!("{}/root.json", server.uri())),
    };
    let mut options = Options::default();
    options.continue_on_error = true;
    options.resolve.http.timeout = Duration::from_millis(100);

    let err = jsref::dereference(source, &options)
        .await
        .expect_err("timeout is grouped");
    let group = err.as_group().expect("group");
    assert_eq!(group.errors.len(), 1);
    let timeout = &group.errors[0];
    assert_eq!(timeout.name(), "ResolverError");
    assert_eq!(timeout.path, vec!["a"]);
    assert_eq!(
        timeout.message(),
        format!("Error downloading {}/slow.json: request timed out after 100ms", server.uri())
    );

    let root = group.refs.root_value().unwrap();
    let partial = group.refs.graph().to_value(root).unwrap();
    assert_eq!(partial, json!({"a": null, "b": {"type": "integer"}}));
}

struct MemoryReader {
    files: HashMap<String, String>,
}

#[async_trait::async_trait]
impl Reader for MemoryReader {
    fn name(&self) -> &str {
        "memory"
    }

    fn order(&self) -> i32 {
        1
    }

    fn can_read(&self, request: &ReadRequest) -> bool {
        request.url.scheme() == "mem"
    }

    async fn read(&self, request: &ReadRequest) -> Result<Vec<u8>, ReadError> {
        self.files
            .get(request.url.as_str())
            .map(|content| content.as_bytes().to_vec())
            .ok_or_else(|| ReadError::Io {
                path: request.url.to_string(),
                message: "not in memory".to_string(),
            })
    }
}

#[tokio::test]
async fn test_custom_reader() {
    let mut files = HashMap::new();
    files.insert(
        "mem://schemas/other.json".to_string(),
        r#"{"Name": {"type": "string"}}"#.to_string(),
    );
    let mut options = Options::default();
    options.resolve.readers = Some(vec![Arc::new(MemoryReader { files }) as Arc<dyn Reader>]);

    let source = Source::Value {
        value: json!({"properties": {"name": {"$ref": "other.json#/Name"}}}),
        path: Some("mem://schemas/root.json".to_string()),
    };
    let parser = jsref::dereference(source, &options).await.unwrap();
    assert_eq!(
        parser.to_value().unwrap(),
        json!({"properties": {"name": {"type": "string"}}})
    );
    let other = parser.refs().entry("mem://schemas/other.json").unwrap();
    assert_eq!(other.path_type(), &PathType::Custom("memory".to_string()));
}
