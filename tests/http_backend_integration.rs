//! REST backend against a mock server.

#![cfg(feature = "http-client")]

use bytes::Bytes;
use flowsync::client::{Backend, FileService, HttpBackend, ProjectService, ResultDataService, StaticToken};
use flowsync::config::SyncConfig;
use flowsync::types::{DataRef, DataView, FileContent, Project, SubmitResponse};
use flowsync::Error;
use mockito::{Matcher, Server, ServerGuard};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn backend(server: &ServerGuard) -> HttpBackend {
    let config = SyncConfig {
        api_url: server.url(),
        ..SyncConfig::default()
    };
    HttpBackend::new(&config).unwrap()
}

fn project_json(id: i64, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "owner": 1,
        "updated_at": "2026-01-02T03:04:05Z",
        "workflow": {"nodes": [], "edges": []},
    })
}

#[tokio::test]
async fn submit_returns_task_id() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/projects/5/sync")
        .match_body(Matcher::PartialJson(json!({"id": 5, "name": "demo"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"task_id": "t-1"}"#)
        .create_async()
        .await;

    let response = backend(&server)
        .submit(&Project::new(5, "demo", 1))
        .await
        .unwrap();

    assert_eq!(
        response,
        SubmitResponse::Task {
            task_id: "t-1".to_string()
        }
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn submit_returns_final_project() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/projects/5/sync")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(project_json(5, "demo").to_string())
        .create_async()
        .await;

    let response = backend(&server)
        .submit(&Project::new(5, "demo", 1))
        .await
        .unwrap();

    match response {
        SubmitResponse::Final(project) => assert_eq!(project.name, "demo"),
        other => panic!("expected final project, got {other:?}"),
    }
}

#[tokio::test]
async fn error_status_becomes_api_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/projects/9")
        .with_status(404)
        .with_body("no such project")
        .create_async()
        .await;

    let err = backend(&server).fetch_project(9).await.unwrap_err();
    match err {
        Error::Api { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such project");
        },
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn error_status_without_body_keeps_the_status() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("DELETE", "/files/gone.csv")
        .with_status(503)
        .create_async()
        .await;

    let err = backend(&server).delete("gone.csv").await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 503, ref body } if body.is_empty()));
}

#[tokio::test]
async fn bearer_token_is_attached() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/projects")
        .match_header("authorization", "Bearer secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let projects = backend(&server)
        .with_auth_provider(Arc::new(StaticToken::new("secret")))
        .list_projects()
        .await
        .unwrap();

    assert!(projects.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn project_crud() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/projects")
        .match_body(Matcher::Json(json!({"name": "fresh"})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(project_json(12, "fresh").to_string())
        .create_async()
        .await;
    let rename = server
        .mock("PATCH", "/projects/12")
        .match_body(Matcher::Json(json!({"name": "renamed"})))
        .with_status(204)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/projects/12")
        .with_status(204)
        .create_async()
        .await;

    let backend = backend(&server);
    let project = backend.create_project("fresh").await.unwrap();
    assert_eq!(project.id, 12);
    backend.rename_project(12, "renamed").await.unwrap();
    backend.delete_project(12).await.unwrap();

    create.assert_async().await;
    rename.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn file_content_json_or_bytes() {
    let mut server = Server::new_async().await;
    let _json = server
        .mock("GET", "/files/a.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"rows": 3}"#)
        .create_async()
        .await;
    let _csv = server
        .mock("GET", "/files/b.csv")
        .with_status(200)
        .with_header("content-type", "text/csv")
        .with_body("x,y\n1,2\n")
        .create_async()
        .await;

    let backend = backend(&server);
    assert_eq!(
        backend.content("a.json").await.unwrap(),
        FileContent::Structured(json!({"rows": 3}))
    );
    assert_eq!(
        backend.content("b.csv").await.unwrap(),
        FileContent::Bytes(Bytes::from_static(b"x,y\n1,2\n"))
    );
}

#[tokio::test]
async fn upload_encodes_query_and_sends_bytes() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/files/5/n1")
        .match_query(Matcher::UrlEncoded("filename".into(), "my data.csv".into()))
        .match_header("content-type", "application/octet-stream")
        .match_body("a,b\n")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"key": "n1/my data.csv", "filename": "my data.csv", "size": 4}"#)
        .create_async()
        .await;

    let file = backend(&server)
        .upload(5, "n1", "my data.csv", Bytes::from_static(b"a,b\n"))
        .await
        .unwrap();

    assert_eq!(file.size, 4);
    mock.assert_async().await;
}

#[tokio::test]
async fn node_data_is_decoded() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/data/d-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"type": "float", "value": 2.5}"#)
        .create_async()
        .await;

    let view = backend(&server)
        .node_data(&DataRef::new("d-7"))
        .await
        .unwrap();
    assert_eq!(view, DataView::Float(2.5));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let config = SyncConfig {
        api_url: "http://127.0.0.1:9".to_string(),
        ..SyncConfig::default()
    };
    let err = HttpBackend::new(&config)
        .unwrap()
        .list()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}
