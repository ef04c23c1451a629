// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests of the HTTP API against the in-memory registry.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use ifc_catalog_server::{
    config::{Config, LogFormat},
    router,
    services::{MemoryRegistry, CONVERSION_FAILED_MESSAGE, UNSUPPORTED_FORMAT_MESSAGE},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "catalog-test-boundary";

const PLUMBING: &str = "ISO-10303-21;\n\
    HEADER;\n\
    FILE_SCHEMA(('IFC4'));\n\
    ENDSEC;\n\
    DATA;\n\
    #10=IFCFLOWSEGMENT('2N1qJ7$1z3Ax9jUVJ7x0b0',$,'P1-A01',$,$,$,$,$);\n\
    #11=IFCFLOWSEGMENT('2N1qJ7$1z3Ax9jUVJ7x0b1',$,'P1-A02',$,$,$,$,$);\n\
    #12=IFCVALVE('0dTR3bPzT1NvhHT8Dx6wZQ',$,'S2-B99',$,$,$,$,$);\n\
    #13=IFCVALVE('0dTR3bPzT1NvhHT8Dx6wZR',$,'S2-B99',$,$,$,$,$);\n\
    ENDSEC;\n\
    END-ISO-10303-21;\n";

struct TestServer {
    app: Router,
    dir: tempfile::TempDir,
}

fn server(max_file_size_mb: usize) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        port: 0,
        uploads_dir: dir.path().to_path_buf(),
        max_file_size_mb,
        request_timeout_secs: 30,
        conversion_workers: 2,
        max_components: 50_000,
        database_url: None,
        database_max_connections: 1,
        cors_origins: vec!["*".into()],
        log_format: LogFormat::Pretty,
    };
    let app = router(AppState::new(config, Arc::new(MemoryRegistry::new())));
    TestServer { app, dir }
}

fn multipart_body(file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn upload(app: &Router, project_id: Uuid, file_name: &str, content: &[u8]) -> (StatusCode, Value) {
    let body = multipart_body(file_name, content);
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/projects/{}/models", project_id))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

/// Poll the model until it reaches READY or ERROR.
async fn wait_terminal(app: &Router, project_id: Uuid, model_id: &str) -> Value {
    let uri = format!("/api/v1/projects/{}/models/{}", project_id, model_id);
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let (status, model) = get(app, &uri).await;
            assert_eq!(status, StatusCode::OK);
            if model["status"] == "READY" || model["status"] == "ERROR" {
                return model;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_health() {
    let srv = server(10);
    let (status, body) = get(&srv.app, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["registry"], "memory");

    let (status, body) = get(&srv.app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["endpoints"].as_array().unwrap().len() > 5);
}

#[tokio::test]
async fn test_ifc_upload_converts_to_ready() {
    let srv = server(10);
    let project_id = Uuid::new_v4();

    let (status, model) = upload(&srv.app, project_id, "plant.ifc", PLUMBING.as_bytes()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(model["format"], "IFC");
    assert_eq!(model["fileName"], "plant.ifc");
    let model_id = model["id"].as_str().unwrap().to_string();

    let model = wait_terminal(&srv.app, project_id, &model_id).await;
    assert_eq!(model["status"], "READY", "{}", model);
    assert_eq!(model["errorMessage"], Value::Null);
    assert_eq!(model["metadata"]["progress"]["percent"], 100);

    let components_url = model["componentsUrl"].as_str().unwrap().to_string();
    assert_eq!(
        components_url,
        format!("/uploads/projects/{}/models/{}/converted/components.json", project_id, model_id)
    );

    // The artifact is served from the uploads root
    let (status, artifact) = get(&srv.app, &components_url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(artifact["count"], 3);
    assert_eq!(artifact["systems"], serde_json::json!(["P1", "S2"]));

    let base = format!("/api/v1/projects/{}/models/{}", project_id, model_id);
    let (status, list) = get(&srv.app, &format!("{}/components", base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 3);
    let tags: Vec<&str> = list["components"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["fullTag"].as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["P1-A01", "P1-A02", "S2-B99"]);

    let (status, p1) = get(&srv.app, &format!("{}/components?system=P1", base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(p1["count"], 2);

    let (status, err) = get(&srv.app, &format!("{}/components?system=p1", base)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "INVALID_SYSTEM_CODE");

    let (status, models) = get(&srv.app, &format!("/api/v1/projects/{}/models", project_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(models["models"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rvt_upload_is_accepted_then_rejected() {
    let srv = server(10);
    let project_id = Uuid::new_v4();

    let (status, model) = upload(&srv.app, project_id, "model.rvt", b"not an ifc file").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(model["format"], "RVT");
    let model_id = model["id"].as_str().unwrap().to_string();

    let model = wait_terminal(&srv.app, project_id, &model_id).await;
    assert_eq!(model["status"], "ERROR");
    assert_eq!(model["errorMessage"], UNSUPPORTED_FORMAT_MESSAGE);
    assert_eq!(model["metadata"]["progress"]["percent"], 0);

    let (_, list) = get(
        &srv.app,
        &format!("/api/v1/projects/{}/models/{}/components", project_id, model_id),
    )
    .await;
    assert_eq!(list["count"], 0);
}

#[tokio::test]
async fn test_unreadable_ifc_records_generic_failure() {
    let srv = server(10);
    let project_id = Uuid::new_v4();

    let (status, model) = upload(&srv.app, project_id, "plant.ifc", PLUMBING.as_bytes()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let model_id = model["id"].as_str().unwrap().to_string();
    wait_terminal(&srv.app, project_id, &model_id).await;

    // Remove the original, then ask for a rerun
    let original = srv
        .dir
        .path()
        .join("projects")
        .join(project_id.to_string())
        .join("models")
        .join(&model_id)
        .join("original.ifc");
    std::fs::remove_file(&original).unwrap();

    let request = Request::post(format!("/api/v1/projects/{}/models/{}/convert", project_id, model_id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&srv.app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    // The first job may still be winding down
    assert!(body["enqueued"] == "started" || body["enqueued"] == "coalesced");

    let model = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let model = wait_terminal(&srv.app, project_id, &model_id).await;
            if model["status"] == "ERROR" {
                return model;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(model["errorMessage"], CONVERSION_FAILED_MESSAGE);
    // The previous artifact pointer is kept
    assert!(model["componentsUrl"].is_string());
}

#[tokio::test]
async fn test_upload_validation() {
    let srv = server(1);
    let project_id = Uuid::new_v4();

    let (status, body) = upload(&srv.app, project_id, "../../evil", b"x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_FILE_NAME");

    let (status, body) = upload(&srv.app, project_id, "drawing.dwg", b"x").await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["code"], "UNSUPPORTED_EXTENSION");

    let (status, body) = upload(&srv.app, project_id, "noext", b"x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_EXTENSION");

    // One byte over: caught while streaming
    let oversized = vec![b'x'; 1024 * 1024 + 1];
    let (status, body) = upload(&srv.app, project_id, "huge.ifc", &oversized).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "FILE_TOO_LARGE");

    // Far over: caught from the request length before anything is written
    let oversized = vec![b'x'; 2 * 1024 * 1024 + 1];
    let (status, body) = upload(&srv.app, project_id, "huge.ifc", &oversized).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "FILE_TOO_LARGE");

    // Nothing was persisted for any rejected upload
    let models_dir = srv.dir.path().join("projects").join(project_id.to_string()).join("models");
    let leftovers = std::fs::read_dir(&models_dir).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
    let (_, models) = get(&srv.app, &format!("/api/v1/projects/{}/models", project_id)).await;
    assert!(models["models"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_at_size_ceiling_is_accepted() {
    let srv = server(1);
    let project_id = Uuid::new_v4();

    let exact = vec![b'x'; 1024 * 1024];
    let (status, model) = upload(&srv.app, project_id, "exact.ifc", &exact).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(model["sizeBytes"], 1024 * 1024);
}

#[tokio::test]
async fn test_delete_model() {
    let srv = server(10);
    let project_id = Uuid::new_v4();

    let (_, model) = upload(&srv.app, project_id, "plant.ifc", PLUMBING.as_bytes()).await;
    let model_id = model["id"].as_str().unwrap().to_string();
    wait_terminal(&srv.app, project_id, &model_id).await;

    let model_dir = srv
        .dir
        .path()
        .join("projects")
        .join(project_id.to_string())
        .join("models")
        .join(&model_id);
    assert!(model_dir.join("converted").join("metadata.json").exists());

    let uri = format!("/api/v1/projects/{}/models/{}", project_id, model_id);
    let request = Request::delete(&uri).body(Body::empty()).unwrap();
    let (status, _) = send(&srv.app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!model_dir.exists());

    let (status, body) = get(&srv.app, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_model_is_not_found() {
    let srv = server(10);
    let uri = format!("/api/v1/projects/{}/models/{}/components", Uuid::new_v4(), Uuid::new_v4());
    let (status, _) = get(&srv.app, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&srv.app, "/api/v1/projects/not-a-uuid/models").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
