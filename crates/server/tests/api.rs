//! End-to-end tests of the HTTP surface against an in-memory workspace.
//!
//! Each test builds a fresh router with the built-in providers and
//! drives it through `tower::ServiceExt::oneshot`, polling `GET
//! /jobs/{id}` where a worker has to finish first.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use scriptorium_scheduler::store::memory::{MemoryModels, MemoryWorkspace};
use scriptorium_scheduler::store::{
    ModelState, ModelStore, ProjectState, SandboxState, SnapshotStore, WorkspaceDirectory,
};
use scriptorium_scheduler::{ProviderRegistry, Scheduler, SchedulerConfig};
use scriptorium_server::{build_router, builtin, AppState};

struct TestApp {
    app: Router,
    models: Arc<MemoryModels>,
}

fn test_app() -> TestApp {
    let workspace = Arc::new(MemoryWorkspace::new());
    workspace.add_project("book", ProjectState::Active);
    workspace.add_project("archive", ProjectState::Closed);
    workspace.add_sandbox("book", "run-1", SandboxState::Active);
    workspace.add_collection("gt-latin", None);

    let directory: Arc<dyn WorkspaceDirectory> = workspace.clone();
    let snapshots: Arc<dyn SnapshotStore> = workspace;
    let models = Arc::new(MemoryModels::new());
    let model_store: Arc<dyn ModelStore> = models.clone();

    let mut registry = ProviderRegistry::new();
    builtin::register(&mut registry);

    let config = SchedulerConfig {
        task_workers: 2,
        workflow_workers: 2,
        training_workers: 1,
        ..SchedulerConfig::default()
    };
    let scheduler = Arc::new(Scheduler::new(
        config,
        directory.clone(),
        snapshots.clone(),
        model_store.clone(),
    ));

    let state = Arc::new(AppState {
        scheduler,
        registry: Arc::new(registry),
        directory,
        snapshots,
        models: model_store,
    });

    TestApp {
        app: build_router(state),
        models,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-user", "alice")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json_with_rights(uri: &str, body: Value, rights: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-user", "alice")
        .header("x-rights", rights)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn wait_for_state(app: &Router, id: &str, want: &str) -> Value {
    for _ in 0..250 {
        let (status, body) = send(app, get(&format!("/jobs/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        if body["state"] == want {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} never reached state {}", id, want);
}

#[tokio::test]
async fn health_reports_ok() {
    let t = test_app();
    let (status, body) = send(&t.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["accepting"], true);
    assert_eq!(body["retained_jobs"], 0);
}

#[tokio::test]
async fn providers_lists_builtins() {
    let t = test_app();
    let (status, body) = send(&t.app, get("/providers")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["builtin.echo", "builtin.sleep", "builtin.train"]);
}

#[tokio::test]
async fn project_task_runs_to_completion() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/tasks",
            json!({
                "project": "book",
                "provider": "builtin.echo",
                "args": {"message": "hi"},
                "processing": "parallel",
                "description": "echo smoke test",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "scheduled");
    let id = body["job-id"].as_str().unwrap().to_string();

    let view = wait_for_state(&t.app, &id, "completed").await;
    assert_eq!(view["progress"], 1.0);
    assert_eq!(view["owner"], "alice");
    assert_eq!(view["target"]["project"], "book");
    let journal: Vec<&str> = view["journal"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l.as_str().unwrap())
        .collect();
    assert!(journal.iter().any(|l| l.contains("echo: hi")));
}

#[tokio::test]
async fn sandbox_task_materializes_snapshot() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/tasks",
            json!({
                "project": "book",
                "sandbox": "run-1",
                "parent": [1],
                "label": "Smoke run",
                "provider": "builtin.sleep",
                "args": {"seconds": 0},
                "processing": "serial",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["job-id"].as_str().unwrap().to_string();

    let view = wait_for_state(&t.app, &id, "completed").await;
    assert_eq!(view["target"]["sandbox"], "run-1");
    assert_eq!(view["snapshot"], json!([1, 1]));
}

#[tokio::test]
async fn sandbox_task_without_parent_is_rejected() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/tasks",
            json!({
                "project": "book",
                "sandbox": "run-1",
                "label": "No parent",
                "provider": "builtin.sleep",
                "args": {"seconds": 0},
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/tasks",
            json!({"project": "book", "provider": "nope", "processing": "parallel"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert!(body["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn missing_execute_right_is_forbidden() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json_with_rights(
            "/tasks",
            json!({"project": "book", "provider": "builtin.echo", "processing": "parallel"}),
            "read,write",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "authorization");
}

#[tokio::test]
async fn closed_project_is_a_conflict() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/tasks",
            json!({"project": "archive", "provider": "builtin.echo", "processing": "parallel"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "unavailable");
}

#[tokio::test]
async fn training_trains_the_registered_model() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/trainings",
            json!({
                "project": "book",
                "provider": "builtin.train",
                "args": {"epochs": 1},
                "dataset": ["gt-latin"],
                "model-name": "latin-v1",
                "processing": "parallel",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["job-id"].as_str().unwrap().to_string();

    wait_for_state(&t.app, &id, "completed").await;
    let entities = t.models.list();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].name, "latin-v1");
    assert_eq!(entities[0].state, ModelState::Trained);
}

#[tokio::test]
async fn empty_dataset_is_rejected_without_model() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/trainings",
            json!({
                "project": "book",
                "provider": "builtin.train",
                "dataset": [],
                "model-name": "latin-v1",
                "processing": "parallel",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert!(t.models.list().is_empty());
}

#[tokio::test]
async fn running_job_can_be_canceled() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/tasks",
            json!({
                "project": "book",
                "sandbox": "run-1",
                "parent": [1],
                "label": "Long run",
                "provider": "builtin.sleep",
                "args": {"seconds": 30},
                "processing": "serial",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["job-id"].as_str().unwrap().to_string();

    wait_for_state(&t.app, &id, "running").await;
    let (status, _) = send(
        &t.app,
        post_json(&format!("/jobs/{}/cancel", id), Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let view = wait_for_state(&t.app, &id, "canceled").await;
    assert_eq!(view["reason"], "canceled on request");
}

#[tokio::test]
async fn job_listing_can_filter_by_state() {
    let t = test_app();
    let (_, body) = send(
        &t.app,
        post_json(
            "/tasks",
            json!({
                "project": "book",
                "provider": "builtin.echo",
                "processing": "parallel",
            }),
        ),
    )
    .await;
    let id = body["job-id"].as_str().unwrap().to_string();
    wait_for_state(&t.app, &id, "completed").await;

    let (status, all) = send(&t.app, get("/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);

    let (_, completed) = send(&t.app, get("/jobs?state=completed")).await;
    assert_eq!(completed.as_array().unwrap().len(), 1);

    let (_, running) = send(&t.app, get("/jobs?state=running")).await;
    assert!(running.as_array().unwrap().is_empty());

    let (_, other) = send(&t.app, get("/jobs?project=archive")).await;
    assert!(other.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_job_ids_are_not_found() {
    let t = test_app();
    let missing = uuid::Uuid::new_v4();

    let (status, body) = send(&t.app, get(&format!("/jobs/{}", missing))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not-found");

    let (status, _) = send(
        &t.app,
        post_json(&format!("/jobs/{}/cancel", missing), Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_track_finished_jobs() {
    let t = test_app();
    let (_, body) = send(
        &t.app,
        post_json(
            "/tasks",
            json!({
                "project": "book",
                "provider": "builtin.echo",
                "processing": "parallel",
            }),
        ),
    )
    .await;
    let id = body["job-id"].as_str().unwrap().to_string();
    wait_for_state(&t.app, &id, "completed").await;

    let (status, metrics) = send(&t.app, get("/scheduler/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["finished"]["completed"], 1);
    assert_eq!(metrics["executions"]["builtin.echo"], 1);
}

#[tokio::test]
async fn docs_are_served() {
    let t = test_app();
    let response = t.app.clone().oneshot(get("/docs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
