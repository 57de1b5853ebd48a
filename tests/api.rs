mod common;

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};

use common::TestApp;

async fn create_group(app: &TestApp, name: &str) {
    let (status, _) = app
        .admin(Method::POST, "/group", Some(json!({ "name": name })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn sync_group(app: &TestApp, group: &str, images: Value) -> (StatusCode, Value) {
    app.admin(
        Method::POST,
        "/groups/sync",
        Some(json!({ "group": group, "images": images })),
    )
    .await
}

async fn register(app: &TestApp, name: &str, groups: &[&str]) -> String {
    let (status, body) = app
        .admin(
            Method::POST,
            "/satellites",
            Some(json!({ "name": name, "groups": groups })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn test_ping_and_health() {
    let app = TestApp::start().await;

    let request = Request::get("/ping").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"pong");

    let (status, body) = app.json(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_reads_answer_while_sync_waits_on_registry() {
    let app = TestApp::start().await;
    create_group(&app, "g1").await;
    app.registry.set_latency(Duration::from_millis(800));

    let sync = sync_group(
        &app,
        "g2",
        json!([{ "registry": "reg.example.com", "repository": "app/web", "tag": "v1" }]),
    );
    let reads = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let start = Instant::now();
        let (health, _) = app.json(Method::GET, "/health", None, None).await;
        let elapsed = start.elapsed();
        let (list, _) = app.admin(Method::GET, "/group/list", None).await;
        (health, elapsed, list)
    };

    let ((sync_status, _), (health_status, elapsed, list_status)) = tokio::join!(sync, reads);
    assert_eq!(sync_status, StatusCode::OK);
    assert_eq!(health_status, StatusCode::OK);
    assert!(elapsed < Duration::from_millis(300), "health waited {elapsed:?}");
    assert_eq!(list_status, StatusCode::OK);

    let (_, groups) = app.admin(Method::GET, "/group/list", None).await;
    assert_eq!(groups.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let app = TestApp::start().await;

    let (status, body) = app.json(Method::GET, "/group/list", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let (status, _) = app
        .json(Method::GET, "/group/list", None, Some("gc_abcdefgh_0123456789abcdef0123456789abcdef"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_group_crud() {
    let app = TestApp::start().await;
    create_group(&app, "g1").await;

    let (status, body) = app
        .admin(Method::POST, "/group", Some(json!({ "name": "g1" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (status, body) = app.admin(Method::GET, "/group/g1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "g1");
    assert_eq!(body["registry_url"], "reg.example.com");

    let (_, body) = app.admin(Method::GET, "/group/list", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = app.admin(Method::DELETE, "/group/g1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.admin(Method::GET, "/group/g1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Group 'g1' not found");
}

#[tokio::test]
async fn test_invalid_input_uses_error_envelope() {
    let app = TestApp::start().await;

    let (status, body) = app
        .admin(Method::POST, "/group", Some(json!({ "name": "Bad Name" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(body["message"].as_str().unwrap().contains("Group name"));

    let (status, body) = app
        .admin(Method::POST, "/group", Some(json!({ "wrong": true })))
        .await;
    assert!(status.is_client_error());
    assert_eq!(body["code"], status.as_u16());

    create_group(&app, "g1").await;
    let (status, body) = app
        .admin(
            Method::POST,
            "/group/images",
            Some(json!({ "group": "g1", "image": "reg.example.com/app/web" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("tag or digest"));
}

#[tokio::test]
async fn test_sync_publishes_group_state() {
    let app = TestApp::start().await;

    let (status, body) = sync_group(
        &app,
        "g1",
        json!([{ "registry": "reg.example.com", "repository": "app/web", "tag": "v1" }]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body["artifact"]["reference"],
        "reg.example.com/satellite/groups/g1:latest"
    );

    let state = app.published_state("satellite/groups/g1").expect("published");
    assert_eq!(
        state,
        json!({
            "name": "g1",
            "registry": "reg.example.com",
            "images": [
                { "registry": "reg.example.com", "repository": "app/web", "tag": "v1" }
            ]
        })
    );

    let tags = app.registry.tags("satellite/groups/g1");
    assert_eq!(tags.len(), 2);
    assert!(tags.contains(&"latest".to_string()));
    assert!(tags.iter().any(|t| t.parse::<i64>().is_ok()));

    let (_, images) = app.admin(Method::GET, "/group/g1/images", None).await;
    assert_eq!(images.as_array().unwrap().len(), 1);
    assert!(app.projects.has_project("satellite"));
}

#[tokio::test]
async fn test_register_and_ztr() {
    let app = TestApp::start().await;
    sync_group(
        &app,
        "g1",
        json!([{ "registry": "reg.example.com", "repository": "app/web", "tag": "v1" }]),
    )
    .await;

    let token = register(&app, "sat1", &["g1"]).await;

    let (status, body) = app
        .json(Method::GET, &format!("/satellites/ztr/{token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body["states"],
        json!(["reg.example.com/satellite/groups/g1:latest"])
    );
    assert_eq!(body["auth"]["name"], "robot$sat1");
    assert_eq!(body["auth"]["registry"], "https://reg.example.com");
    assert!(body["auth"]["secret"].as_str().is_some());

    let robot = app.projects.robot_by_name("robot$sat1").unwrap();
    assert_eq!(robot.projects(), vec!["satellite", "app"]);

    let (status, body) = app
        .json(Method::GET, &format!("/satellites/ztr/{token}"), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let (_, body) = app.admin(Method::GET, "/satellites/sat1", None).await;
    assert_eq!(body["status"], "active");
    assert_eq!(body["groups"], json!(["g1"]));
    assert_eq!(body["robot_name"], "robot$sat1");
}

#[tokio::test]
async fn test_ztr_token_in_body() {
    let app = TestApp::start().await;
    let token = register(&app, "sat1", &[]).await;

    let (status, body) = app
        .json(Method::POST, "/satellites/ztr", Some(json!({ "token": token })), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["states"], json!([]));

    let (status, _) = app
        .json(Method::POST, "/satellites/ztr", Some(json!({ "token": token })), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_unknown_group() {
    let app = TestApp::start().await;

    let (status, body) = app
        .admin(
            Method::POST,
            "/satellites",
            Some(json!({ "name": "sat1", "groups": ["missing"] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Group 'missing' not found");

    let (_, body) = app.admin(Method::GET, "/satellites", None).await;
    assert_eq!(body, json!([]));
    assert_eq!(app.projects.robot_count(), 0);
}

#[tokio::test]
async fn test_image_assignment_is_idempotent() {
    let app = TestApp::start().await;
    create_group(&app, "g1").await;
    let body = json!({ "group": "g1", "image": "reg.example.com/app/web:v1" });

    let (status, first) = app
        .admin(Method::POST, "/group/images", Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["changed"], true);

    let (status, second) = app.admin(Method::POST, "/group/images", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["changed"], false);

    let (_, images) = app.admin(Method::GET, "/group/g1/images", None).await;
    assert_eq!(images.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_reconcile_rolls_back_sync() {
    let app = TestApp::start().await;
    sync_group(
        &app,
        "g1",
        json!([{ "registry": "reg.example.com", "repository": "app/web", "tag": "v1" }]),
    )
    .await;
    register(&app, "sat1", &["g1"]).await;

    app.projects.fail_updates(true);
    let (status, body) = sync_group(
        &app,
        "g1",
        json!([{ "registry": "reg.example.com", "repository": "other/svc", "tag": "v2" }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], 502);
    app.projects.fail_updates(false);

    let (_, images) = app.admin(Method::GET, "/group/g1/images", None).await;
    assert_eq!(
        images,
        json!([{ "registry": "reg.example.com", "repository": "app/web", "tag": "v1" }])
    );

    let state = app.published_state("satellite/groups/g1").unwrap();
    assert_eq!(state["images"][0]["repository"], "app/web");
}

#[tokio::test]
async fn test_failed_publish_leaves_no_group() {
    let app = TestApp::start().await;
    app.registry.fail_pushes(true);

    let (status, _) = sync_group(
        &app,
        "g2",
        json!([{ "registry": "reg.example.com", "repository": "app/web", "tag": "v1" }]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _) = app.admin(Method::GET, "/group/g2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_republish_keeps_digest() {
    let app = TestApp::start().await;
    let images = json!([
        { "registry": "reg.example.com", "repository": "app/web", "tag": "v1" },
        { "registry": "reg.example.com", "repository": "lib/db", "digest": "sha256:00ff" },
        { "registry": "reg.example.com", "repository": "old/gone", "tag": "v0", "deleted": true }
    ]);

    let (_, first) = sync_group(&app, "g1", images.clone()).await;
    let (_, second) = sync_group(&app, "g1", images).await;
    assert_eq!(first["artifact"]["digest"], second["artifact"]["digest"]);

    let state = app.published_state("satellite/groups/g1").unwrap();
    assert_eq!(state["images"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_membership_edits() {
    let app = TestApp::start().await;
    sync_group(
        &app,
        "g1",
        json!([{ "registry": "reg.example.com", "repository": "app/web", "tag": "v1" }]),
    )
    .await;
    register(&app, "sat1", &[]).await;
    let membership = json!({ "satellite": "sat1", "group": "g1" });

    let (status, body) = app
        .admin(Method::POST, "/group/satellite", Some(membership.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    let robot = app.projects.robot_by_name("robot$sat1").unwrap();
    assert_eq!(robot.projects(), vec!["satellite", "app"]);

    let (_, members) = app.admin(Method::GET, "/group/g1/satellites", None).await;
    assert_eq!(members[0]["name"], "sat1");
    assert_eq!(members[0]["status"], "pending");

    let (status, body) = app
        .admin(Method::DELETE, "/group/satellite", Some(membership))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    let robot = app.projects.robot_by_name("robot$sat1").unwrap();
    assert_eq!(robot.projects(), vec!["satellite"]);
}

#[tokio::test]
async fn test_labels_and_satellite_state() {
    let app = TestApp::start().await;
    create_group(&app, "g1").await;
    register(&app, "sat1", &["g1"]).await;

    let (status, _) = app
        .admin(Method::POST, "/label", Some(json!({ "name": "edge" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .admin(
            Method::POST,
            "/label/images",
            Some(json!({ "label": "edge", "image": "reg.example.com/tools/agent:1.0" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .admin(
            Method::POST,
            "/label/satellite",
            Some(json!({ "satellite": "sat1", "label": "edge" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, label) = app.admin(Method::GET, "/label/edge", None).await;
    assert_eq!(label["images"][0]["repository"], "tools/agent");

    let (status, body) = app.admin(Method::POST, "/satellites/sat1/sync", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let state = app.published_state("satellite/satellites/sat1").unwrap();
    assert_eq!(state["name"], "sat1");
    assert_eq!(state["groups"], json!(["g1"]));
    assert_eq!(state["images"][0]["repository"], "tools/agent");

    let (_, labels) = app.admin(Method::GET, "/label/list", None).await;
    assert_eq!(labels.as_array().unwrap().len(), 1);
    let (status, _) = app.admin(Method::DELETE, "/label/edge", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_delete_satellite_revokes_robot() {
    let app = TestApp::start().await;
    register(&app, "sat1", &[]).await;
    assert_eq!(app.projects.robot_count(), 1);

    let (status, _) = app.admin(Method::DELETE, "/satellites/sat1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.projects.robot_count(), 0);

    let (status, _) = app.admin(Method::GET, "/satellites/sat1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
