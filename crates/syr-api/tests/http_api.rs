use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use syr_api::{AppState, AppStateInner, router};
use syr_core::{CredentialVerifier, MessageStore, RoutingEngine, ServiceDirectory};
use syr_db::Database;
use syr_gateway::Dispatcher;
use syr_types::models::Identity;

fn light_hash(password: &str) -> String {
    let params = Params::new(1024, 1, 1, None).unwrap();
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

fn test_state() -> AppState {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.create_user("admin", &light_hash("admin123"), "directeur").unwrap();
    db.create_user("naima", &light_hash("naima04"), "secrétariat").unwrap();

    let directory = Arc::new(ServiceDirectory::load(&db).unwrap());
    let store = MessageStore::new(db.clone(), Duration::from_secs(5));

    Arc::new(AppStateInner {
        verifier: CredentialVerifier::new(db),
        router: RoutingEngine::new(store, directory),
        dispatcher: Dispatcher::new(),
        jwt_secret: "test-secret".into(),
    })
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    call_as(app, None, method, uri, body).await
}

async fn call_as(
    app: &Router,
    token: Option<&str>,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login(app: &Router, username: &str, password: &str, service: &str) -> (i64, String) {
    let (status, body) = call(
        app,
        "POST",
        "/api/login",
        Some(json!({"username": username, "password": password, "service": service})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (
        body["user"]["id"].as_i64().unwrap(),
        body["token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn login_succeeds_and_failures_are_indistinguishable() {
    let app = router(test_state());

    let (status, body) = call(
        &app,
        "POST",
        "/api/login",
        Some(json!({"username": "admin", "password": "admin123", "service": "directeur"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["service"], "directeur");
    assert!(body["user"].get("password").is_none());
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

    let (s1, unknown) = call(
        &app,
        "POST",
        "/api/login",
        Some(json!({"username": "unknown", "password": "x", "service": "directeur"})),
    )
    .await;
    let (s2, wrong) = call(
        &app,
        "POST",
        "/api/login",
        Some(json!({"username": "admin", "password": "wrong", "service": "directeur"})),
    )
    .await;
    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, wrong);

    let (status, body) = call(&app, "POST", "/api/login", Some(json!({"username": "admin"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn public_message_defaults_and_is_listed_first() {
    let app = router(test_state());

    call(
        &app,
        "POST",
        "/api/messages",
        Some(json!({"fromUser": "admin", "fromService": "directeur", "toService": "tous", "content": "first"})),
    )
    .await;
    let (status, msg) = call(
        &app,
        "POST",
        "/api/messages",
        Some(json!({"fromUser": "admin", "fromService": "directeur", "toService": "tous", "content": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(msg["type"], "public");
    assert_eq!(msg["toService"], "tous");
    assert_eq!(msg["readBy"], json!([]));

    let (status, public) = call(&app, "GET", "/api/messages/public", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public[0]["id"], msg["id"]);
    assert_eq!(public[0]["content"], "hi");

    let (_, limited) = call(&app, "GET", "/api/messages?limit=1", None).await;
    assert_eq!(limited.as_array().unwrap().len(), 1);

    let (status, fetched) = call(&app, "GET", &format!("/api/messages/{}", msg["id"]), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, msg);
}

#[tokio::test]
async fn private_thread_is_separate_and_pushed_to_pair_only() {
    let state = test_state();
    let app = router(state.clone());

    let identity = |id, username: &str, service: &str| Identity {
        id,
        username: username.into(),
        service_id: service.into(),
    };
    let (_, mut comptable) = state.dispatcher.connect(&identity(1, "belkaceme", "comptable")).await;
    let (_, mut commercial) = state.dispatcher.connect(&identity(2, "anwar", "commercial")).await;
    let (_, mut personnel) = state.dispatcher.connect(&identity(3, "abdenour", "personnel")).await;
    for rx in [&mut comptable, &mut commercial, &mut personnel] {
        while rx.try_recv().is_ok() {}
    }

    let (status, msg) = call(
        &app,
        "POST",
        "/api/messages",
        Some(json!({
            "fromUser": "belkaceme",
            "fromService": "comptable",
            "toService": "commercial",
            "messageType": "private",
            "content": "facture 12"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, thread) = call(&app, "GET", "/api/messages/private/comptable/commercial", None).await;
    assert_eq!(thread.as_array().unwrap().len(), 1);
    assert_eq!(thread[0]["id"], msg["id"]);

    let (_, public) = call(&app, "GET", "/api/messages/public", None).await;
    assert!(public.as_array().unwrap().is_empty());

    let pushed: Value = serde_json::from_str(&comptable.try_recv().unwrap()).unwrap();
    assert_eq!(pushed["type"], "new_private_message");
    assert_eq!(pushed["data"]["id"], msg["id"]);
    assert!(commercial.try_recv().is_ok());
    assert!(personnel.try_recv().is_err());
}

#[tokio::test]
async fn invalid_submissions_are_rejected_without_writing() {
    let app = router(test_state());

    let (status, body) = call(
        &app,
        "POST",
        "/api/messages",
        Some(json!({"fromUser": "admin", "fromService": "directeur", "toService": "tous", "content": "re", "replyTo": 999999})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(
        &app,
        "POST",
        "/api/messages",
        Some(json!({"fromUser": "admin", "fromService": "cuisine", "toService": "tous"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "POST", "/api/messages", Some(json!({"content": "orphan"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, all) = call(&app, "GET", "/api/messages", None).await;
    assert!(all.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn read_receipts_come_from_the_token_holder() {
    let app = router(test_state());
    let (admin_id, admin_token) = login(&app, "admin", "admin123", "directeur").await;
    let (naima_id, naima_token) = login(&app, "naima", "naima04", "secrétariat").await;

    let (_, msg) = call(
        &app,
        "POST",
        "/api/messages",
        Some(json!({"fromUser": "admin", "fromService": "directeur", "toService": "tous", "content": "lu?"})),
    )
    .await;
    let uri = format!("/api/messages/{}/read", msg["id"]);

    call_as(&app, Some(&naima_token), "POST", &uri, None).await;
    let (status, updated) = call_as(&app, Some(&admin_token), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["readBy"], json!([admin_id, naima_id]));

    let (status, body) = call_as(&app, None, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    let (status, _) = call_as(&app, Some("not-a-token"), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, fetched) = call(&app, "GET", &format!("/api/messages/{}", msg["id"]), None).await;
    assert_eq!(fetched["readBy"], json!([admin_id, naima_id]));

    let (status, _) = call(&app, "GET", "/api/messages/424242", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call_as(&app, Some(&admin_token), "POST", "/api/messages/424242/read", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let app = router(test_state());

    let (status, body) = call(
        &app,
        "POST",
        "/api/messages",
        Some(json!({"fromUser": "admin", "fromService": "directeur", "toService": "tous", "messageType": "foo"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

    let (status, body) = call(
        &app,
        "POST",
        "/api/messages",
        Some(json!({"fromUser": "admin", "fromService": "directeur", "toService": "tous", "replyTo": "abc"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = call(&app, "POST", "/api/login", Some(json!({"username": 7}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = call(&app, "GET", "/api/messages?limit=many", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (_, all) = call(&app, "GET", "/api/messages", None).await;
    assert!(all.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn services_reflect_presence() {
    let state = test_state();
    let app = router(state.clone());

    let (_, services) = call(&app, "GET", "/api/services", None).await;
    let services = services.as_array().unwrap().clone();
    assert_eq!(services.len(), 12);
    assert!(services.iter().all(|s| s["isOnline"] == false));

    state
        .dispatcher
        .connect(&Identity {
            id: 9,
            username: "ramzi".into(),
            service_id: "magasin".into(),
        })
        .await;

    let (_, services) = call(&app, "GET", "/api/services", None).await;
    let magasin = services
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["id"] == "magasin")
        .unwrap()
        .clone();
    assert_eq!(magasin["isOnline"], true);

    let (_, online) = call(&app, "GET", "/api/users/online", None).await;
    assert_eq!(online, json!([{"username": "ramzi", "service": "magasin"}]));

    let (status, health) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}
