// End-to-end tests for the JSON-RPC gateway
//
// Tests cover:
// - Basic authentication and session reuse
// - Object creation through update, then cat
// - Rejected updates leave the directory untouched
// - Unknown types fail before any bind

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use dirgate::api::app_state::AppState;
use dirgate::api::create_router;
use dirgate::directory::InMemoryDirectory;
use dirgate::security::auth::Credentials;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const CAROL: &str = "uid=carol,ou=people,ou=sales,dc=example,dc=com";

struct Gateway {
    app: Router,
    directory: Arc<InMemoryDirectory>,
}

impl Gateway {
    fn new() -> Self {
        let directory = Arc::new(InMemoryDirectory::example());
        let app = create_router(AppState::development(directory.clone()));
        Self { app, directory }
    }

    async fn call(&self, method: &str, params: Value, auth: Option<&Credentials>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/jsonrpc")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(credentials) = auth {
            builder = builder.header(header::AUTHORIZATION, credentials.to_authorization_header());
        }
        let request = builder
            .body(Body::from(
                json!({"jsonrpc": "2.0", "id": "t", "method": method, "params": params})
                    .to_string(),
            ))
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn login(&self, session: &str) {
        let alice = Credentials::new("alice", "wonderland");
        let (status, body) = self.call("get_id", json!([session]), Some(&alice)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!(session));
    }
}

#[tokio::test]
async fn test_create_then_cat() {
    let gateway = Gateway::new();
    gateway.login("e2e").await;

    let (_, body) = gateway
        .call(
            "update",
            json!([
                "e2e",
                "person",
                null,
                null,
                {
                    "base": "ou=sales,dc=example,dc=com",
                    "uid": "carol",
                    "sn": "Doe",
                    "cn": "Carol Doe"
                }
            ]),
            None,
        )
        .await;
    assert_eq!(body["result"], json!(CAROL));
    assert!(gateway.directory.get(CAROL).is_some());

    let (_, body) = gateway
        .call("cat", json!(["e2e", CAROL, "person"]), None)
        .await;
    let values = &body["result"];
    assert_eq!(values["uid"], json!("carol"));
    assert_eq!(values["cn"], json!("Carol Doe"));
    assert_eq!(values["base"], json!("ou=sales,dc=example,dc=com"));

    let (_, body) = gateway
        .call("ls", json!(["e2e", "person", "uid", "ou=sales,dc=example,dc=com"]), None)
        .await;
    let listed = body["result"].as_object().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[CAROL], json!("carol"));
}

#[tokio::test]
async fn test_rejected_update_changes_nothing() {
    let gateway = Gateway::new();
    gateway.login("e2e").await;
    let bob = "uid=bob,ou=people,ou=sales,dc=example,dc=com";
    let before = gateway.directory.get(bob).unwrap();

    let (status, body) = gateway
        .call(
            "update",
            json!(["e2e", "person", bob, null, {"uid": "alice", "sn": ""}]),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let errors = body["result"]["errors"].as_array().unwrap();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|error| error["attribute"] == json!("sn")));
    assert_eq!(gateway.directory.get(bob).unwrap(), before);
}

#[tokio::test]
async fn test_unknown_type_never_binds() {
    let gateway = Gateway::new();
    gateway.login("e2e").await;
    let binds = gateway.directory.bind_count();

    let (_, body) = gateway
        .call("infos", json!(["e2e", "printer"]), None)
        .await;
    assert_eq!(body["error"]["code"], json!(-32001));
    assert_eq!(gateway.directory.bind_count(), binds);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let gateway = Gateway::new();
    gateway.login("first").await;

    let (status, _) = gateway.call("get_base", json!(["second"]), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = gateway.call("get_base", json!(["first"]), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!("dc=example,dc=com"));
}
