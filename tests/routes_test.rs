//! HTTP surface, driven through the router without a socket.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use relay_chain::config::CryptoArgs;
use relay_chain::types::Ciphertext;
use relay_chain::{create_router, ChainService, MemoryChain, SecrecyCodec};

fn app() -> (Router, Arc<ChainService>) {
    let relay = CryptoArgs::default().build_relay().unwrap();
    let service = Arc::new(ChainService::new(Arc::new(MemoryChain::new()), relay));
    (create_router(service.clone(), true), service)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
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
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_says_ok() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn empty_chain_reads_as_empty() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/data", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marker"], 1);
    assert_eq!(body["days_since"], 0);
    assert_eq!(body["chain"], json!([]));
}

#[tokio::test]
async fn genesis_then_relayed_post() {
    let (app, service) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/data/post",
        Some(json!({ "title": "genesis", "contents": "in the beginning", "tag": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["marker"], 2);

    let ciphertext = Ciphertext::new(body["data"].as_str().unwrap());
    let secret = service
        .relay()
        .codec()
        .decrypt(&ciphertext, service.relay().genesis_key())
        .unwrap();
    let held = SecrecyCodec::digest(&secret);

    let (status, body) = send(
        &app,
        Method::POST,
        "/data/post",
        Some(json!({
            "title": "second",
            "author": "me",
            "contents": "passed along",
            "tag": 5,
            "hash": held.as_str(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["marker"], 1);
    assert_eq!(body["data"].as_str().unwrap().len(), 32);

    let (_, chain) = send(&app, Method::GET, "/data", None).await;
    let posts = chain["chain"].as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["title"], "second");
    assert_eq!(posts[1]["tag"], 0);
    assert_eq!(posts[0]["descriptors"].as_array().unwrap().len(), 10);
    // Digests are credentials and never leave the server
    assert!(posts.iter().all(|p| p.get("hash").is_none()));
}

#[tokio::test]
async fn unknown_digest_is_rejected_with_marker_zero() {
    let (app, _) = app();
    send(
        &app,
        Method::POST,
        "/data/post",
        Some(json!({ "title": "genesis", "contents": "first" })),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/data/post",
        Some(json!({
            "title": "forged",
            "contents": "nope",
            "tag": 1,
            "hash": SecrecyCodec::digest_str("forged").as_str(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["marker"], 0);
    assert_eq!(body["message"], "passcode will never have ability to make post");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/data/post",
        Some(json!({ "contents": "no title" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["marker"], 0);
}

#[tokio::test]
async fn reaction_round_trip() {
    let (app, _) = app();
    send(
        &app,
        Method::POST,
        "/data/post",
        Some(json!({ "title": "genesis", "contents": "react to me" })),
    )
    .await;
    let (_, chain) = send(&app, Method::GET, "/data", None).await;
    let post = &chain["chain"][0];
    let descriptor = post["descriptors"][0].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        "/data/reaction",
        Some(json!({ "postId": post["id"], "descriptor": descriptor })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["marker"], 1);
    assert!(body["data"].as_str().is_some());

    let (status, body) = send(
        &app,
        Method::POST,
        "/data/reaction",
        Some(json!({ "post_id": 42, "descriptor": descriptor })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["marker"], 0);

    let (_, chain) = send(&app, Method::GET, "/data", None).await;
    assert_eq!(chain["chain"][0]["reactions"][0]["gravitas"], 2);
}

#[tokio::test]
async fn duplicate_title_conflicts_without_store_details() {
    let (app, service) = app();
    let (_, body) = send(
        &app,
        Method::POST,
        "/data/post",
        Some(json!({ "title": "same", "contents": "first" })),
    )
    .await;
    let ciphertext = Ciphertext::new(body["data"].as_str().unwrap());
    let secret = service
        .relay()
        .codec()
        .decrypt(&ciphertext, service.relay().genesis_key())
        .unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/data/post",
        Some(json!({
            "title": "same",
            "contents": "second",
            "tag": 1,
            "hash": SecrecyCodec::digest(&secret).as_str(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["marker"], 0);
    assert_eq!(body["message"], "Conflict: a post with this title already exists");
}
