//! HTTP contract tests for the guild configuration endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use guildcfg_api::{create_router, AppState};
use guildcfg_core::{EngineConfig, RateLimitPolicy};
use guildcfg_engine::{ConfigService, RateLimiter, StaticTenantDirectory};
use guildcfg_storage::DurableRepo;
use guildcfg_test_utils::fixtures::{channels, tenant, InMemoryStores};
use serde_json::{json, Value};
use tower::ServiceExt;

const GUILD: &str = "123456789012345678";
const PATH: &str = "/api/guilds/123456789012345678/config";

fn app_with(stores: &InMemoryStores, config: EngineConfig) -> Router {
    let service = ConfigService::new(
        stores.durable.clone(),
        stores.cache.clone(),
        Arc::new(StaticTenantDirectory::new([tenant(GUILD)])),
        RateLimiter::new(stores.cache.clone()),
        config,
    );
    create_router(AppState::new(service))
}

fn app(stores: &InMemoryStores) -> Router {
    app_with(
        stores,
        EngineConfig {
            write_rate: RateLimitPolicy::new(1_000, Duration::from_secs(60)),
            read_rate: RateLimitPolicy::new(1_000, Duration::from_secs(10)),
            ..Default::default()
        },
    )
}

fn get(path: &str) -> Request<Body> {
    Request::get(path)
        .header("x-actor-id", "42")
        .body(Body::empty())
        .unwrap()
}

fn put(path: &str, if_match: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::put(path)
        .header("x-actor-id", "42")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(tag) = if_match {
        builder = builder.header(header::IF_MATCH, tag);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn whitelist_body(allow_all: bool, ids: &[&str]) -> Value {
    json!({ "allowAllChannels": allow_all, "whitelistedChannelIds": ids })
}

// ============================================================================
// GET
// ============================================================================

#[tokio::test]
async fn test_get_creates_default_with_etag() {
    let stores = InMemoryStores::new();
    let response = app(&stores).oneshot(get(PATH)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ETAG], "\"1\"");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    let body = json_body(response).await;
    assert_eq!(body["tenantId"], GUILD);
    assert_eq!(body["allowAllChannels"], true);
    assert_eq!(body["whitelistedChannelIds"], json!([]));
    assert_eq!(body["version"], 1);
}

#[tokio::test]
async fn test_missing_actor_is_unauthorized() {
    let stores = InMemoryStores::new();
    let request = Request::get(PATH).body(Body::empty()).unwrap();
    let response = app(&stores).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_inactive_guild_is_not_found() {
    let stores = InMemoryStores::new();
    let response = app(&stores)
        .oneshot(get("/api/guilds/999/config"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reserved_guild_id_is_rejected() {
    let stores = InMemoryStores::new();
    let response = app(&stores)
        .oneshot(get("/api/guilds/schema_version/config"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// PUT
// ============================================================================

#[tokio::test]
async fn test_put_round_trip_then_conflict() {
    let stores = InMemoryStores::new();
    let app = app(&stores);
    app.clone().oneshot(get(PATH)).await.unwrap();

    let response = app
        .clone()
        .oneshot(put(PATH, Some("\"1\""), whitelist_body(false, &["111", "222", "111"])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ETAG], "\"2\"");
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["config"]["version"], 2);
    assert_eq!(body["config"]["whitelistedChannelIds"], json!(["111", "222"]));
    assert!(body.get("warning").is_none());

    let response = app
        .oneshot(put(PATH, Some("\"1\""), whitelist_body(true, &[])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], "VERSION_CONFLICT");
    assert_eq!(body["details"]["currentVersion"], 2);
}

#[tokio::test]
async fn test_put_without_precondition_is_412() {
    let stores = InMemoryStores::new();
    let app = app(&stores);
    app.clone().oneshot(get(PATH)).await.unwrap();

    for tag in [None, Some("1"), Some("\"one\""), Some("*")] {
        let response = app
            .clone()
            .oneshot(put(PATH, tag, whitelist_body(true, &[])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED, "tag {:?}", tag);
    }

    let config = stores.durable.get(&tenant(GUILD)).await.unwrap().unwrap();
    assert_eq!(config.version, 1);
}

#[tokio::test]
async fn test_put_oversized_whitelist_is_400() {
    let stores = InMemoryStores::new();
    let app = app(&stores);
    app.clone().oneshot(get(PATH)).await.unwrap();

    let ids = channels(501);
    let body = json!({ "allowAllChannels": false, "whitelistedChannelIds": ids });
    let response = app.oneshot(put(PATH, Some("\"1\""), body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["details"]["limit"], 500);
}

#[tokio::test]
async fn test_put_malformed_body_is_400() {
    let stores = InMemoryStores::new();
    let app = app(&stores);
    app.clone().oneshot(get(PATH)).await.unwrap();

    let response = app
        .oneshot(put(PATH, Some("\"1\""), json!({ "whitelistedChannelIds": "nope" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_put_missing_whitelist_is_400_and_keeps_stored_list() {
    let stores = InMemoryStores::new();
    let app = app(&stores);
    app.clone().oneshot(get(PATH)).await.unwrap();

    let response = app
        .clone()
        .oneshot(put(PATH, Some("\"1\""), whitelist_body(false, &["111", "222"])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for body in [json!({ "allowAllChannels": false }), json!({ "whitelistedChannelIds": [] })] {
        let response = app
            .clone()
            .oneshot(put(PATH, Some("\"2\""), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    let config = stores.durable.get(&tenant(GUILD)).await.unwrap().unwrap();
    assert_eq!(config.version, 2);
    assert_eq!(config.whitelist, vec!["111".to_string(), "222".to_string()]);
}

#[tokio::test]
async fn test_put_cache_failure_is_503_with_saved_version() {
    let stores = InMemoryStores::new();
    let app = app(&stores);
    app.clone().oneshot(get(PATH)).await.unwrap();
    stores.cache.fail_writes_for(&tenant(GUILD));

    let response = app
        .oneshot(put(PATH, Some("\"1\""), whitelist_body(false, &["111"])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["details"]["savedVersion"], 2);
    assert_eq!(body["details"]["tenantId"], GUILD);

    let config = stores.durable.get(&tenant(GUILD)).await.unwrap().unwrap();
    assert_eq!(config.version, 2);
}

#[tokio::test]
async fn test_put_notify_failure_is_200_with_warning() {
    let stores = InMemoryStores::new();
    let app = app(&stores);
    app.clone().oneshot(get(PATH)).await.unwrap();
    stores.cache.set_notify_failure(true);

    let response = app
        .oneshot(put(PATH, Some("\"1\""), whitelist_body(true, &[])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["warning"].is_string());
}

#[tokio::test]
async fn test_put_commit_failure_is_500() {
    let stores = InMemoryStores::new();
    let app = app(&stores);
    app.clone().oneshot(get(PATH)).await.unwrap();
    stores.durable.set_commit_failure(true);

    let response = app
        .oneshot(put(PATH, Some("\"1\""), whitelist_body(true, &[])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_put_rate_limited_is_429_with_retry_after() {
    let stores = InMemoryStores::new();
    let app = app_with(
        &stores,
        EngineConfig {
            write_rate: RateLimitPolicy::new(1, Duration::from_secs(60)),
            ..Default::default()
        },
    );
    app.clone().oneshot(get(PATH)).await.unwrap();

    let first = app
        .clone()
        .oneshot(put(PATH, Some("\"1\""), whitelist_body(true, &[])))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(put(PATH, Some("\"2\""), whitelist_body(true, &[])))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = second.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn test_rejected_writes_still_consume_write_budget() {
    let stores = InMemoryStores::new();
    let app = app_with(
        &stores,
        EngineConfig {
            write_rate: RateLimitPolicy::new(2, Duration::from_secs(60)),
            ..Default::default()
        },
    );
    app.clone().oneshot(get(PATH)).await.unwrap();

    let missing_tag = app
        .clone()
        .oneshot(put(PATH, None, whitelist_body(true, &[])))
        .await
        .unwrap();
    assert_eq!(missing_tag.status(), StatusCode::PRECONDITION_FAILED);

    let malformed = app
        .clone()
        .oneshot(put(PATH, Some("\"1\""), json!({ "allowAllChannels": "yes" })))
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let valid = app
        .oneshot(put(PATH, Some("\"1\""), whitelist_body(true, &[])))
        .await
        .unwrap();
    assert_eq!(valid.status(), StatusCode::TOO_MANY_REQUESTS);

    let config = stores.durable.get(&tenant(GUILD)).await.unwrap().unwrap();
    assert_eq!(config.version, 1);
}

#[tokio::test]
async fn test_health() {
    let stores = InMemoryStores::new();
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = app(&stores).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}
