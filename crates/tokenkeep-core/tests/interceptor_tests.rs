//! Integration tests for the authenticated request interceptor

use std::time::Duration;

use serde_json::json;
use tokenkeep_core::{
    ApiError, AuthConfig, AuthSession, CookieJar, SessionEvent, SharedStorage, TokenKind,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn logged_in_session(server: &MockServer) -> AuthSession {
    Mock::given(method("POST"))
        .and(path("/api/token/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "a1", "refresh": "r1"})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/user/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 1, "username": "admin"})),
        )
        .mount(server)
        .await;

    let session = anonymous_session(server);
    session.login("admin", "secret", false).await.unwrap();
    session
}

fn anonymous_session(server: &MockServer) -> AuthSession {
    let config = AuthConfig {
        api_url: format!("{}/api", server.uri()),
        ..AuthConfig::default()
    };
    AuthSession::open_context(config, CookieJar::in_memory(), SharedStorage::in_memory())
        .expect("Failed to open session")
}

async fn mount_refresh(server: &MockServer, status: u16, expected_calls: u64) {
    let template = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({"access": "a2"}))
    } else {
        ResponseTemplate::new(status).set_body_json(json!({"detail": "Token is invalid"}))
    };
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(template)
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_attaches_bearer_token() {
    let server = MockServer::start().await;
    let session = logged_in_session(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/blog-posts/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .expect(1)
        .mount(&server)
        .await;

    let client = session.install(reqwest::Client::new());
    let posts: Vec<i32> = client.get_json("blog-posts/").await.unwrap();
    assert_eq!(posts, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_sends_unauthenticated_without_token() {
    let server = MockServer::start().await;
    let session = anonymous_session(&server);

    Mock::given(method("GET"))
        .and(path("/api/services/"))
        .and(|req: &Request| !req.headers.contains_key("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = session.install(reqwest::Client::new());
    let body: serde_json::Value = client.get_json("/services/").await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_renews_and_replays_once() {
    let server = MockServer::start().await;
    let session = logged_in_session(&server).await;
    mount_refresh(&server, 200, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/leads/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/leads/"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = session.install(reqwest::Client::new());
    let leads: Vec<serde_json::Value> = client.get_json("leads/").await.unwrap();
    assert!(leads.is_empty());
    assert_eq!(session.store().get(TokenKind::Access).as_deref(), Some("a2"));
}

#[tokio::test]
async fn test_replay_carries_original_body() {
    let server = MockServer::start().await;
    let session = logged_in_session(&server).await;
    mount_refresh(&server, 200, 1).await;

    let payload = json!({"email": "lead@example.com"});
    Mock::given(method("POST"))
        .and(path("/api/leads/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/leads/"))
        .and(header("authorization", "Bearer a2"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    let client = session.install(reqwest::Client::new());
    let created: serde_json::Value = client.post_json("leads/", &payload).await.unwrap();
    assert_eq!(created["id"], 9);
}

#[tokio::test]
async fn test_second_failure_is_propagated_without_looping() {
    let server = MockServer::start().await;
    let session = logged_in_session(&server).await;
    mount_refresh(&server, 200, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/dashboard/stats/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = session.install(reqwest::Client::new());
    let result: Result<serde_json::Value, _> = client.get_json("dashboard/stats/").await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
    // The renewal itself succeeded, so the session stays
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_failed_renewal_propagates_and_logs_out() {
    let server = MockServer::start().await;
    let session = logged_in_session(&server).await;
    mount_refresh(&server, 401, 1).await;
    let mut events = session.subscribe();

    Mock::given(method("GET"))
        .and(path("/api/bookings/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = session.install(reqwest::Client::new());
    let result = client.send(client.request(reqwest::Method::GET, "bookings/")).await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
    assert!(!session.is_authenticated());

    let mut saw_redirect = false;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if matches!(event, SessionEvent::LoginRequired { .. }) {
            saw_redirect = true;
        }
    }
    assert!(saw_redirect);
}

#[tokio::test]
async fn test_other_failures_skip_renewal() {
    let server = MockServer::start().await;
    let session = logged_in_session(&server).await;
    mount_refresh(&server, 200, 0).await;

    Mock::given(method("DELETE"))
        .and(path("/api/media/4/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .expect(1)
        .mount(&server)
        .await;

    let client = session.install(reqwest::Client::new());
    let result = client.delete("media/4/").await;
    assert!(matches!(result, Err(ApiError::NotFound(ref body)) if body == "missing"));
}

#[tokio::test]
async fn test_concurrent_calls_each_get_one_retry() {
    let server = MockServer::start().await;
    let session = logged_in_session(&server).await;
    mount_refresh(&server, 200, 2).await;

    Mock::given(method("GET"))
        .and(path("/api/campaigns/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/campaigns/"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let client = session.install(reqwest::Client::new());
    // Both calls go out with the old token before either renews
    let first = client.request(reqwest::Method::GET, "campaigns/").build().unwrap();
    let second = client.request(reqwest::Method::GET, "campaigns/").build().unwrap();
    let (a, b) = tokio::join!(client.execute(first), client.execute(second));

    assert!(a.is_ok());
    assert!(b.is_ok());
}
