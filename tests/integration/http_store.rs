// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for [`HttpStore`] against a mock script endpoint.
//!
//! Uses wiremock to stand in for the spreadsheet-backed endpoint.
//!
//! These tests validate:
//! - Reads carry a cache-busting `t` parameter and decode leniently
//! - Non-success statuses and malformed bodies surface as protocol errors
//! - Writes send the `{user, message, session, version}` body as text/plain
//! - Pings report reachability without failing
//! - A session runs end to end over HTTP

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use omichat::session::{Session, SessionConfig};
use omichat::store::http::HttpStore;
use omichat::store::{RemoteStore, StoreError};
use omichat_proto::api::SendRequest;
use omichat_proto::message::MessageId;

const SCRIPT_PATH: &str = "/macros/s/test/exec";

/// Matches requests whose query string carries `key`, whatever its value.
struct HasQueryKey(&'static str);

impl Match for HasQueryKey {
    fn matches(&self, request: &Request) -> bool {
        request.url.query_pairs().any(|(k, _)| k == self.0)
    }
}

fn store_for(server: &MockServer) -> HttpStore {
    let endpoint = Url::parse(&format!("{}{SCRIPT_PATH}", server.uri())).unwrap();
    HttpStore::new(endpoint, Duration::from_secs(5)).unwrap()
}

fn request(user: &str, message: &str) -> SendRequest {
    SendRequest {
        user: user.to_string(),
        message: message.to_string(),
        session: "omichat_v0.3".to_string(),
        version: "0.3".to_string(),
    }
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn fetch_sends_cache_buster_and_decodes_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SCRIPT_PATH))
        .and(HasQueryKey("t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "user": "bob", "message": "hi", "timestamp": "2024-01-15T10:30:00.000Z"},
            {"id": "2", "user": "carol", "message": "hey", "timestamp": "2024-01-15T10:31:00.000Z"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let feed = store_for(&server).fetch_messages().await.unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].id, MessageId::new(1));
    assert_eq!(feed[0].author, "bob");
    assert_eq!(feed[1].id, MessageId::new(2));
    assert_eq!(feed[1].body, "hey");
}

#[tokio::test]
async fn non_array_body_is_an_empty_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "busy"})))
        .mount(&server)
        .await;

    let feed = store_for(&server).fetch_messages().await.unwrap();
    assert!(feed.is_empty());
}

#[tokio::test]
async fn error_status_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch_messages().await.unwrap_err();
    assert!(matches!(err, StoreError::Protocol(ref m) if m.contains("500")));
}

#[tokio::test]
async fn malformed_body_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>quota</html>"))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch_messages().await.unwrap_err();
    assert!(matches!(err, StoreError::Protocol(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    // Bind and drop a listener so the port is closed.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let endpoint = Url::parse(&format!("http://127.0.0.1:{port}{SCRIPT_PATH}")).unwrap();
    let store = HttpStore::new(endpoint, Duration::from_secs(2)).unwrap();

    let err = store.fetch_messages().await.unwrap_err();
    assert!(matches!(err, StoreError::Network(_)));
    assert!(!store.ping().await);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn post_sends_text_plain_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCRIPT_PATH))
        .and(header("content-type", "text/plain;charset=utf-8"))
        .and(body_json(json!({
            "user": "alice",
            "message": "hello",
            "session": "omichat_v0.3",
            "version": "0.3",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "id": 42,
            "timestamp": "2024-01-15T10:30:00.000Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = store_for(&server)
        .post_message(&request("alice", "hello"))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.id, Some(MessageId::new(42)));
}

#[tokio::test]
async fn post_rejection_is_returned_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .mount(&server)
        .await;

    let response = store_for(&server)
        .post_message(&request("alice", "hello"))
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.id, None);
}

#[tokio::test]
async fn post_with_non_object_body_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .post_message(&request("alice", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Protocol(_)));
}

// =============================================================================
// Ping
// =============================================================================

#[tokio::test]
async fn ping_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(HasQueryKey("ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .expect(1)
        .mount(&server)
        .await;
    assert!(store_for(&server).ping().await);

    let failing = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&failing)
        .await;
    assert!(!store_for(&failing).ping().await);
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn session_syncs_and_sends_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SCRIPT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "user": "bob", "message": "hi alice", "timestamp": "2024-01-15T10:30:00.000Z"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SCRIPT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "id": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let config = SessionConfig {
        poll_interval: Duration::from_secs(60),
        ..SessionConfig::default()
    };
    let (session, _rx) = Session::new(store_for(&server), None, config);
    session.start("alice").await.unwrap();
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.online_users(), vec!["alice", "bob"]);
    assert!(session.settings().unwrap().connected);

    session.send("hi bob").await.unwrap();
    assert_eq!(session.last_seen_id(), Some(MessageId::new(2)));
    assert_eq!(session.history().len(), 2);

    session.logout();
}
