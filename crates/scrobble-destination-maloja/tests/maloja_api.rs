//! Maloja API tests against a mock HTTP server

use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use scrobble_core::config::{ClientOptions, ProtocolPreference};
use scrobble_core::traits::DestinationApi;
use scrobble_core::{
    ClientRegistry, DeliveryStatus, DestinationClient, DestinationConfig, DispatchOptions, Error,
    PlayEvent,
};
use scrobble_destination_maloja::MalojaApi;
use serde_json::json;
use std::collections::HashMap;

const SERVERINFO_V3: &str =
    r#"{"name": "maloja", "version": [3, 2, 4], "versionstring": "3.2.4", "db_status": {"healthy": true}}"#;
const SERVERINFO_V2: &str = r#"{"name": "maloja", "version": [2, 14, 6], "versionstring": "2.14.6"}"#;

fn api(server: &Server) -> MalojaApi {
    MalojaApi::new(&server.url(), "k", &ClientOptions::default()).unwrap()
}

fn play(title: &str) -> PlayEvent {
    PlayEvent::new(["A", "B"], title, Utc::now()).unwrap()
}

#[tokio::test]
async fn connection_check_detects_structured_server() {
    let mut server = Server::new_async().await;
    let info = server
        .mock("GET", "/apis/mlj_1/serverinfo")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(SERVERINFO_V3)
        .expect(1)
        .create_async()
        .await;

    let api = api(&server);
    api.check_connection().await.unwrap();

    // cached: no second probe
    assert_eq!(api.protocol().await.unwrap(), scrobble_destination_maloja::codec::ProtocolVersion::Structured);
    info.assert_async().await;
}

#[tokio::test]
async fn unhealthy_database_is_a_connection_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/apis/mlj_1/serverinfo")
        .with_status(200)
        .with_body(r#"{"version": [3, 0, 0], "db_status": {"healthy": false}}"#)
        .create_async()
        .await;

    let err = api(&server).check_connection().await.unwrap_err();
    assert!(err.is_connection());
}

#[tokio::test]
async fn rejected_key_is_an_auth_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/apis/mlj_1/test")
        .match_query(Matcher::UrlEncoded("key".into(), "k".into()))
        .with_status(403)
        .with_body(r#"{"status": "error", "error": "Wrong API key"}"#)
        .create_async()
        .await;

    let err = api(&server).test_auth().await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn accepted_key_passes() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/apis/mlj_1/test")
        .match_query(Matcher::UrlEncoded("key".into(), "k".into()))
        .with_status(200)
        .with_body(r#"{"status": "ok"}"#)
        .create_async()
        .await;

    api(&server).test_auth().await.unwrap();
}

#[tokio::test]
async fn flat_server_gets_joined_artist() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/apis/mlj_1/serverinfo")
        .with_status(200)
        .with_body(SERVERINFO_V2)
        .create_async()
        .await;
    let scrobble = server
        .mock("POST", "/apis/mlj_1/newscrobble")
        .match_body(Matcher::PartialJson(json!({"key": "k", "artist": "A, B", "title": "Song"})))
        .with_status(200)
        .with_body(r#"{"status": "success"}"#)
        .expect(1)
        .create_async()
        .await;

    let outcome = api(&server).submit(&play("Song")).await.unwrap();

    assert!(outcome.is_delivered());
    scrobble.assert_async().await;
}

#[tokio::test]
async fn client_error_body_is_decoded_as_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/apis/mlj_1/newscrobble")
        .with_status(400)
        .with_body(r#"{"status": "failure", "error": {"type": "missing_scrobble_data", "value": ["title"], "desc": "A scrobble needs a title"}}"#)
        .create_async()
        .await;

    let options = ClientOptions {
        protocol: ProtocolPreference::Structured,
        ..ClientOptions::default()
    };
    let api = MalojaApi::new(&server.url(), "k", &options).unwrap();
    let outcome = api.submit(&play("Song")).await.unwrap();

    assert!(!outcome.is_delivered());
    assert!(outcome.failure_reason().contains("missing_scrobble_data"));
}

#[tokio::test]
async fn unparseable_body_is_a_delivery_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/apis/mlj_1/newscrobble")
        .with_status(404)
        .with_body("<html>not found</html>")
        .create_async()
        .await;

    let options = ClientOptions {
        protocol: ProtocolPreference::Flat,
        ..ClientOptions::default()
    };
    let api = MalojaApi::new(&server.url(), "k", &options).unwrap();
    let err = api.submit(&play("Song")).await.unwrap_err();

    assert!(matches!(err, Error::Delivery { .. }));
}

#[tokio::test]
async fn recent_scrobbles_are_parsed() {
    let mut server = Server::new_async().await;
    let now = Utc::now().timestamp();
    server
        .mock("GET", "/apis/mlj_1/scrobbles")
        .match_query(Matcher::UrlEncoded("max".into(), "50".into()))
        .with_status(200)
        .with_body(
            json!({"list": [{"time": now, "track": {"artists": ["A"], "title": "Song", "album": null}}]})
                .to_string(),
        )
        .create_async()
        .await;

    let events = api(&server).recent_scrobbles(50).await.unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title(), "Song");
}

#[tokio::test]
async fn failed_scrobble_is_dead_lettered_then_redelivered() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/apis/mlj_1/serverinfo")
        .with_status(200)
        .with_body(SERVERINFO_V3)
        .create_async()
        .await;
    let failing = server
        .mock("POST", "/apis/mlj_1/newscrobble")
        .with_status(500)
        .with_body(r#"{"status": "error", "error": {"type": "database_locked", "desc": "busy"}}"#)
        .expect(1)
        .create_async()
        .await;

    let registry = ClientRegistry::new();
    scrobble_destination_maloja::register(&registry);
    let configs = vec![DestinationConfig::new("maloja", server.url(), "k")];
    registry.build_with_env(&configs, None, &HashMap::new());
    let client = registry.clients().remove(0);

    let status = client.scrobble(&play("Song")).await.unwrap();
    assert_eq!(status, DeliveryStatus::DeadLettered);
    assert_eq!(client.dead_letter_len(), 1);
    failing.assert_async().await;
    failing.remove_async().await;

    server
        .mock("POST", "/apis/mlj_1/newscrobble")
        .with_status(200)
        .with_body(r#"{"status": "success"}"#)
        .create_async()
        .await;

    let report = client.process_dead_letter_queue().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(client.dead_letter_len(), 0);
}

#[tokio::test]
async fn end_to_end_dispatch_delivers_only_in_window_play() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/apis/mlj_1/scrobbles")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"list": []}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/apis/mlj_1/serverinfo")
        .with_status(200)
        .with_body(SERVERINFO_V3)
        .create_async()
        .await;
    let scrobble = server
        .mock("POST", "/apis/mlj_1/newscrobble")
        .match_body(Matcher::PartialJson(json!({
            "key": "k",
            "title": "Fresh",
            "artists": ["A", "B"],
            "albumartists": ["A", "B"]
        })))
        .with_status(200)
        .with_body(r#"{"status": "success", "track": {"title": "Fresh", "artists": ["A", "B"]}}"#)
        .expect(1)
        .create_async()
        .await;

    let registry = ClientRegistry::new();
    scrobble_destination_maloja::register(&registry);
    let configs: Vec<DestinationConfig> =
        serde_json::from_value(json!([{"type": "maloja", "url": server.url(), "apiKey": "k"}])).unwrap();
    assert_eq!(registry.build_with_env(&configs, None, &HashMap::new()), 1);

    let fresh = play("Fresh");
    let stale = PlayEvent::new(["A", "B"], "Stale", Utc::now() - Duration::days(3)).unwrap();

    let attempted = registry
        .scrobble(vec![fresh.clone(), stale], DispatchOptions::default())
        .await;

    assert_eq!(attempted, vec![fresh.clone()]);
    scrobble.assert_async().await;
    assert!(registry.clients()[0].already_scrobbled(&fresh));
}
