//! HttpGateway against a local upstream

mod common;

use common::spawn_upstream;
use serde_json::json;
use skin_flow::{ClassificationGateway, Endpoint, GatewayError, HttpGateway, UserProfile};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn gateway(base: &str) -> HttpGateway {
    HttpGateway::new(
        &format!("{}/level1", base),
        &format!("{}/level2", base),
        Duration::from_secs(5),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn test_identity_is_relayed_as_json() {
    let (base, upstream) = spawn_upstream().await;
    let gateway = gateway(&base);

    let profile = UserProfile {
        name: "Alex".to_string(),
        location: "12 Elm St".to_string(),
    };
    let ack = assert_ok!(gateway.submit_identity(&profile).await);
    assert_eq!(ack.status, 200);
    assert_eq!(ack.body["success"], true);

    let sent = upstream.received("/level1");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, json!({ "name": "Alex", "location": "12 Elm St" }));
    assert_eq!(sent[0].content_type.as_deref(), Some("application/json"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_relay_forwards_body_untouched() {
    let (base, upstream) = spawn_upstream().await;
    let body = json!({ "anything": [1, 2, 3], "nested": { "ok": true } });

    let relayed = assert_ok!(gateway(&base).relay(Endpoint::Identity, body.clone()).await);
    assert_eq!(relayed.status, 200);
    assert_eq!(upstream.received("/level1")[0].body, body);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plain_text_reply_is_relayed() {
    let (base, upstream) = spawn_upstream().await;
    upstream.reply_identity_text("Form submitted");

    let relayed = assert_ok!(gateway(&base).relay(Endpoint::Identity, json!({})).await);
    assert_eq!(relayed.status, 200);
    assert_eq!(relayed.body, json!("Form submitted"));
    assert_eq!(relayed.raw, "Form submitted");
    assert!(!relayed.is_json());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upstream_status_is_kept() {
    let (base, upstream) = spawn_upstream().await;
    upstream.fail_identity(503);

    let err = assert_err!(gateway(&base).relay(Endpoint::Identity, json!({})).await);
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.to_string(), "Request failed with status code 503");
    assert_eq!(err.details(), json!({ "message": "Service Unavailable" }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_upstream_is_network_error() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = assert_err!(
        gateway(&format!("http://{}", addr))
            .relay(Endpoint::Classify, json!({ "Image": "QUJD" }))
            .await
    );
    assert!(matches!(err, GatewayError::Network { .. }));
    assert_eq!(err.status(), None);
    assert_eq!(err.details(), serde_json::Value::Null);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_image_prefix_stripped_and_scores_normalized() {
    let (base, upstream) = spawn_upstream().await;

    let result = assert_ok!(
        gateway(&base)
            .submit_image("data:image/png;base64,iVBORw0KGgo=")
            .await
    );

    assert_eq!(
        upstream.received("/level2")[0].body,
        json!({ "Image": "iVBORw0KGgo=" })
    );

    let race = result.race.unwrap();
    assert_eq!(race.predicted, "black");
    assert_eq!(race.confidence, 99.51);
    assert_eq!(race.confidences[0].label, "black");
    assert_eq!(race.confidences[1].label, "white");

    let gender = result.gender.unwrap();
    assert_eq!(gender.predicted, "female");
    assert_eq!(gender.confidences.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_prediction_is_decode_error() {
    let (base, upstream) = spawn_upstream().await;
    *upstream.classify_body.lock().unwrap() = json!({ "message": "success", "data": {} });

    let err = assert_err!(gateway(&base).submit_image("QUJD").await);
    assert!(matches!(err, GatewayError::Decode { .. }));
}
