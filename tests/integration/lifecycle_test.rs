//! Health, fire-and-forget ingest, and shutdown behaviour.

use std::time::Duration;

use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

use crate::common::*;

#[tokio::test]
async fn test_health_reports_serving() {
    let gateway = start_gateway(
        config(&[(PROCESS_URL, "BarStream")], 30_000, 1_000),
        Processing::Echo,
    )
    .await;

    let channel = tonic::transport::Endpoint::new(format!("http://127.0.0.1:{}", gateway.port))
        .unwrap()
        .connect()
        .await
        .unwrap();
    let mut health = HealthClient::new(channel);
    let response = health
        .check(HealthCheckRequest {
            service: "eventgate.EventService".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status(), ServingStatus::Serving);

    gateway.stop().await;
}

#[tokio::test]
async fn test_consume_acknowledges_without_replies() {
    let mut gateway = start_gateway(
        config(&[(PROCESS_URL, "BarStream")], 30_000, 1_000),
        Processing::Echo,
    )
    .await;

    let messages = vec![
        event(r#"{"n":1}"#, &[("message.id", "c1")]),
        event("not json", &[("message.id", "c2")]),
    ];
    gateway
        .client
        .consume(tokio_stream::iter(messages))
        .await
        .unwrap();

    assert!(gateway.endpoints[0].table().is_empty().await);
    gateway.stop().await;
}

#[tokio::test]
async fn test_shutdown_fails_pending_call() {
    let gateway = start_gateway(
        config(&[(PROCESS_URL, "BarStream")], 30_000, 1_000),
        Processing::Silent,
    )
    .await;
    let endpoint = gateway.endpoints[0].clone();

    let mut client = gateway.client.clone();
    let call = tokio::spawn(async move {
        client
            .process(event(r#"{"message":"hi"}"#, &[("message.id", "m1")]))
            .await
    });

    for _ in 0..100 {
        if endpoint.table().contains("m1").await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    gateway.stop().await;

    let reply = call.await.unwrap().unwrap().into_inner();
    assert_eq!(reply.correlation_id, "m1");
    assert_eq!(failure_kind(&reply), Some(FailureKind::Shutdown));
    assert!(endpoint.table().is_closed().await);
}

#[tokio::test]
async fn test_consumed_message_never_answers_process_call() {
    let mut gateway = start_gateway(
        config(&[(PROCESS_URL, "BarStream")], 30_000, 1_000),
        Processing::Echo,
    )
    .await;

    gateway
        .client
        .consume(tokio_stream::iter(vec![event(
            r#"{"message":"someone-else"}"#,
            &[("message.id", "m1")],
        )]))
        .await
        .unwrap();

    let reply = gateway
        .client
        .process(event(r#"{"message":"mine"}"#, &[("message.id", "m1")]))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(reply.correlation_id, "m1");
    let body: serde_json::Value = serde_json::from_str(result_payload(&reply).unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({"message": "mine"}));

    gateway.stop().await;
}
