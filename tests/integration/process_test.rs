//! Request/response calls through `Process`.

use std::time::Duration;

use crate::common::*;

#[tokio::test]
async fn test_process_echoes_payload() {
    let mut gateway = start_gateway(
        config(&[(PROCESS_URL, "BarStream")], 30_000, 1_000),
        Processing::Echo,
    )
    .await;

    let reply = gateway
        .client
        .process(event(r#"{"message":"hi"}"#, &[("message.id", "m1")]))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(reply.correlation_id, "m1");
    let body: serde_json::Value = serde_json::from_str(result_payload(&reply).unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({"message": "hi"}));
    assert!(reply.completed_at.is_some());
    assert!(gateway.endpoints[0].table().is_empty().await);

    gateway.stop().await;
}

#[tokio::test]
async fn test_process_without_correlation_header_gets_generated_id() {
    let mut gateway = start_gateway(
        config(&[(PROCESS_URL, "BarStream")], 30_000, 1_000),
        Processing::Echo,
    )
    .await;

    let reply = gateway
        .client
        .process(event(r#"{"message":"hi"}"#, &[]))
        .await
        .unwrap()
        .into_inner();

    assert!(uuid::Uuid::parse_str(&reply.correlation_id).is_ok());
    assert!(result_payload(&reply).is_some());

    gateway.stop().await;
}

#[tokio::test]
async fn test_process_routes_by_stream_header() {
    let mut gateway = start_gateway(
        config(
            &[(PROCESS_URL, "BarStream"), (EXCHANGE_URL, "FooStream")],
            30_000,
            1_000,
        ),
        Processing::Echo,
    )
    .await;

    let reply = gateway
        .client
        .process(event(
            r#"{"n":1}"#,
            &[("message.id", "m1"), ("stream.id", "FooStream")],
        ))
        .await
        .unwrap()
        .into_inner();
    assert!(result_payload(&reply).is_some());

    let status = gateway
        .client
        .process(event(r#"{"n":2}"#, &[("message.id", "m2")]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::NotFound);

    gateway.stop().await;
}

#[tokio::test]
async fn test_process_unanswered_call_times_out() {
    let mut gateway = start_gateway(
        config(&[(PROCESS_URL, "BarStream")], 200, 50),
        Processing::Silent,
    )
    .await;

    let reply = tokio::time::timeout(
        Duration::from_secs(5),
        gateway
            .client
            .process(event(r#"{"message":"slow"}"#, &[("message.id", "m2")])),
    )
    .await
    .unwrap()
    .unwrap()
    .into_inner();

    assert_eq!(reply.correlation_id, "m2");
    assert_eq!(failure_kind(&reply), Some(FailureKind::Timeout));
    assert!(gateway.endpoints[0].table().is_empty().await);

    gateway.stop().await;
}

#[tokio::test]
async fn test_process_malformed_payload_is_invalid_argument() {
    let mut gateway = start_gateway(
        config(&[(PROCESS_URL, "BarStream")], 30_000, 1_000),
        Processing::Echo,
    )
    .await;

    let status = gateway
        .client
        .process(event("{oops", &[("message.id", "m1")]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert!(gateway.endpoints[0].table().is_empty().await);

    gateway.stop().await;
}
