//! Streaming calls through `Exchange`.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::common::*;

#[tokio::test]
async fn test_exchange_answers_every_message_then_ends() {
    let mut gateway = start_gateway(
        config(&[(EXCHANGE_URL, "FooStream")], 30_000, 1_000),
        Processing::Echo,
    )
    .await;

    let (tx, rx) = mpsc::unbounded_channel();
    let mut replies = gateway
        .client
        .exchange(UnboundedReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    for id in ["a", "b", "c"] {
        tx.send(event(&format!(r#"{{"id":"{id}"}}"#), &[("message.id", id)]))
            .unwrap();
    }
    drop(tx);

    let mut seen = HashSet::new();
    let collect = async {
        while let Some(reply) = replies.message().await.unwrap() {
            assert!(result_payload(&reply).is_some());
            seen.insert(reply.correlation_id);
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .unwrap();

    let expected: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    assert_eq!(seen, expected);

    gateway.stop().await;
}

#[tokio::test]
async fn test_exchange_expired_entry_does_not_end_stream() {
    let mut gateway = start_gateway(
        config(&[(EXCHANGE_URL, "FooStream")], 200, 50),
        Processing::Silent,
    )
    .await;
    let endpoint = gateway.endpoints[0].clone();

    let (tx, rx) = mpsc::unbounded_channel();
    let mut replies = gateway
        .client
        .exchange(UnboundedReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    tx.send(event(r#"{"n":1}"#, &[("message.id", "old")])).unwrap();

    let expired = tokio::time::timeout(Duration::from_secs(5), replies.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(expired.correlation_id, "old");
    assert_eq!(failure_kind(&expired), Some(FailureKind::Timeout));

    // The stream is still usable after one of its calls expired.
    tx.send(event(r#"{"n":2}"#, &[("message.id", "new")])).unwrap();
    drop(tx);

    for _ in 0..100 {
        if endpoint.table().contains("new").await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let pending = endpoint.table().claim("new").await.unwrap();
    pending.complete(eventgate::broker::Completion::Result(event("done", &[])));

    let answered = replies.message().await.unwrap().unwrap();
    assert_eq!(answered.correlation_id, "new");
    assert_eq!(result_payload(&answered), Some("done"));
    assert!(replies.message().await.unwrap().is_none());

    gateway.stop().await;
}

#[tokio::test]
async fn test_exchange_rejects_message_for_unknown_stream() {
    let mut gateway = start_gateway(
        config(
            &[(PROCESS_URL, "BarStream"), (EXCHANGE_URL, "FooStream")],
            30_000,
            1_000,
        ),
        Processing::Echo,
    )
    .await;

    let (tx, rx) = mpsc::unbounded_channel();
    let mut replies = gateway
        .client
        .exchange(UnboundedReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    tx.send(event(
        r#"{"n":1}"#,
        &[("message.id", "lost"), ("stream.id", "Nowhere")],
    ))
    .unwrap();
    drop(tx);

    let reply = replies.message().await.unwrap().unwrap();
    assert_eq!(reply.correlation_id, "lost");
    assert_eq!(failure_kind(&reply), Some(FailureKind::Rejected));
    assert!(replies.message().await.unwrap().is_none());

    gateway.stop().await;
}
