mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{ChunkMessage, FetchRequest, FetchResult, Sender};
use courier_engine::{
    Coordinator, CoordinatorSettings, FetchSettings, Fetcher, ReqwestFetcher, TokioScheduler,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{init_logging, wait_until, RecordingTransport};

/// Serves a canned result for any request.
struct StaticFetcher {
    result: FetchResult,
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _request: &FetchRequest) -> FetchResult {
        self.result.clone()
    }
}

fn ok_result(bytes: Vec<u8>) -> FetchResult {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "text/css".to_string());
    FetchResult {
        bytes,
        headers,
        status: Some(200),
        error: None,
    }
}

fn coordinator_with_result(
    transport: Arc<RecordingTransport>,
    result: FetchResult,
    chunk_size: usize,
) -> Coordinator {
    let settings = CoordinatorSettings {
        chunk_size,
        ..CoordinatorSettings::default()
    };
    Coordinator::with_parts(
        transport,
        Arc::new(StaticFetcher { result }),
        Arc::new(TokioScheduler),
        settings,
    )
}

fn as_chunk(message: &Value) -> ChunkMessage {
    serde_json::from_value(message.clone()).expect("chunk message")
}

#[tokio::test]
async fn fetch_message_acks_immediately_and_delivers_chunks() {
    init_logging();
    let transport = RecordingTransport::new();
    let coordinator = coordinator_with_result(transport.clone(), ok_result((0..5).collect()), 2);

    let ack = coordinator.handle_message(
        Sender::new(3, 1),
        json!({
            "method": "fetch",
            "url": "https://example.com/style.css",
            "headers": {},
            "requestId": 21,
        }),
    );
    assert_eq!(ack, Some(json!({"success": true})));

    wait_until(|| transport.sent_count() == 3).await;
    let sent = transport.sent();
    let reassembled: Vec<u8> = sent
        .iter()
        .flat_map(|entry| as_chunk(&entry.message).byte_array)
        .collect();
    assert_eq!(reassembled, (0..5).collect::<Vec<u8>>());
    for entry in &sent {
        assert_eq!(entry.tab, 3);
        assert_eq!(as_chunk(&entry.message).request_id, 21);
    }
}

#[tokio::test]
async fn fetch_frame_is_forwarded_verbatim_to_the_sender_tab() {
    init_logging();
    let transport = RecordingTransport::new();
    let coordinator = coordinator_with_result(transport.clone(), ok_result(Vec::new()), 8);

    let payload = json!({
        "method": "fetchFrame",
        "nested": {"frameId": 4, "blob": [1, 2, 3]},
    });
    let ack = coordinator.handle_message(Sender::new(6, 4), payload.clone());
    assert_eq!(ack, Some(json!({"success": true})));

    wait_until(|| transport.sent_count() == 1).await;
    let sent = transport.sent();
    assert_eq!(sent[0].tab, 6);
    assert_eq!(sent[0].frame, None);
    assert_eq!(sent[0].message, payload);
}

#[tokio::test]
async fn frame_tree_messages_go_verbatim_to_the_top_frame() {
    init_logging();
    let transport = RecordingTransport::new();
    let coordinator = coordinator_with_result(transport.clone(), ok_result(Vec::new()), 8);

    for (index, method) in ["frameTree.initResponse", "frameTree.ackInitRequest"]
        .iter()
        .enumerate()
    {
        let payload = json!({"method": method, "sessionId": index});
        let ack = coordinator.handle_message(Sender::new(2, 7), payload.clone());
        assert_eq!(ack, Some(json!({})));

        wait_until(|| transport.sent_count() == index + 1).await;
        let sent = transport.sent();
        assert_eq!(sent[index].tab, 2);
        assert_eq!(sent[index].frame, Some(0));
        assert_eq!(sent[index].message, payload);
    }
}

#[tokio::test]
async fn timeout_messages_ack_with_an_empty_object() {
    init_logging();
    let transport = RecordingTransport::new();
    let coordinator = coordinator_with_result(transport.clone(), ok_result(Vec::new()), 8);
    let sender = Sender::new(1, 0);

    let ack = coordinator.handle_message(
        sender,
        json!({"method": "lazyTimeout.setTimeout", "type": "x", "delay": 40}),
    );
    assert_eq!(ack, Some(json!({})));
    assert_eq!(coordinator.pending_timeouts(), 1);

    let ack = coordinator.handle_message(
        sender,
        json!({"method": "lazyTimeout.clearTimeout", "type": "x"}),
    );
    assert_eq!(ack, Some(json!({})));
    assert_eq!(coordinator.pending_timeouts(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn timeouts_are_scoped_to_the_sending_frame() {
    init_logging();
    let transport = RecordingTransport::new();
    let coordinator = coordinator_with_result(transport.clone(), ok_result(Vec::new()), 8);

    coordinator.handle_message(
        Sender::new(1, 5),
        json!({"method": "lazyTimeout.setTimeout", "type": "x", "delay": 20}),
    );

    wait_until(|| transport.sent_count() == 1).await;
    let sent = transport.sent();
    assert_eq!(sent[0].tab, 1);
    assert_eq!(sent[0].frame, Some(5));
    assert_eq!(
        sent[0].message,
        json!({"method": "lazyTimeout.onTimeout", "type": "x"})
    );
}

#[tokio::test]
async fn closing_a_tab_cancels_its_pending_timeouts() {
    init_logging();
    let transport = RecordingTransport::new();
    let coordinator = coordinator_with_result(transport.clone(), ok_result(Vec::new()), 8);

    for frame in [0, 1] {
        coordinator.handle_message(
            Sender::new(9, frame),
            json!({"method": "lazyTimeout.setTimeout", "type": "x", "delay": 40}),
        );
    }
    assert_eq!(coordinator.pending_timeouts(), 2);

    coordinator.on_tab_removed(9);
    assert_eq!(coordinator.pending_timeouts(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn malformed_and_unknown_messages_get_no_ack() {
    init_logging();
    let transport = RecordingTransport::new();
    let coordinator = coordinator_with_result(transport.clone(), ok_result(Vec::new()), 8);
    let sender = Sender::new(1, 0);

    assert_eq!(coordinator.handle_message(sender, json!({"no": "method"})), None);
    assert_eq!(
        coordinator.handle_message(sender, json!({"method": "unknown.method"})),
        None
    );
    // A known method with a broken payload is tolerated the same way.
    assert_eq!(
        coordinator.handle_message(sender, json!({"method": "fetch", "url": 5})),
        None
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn fetch_relays_a_real_response_end_to_end() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw((0u8..10).collect::<Vec<u8>>(), "font/woff2"),
        )
        .mount(&server)
        .await;

    let transport = RecordingTransport::new();
    let settings = CoordinatorSettings {
        chunk_size: 4,
        fetch: FetchSettings::default(),
    };
    let coordinator = Coordinator::with_parts(
        transport.clone(),
        Arc::new(ReqwestFetcher::new(settings.fetch.clone())),
        Arc::new(TokioScheduler),
        settings,
    );

    let ack = coordinator.handle_message(
        Sender::new(5, 2),
        json!({
            "method": "fetch",
            "url": format!("{}/doc", server.uri()),
            "requestId": 77,
        }),
    );
    assert_eq!(ack, Some(json!({"success": true})));

    wait_until(|| transport.sent_count() == 3).await;
    let sent = transport.sent();
    let chunks: Vec<ChunkMessage> = sent.iter().map(|entry| as_chunk(&entry.message)).collect();

    let reassembled: Vec<u8> = chunks
        .iter()
        .flat_map(|chunk| chunk.byte_array.iter().copied())
        .collect();
    assert_eq!(reassembled, (0u8..10).collect::<Vec<u8>>());
    assert_eq!(chunks[0].status, Some(200));
    assert_eq!(
        chunks[0].headers.get("content-type").map(String::as_str),
        Some("font/woff2")
    );
    assert_eq!(chunks[2].finished, Some(true));
}
