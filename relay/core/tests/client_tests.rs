//! Client Streaming Tests
//!
//! End-to-end through `AgentClient` with an in-process agent: cancellation,
//! transport failure, session capture and bus delivery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use relay_core::streaming::PumpConfig;
use relay_core::transport::{
    AgentRequest, AgentTransport, Connection, InProcessTransport, IncomingRequest,
};
use relay_core::{
    ActiveThread, AgentClient, BusEvent, EventBus, RequestContext, ThreadSessionStore, TodoBoard,
    Topic, TransportError, UiChunk,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(5);

/// Agent that accepts the connection attempt and never answers
struct StalledTransport;

#[async_trait]
impl AgentTransport for StalledTransport {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn open(&self, _request: &AgentRequest) -> Result<Connection, TransportError> {
        std::future::pending().await
    }
}

fn client() -> (AgentClient, mpsc::Receiver<IncomingRequest>) {
    let (transport, requests) = InProcessTransport::new_pair();
    let client = AgentClient::new(Arc::new(transport), ThreadSessionStore::in_memory());
    (client, requests)
}

async fn next_request(requests: &mut mpsc::Receiver<IncomingRequest>) -> IncomingRequest {
    assert_ok!(timeout(WAIT, requests.recv()).await).expect("agent request")
}

fn kinds(chunks: &[UiChunk]) -> Vec<&'static str> {
    chunks.iter().map(UiChunk::kind).collect()
}

/// Wait for every pump to exit
async fn wait_until_idle(client: &AgentClient) {
    assert_ok!(
        timeout(WAIT, async {
            while !client.registry().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
    );
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_abort_mid_stream_suppresses_everything() {
    let (client, mut requests) = client();
    let mut stream = client.send("hi", &RequestContext::for_thread("t1"));
    let incoming = next_request(&mut requests).await;

    incoming
        .send_line(r#"{"type":"text_delta","content":"par"}"#)
        .await;
    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(assert_ok!(timeout(WAIT, stream.next()).await).expect("chunk"));
    }
    assert_eq!(
        kinds(&seen),
        vec!["start", "start-step", "text-start", "text-delta"]
    );

    stream.abort();
    stream.abort();
    assert_ok!(timeout(WAIT, incoming.closed()).await);
    assert!(!incoming.send_line(r#"{"type":"done"}"#).await);

    assert_eq!(assert_ok!(timeout(WAIT, stream.next()).await), None);
    wait_until_idle(&client).await;
}

#[tokio::test]
async fn test_abort_after_done_is_a_no_op() {
    let (client, mut requests) = client();
    let stream = client.send("hi", &RequestContext::new());
    let handle = stream.abort_handle();
    let incoming = next_request(&mut requests).await;
    incoming.send_line(r#"{"type":"done"}"#).await;

    let chunks = assert_ok!(timeout(WAIT, stream.collect()).await);
    assert_eq!(
        kinds(&chunks),
        vec!["start", "start-step", "finish-step", "finish"]
    );

    handle.abort();
    handle.abort();
}

#[tokio::test]
async fn test_abort_discards_buffered_chunks() {
    let (client, mut requests) = client();
    let stream = client.send("hi", &RequestContext::new());
    let incoming = next_request(&mut requests).await;
    incoming
        .send_line(r#"{"type":"text_delta","content":"hi"}"#)
        .await;
    incoming.send_line(r#"{"type":"done"}"#).await;

    // The pump has queued the whole response, finish included
    wait_until_idle(&client).await;
    stream.abort();
    assert!(assert_ok!(timeout(WAIT, stream.collect()).await).is_empty());
}

#[tokio::test]
async fn test_abort_ends_adapted_stream() {
    use futures::StreamExt;

    let (client, mut requests) = client();
    let stream = client.send("hi", &RequestContext::new());
    let handle = stream.abort_handle();
    let incoming = next_request(&mut requests).await;
    incoming
        .send_line(r#"{"type":"text_delta","content":"hi"}"#)
        .await;
    incoming.send_line(r#"{"type":"done"}"#).await;
    wait_until_idle(&client).await;

    let mut chunks = Box::pin(stream.into_stream());
    assert_eq!(
        assert_ok!(timeout(WAIT, chunks.next()).await),
        Some(UiChunk::Start)
    );
    handle.abort();
    assert_eq!(assert_ok!(timeout(WAIT, chunks.next()).await), None);
}

#[tokio::test]
async fn test_abort_while_waiting_for_first_event() {
    let (client, mut requests) = client();
    let mut stream = client.send("hi", &RequestContext::new());
    let incoming = next_request(&mut requests).await;

    stream.abort();
    assert_eq!(assert_ok!(timeout(WAIT, stream.next()).await), None);
    assert_ok!(timeout(WAIT, incoming.closed()).await);
}

#[tokio::test]
async fn test_delete_thread_aborts_and_forgets() {
    let (client, mut requests) = client();
    client.sessions().set_session_id("t1", "S1");
    let mut stream = client.send("one", &RequestContext::for_thread("t1"));
    let other = client.send("two", &RequestContext::for_thread("t2"));
    let a = next_request(&mut requests).await;
    let b = next_request(&mut requests).await;
    let second = if a.request.content == "two" { a } else { b };

    assert_eq!(client.delete_thread("t1"), 1);
    assert_eq!(client.sessions().get_session_id("t1"), None);
    assert_eq!(assert_ok!(timeout(WAIT, stream.next()).await), None);

    second.send_line(r#"{"type":"done"}"#).await;
    let chunks = assert_ok!(timeout(WAIT, other.collect()).await);
    assert_eq!(chunks.last(), Some(&UiChunk::Finish));
}

// ============================================================================
// Transport failure
// ============================================================================

#[tokio::test]
async fn test_connection_error_forces_completion() {
    let (client, mut requests) = client();
    let stream = client.send("hi", &RequestContext::new());
    let incoming = next_request(&mut requests).await;

    incoming
        .send_line(r#"{"type":"reasoning","content":"hmm","status":"thinking"}"#)
        .await;
    incoming
        .send_line(r#"{"type":"text_delta","content":"par"}"#)
        .await;
    incoming.fail(TransportError::ConnectionClosed).await;

    let chunks = assert_ok!(timeout(WAIT, stream.collect()).await);
    assert_eq!(
        kinds(&chunks),
        vec![
            "start",
            "start-step",
            "reasoning-start",
            "reasoning-delta",
            "text-start",
            "text-delta",
            "error",
            "text-end",
            "reasoning-end",
            "finish-step",
            "finish"
        ]
    );
    assert_eq!(
        chunks[6],
        UiChunk::Error {
            error_text: "Connection closed".to_string()
        }
    );
}

#[tokio::test]
async fn test_eof_without_done_completes() {
    let (client, mut requests) = client();
    let stream = client.send("hi", &RequestContext::new());
    let incoming = next_request(&mut requests).await;
    incoming.send_bytes(&b"{\"type\":\"text_delta\",\"content\":\"x\"}"[..]).await;
    drop(incoming);

    let chunks = assert_ok!(timeout(WAIT, stream.collect()).await);
    assert_eq!(
        kinds(&chunks),
        vec![
            "start",
            "start-step",
            "text-start",
            "text-delta",
            "text-end",
            "finish-step",
            "finish"
        ]
    );
}

#[tokio::test]
async fn test_agent_unreachable_reports_error() {
    let (client, requests) = client();
    drop(requests);

    let chunks =
        assert_ok!(timeout(WAIT, client.send("hi", &RequestContext::new()).collect()).await);
    assert_eq!(
        kinds(&chunks),
        vec!["start", "start-step", "error", "finish-step", "finish"]
    );
}

#[tokio::test]
async fn test_connect_timeout_reports_error() {
    let client = AgentClient::new(Arc::new(StalledTransport), ThreadSessionStore::in_memory())
        .with_pump_config(PumpConfig {
            channel_capacity: 16,
            connect_timeout: Duration::from_millis(50),
        });

    let chunks =
        assert_ok!(timeout(WAIT, client.send("hi", &RequestContext::new()).collect()).await);
    assert_eq!(
        chunks[2],
        UiChunk::Error {
            error_text: "Connection timed out after 50 ms".to_string()
        }
    );
    assert_eq!(chunks.last(), Some(&UiChunk::Finish));
}

// ============================================================================
// Session capture
// ============================================================================

#[tokio::test]
async fn test_session_first_write_wins() {
    let (client, mut requests) = client();
    let stream = client.send("hi", &RequestContext::for_thread("t1"));
    let incoming = next_request(&mut requests).await;
    incoming
        .send_line(r#"{"type":"session_id","session_id":"A"}"#)
        .await;
    incoming
        .send_line(r#"{"type":"session_id","session_id":"B"}"#)
        .await;
    incoming.send_line(r#"{"type":"done"}"#).await;

    let chunks = assert_ok!(timeout(WAIT, stream.collect()).await);
    assert!(chunks.iter().all(|c| c.is_envelope()));
    assert_eq!(client.sessions().get_session_id("t1").as_deref(), Some("A"));
}

#[tokio::test]
async fn test_thread_switch_mid_stream_keeps_original_binding() {
    let (client, mut requests) = client();
    let active = ActiveThread::new();
    active.set(Some("t1".to_string()));

    let stream = client.send("hi", &RequestContext::from_active(&active.watch()));
    let incoming = next_request(&mut requests).await;
    incoming
        .send_line(r#"{"type":"text_delta","content":"working"}"#)
        .await;

    active.set(Some("t2".to_string()));
    incoming
        .send_line(r#"{"type":"session_id","session_id":"S1"}"#)
        .await;
    incoming.send_line(r#"{"type":"done"}"#).await;
    assert_ok!(timeout(WAIT, stream.collect()).await);

    assert_eq!(client.sessions().get_session_id("t1").as_deref(), Some("S1"));
    assert_eq!(client.sessions().get_session_id("t2"), None);

    // The next request on t1 resumes the session
    let _again = client.send("more", &RequestContext::for_thread("t1"));
    let incoming = next_request(&mut requests).await;
    assert_eq!(incoming.request.session_id.as_deref(), Some("S1"));
}

#[tokio::test]
async fn test_session_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions").join("thread-sessions.json");

    {
        let (transport, mut requests) = InProcessTransport::new_pair();
        let sessions = assert_ok!(ThreadSessionStore::open(&path).await);
        let client = AgentClient::new(Arc::new(transport), sessions.clone());
        let stream = client.send("hi", &RequestContext::for_thread("t1"));
        let incoming = next_request(&mut requests).await;
        incoming
            .send_line(r#"{"type":"session_id","id":"legacy-S"}"#)
            .await;
        drop(incoming);
        assert_ok!(timeout(WAIT, stream.collect()).await);
        assert_ok!(sessions.flush().await);
    }

    let reopened = assert_ok!(ThreadSessionStore::open(&path).await);
    assert_eq!(reopened.get_session_id("t1").as_deref(), Some("legacy-S"));
}

// ============================================================================
// Event bus
// ============================================================================

#[tokio::test]
async fn test_todo_events_reach_bus_and_board() {
    let bus = EventBus::new();
    let board = TodoBoard::new();
    let _feeder = board.attach(&bus);
    let mut list_topic = bus.subscribe(Topic::TodoListUpdate);
    let mut canvas_topic = bus.subscribe(Topic::UseCanvas);
    let mut changes = board.changes();

    let (transport, mut requests) = InProcessTransport::new_pair();
    let client = AgentClient::new(Arc::new(transport), ThreadSessionStore::in_memory())
        .with_bus(bus.clone());
    let stream = client.send("plan it", &RequestContext::new());
    let incoming = next_request(&mut requests).await;

    incoming
        .send_line(
            r#"{"type":"todo_list","data":{"list_id":"L1","title":"Plan","items":[{"content":"Read","status":"pending"},{"content":"Write","status":"pending"}]}}"#,
        )
        .await;
    incoming
        .send_line(r#"{"type":"todo_update","data":{"list_id":"L1","item_id":"todo_1","status":"completed"}}"#)
        .await;
    incoming
        .send_line(r#"{"type":"use_canvas","data":{"action":"create","file":{"name":"a.md"},"message":"opened"}}"#)
        .await;
    incoming.send_line(r#"{"type":"done"}"#).await;

    let chunks = assert_ok!(timeout(WAIT, stream.collect()).await);
    assert_eq!(
        kinds(&chunks),
        vec![
            "start",
            "start-step",
            "data-todo_list",
            "data-todo_update",
            "finish-step",
            "finish"
        ]
    );

    let Some(BusEvent::TodoList(list)) = assert_ok!(timeout(WAIT, list_topic.recv()).await)
    else {
        panic!("expected todo list on bus");
    };
    assert_eq!(list.list_id, "L1");
    assert_eq!(list.items.len(), 2);

    let Some(BusEvent::Canvas(canvas)) = assert_ok!(timeout(WAIT, canvas_topic.recv()).await)
    else {
        panic!("expected canvas event on bus");
    };
    assert_eq!(canvas.message, "opened");

    assert_ok!(
        timeout(WAIT, async {
            while *changes.borrow_and_update() < 2 {
                changes.changed().await.expect("board alive");
            }
        })
        .await
    );
    let list = board.list("L1").expect("list on board");
    assert_eq!(list.items[0].status, "pending");
    assert_eq!(list.items[1].status, "completed");
    assert_eq!(list.completed_count(), 1);
}
