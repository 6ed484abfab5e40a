use async_trait::async_trait;
use serde_json::{json, Value};
use speakd::cache::CacheResolver;
use speakd::config_loader::Settings;
use speakd::engine::{PlaybackIntent, SpeechEngine};
use speakd::error::{Result, SpeakError};
use speakd::provider::SpeechProvider;
use speakd::request::SpeechRequest;
use speakd::service::{McpService, SessionState};
use speakd::stdio::serve;
use speakd::supervisor::TaskSupervisor;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Waits for a permit before writing, so tests decide when synthesis finishes.
struct GatedProvider {
    gate: Arc<Semaphore>,
    calls: AtomicU32,
    fail: bool,
}

impl GatedProvider {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(Semaphore::new(0)),
            calls: AtomicU32::new(0),
            fail,
        })
    }
}

#[async_trait]
impl SpeechProvider for GatedProvider {
    async fn synthesize(&self, _request: &SpeechRequest, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await.expect("gate closed");
        if self.fail {
            return Err(SpeakError::Transport {
                attempts: 3,
                last_error: "connection refused".into(),
            });
        }
        tokio::fs::write(dest, b"\xff\xfb\x90\x00audio").await?;
        Ok(())
    }
}

fn service(provider: Arc<GatedProvider>, dir: &Path) -> McpService {
    let engine = SpeechEngine::new(provider, CacheResolver::new(dir, "speakd_"));
    McpService::new(
        Settings::default(),
        TaskSupervisor::new(engine, PlaybackIntent::Delegate),
    )
}

async fn exchange(svc: &mut McpService, lines: &[Value]) -> Vec<Value> {
    let mut input = String::new();
    for line in lines {
        input.push_str(&line.to_string());
        input.push('\n');
    }
    let mut output: Vec<u8> = Vec::new();
    serve(input.as_bytes(), &mut output, svc).await.unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

async fn wait_for_finished(svc: &McpService, n: u64) {
    for _ in 0..200 {
        if svc.supervisor().stats().finished() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("tasks did not finish: {:?}", svc.supervisor().stats());
}

#[tokio::test]
async fn test_one_response_per_request_none_per_notification() {
    let dir = tempfile::tempdir().unwrap();
    let mut svc = service(GatedProvider::new(false), dir.path());

    let responses = exchange(
        &mut svc,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": "two", "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "prompts/list"}),
            json!({"jsonrpc": "2.0", "method": "frobnicate"}),
            json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"}),
        ],
    )
    .await;

    let ids: Vec<Value> = responses.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!("two"), json!(3), json!(4)]);
    assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(responses[2]["result"]["prompts"], json!([]));
    assert_eq!(responses[3]["result"]["resources"], json!([]));
    assert_eq!(svc.state(), SessionState::Active);
}

#[tokio::test]
async fn test_speak_without_text_is_tool_error() {
    let dir = tempfile::tempdir().unwrap();
    let provider = GatedProvider::new(false);
    let mut svc = service(provider.clone(), dir.path());

    let responses = exchange(
        &mut svc,
        &[json!({
            "jsonrpc": "2.0",
            "id": 10,
            "method": "tools/call",
            "params": {"name": "speak", "arguments": {}}
        })],
    )
    .await;

    assert_eq!(responses.len(), 1);
    assert!(responses[0].get("error").is_none());
    assert_eq!(responses[0]["result"]["isError"], true);
    assert_eq!(responses[0]["result"]["content"][0]["type"], "text");
    assert_eq!(svc.supervisor().stats().launched, 0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_method_is_method_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut svc = service(GatedProvider::new(false), dir.path());

    let responses = exchange(
        &mut svc,
        &[json!({"jsonrpc": "2.0", "id": 5, "method": "frobnicate"})],
    )
    .await;

    assert_eq!(responses[0]["id"], 5);
    assert_eq!(responses[0]["error"]["code"], -32601);
    assert!(responses[0].get("result").is_none());
}

#[tokio::test]
async fn test_wrong_version_and_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let mut svc = service(GatedProvider::new(false), dir.path());

    let mut output: Vec<u8> = Vec::new();
    let input = "{\"jsonrpc\":\"1.0\",\"id\":6,\"method\":\"ping\"}\nnot json at all\n\n{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n";
    serve(input.as_bytes(), &mut output, &mut svc).await.unwrap();

    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["error"]["code"], -32600);
    assert_eq!(responses[1]["error"]["code"], -32700);
    assert_eq!(responses[1]["id"], Value::Null);
    // The session keeps going after protocol errors
    assert_eq!(responses[2]["id"], 7);
    assert_eq!(responses[2]["result"], json!({}));
}

#[tokio::test]
async fn test_shutdown_answers_then_stops_reading() {
    let dir = tempfile::tempdir().unwrap();
    let mut svc = service(GatedProvider::new(false), dir.path());

    let responses = exchange(
        &mut svc,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "shutdown"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}),
        ],
    )
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[1]["id"], 2);
    assert!(responses[1].get("result").is_some());
    assert_eq!(svc.state(), SessionState::Terminated);
}

#[tokio::test]
async fn test_speak_returns_before_synthesis_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let provider = GatedProvider::new(false);
    let mut svc = service(provider.clone(), dir.path());

    let responses = exchange(
        &mut svc,
        &[json!({
            "jsonrpc": "2.0",
            "id": 11,
            "method": "tools/call",
            "params": {"name": "speak", "arguments": {"text": "Your build is green"}}
        })],
    )
    .await;

    assert_eq!(responses[0]["result"]["isError"], false);
    let stats = svc.supervisor().stats();
    assert_eq!(stats.launched, 1);
    assert_eq!(stats.finished(), 0);

    provider.gate.add_permits(1);
    wait_for_finished(&svc, 1).await;
    assert_eq!(svc.supervisor().stats().succeeded, 1);

    let cached = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(cached, 1);
}

#[tokio::test]
async fn test_background_failure_is_not_reported_to_caller() {
    let dir = tempfile::tempdir().unwrap();
    let provider = GatedProvider::new(true);
    provider.gate.add_permits(10);
    let mut svc = service(provider.clone(), dir.path());

    let responses = exchange(
        &mut svc,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "speak", "params": {"text": "one"}}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "speak", "params": {"text": "two"}}),
        ],
    )
    .await;

    assert!(responses.iter().all(|r| r["result"]["isError"] == false));

    wait_for_finished(&svc, 2).await;
    let stats = svc.supervisor().stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.succeeded, 0);
}

#[tokio::test]
async fn test_null_id_request_gets_an_answer() {
    let dir = tempfile::tempdir().unwrap();
    let mut svc = service(GatedProvider::new(false), dir.path());

    let responses = exchange(
        &mut svc,
        &[json!({"jsonrpc": "2.0", "id": null, "method": "tools/list"})],
    )
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[0]["result"]["tools"][0]["name"], "speak");
}
