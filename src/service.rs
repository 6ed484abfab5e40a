use crate::config_loader::Settings;
use crate::protocol::{parse_line, tool_text, Incoming, RpcError, RpcResponse};
use crate::request::{SpeechRequest, VOICES};
use crate::supervisor::TaskSupervisor;
use serde_json::{json, Value};

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SPEAK_TOOL: &str = "speak";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Terminated,
}

/// Routes control-plane envelopes and owns the session lifecycle.
pub struct McpService {
    settings: Settings,
    supervisor: TaskSupervisor,
    state: SessionState,
}

impl McpService {
    pub fn new(settings: Settings, supervisor: TaskSupervisor) -> Self {
        Self {
            settings,
            supervisor,
            state: SessionState::Created,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Handles one input line. Returns the response to write, if any.
    pub fn handle_line(&mut self, line: &str) -> Option<RpcResponse> {
        match parse_line(line) {
            Ok(incoming) => self.handle(incoming),
            Err(rejected) => {
                tracing::warn!(code = rejected.error.code, "Rejected envelope: {}", rejected.error.message);
                rejected.into_response()
            }
        }
    }

    pub fn handle(&mut self, incoming: Incoming) -> Option<RpcResponse> {
        if self.state == SessionState::Created && !matches!(incoming.method(), "initialize" | "ping") {
            tracing::warn!(method = incoming.method(), "Call received before initialize");
        }

        match incoming {
            Incoming::Request { id, method, params } => {
                tracing::debug!(%id, %method, "Request");
                let response = match self.route(&method, &params, &id) {
                    Ok(result) => RpcResponse::success(id, result),
                    Err(error) => RpcResponse::failure(id, error),
                };
                Some(response)
            }
            Incoming::Notification { method, params } => {
                tracing::debug!(%method, "Notification");
                if let Err(e) = self.route(&method, &params, &Value::Null) {
                    tracing::debug!(%method, "Notification dropped: {}", e.message);
                }
                None
            }
        }
    }

    fn route(&mut self, method: &str, params: &Value, id: &Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize(params)),
            "shutdown" => {
                tracing::info!("Shutdown requested");
                self.state = SessionState::Terminated;
                Ok(json!({}))
            }
            "ping" => Ok(json!({})),
            m if m.starts_with("notifications/") => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": [speak_tool_descriptor()] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "resources/list" => Ok(json!({ "resources": [] })),
            "tools/call" => self.call_tool(params, id),
            // Kept for hosts that predate tools/call
            "speak" => Ok(self.speak(params, id)),
            other => Err(RpcError::method_not_found(other)),
        }
    }

    fn initialize(&mut self, params: &Value) -> Value {
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);

        if self.state == SessionState::Created {
            self.state = SessionState::Active;
        }
        tracing::info!(protocol = version, "Session initialized");

        json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": {},
                "prompts": {},
                "resources": {},
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn call_tool(&mut self, params: &Value, id: &Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires a tool name"))?;

        match name {
            SPEAK_TOOL => {
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                Ok(self.speak(&arguments, id))
            }
            other => Err(RpcError::invalid_params(format!("Unknown tool: {}", other))),
        }
    }

    /// Validates locally and hands off. Bad arguments become a tool error
    /// result, not a protocol error.
    fn speak(&mut self, arguments: &Value, id: &Value) -> Value {
        let request = match self.build_request(arguments) {
            Ok(r) => r,
            Err(message) => {
                tracing::warn!("speak rejected: {}", message);
                return tool_text(format!("Error: {}", message), true);
            }
        };

        let preview: String = request.text.chars().take(60).collect();
        let task_id = self.supervisor.launch(request, id.clone());
        tool_text(format!("Speaking: \"{}\" (task {})", preview, task_id), false)
    }

    fn build_request(&self, arguments: &Value) -> Result<SpeechRequest, String> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| "the 'text' argument is required".to_string())?;

        let mut request = SpeechRequest::from_settings(text, &self.settings);
        if let Some(voice) = arguments.get("voice") {
            request.voice = voice
                .as_str()
                .ok_or_else(|| "'voice' must be a string".to_string())?
                .to_string();
        }
        if let Some(speed) = arguments.get("speed") {
            request.speed = speed
                .as_f64()
                .ok_or_else(|| "'speed' must be a number".to_string())? as f32;
        }

        request.validate().map_err(|e| e.to_string())?;
        Ok(request)
    }
}

fn speak_tool_descriptor() -> Value {
    json!({
        "name": SPEAK_TOOL,
        "description": "Speak text aloud using text-to-speech. Returns immediately; audio is produced in the background.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to speak"
                },
                "voice": {
                    "type": "string",
                    "enum": VOICES,
                    "description": "Voice to use (optional)"
                },
                "speed": {
                    "type": "number",
                    "minimum": crate::request::MIN_SPEED,
                    "maximum": crate::request::MAX_SPEED,
                    "description": "Speaking rate (optional)"
                }
            },
            "required": ["text"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheResolver;
    use crate::engine::{PlaybackIntent, SpeechEngine};
    use crate::error::Result;
    use crate::protocol::{Outcome, METHOD_NOT_FOUND};
    use crate::provider::SpeechProvider;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;

    struct SilentProvider;

    #[async_trait]
    impl SpeechProvider for SilentProvider {
        async fn synthesize(&self, _request: &SpeechRequest, dest: &Path) -> Result<()> {
            tokio::fs::write(dest, b"\xff\xfb\x90\x00").await?;
            Ok(())
        }
    }

    fn service(dir: &Path) -> McpService {
        let engine = SpeechEngine::new(Arc::new(SilentProvider), CacheResolver::new(dir, "t_"));
        McpService::new(
            Settings::default(),
            TaskSupervisor::new(engine, PlaybackIntent::Delegate),
        )
    }

    fn result_of(resp: RpcResponse) -> Value {
        match resp.outcome {
            Outcome::Result(v) => v,
            Outcome::Error(e) => panic!("unexpected error: {e:?}"),
        }
    }

    #[tokio::test]
    async fn test_session_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path());
        assert_eq!(svc.state(), SessionState::Created);

        let resp = svc
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#)
            .unwrap();
        let result = result_of(resp);
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], "speakd");
        assert_eq!(svc.state(), SessionState::Active);

        svc.handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"shutdown"}"#).unwrap();
        assert_eq!(svc.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_tools_list_describes_speak() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path());
        let result = result_of(
            svc.handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
                .unwrap(),
        );
        assert_eq!(result["tools"][0]["name"], "speak");
        assert_eq!(result["tools"][0]["inputSchema"]["required"][0], "text");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path());
        let resp = svc
            .handle_line(r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"sing"}}"#)
            .unwrap();
        assert!(matches!(resp.outcome, Outcome::Error(ref e) if e.code == crate::protocol::INVALID_PARAMS));
    }

    #[tokio::test]
    async fn test_bad_speed_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path());
        let result = result_of(
            svc.handle_line(r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"speak","arguments":{"text":"hi","speed":12}}}"#)
                .unwrap(),
        );
        assert_eq!(result["isError"], true);
        assert_eq!(svc.supervisor().stats().launched, 0);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path());
        let resp = svc
            .handle_line(r#"{"jsonrpc":"2.0","id":9,"method":"frobnicate"}"#)
            .unwrap();
        assert_eq!(resp.id, json!(9));
        assert!(matches!(resp.outcome, Outcome::Error(ref e) if e.code == METHOD_NOT_FOUND));
        assert_eq!(svc.state(), SessionState::Created);
    }

    #[tokio::test]
    async fn test_legacy_speak_launches_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path());
        let result = result_of(
            svc.handle_line(r#"{"jsonrpc":"2.0","id":"a","method":"speak","params":{"text":"hello"}}"#)
                .unwrap(),
        );
        assert_eq!(result["isError"], false);
        assert_eq!(svc.supervisor().stats().launched, 1);
    }
}
