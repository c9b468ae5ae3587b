//! Relay transport.
//!
//! Alternate network path through an intermediary endpoint.  Authenticates
//! with a refreshable credential, performs a one-time project discovery call
//! before the first generation request, and — unlike the direct transport —
//! owns its own bounded recursive send loop: it manages raw exchange turns
//! itself, executing requested skills through the shared registry instead of
//! delegating to the shared tool loop.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::auth::{CredentialProvider, fresh_token};
use crate::config::BrainConfig;
use crate::conversation::{Conversation, Part, Turn, function_calls};
use crate::error::Result;
use crate::skills::{SkillRegistry, ToolDeclaration};
use crate::tool_loop::MAX_RECURSION_MESSAGE;
use crate::transport::{
    SendError, SendErrorKind, Transport, classify_request_error, classify_response,
    parse_candidate_parts, system_instruction_to_wire, tools_to_wire,
};

/// Path of the one-time project discovery call.
const DISCOVERY_PATH: &str = "v1internal:loadCodeAssist";

/// Path of the generation call.
const GENERATE_PATH: &str = "v1internal:generateContent";

/// Credential-based transport through the relay endpoint.
pub struct RelayTransport {
    http: reqwest::Client,
    provider: Arc<dyn CredentialProvider>,
    registry: Arc<SkillRegistry>,
    base_url: String,
    session_id: String,
    /// Discovered project identifier; `None` inside means discovery ran and
    /// the relay did not assign one.
    project: OnceCell<Option<String>>,
    max_tool_turns: u32,
    conversation_cap: usize,
    keep_recent_turns: usize,
    inter_turn_delay: std::time::Duration,
}

impl RelayTransport {
    /// Create a relay transport.
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        registry: Arc<SkillRegistry>,
        config: &BrainConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            provider,
            registry,
            base_url: config.relay_base_url.clone(),
            session_id: uuid::Uuid::now_v7().to_string(),
            project: OnceCell::new(),
            max_tool_turns: config.max_tool_turns,
            conversation_cap: config.conversation_cap,
            keep_recent_turns: config.keep_recent_turns,
            inter_turn_delay: config.inter_turn_delay(),
        })
    }

    /// Session identifier sent with every generation call.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Fetch a usable bearer token, refreshing the credential if expired.
    async fn bearer(&self) -> std::result::Result<String, SendError> {
        fresh_token(self.provider.as_ref()).await.map_err(|e| {
            SendError::new(SendErrorKind::Unknown, format!("credential error: {e}"))
        })
    }

    /// Run the one-time project discovery call, caching its result.
    /// Idempotent: concurrent callers share a single discovery.
    async fn project(&self) -> std::result::Result<Option<String>, SendError> {
        self.project
            .get_or_try_init(|| async {
                let token = self.bearer().await?;
                let url = format!("{}/{DISCOVERY_PATH}", self.base_url);

                tracing::debug!(session = %self.session_id, "running relay project discovery");

                let resp = self
                    .http
                    .post(&url)
                    .bearer_auth(token)
                    .json(&serde_json::json!({ "metadata": { "pluginType": "GEMINI" } }))
                    .send()
                    .await
                    .map_err(|e| classify_request_error(&e))?;

                let status = resp.status();
                let text = resp.text().await.map_err(|e| {
                    SendError::new(
                        SendErrorKind::Unknown,
                        format!("failed to read discovery response: {e}"),
                    )
                })?;
                if !status.is_success() {
                    return Err(classify_response(status, &text));
                }

                let value: Value = serde_json::from_str(&text).map_err(|e| {
                    SendError::new(
                        SendErrorKind::Unknown,
                        format!("invalid discovery response: {e}"),
                    )
                })?;
                let project = value
                    .get("cloudaicompanionProject")
                    .and_then(Value::as_str)
                    .map(str::to_owned);

                tracing::info!(project = ?project, "relay project discovery complete");
                Ok(project)
            })
            .await
            .map(Clone::clone)
    }

    /// One raw exchange with the relay: a single generation request.
    async fn exchange(
        &self,
        model: &str,
        conversation: &Conversation,
        system_instruction: Option<&str>,
        tools: &[ToolDeclaration],
    ) -> std::result::Result<Vec<Part>, SendError> {
        let token = self.bearer().await?;
        let project = self.project().await?;
        let url = format!("{}/{GENERATE_PATH}", self.base_url);
        let body = build_generate_body(
            model,
            &self.session_id,
            project.as_deref(),
            conversation,
            system_instruction,
            tools,
        );

        tracing::debug!(
            model,
            turns = conversation.len(),
            "sending relay generation request"
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            SendError::new(
                SendErrorKind::Unknown,
                format!("failed to read response body: {e}"),
            )
        })?;
        if !status.is_success() {
            return Err(classify_response(status, &text));
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            SendError::new(
                SendErrorKind::Unknown,
                format!("invalid JSON response: {e}"),
            )
        })?;

        // The relay nests the direct-shaped payload one level deeper.
        let inner = value.get("response").ok_or_else(|| {
            SendError::new(
                SendErrorKind::Unknown,
                "malformed relay response: missing response wrapper",
            )
        })?;
        parse_candidate_parts(inner)
    }
}

/// Build the relay generation body: the direct-shaped request nested under
/// a `request` wrapper alongside the session and project identifiers.
fn build_generate_body(
    model: &str,
    session_id: &str,
    project: Option<&str>,
    conversation: &Conversation,
    system_instruction: Option<&str>,
    tools: &[ToolDeclaration],
) -> Value {
    let mut request = serde_json::json!({
        "contents": conversation.to_wire(),
        "generationConfig": {},
    });
    if let Some(instruction) = system_instruction {
        request["systemInstruction"] = system_instruction_to_wire(instruction);
    }
    if !tools.is_empty() {
        request["tools"] = tools_to_wire(tools);
    }

    let mut body = serde_json::json!({
        "model": model,
        "session_id": session_id,
        "request": request,
    });
    if let Some(project) = project {
        body["project"] = serde_json::json!(project);
    }
    body
}

#[async_trait]
impl Transport for RelayTransport {
    /// Send with the relay's own bounded recursive loop.
    ///
    /// Requested skills are executed here, turn by turn, with the same
    /// truncation policy and inter-turn delay as the shared tool loop.  When
    /// tools are disabled the raw function-call parts are returned untouched
    /// so the layer above can report the violation.
    async fn send(
        &self,
        model: &str,
        conversation: &Conversation,
        system_instruction: Option<&str>,
        tools: &[ToolDeclaration],
    ) -> std::result::Result<Vec<Part>, SendError> {
        let mut working = conversation.clone();

        for turn in 0..self.max_tool_turns {
            let parts = self
                .exchange(model, &working, system_instruction, tools)
                .await?;

            let calls = function_calls(&parts);
            if calls.is_empty() || tools.is_empty() {
                return Ok(parts);
            }

            tracing::info!(
                model,
                turn,
                calls = calls.len(),
                "relay executing requested tool calls"
            );

            let mut responses = Vec::with_capacity(calls.len());
            for (name, args) in &calls {
                let result = match self.registry.execute(name, (*args).clone()).await {
                    Ok(value) => value,
                    Err(e) => serde_json::json!({ "error": e.to_string() }),
                };
                responses.push(Part::function_response(*name, result));
            }

            working.push(Turn::model(parts));
            working.push(Turn::tool(responses));
            working.truncate_preserving_seed(self.conversation_cap, self.keep_recent_turns);

            tokio::time::sleep(self.inter_turn_delay).await;
        }

        tracing::warn!(
            model,
            max_turns = self.max_tool_turns,
            "relay send loop exhausted without a final response"
        );
        Ok(vec![Part::text(MAX_RECURSION_MESSAGE)])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use serde_json::json;

    #[test]
    fn generate_body_nests_the_request() {
        let convo = Conversation::from_user_text("hi");
        let body = build_generate_body("model-x", "session-1", Some("proj-9"), &convo, None, &[]);

        assert_eq!(body["model"], "model-x");
        assert_eq!(body["session_id"], "session-1");
        assert_eq!(body["project"], "proj-9");
        assert_eq!(body["request"]["contents"][0]["role"], "user");
        assert!(body["request"]["generationConfig"].is_object());
        assert!(body["request"].get("tools").is_none());
    }

    #[test]
    fn generate_body_omits_absent_project() {
        let convo = Conversation::from_user_text("hi");
        let body = build_generate_body("m", "s", None, &convo, Some("be brief"), &[]);
        assert!(body.get("project").is_none());
        assert_eq!(
            body["request"]["systemInstruction"]["parts"][0]["text"],
            "be brief"
        );
    }

    #[test]
    fn sessions_are_unique_per_transport() {
        let config = BrainConfig::default();
        let registry = Arc::new(SkillRegistry::new());
        let provider = Arc::new(StaticTokenProvider::new("t"));

        let a = RelayTransport::new(provider.clone(), registry.clone(), &config).unwrap();
        let b = RelayTransport::new(provider, registry, &config).unwrap();
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn tool_declarations_nest_under_request() {
        let convo = Conversation::from_user_text("hi");
        let tools = vec![ToolDeclaration {
            name: "echo".into(),
            description: "Echo.".into(),
            parameters: json!({"type": "OBJECT", "properties": {}, "required": []}),
        }];
        let body = build_generate_body("m", "s", None, &convo, None, &tools);
        assert_eq!(
            body["request"]["tools"][0]["functionDeclarations"][0]["name"],
            "echo"
        );
    }
}
