//! Direct transport.
//!
//! Calls the service's generation endpoint once per attempt, authenticated
//! with a static API key.  Tool recursion is handled above this layer by the
//! shared tool loop.

use serde_json::Value;

use async_trait::async_trait;

use crate::config::BrainConfig;
use crate::conversation::{Conversation, Part};
use crate::error::{BrainError, Result};
use crate::skills::ToolDeclaration;
use crate::transport::{
    SendError, SendErrorKind, Transport, classify_request_error, classify_response,
    parse_candidate_parts, system_instruction_to_wire, tools_to_wire,
};

/// API-key authenticated transport to the generation endpoint.
pub struct DirectTransport {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl DirectTransport {
    /// Create a direct transport from the configured API key.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::MissingApiKey`] when no key is configured.
    pub fn new(config: &BrainConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(BrainError::MissingApiKey)?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: config.direct_base_url.clone(),
        })
    }
}

/// Build the generation request body.
fn build_request_body(
    conversation: &Conversation,
    system_instruction: Option<&str>,
    tools: &[ToolDeclaration],
) -> Value {
    let mut body = serde_json::json!({ "contents": conversation.to_wire() });
    if let Some(instruction) = system_instruction {
        body["systemInstruction"] = system_instruction_to_wire(instruction);
    }
    if !tools.is_empty() {
        body["tools"] = tools_to_wire(tools);
    }
    body
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send(
        &self,
        model: &str,
        conversation: &Conversation,
        system_instruction: Option<&str>,
        tools: &[ToolDeclaration],
    ) -> std::result::Result<Vec<Part>, SendError> {
        let url = format!("{}/v1beta/models/{model}:generateContent", self.base_url);
        let body = build_request_body(conversation, system_instruction, tools);

        tracing::debug!(
            model,
            turns = conversation.len(),
            tools = tools.len(),
            "sending direct generation request"
        );

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        parse_candidate_parts(&value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_api_key_is_rejected() {
        let config = BrainConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            DirectTransport::new(&config),
            Err(BrainError::MissingApiKey)
        ));

        let config = BrainConfig {
            api_key: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            DirectTransport::new(&config),
            Err(BrainError::MissingApiKey)
        ));
    }

    #[test]
    fn request_body_omits_optional_fields() {
        let convo = Conversation::from_user_text("hi");
        let body = build_request_body(&convo, None, &[]);
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("tools").is_none());
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[test]
    fn request_body_carries_instruction_and_tools() {
        let convo = Conversation::from_user_text("hi");
        let tools = vec![ToolDeclaration {
            name: "echo".into(),
            description: "Echo.".into(),
            parameters: json!({"type": "OBJECT", "properties": {}, "required": []}),
        }];
        let body = build_request_body(&convo, Some("be brief"), &tools);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "echo"
        );
    }
}
