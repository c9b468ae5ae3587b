//! The invocation façade.
//!
//! [`Brain`] wraps one transport behind the full resilience policy: dispatch
//! throttling, the model fallback ratchet with per-model cooldowns, the
//! process-wide circuit breaker, and the bounded tool-calling loop.  Its
//! generation methods always return a displayable `String` — every failure
//! mode is folded into text here, never propagated to the caller.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::BrainConfig;
use crate::conversation::{Conversation, Part, collect_text, function_calls};
use crate::error::Result;
use crate::fallback::FallbackController;
use crate::skills::{SkillRegistry, ToolDeclaration};
use crate::throttle::ThrottleGate;
use crate::tool_loop::{NO_TEXT_MESSAGE, ToolCallLoop};
use crate::transport::{DirectTransport, RelayTransport, SendError, SendErrorKind, Transport};

/// Returned after the circuit-breaker pause completes.
pub const CIRCUIT_OPEN_MESSAGE: &str =
    "I'm having trouble reaching the model service right now. Please try again in a moment.";

/// Returned when every model in the hierarchy is cooling down.
pub const ALL_MODELS_COOLING_MESSAGE: &str =
    "Error: all models are cooling down. Please try again later.";

/// The resilient invocation layer.
///
/// Cheap to share behind an `Arc`; all interior state is synchronized, and
/// concurrent `generate_response` calls are serialized only where the policy
/// demands it (the dispatch throttle and fallback mutations).
pub struct Brain {
    config: BrainConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<SkillRegistry>,
    throttle: ThrottleGate,
    fallback: Mutex<FallbackController>,
}

impl Brain {
    /// Create a brain over an explicit transport.
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate.
    pub fn new(
        config: BrainConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<SkillRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let fallback = FallbackController::new(config.model_hierarchy.clone())?;
        Ok(Self {
            throttle: ThrottleGate::new(config.min_request_interval()),
            fallback: Mutex::new(fallback),
            config,
            transport,
            registry,
        })
    }

    /// Create a brain over the API-key transport.
    pub fn direct(config: BrainConfig, registry: Arc<SkillRegistry>) -> Result<Self> {
        let transport = Arc::new(DirectTransport::new(&config)?);
        Self::new(config, transport, registry)
    }

    /// Create a brain over the relay transport.
    pub fn relay(
        config: BrainConfig,
        provider: Arc<dyn crate::auth::CredentialProvider>,
        registry: Arc<SkillRegistry>,
    ) -> Result<Self> {
        let transport = Arc::new(RelayTransport::new(provider, registry.clone(), &config)?);
        Self::new(config, transport, registry)
    }

    /// The skill registry this brain executes against.
    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    /// Generate a response for a single prompt, with every registered skill
    /// offered to the model.
    pub async fn generate_from_prompt(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
    ) -> String {
        self.generate_with_skills(Conversation::from_user_text(prompt), system_instruction)
            .await
    }

    /// Generate a response with every registered skill offered to the model.
    pub async fn generate_with_skills(
        &self,
        conversation: Conversation,
        system_instruction: Option<&str>,
    ) -> String {
        let tools = self.registry.schemas();
        self.generate_response(conversation, system_instruction, &tools)
            .await
    }

    /// Generate a response for the conversation.
    ///
    /// Never fails: quota rejections fall through the model hierarchy,
    /// transient failures are retried in place, and anything that survives
    /// the attempt budget is rendered as error text.
    pub async fn generate_response(
        &self,
        conversation: Conversation,
        system_instruction: Option<&str>,
        tools: &[ToolDeclaration],
    ) -> String {
        {
            let fallback = self.fallback.lock().await;
            if fallback.circuit_open() {
                let failures = fallback.consecutive_failures();
                drop(fallback);
                tracing::error!(
                    failures,
                    pause_secs = self.config.circuit_pause_secs,
                    "circuit open; pausing before accepting requests"
                );
                tokio::time::sleep(self.config.circuit_pause()).await;
                self.fallback.lock().await.reset_failures();
                return CIRCUIT_OPEN_MESSAGE.to_owned();
            }
        }

        self.throttle.wait().await;

        let mut attempts_left = self.config.max_attempts;
        let mut last_error: Option<SendError> = None;

        while attempts_left > 0 {
            // Skip past models still on cooldown; a fully cooled hierarchy is
            // terminal for this call.
            let model = {
                let mut fallback = self.fallback.lock().await;
                while fallback.is_cooling_down(fallback.current()) {
                    if !fallback.next_model() {
                        tracing::warn!("every model in the hierarchy is cooling down");
                        return ALL_MODELS_COOLING_MESSAGE.to_owned();
                    }
                }
                fallback.current().to_owned()
            };

            match self
                .transport
                .send(&model, &conversation, system_instruction, tools)
                .await
            {
                Ok(parts) => {
                    self.fallback.lock().await.record_success();
                    return self
                        .finish(&model, conversation, system_instruction, tools, parts)
                        .await;
                }
                Err(e) => {
                    tracing::warn!(model = %model, kind = ?e.kind, error = %e, "generation attempt failed");
                    match e.kind {
                        SendErrorKind::QuotaExceeded => {
                            let cooldown =
                                e.retry_after.unwrap_or_else(|| self.config.quota_cooldown());
                            {
                                let mut fallback = self.fallback.lock().await;
                                fallback.record_failure();
                                fallback.mark_cooldown(&model, cooldown);
                                fallback.next_model();
                            }
                            tokio::time::sleep(cooldown).await;
                            attempts_left -= 1;
                        }
                        SendErrorKind::ModelRejected => {
                            // The identifier itself is bad: long cooldown and
                            // immediate fallback without spending an attempt.
                            // Not a quota failure, so the breaker counter is
                            // untouched.
                            let mut fallback = self.fallback.lock().await;
                            fallback.mark_cooldown(&model, self.config.rejected_cooldown());
                            fallback.next_model();
                        }
                        SendErrorKind::TransientNetwork | SendErrorKind::Unknown => {
                            // Same-model retry; only hierarchy-spanning quota
                            // failures feed the circuit breaker.
                            tokio::time::sleep(self.config.retry_backoff()).await;
                            attempts_left -= 1;
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt completed".to_owned());
        tracing::error!(error = %detail, "attempt budget exhausted");
        format!("Error: unable to get a response from any model: {detail}")
    }

    /// Turn a successful exchange into the final string, running the tool
    /// loop when the response carries function calls.
    async fn finish(
        &self,
        model: &str,
        conversation: Conversation,
        system_instruction: Option<&str>,
        tools: &[ToolDeclaration],
        parts: Vec<Part>,
    ) -> String {
        if !function_calls(&parts).is_empty() {
            let tool_loop = ToolCallLoop::new(self.transport.as_ref(), &self.registry, &self.config);
            return tool_loop
                .run(model, conversation, system_instruction, tools, parts)
                .await;
        }

        let text = collect_text(&parts);
        if text.is_empty() {
            NO_TEXT_MESSAGE.to_owned()
        } else {
            text
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrainError;
    use async_trait::async_trait;

    struct NeverTransport;

    #[async_trait]
    impl Transport for NeverTransport {
        async fn send(
            &self,
            _model: &str,
            _conversation: &Conversation,
            _system_instruction: Option<&str>,
            _tools: &[ToolDeclaration],
        ) -> std::result::Result<Vec<Part>, SendError> {
            unreachable!("transport must not be reached")
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = BrainConfig {
            model_hierarchy: Vec::new(),
            ..Default::default()
        };
        let result = Brain::new(
            config,
            Arc::new(NeverTransport),
            Arc::new(SkillRegistry::new()),
        );
        assert!(matches!(result, Err(BrainError::EmptyHierarchy)));
    }

    #[tokio::test]
    async fn fully_cooled_hierarchy_is_terminal_without_a_send() {
        let config = BrainConfig {
            model_hierarchy: vec!["a".into(), "b".into()],
            min_request_interval_secs: 0.0,
            ..Default::default()
        };
        let brain = Brain::new(
            config,
            Arc::new(NeverTransport),
            Arc::new(SkillRegistry::new()),
        )
        .unwrap();

        {
            let mut fallback = brain.fallback.lock().await;
            fallback.mark_cooldown("a", std::time::Duration::from_secs(600));
            fallback.mark_cooldown("b", std::time::Duration::from_secs(600));
        }

        let reply = brain
            .generate_response(Conversation::from_user_text("hi"), None, &[])
            .await;
        assert_eq!(reply, ALL_MODELS_COOLING_MESSAGE);
    }
}
