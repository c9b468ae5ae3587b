//! Bounded tool-calling loop.
//!
//! Drives the multi-turn exchange after a response carries function calls:
//! execute every requested skill, append the results as a tool turn, truncate
//! the conversation, wait out the inter-turn delay, and resend — until the
//! model produces plain text or the turn budget runs out.

use crate::config::BrainConfig;
use crate::conversation::{Conversation, Part, Turn, collect_text, function_calls};
use crate::skills::{SkillRegistry, ToolDeclaration};
use crate::transport::Transport;

/// Returned when a successful exchange contains no text parts at all.
pub const NO_TEXT_MESSAGE: &str = "I received an empty response from the model.";

/// Returned when the model attempts a tool call while tools are disabled for
/// the request.  The call is not executed.
pub const TOOLS_DISABLED_MESSAGE: &str =
    "Error: the model requested a tool call, but tools are disabled for this request.";

/// Returned when the turn budget is exhausted without a final text response.
pub const MAX_RECURSION_MESSAGE: &str =
    "Error: maximum tool recursion reached without a final response.";

/// The bounded send → execute → append → truncate loop.
pub struct ToolCallLoop<'a> {
    transport: &'a dyn Transport,
    registry: &'a SkillRegistry,
    config: &'a BrainConfig,
}

impl<'a> ToolCallLoop<'a> {
    /// Create a loop over the given transport and registry.
    pub fn new(
        transport: &'a dyn Transport,
        registry: &'a SkillRegistry,
        config: &'a BrainConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            config,
        }
    }

    /// Run the loop to completion, starting from the response parts of an
    /// exchange that has already happened.  That exchange counts against the
    /// turn budget: at most `max_tool_turns` exchanges occur in total.
    ///
    /// Always returns a final string — transport failures mid-loop are
    /// converted into error-prefixed text, never propagated.
    pub async fn run(
        &self,
        model: &str,
        mut conversation: Conversation,
        system_instruction: Option<&str>,
        tools: &[ToolDeclaration],
        first_parts: Vec<Part>,
    ) -> String {
        let mut parts = first_parts;
        // The caller's send produced `first_parts`, so one exchange is spent.
        let mut exchange: u32 = 1;

        loop {
            let calls = function_calls(&parts);

            if calls.is_empty() {
                let text = collect_text(&parts);
                return if text.is_empty() {
                    NO_TEXT_MESSAGE.to_owned()
                } else {
                    text
                };
            }

            if tools.is_empty() {
                tracing::warn!(
                    model,
                    requested = calls.len(),
                    "tool call requested while tools are disabled"
                );
                return TOOLS_DISABLED_MESSAGE.to_owned();
            }

            if exchange >= self.config.max_tool_turns {
                tracing::warn!(
                    model,
                    max_turns = self.config.max_tool_turns,
                    "tool loop exhausted without a final response"
                );
                return MAX_RECURSION_MESSAGE.to_owned();
            }

            tracing::info!(
                model,
                exchange,
                calls = calls.len(),
                "executing requested tool calls"
            );

            // Execute in request order; one response part per call.
            let mut responses = Vec::with_capacity(calls.len());
            for (name, args) in &calls {
                let result = match self.registry.execute(name, (*args).clone()).await {
                    Ok(value) => value,
                    // Unknown skills are surfaced to the model the same way
                    // handler failures are, so it can correct itself.
                    Err(e) => serde_json::json!({ "error": e.to_string() }),
                };
                responses.push(Part::function_response(*name, result));
            }

            conversation.push(Turn::model(parts));
            conversation.push(Turn::tool(responses));
            conversation
                .truncate_preserving_seed(self.config.conversation_cap, self.config.keep_recent_turns);

            tokio::time::sleep(self.config.inter_turn_delay()).await;

            parts = match self
                .transport
                .send(model, &conversation, system_instruction, tools)
                .await
            {
                Ok(parts) => parts,
                Err(e) => {
                    tracing::warn!(model, error = %e, "transport failed mid tool loop");
                    return format!("Error: {e}");
                }
            };
            exchange += 1;
        }
    }
}
