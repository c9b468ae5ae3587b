//! Conversation data model.
//!
//! These types model the dialogue flowing between the caller and the
//! generative service.  They are provider-agnostic at this layer; the
//! [`crate::transport`] module translates them into the wire format.  Every
//! response is normalized into [`Part`] at the transport boundary so that no
//! downstream code branches on raw JSON shape.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Roles and parts
// ---------------------------------------------------------------------------

/// The author of a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input from the caller.
    User,
    /// Output from the generative model.
    Model,
    /// Results of skill invocations, fed back to the model.
    Tool,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
            Role::Tool => "tool",
        }
    }
}

/// One content fragment within a [`Turn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    /// Plain text.
    Text(String),

    /// A skill invocation requested by the model.
    FunctionCall {
        /// Name of the skill to invoke (must match a registered skill).
        name: String,
        /// Arguments as a JSON mapping.
        args: Value,
    },

    /// The result of a skill invocation, addressed back to the model.
    FunctionResponse {
        /// Name of the skill that produced this result.
        name: String,
        /// The result value.  Error results carry the error text.
        response: Value,
    },
}

impl Part {
    /// Create a text part.
    pub fn text(content: impl Into<String>) -> Self {
        Part::Text(content.into())
    }

    /// Create a function-call part.
    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Part::FunctionCall {
            name: name.into(),
            args,
        }
    }

    /// Create a function-response part.
    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Part::FunctionResponse {
            name: name.into(),
            response,
        }
    }

    /// True if this part is a function call.
    pub fn is_function_call(&self) -> bool {
        matches!(self, Part::FunctionCall { .. })
    }

    /// Convert to the service wire shape.
    ///
    /// The service requires function responses to be JSON objects, so scalar
    /// results are wrapped in a `{"result": …}` envelope.
    pub fn to_wire(&self) -> Value {
        match self {
            Part::Text(text) => json!({ "text": text }),
            Part::FunctionCall { name, args } => json!({
                "functionCall": { "name": name, "args": args },
            }),
            Part::FunctionResponse { name, response } => {
                let response = if response.is_object() {
                    response.clone()
                } else {
                    json!({ "result": response })
                };
                json!({
                    "functionResponse": { "name": name, "response": response },
                })
            }
        }
    }

    /// Parse a single wire part into a [`Part`].
    ///
    /// Returns `None` for part kinds this layer does not model (e.g. inline
    /// media), which are skipped rather than rejected.
    pub fn from_wire(value: &Value) -> Option<Part> {
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            return Some(Part::Text(text.to_owned()));
        }
        if let Some(call) = value.get("functionCall") {
            let name = call.get("name").and_then(Value::as_str)?;
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            return Some(Part::FunctionCall {
                name: name.to_owned(),
                args,
            });
        }
        if let Some(resp) = value.get("functionResponse") {
            let name = resp.get("name").and_then(Value::as_str)?;
            let response = resp.get("response").cloned().unwrap_or(Value::Null);
            return Some(Part::FunctionResponse {
                name: name.to_owned(),
                response,
            });
        }
        None
    }
}

/// Concatenate the text content of a slice of parts.
pub fn collect_text(parts: &[Part]) -> String {
    let mut out = String::new();
    for part in parts {
        if let Part::Text(text) = part {
            out.push_str(text);
        }
    }
    out
}

/// Extract all function calls from a slice of parts, in request order.
pub fn function_calls(parts: &[Part]) -> Vec<(&str, &Value)> {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::FunctionCall { name, args } => Some((name.as_str(), args)),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Turns and conversations
// ---------------------------------------------------------------------------

/// One attributed message unit within a conversation.
///
/// A turn never mixes a function call intended for execution with content
/// authored by a different role: model turns carry the calls, tool turns
/// carry only the responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn.
    pub role: Role,
    /// Ordered content fragments.
    pub parts: Vec<Part>,
}

impl Turn {
    /// Create a user turn.
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    /// Create a user turn holding a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::text(text)])
    }

    /// Create a model turn.
    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    /// Create a tool turn.
    pub fn tool(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Tool,
            parts,
        }
    }

    /// Convert to the service wire shape.
    pub fn to_wire(&self) -> Value {
        json!({
            "role": self.role.as_str(),
            "parts": self.parts.iter().map(Part::to_wire).collect::<Vec<_>>(),
        })
    }
}

/// An ordered sequence of turns.
///
/// Created fresh per inbound request, mutated only during that request's tool
/// loop, and discarded once the final text is produced.  Turn order is
/// semantically significant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Conversation(Vec<Turn>);

impl Conversation {
    /// Create an empty conversation.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a one-turn conversation from a bare user prompt.
    pub fn from_user_text(text: impl Into<String>) -> Self {
        Self(vec![Turn::user_text(text)])
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.0.push(turn);
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the conversation has no turns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the turns.
    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    /// Convert to the service wire shape (the `contents` array).
    pub fn to_wire(&self) -> Value {
        Value::Array(self.0.iter().map(Turn::to_wire).collect())
    }

    /// Enforce the conversation cap during tool recursion.
    ///
    /// When the turn count exceeds `cap`, keeps the seed turn (index 0) plus
    /// the `keep` most recent turns.  The seed is always preserved at index 0
    /// regardless of how much history is dropped.
    pub fn truncate_preserving_seed(&mut self, cap: usize, keep: usize) {
        if self.0.len() <= cap {
            return;
        }
        let tail_start = self.0.len().saturating_sub(keep).max(1);
        let dropped = tail_start - 1;
        let mut kept = Vec::with_capacity(1 + keep);
        kept.push(self.0[0].clone());
        kept.extend(self.0.drain(tail_start..));
        self.0 = kept;
        tracing::debug!(dropped, turns = self.0.len(), "conversation truncated");
    }
}

impl From<Vec<Turn>> for Conversation {
    fn from(turns: Vec<Turn>) -> Self {
        Self(turns)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_part_wire_round_trip() {
        let part = Part::text("hello");
        let wire = part.to_wire();
        assert_eq!(wire, json!({"text": "hello"}));
        assert_eq!(Part::from_wire(&wire), Some(part));
    }

    #[test]
    fn function_call_wire_round_trip() {
        let part = Part::function_call("echo", json!({"x": "hi"}));
        let wire = part.to_wire();
        assert_eq!(
            wire,
            json!({"functionCall": {"name": "echo", "args": {"x": "hi"}}})
        );
        assert_eq!(Part::from_wire(&wire), Some(part));
    }

    #[test]
    fn scalar_function_response_is_wrapped_on_wire() {
        let part = Part::function_response("echo", json!("hi"));
        let wire = part.to_wire();
        assert_eq!(
            wire,
            json!({"functionResponse": {"name": "echo", "response": {"result": "hi"}}})
        );
    }

    #[test]
    fn unknown_part_kinds_are_skipped() {
        assert_eq!(Part::from_wire(&json!({"inlineData": {}})), None);
    }

    #[test]
    fn collect_text_skips_non_text_parts() {
        let parts = vec![
            Part::text("a"),
            Part::function_call("f", json!({})),
            Part::text("b"),
        ];
        assert_eq!(collect_text(&parts), "ab");
    }

    #[test]
    fn function_calls_preserve_request_order() {
        let parts = vec![
            Part::function_call("first", json!({})),
            Part::text("..."),
            Part::function_call("second", json!({})),
        ];
        let calls = function_calls(&parts);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "first");
        assert_eq!(calls[1].0, "second");
    }

    #[test]
    fn truncation_preserves_seed_at_index_zero() {
        let seed = Turn::user_text("seed");
        let mut convo = Conversation::from(vec![seed.clone()]);
        for i in 0..10 {
            convo.push(Turn::model(vec![Part::text(format!("m{i}"))]));
        }
        assert_eq!(convo.len(), 11);

        convo.truncate_preserving_seed(10, 6);
        assert_eq!(convo.len(), 7);
        assert_eq!(convo.turns()[0], seed);
        // The tail keeps the six most recent turns.
        assert_eq!(convo.turns()[6].parts, vec![Part::text("m9")]);
    }

    #[test]
    fn truncation_is_a_no_op_under_the_cap() {
        let mut convo = Conversation::from_user_text("seed");
        convo.push(Turn::model(vec![Part::text("reply")]));
        let before = convo.clone();
        convo.truncate_preserving_seed(10, 6);
        assert_eq!(convo, before);
    }
}
