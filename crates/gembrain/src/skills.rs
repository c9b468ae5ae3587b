//! Skill registry.
//!
//! A skill is a named, schema-described local capability the model may
//! request mid-conversation.  The registry maps skill names to async
//! handlers plus a parameter schema, exports declarations for the transport,
//! and executes calls behind an error-absorbing boundary: a failing handler
//! becomes a result *value* carrying the error text, never a propagated
//! error.
//!
//! Construct one registry at process start and inject it explicitly — there
//! is no ambient global.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{BrainError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Async skill handler: JSON arguments in, JSON result out.
pub type SkillHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// One declared parameter of a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Declared type name (`"string"`, `"integer"`, `"number"`, `"boolean"`).
    pub param_type: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// Whether the parameter must be supplied.
    pub required: bool,
}

impl ParamSpec {
    /// Create a required parameter.
    pub fn required(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            description: description.into(),
            required: true,
        }
    }

    /// Create an optional parameter.
    pub fn optional(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// A registered skill: identity, schema, and handler.
#[derive(Clone)]
pub struct SkillDescriptor {
    /// Globally unique skill name.
    pub name: String,
    /// What the skill does, shown to the model.
    pub description: String,
    /// Parameter schema, keyed by parameter name.  Ordered so schema export
    /// is deterministic.
    pub parameters: BTreeMap<String, ParamSpec>,
    /// The callable.
    pub handler: SkillHandler,
}

/// A tool declaration in the shape the generation service consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Skill name.
    pub name: String,
    /// Skill description.
    pub description: String,
    /// JSON schema: `{type: "OBJECT", properties, required}`.
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent skill registry.
///
/// Cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone, Default)]
pub struct SkillRegistry {
    inner: Arc<DashMap<String, SkillDescriptor>>,
}

impl SkillRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Register a skill.  Duplicate names overwrite — last registration
    /// wins, which is acceptable because registration happens at startup.
    pub fn register(&self, descriptor: SkillDescriptor) {
        tracing::info!(skill = %descriptor.name, "skill registered");
        self.inner.insert(descriptor.name.clone(), descriptor);
    }

    /// Register a skill from an async closure.
    pub fn register_fn<F, Fut>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: BTreeMap<String, ParamSpec>,
        handler: F,
    ) where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: SkillHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.register(SkillDescriptor {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        });
    }

    /// Number of registered skills.
    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// Export one declaration per registered skill, sorted by name.
    pub fn schemas(&self) -> Vec<ToolDeclaration> {
        let mut declarations: Vec<ToolDeclaration> = self
            .inner
            .iter()
            .map(|entry| {
                let skill = entry.value();
                let mut properties = serde_json::Map::new();
                let mut required = Vec::new();
                for (param_name, spec) in &skill.parameters {
                    properties.insert(
                        param_name.clone(),
                        json!({
                            "type": spec.param_type,
                            "description": spec.description,
                        }),
                    );
                    if spec.required {
                        required.push(param_name.clone());
                    }
                }
                ToolDeclaration {
                    name: skill.name.clone(),
                    description: skill.description.clone(),
                    parameters: json!({
                        "type": "OBJECT",
                        "properties": properties,
                        "required": required,
                    }),
                }
            })
            .collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }

    /// Execute a skill by name.
    ///
    /// A handler failure is caught here and converted into a result value
    /// carrying the error text, so the model can see it and retry with
    /// different arguments.  Only an unregistered name is an error.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::UnknownSkill`] if no skill with this name is
    /// registered.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        // Clone the handler out so the map reference is not held across await.
        let handler = self
            .inner
            .get(name)
            .map(|entry| entry.handler.clone())
            .ok_or_else(|| BrainError::UnknownSkill {
                name: name.to_owned(),
            })?;

        tracing::info!(skill = name, "executing skill");
        match handler(args).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(skill = name, error = %e, "skill execution failed");
                Ok(json!({ "error": format!("Error executing {name}: {e}") }))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
