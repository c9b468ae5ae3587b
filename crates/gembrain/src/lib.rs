//! gembrain — resilient invocation layer for a hosted generation service.
//!
//! The crate wraps every model call in a single policy so callers never see a
//! raw failure:
//!
//! - [`brain`] -- the [`Brain`] façade; its generation methods always return
//!   a displayable string.
//! - [`fallback`] -- ordered model hierarchy, per-model cooldowns, and the
//!   process-wide circuit breaker.
//! - [`throttle`] -- minimum spacing between outbound request dispatches.
//! - [`transport`] -- the [`Transport`] seam with two implementations: the
//!   API-key [`DirectTransport`] and the credential-based [`RelayTransport`]
//!   with one-time project discovery.
//! - [`tool_loop`] -- the bounded tool-calling loop that executes requested
//!   skills and feeds results back until the model answers in text.
//! - [`skills`] -- the concurrent [`SkillRegistry`] of schema-described
//!   local capabilities.
//! - [`conversation`] -- roles, parts, and turns, plus the seed-preserving
//!   truncation policy.
//! - [`auth`] -- the [`CredentialProvider`] seam consumed by the relay.
//! - [`config`] -- every timing knob, layered from defaults, TOML, and
//!   environment.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gembrain::{Brain, BrainConfig, SkillRegistry};
//!
//! # async fn run() -> gembrain::Result<()> {
//! let config = BrainConfig::from_env()?;
//! let registry = Arc::new(SkillRegistry::new());
//! let brain = Brain::direct(config, registry)?;
//!
//! let reply = brain.generate_from_prompt("hello", None).await;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod brain;
pub mod config;
pub mod conversation;
pub mod error;
pub mod fallback;
pub mod skills;
pub mod throttle;
pub mod tool_loop;
pub mod transport;

pub use auth::{CredentialProvider, Credentials, StaticTokenProvider};
pub use brain::{ALL_MODELS_COOLING_MESSAGE, Brain, CIRCUIT_OPEN_MESSAGE};
pub use config::BrainConfig;
pub use conversation::{Conversation, Part, Role, Turn};
pub use error::{BrainError, Result};
pub use fallback::FallbackController;
pub use skills::{ParamSpec, SkillDescriptor, SkillHandler, SkillRegistry, ToolDeclaration};
pub use throttle::ThrottleGate;
pub use tool_loop::{
    MAX_RECURSION_MESSAGE, NO_TEXT_MESSAGE, TOOLS_DISABLED_MESSAGE, ToolCallLoop,
};
pub use transport::{
    DirectTransport, RelayTransport, SendError, SendErrorKind, Transport,
};
