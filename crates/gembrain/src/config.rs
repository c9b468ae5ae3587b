//! Brain configuration.
//!
//! Every timing knob of the invocation layer lives here so that backoff,
//! cooldown, and recursion behavior can be tuned per deployment — and zeroed
//! under test.  Configuration is layered: struct defaults, then an optional
//! TOML file, then `GEMBRAIN_`-prefixed environment variables (a `.env` file
//! is honored via dotenvy).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BrainError, Result};

/// Environment variable prefix recognized by [`BrainConfig::apply_env`].
const ENV_PREFIX: &str = "GEMBRAIN_";

/// Tunables for the invocation layer.
///
/// All durations are plain seconds so the struct stays trivially
/// serializable; accessor methods convert to [`Duration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Ordered model hierarchy, tried in sequence on failure.
    pub model_hierarchy: Vec<String>,

    /// Optional API key for the direct transport.
    pub api_key: Option<String>,

    /// Minimum spacing between outbound request dispatches.
    pub min_request_interval_secs: f64,

    /// Attempts per `generate_response` call.
    pub max_attempts: u32,

    /// Forced pause when the circuit breaker opens.
    pub circuit_pause_secs: f64,

    /// Default cooldown after a quota rejection, used when the provider does
    /// not suggest its own retry delay.
    pub quota_cooldown_secs: f64,

    /// Cooldown after the service rejects a model identifier outright.
    pub rejected_cooldown_secs: f64,

    /// Short backoff after a transient-network or unknown failure.
    pub retry_backoff_secs: f64,

    /// Maximum exchanges in one tool-calling loop.
    pub max_tool_turns: u32,

    /// Turn count above which the conversation is truncated.
    pub conversation_cap: usize,

    /// Most-recent turns kept (in addition to the seed) when truncating.
    pub keep_recent_turns: usize,

    /// Fixed delay between tool-loop exchanges.
    pub inter_turn_delay_secs: f64,

    /// Network timeout for every transport call, including discovery.
    /// Distinct from the backoff sleeps above.
    pub request_timeout_secs: u64,

    /// Base URL of the direct generation endpoint.
    pub direct_base_url: String,

    /// Base URL of the relay endpoint.
    pub relay_base_url: String,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            model_hierarchy: vec![
                "gemini-2.0-flash".to_owned(),
                "gemini-2.0-flash-lite".to_owned(),
                "gemini-1.5-flash".to_owned(),
            ],
            api_key: None,
            min_request_interval_secs: 3.5,
            max_attempts: 3,
            circuit_pause_secs: 300.0,
            quota_cooldown_secs: 60.0,
            rejected_cooldown_secs: 7200.0,
            retry_backoff_secs: 5.0,
            max_tool_turns: 10,
            conversation_cap: 10,
            keep_recent_turns: 6,
            inter_turn_delay_secs: 3.0,
            request_timeout_secs: 120,
            direct_base_url: "https://generativelanguage.googleapis.com".to_owned(),
            relay_base_url: "https://cloudcode-pa.googleapis.com".to_owned(),
        }
    }
}

impl BrainConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| BrainError::Config {
                reason: format!("failed to read config file: {e}"),
            })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| BrainError::Config {
            reason: format!("failed to parse TOML config: {e}"),
        })?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `GEMBRAIN_`-prefixed environment variables over the current
    /// values.  `GEMINI_API_KEY` is also recognized for the direct transport,
    /// matching the service's conventional variable name.
    pub fn apply_env(&mut self) {
        let _ = dotenvy::dotenv();

        for (key, value) in std::env::vars() {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "MODEL_HIERARCHY" => {
                    let models: Vec<String> = value
                        .split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(str::to_owned)
                        .collect();
                    if !models.is_empty() {
                        self.model_hierarchy = models;
                    }
                }
                "API_KEY" => self.api_key = Some(value),
                "MAX_ATTEMPTS" => parse_into(&mut self.max_attempts, &key, &value),
                "MIN_REQUEST_INTERVAL_SECS" => {
                    parse_into(&mut self.min_request_interval_secs, &key, &value)
                }
                "CIRCUIT_PAUSE_SECS" => parse_into(&mut self.circuit_pause_secs, &key, &value),
                "QUOTA_COOLDOWN_SECS" => parse_into(&mut self.quota_cooldown_secs, &key, &value),
                "REJECTED_COOLDOWN_SECS" => {
                    parse_into(&mut self.rejected_cooldown_secs, &key, &value)
                }
                "RETRY_BACKOFF_SECS" => parse_into(&mut self.retry_backoff_secs, &key, &value),
                "MAX_TOOL_TURNS" => parse_into(&mut self.max_tool_turns, &key, &value),
                "REQUEST_TIMEOUT_SECS" => parse_into(&mut self.request_timeout_secs, &key, &value),
                "DIRECT_BASE_URL" => self.direct_base_url = value,
                "RELAY_BASE_URL" => self.relay_base_url = value,
                _ => {}
            }
        }

        if self.api_key.is_none() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                if !key.is_empty() {
                    self.api_key = Some(key);
                }
            }
        }
    }

    /// Reject configurations that violate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.model_hierarchy.is_empty() {
            return Err(BrainError::EmptyHierarchy);
        }
        if self.max_attempts == 0 {
            return Err(BrainError::Config {
                reason: "max_attempts must be at least 1".into(),
            });
        }
        if self.keep_recent_turns >= self.conversation_cap {
            return Err(BrainError::Config {
                reason: format!(
                    "keep_recent_turns ({}) must be below conversation_cap ({})",
                    self.keep_recent_turns, self.conversation_cap
                ),
            });
        }
        Ok(())
    }

    // -- Duration accessors --------------------------------------------------

    /// Minimum spacing between request dispatches.
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_request_interval_secs)
    }

    /// Forced pause when the circuit opens.
    pub fn circuit_pause(&self) -> Duration {
        Duration::from_secs_f64(self.circuit_pause_secs)
    }

    /// Default quota cooldown.
    pub fn quota_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.quota_cooldown_secs)
    }

    /// Cooldown for rejected model identifiers.
    pub fn rejected_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.rejected_cooldown_secs)
    }

    /// Short backoff for transient and unknown failures.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.retry_backoff_secs)
    }

    /// Delay between tool-loop exchanges.
    pub fn inter_turn_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_turn_delay_secs)
    }

    /// Network timeout for transport calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_into<T: std::str::FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(key, value, "ignoring unparseable config override"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BrainConfig::default();
        config.validate().expect("defaults must validate");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.conversation_cap, 10);
        assert_eq!(config.keep_recent_turns, 6);
        assert_eq!(config.min_request_interval(), Duration::from_millis(3500));
    }

    #[test]
    fn empty_hierarchy_is_rejected() {
        let config = BrainConfig {
            model_hierarchy: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BrainError::EmptyHierarchy)
        ));
    }

    #[test]
    fn keep_window_must_fit_under_cap() {
        let config = BrainConfig {
            conversation_cap: 5,
            keep_recent_turns: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gembrain.toml");
        std::fs::write(
            &path,
            r#"
model_hierarchy = ["model-a", "model-b"]
max_attempts = 5
quota_cooldown_secs = 30.0
"#,
        )
        .unwrap();

        let config = BrainConfig::load(&path).unwrap();
        assert_eq!(config.model_hierarchy, vec!["model-a", "model-b"]);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.quota_cooldown(), Duration::from_secs(30));
        // Unspecified fields keep their defaults.
        assert_eq!(config.max_tool_turns, 10);
    }
}
