//! SFU client configuration.
//!
//! Configuration is loaded from environment variables. The session core only
//! needs [`SessionConfig`]; the remaining fields drive the `sfu-probe` binary.

use common::config::ObservabilityConfig;
use signaling_protocol::{RequestTopic, DEFAULT_DISPLAY_NAME};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default number of render slots (slot 0 is the main speaker).
pub const DEFAULT_RENDER_SLOTS: usize = 5;

/// Default timeout for join, transport, connect, produce and consume requests.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default timeout for `unpauseConsumer` requests.
pub const DEFAULT_UNPAUSE_TIMEOUT_MS: u64 = 5_000;

/// Per-topic signaling request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalingTimeouts {
    pub join: Duration,
    pub transport: Duration,
    pub connect: Duration,
    pub produce: Duration,
    pub consume: Duration,
    pub unpause: Duration,
}

impl Default for SignalingTimeouts {
    fn default() -> Self {
        let request = Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS);
        Self {
            join: request,
            transport: request,
            connect: request,
            produce: request,
            consume: request,
            unpause: Duration::from_millis(DEFAULT_UNPAUSE_TIMEOUT_MS),
        }
    }
}

impl SignalingTimeouts {
    /// Timeout applied to requests of `topic`.
    #[must_use]
    pub const fn for_topic(&self, topic: RequestTopic) -> Duration {
        match topic {
            RequestTopic::JoinRoom => self.join,
            RequestTopic::RequestTransport => self.transport,
            RequestTopic::ConnectTransport => self.connect,
            RequestTopic::StartProducing => self.produce,
            RequestTopic::ConsumeMedia => self.consume,
            RequestTopic::UnpauseConsumer => self.unpause,
        }
    }
}

/// Settings consumed by the session orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of render slots in the participant view (default: 5).
    pub render_slots: usize,

    /// Signaling request timeouts.
    pub timeouts: SignalingTimeouts,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            render_slots: DEFAULT_RENDER_SLOTS,
            timeouts: SignalingTimeouts::default(),
        }
    }
}

/// SFU client configuration.
#[derive(Clone)]
pub struct Config {
    /// Signaling peer address (`host:port`).
    pub signaling_address: String,

    /// Room to join.
    pub room_id: String,

    /// Local display name (default: "Anonymous").
    pub display_name: String,

    /// Whether the probe captures and sends a local feed after joining.
    pub send_feed: bool,

    /// Session orchestrator settings.
    pub session: SessionConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Display names are user-entered; keep them out of debug dumps.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("signaling_address", &self.signaling_address)
            .field("room_id", &self.room_id)
            .field("display_name", &"[REDACTED]")
            .field("send_feed", &self.send_feed)
            .field("session", &self.session)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let signaling_address = vars
            .get("SFU_SIGNALING_ADDRESS")
            .ok_or_else(|| ConfigError::MissingEnvVar("SFU_SIGNALING_ADDRESS".to_string()))?
            .clone();

        let room_id = vars
            .get("SFU_ROOM_ID")
            .filter(|room| !room.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("SFU_ROOM_ID".to_string()))?
            .clone();

        let display_name = vars
            .get("SFU_DISPLAY_NAME")
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        let render_slots = parse_var(vars, "SFU_RENDER_SLOTS", DEFAULT_RENDER_SLOTS)?;
        if render_slots == 0 {
            return Err(ConfigError::InvalidValue(
                "SFU_RENDER_SLOTS must be at least 1".to_string(),
            ));
        }

        let timeouts = SignalingTimeouts {
            join: parse_millis(vars, "SFU_JOIN_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
            transport: parse_millis(vars, "SFU_TRANSPORT_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
            connect: parse_millis(vars, "SFU_CONNECT_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
            produce: parse_millis(vars, "SFU_PRODUCE_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
            consume: parse_millis(vars, "SFU_CONSUME_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
            unpause: parse_millis(vars, "SFU_UNPAUSE_TIMEOUT_MS", DEFAULT_UNPAUSE_TIMEOUT_MS)?,
        };

        let send_feed = parse_var(vars, "SFU_PROBE_SEND_FEED", false)?;
        let json_logs = parse_var(vars, "SFU_LOG_JSON", false)?;

        Ok(Config {
            signaling_address,
            room_id,
            display_name,
            send_feed,
            session: SessionConfig {
                render_slots,
                timeouts,
            },
            observability: ObservabilityConfig {
                json_logs,
                ..ObservabilityConfig::default()
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

fn parse_millis(
    vars: &HashMap<String, String>,
    key: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    let millis: u64 = parse_var(vars, key, default_ms)?;
    if millis == 0 {
        return Err(ConfigError::InvalidValue(format!("{key} must be positive")));
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "SFU_SIGNALING_ADDRESS".to_string(),
                "127.0.0.1:3016".to_string(),
            ),
            ("SFU_ROOM_ID".to_string(), "standup".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.signaling_address, "127.0.0.1:3016");
        assert_eq!(config.room_id, "standup");
        assert_eq!(config.display_name, "Anonymous");
        assert!(!config.send_feed);
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.session.render_slots, 5);
        assert_eq!(
            config.session.timeouts.for_topic(RequestTopic::JoinRoom),
            Duration::from_secs(10)
        );
        assert_eq!(
            config.session.timeouts.for_topic(RequestTopic::UnpauseConsumer),
            Duration::from_secs(5)
        );
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("SFU_DISPLAY_NAME".to_string(), "Alice".to_string());
        vars.insert("SFU_RENDER_SLOTS".to_string(), "3".to_string());
        vars.insert("SFU_CONNECT_TIMEOUT_MS".to_string(), "2500".to_string());
        vars.insert("SFU_CONSUME_TIMEOUT_MS".to_string(), "750".to_string());
        vars.insert("SFU_PROBE_SEND_FEED".to_string(), "true".to_string());
        vars.insert("SFU_LOG_JSON".to_string(), "true".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.display_name, "Alice");
        assert_eq!(config.session.render_slots, 3);
        assert_eq!(
            config.session.timeouts.connect,
            Duration::from_millis(2500)
        );
        assert_eq!(config.session.timeouts.consume, Duration::from_millis(750));
        assert_eq!(
            config.session.timeouts.join,
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
        );
        assert!(config.send_feed);
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_missing_room_id() {
        let mut vars = base_vars();
        vars.remove("SFU_ROOM_ID");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SFU_ROOM_ID"));
    }

    #[test]
    fn test_from_vars_missing_signaling_address() {
        let mut vars = base_vars();
        vars.remove("SFU_SIGNALING_ADDRESS");

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SFU_SIGNALING_ADDRESS")
        );
    }

    #[test]
    fn test_zero_render_slots_rejected() {
        let mut vars = base_vars();
        vars.insert("SFU_RENDER_SLOTS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let mut vars = base_vars();
        vars.insert("SFU_JOIN_TIMEOUT_MS".to_string(), "soon".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(v)) if v == "SFU_JOIN_TIMEOUT_MS=soon")
        );

        let mut vars = base_vars();
        vars.insert("SFU_UNPAUSE_TIMEOUT_MS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_empty_display_name_falls_back() {
        let mut vars = base_vars();
        vars.insert("SFU_DISPLAY_NAME".to_string(), String::new());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.display_name, DEFAULT_DISPLAY_NAME);
    }

    #[test]
    fn test_debug_redacts_display_name() {
        let mut vars = base_vars();
        vars.insert("SFU_DISPLAY_NAME".to_string(), "Alice Liddell".to_string());
        let config = Config::from_vars(&vars).unwrap();

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("Alice"));
    }
}
