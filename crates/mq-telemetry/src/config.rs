//! Telemetry configuration from environment variables.

use std::env;

const DEFAULT_SERVICE: &str = "quantum-mq";

/// Logging setup for a process embedding the messaging engines.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,
    /// `EnvFilter` directive, e.g. `info` or `mq_01_transport=debug,info`
    pub log_level: String,
    /// Write logs to stdout at all
    pub console_output: bool,
    /// JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE.to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MQ_SERVICE_NAME`: Service name (default: quantum-mq)
    /// - `MQ_LOG_LEVEL` or `RUST_LOG`: Filter directive (default: info)
    /// - `MQ_CONSOLE_OUTPUT`: Write to stdout (default: true)
    /// - `MQ_JSON_LOGS`: JSON output (default: true inside a container)
    pub fn from_env() -> Self {
        let in_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();
        let defaults = Self::default();

        Self {
            service_name: env::var("MQ_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: env::var("MQ_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            console_output: env_flag("MQ_CONSOLE_OUTPUT").unwrap_or(defaults.console_output),
            json_logs: env_flag("MQ_JSON_LOGS").unwrap_or(in_container),
        }
    }

    /// Environment configuration under a different service name.
    #[must_use]
    pub fn for_service(service_name: &str) -> Self {
        Self::from_env().with_service_name(service_name)
    }

    #[must_use]
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }

    #[must_use]
    pub fn with_log_level(mut self, directive: &str) -> Self {
        self.log_level = directive.to_string();
        self
    }

    #[must_use]
    pub fn with_json_logs(mut self, json_logs: bool) -> Self {
        self.json_logs = json_logs;
        self
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|value| parse_flag(&value))
}

/// `1/true/yes/on` and `0/false/no/off`, any case. Anything else is ignored.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
