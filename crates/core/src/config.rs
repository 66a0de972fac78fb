use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CADENCE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Tuning for the sequence engine. The schedule clamp horizon and the score
/// ceiling are fixed policy, not configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SequenceConfig {
    #[serde(default = "default_open_score_delta")]
    pub open_score_delta: u32,
    #[serde(default = "default_click_score_delta")]
    pub click_score_delta: u32,
    #[serde(default = "default_max_due_batch")]
    pub max_due_batch: usize,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_open_score_delta() -> u32 {
    5
}
fn default_click_score_delta() -> u32 {
    10
}
fn default_max_due_batch() -> usize {
    1000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            open_score_delta: default_open_score_delta(),
            click_score_delta: default_click_score_delta(),
            max_due_batch: default_max_due_batch(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            sequence: SequenceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("CADENCE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_policy() {
        let config = AppConfig::default();
        assert_eq!(config.sequence.open_score_delta, 5);
        assert_eq!(config.sequence.click_score_delta, 10);
        assert_eq!(config.sequence.max_due_batch, 1000);
        assert_eq!(config.api.http_port, 8080);
    }
}
