//! Server configuration.
//!
//! Read from a TOML file whose path is the first CLI argument, else
//! `OWNER_CONFIG`. Without either, built-in defaults apply. The admin token
//! can always be supplied through `OWNER_ADMIN_TOKEN`.

use owner_admin::{AdminConfig, DEFAULT_RECORD_PREFIX, DohResolver, PlanPrices, StripeConfig};
use owner_webhooks::DispatcherConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "OWNER_CONFIG";

/// Environment variable overriding `server.admin_token`.
pub const ADMIN_TOKEN_ENV: &str = "OWNER_ADMIN_TOKEN";

/// Full server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub billing: BillingConfig,
    pub webhooks: WebhooksConfig,
    pub dns: DnsConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Listener and access settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Bearer token required on every API route but health.
    pub admin_token: Option<String>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            admin_token: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
        }
    }
}

/// Payment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BillingConfig {
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub trial_days: i64,
    /// Monthly prices in cents.
    pub prices: PlanPrices,
}

impl Default for BillingConfig {
    fn default() -> Self {
        let stripe = StripeConfig::default();
        let admin = AdminConfig::default();
        Self {
            stripe_secret_key: stripe.secret_key,
            stripe_api_base: stripe.api_base,
            currency: admin.currency,
            success_url: stripe.success_url,
            cancel_url: stripe.cancel_url,
            trial_days: admin.trial_days,
            prices: admin.prices,
        }
    }
}

impl BillingConfig {
    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig {
            secret_key: self.stripe_secret_key.clone(),
            api_base: self.stripe_api_base.clone(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
        }
    }
}

/// Webhook delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebhooksConfig {
    pub user_agent: String,
    /// Request timeout for webhooks that set none.
    pub default_timeout_ms: u64,
    /// How often the retry worker looks for due deliveries.
    pub retry_interval_secs: u64,
    pub auto_disable_threshold: u32,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        let dispatcher = DispatcherConfig::default();
        Self {
            user_agent: dispatcher.user_agent,
            default_timeout_ms: dispatcher.default_timeout.as_millis() as u64,
            retry_interval_secs: 30,
            auto_disable_threshold: dispatcher.auto_disable_threshold,
        }
    }
}

impl WebhooksConfig {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            user_agent: self.user_agent.clone(),
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            auto_disable_threshold: self.auto_disable_threshold,
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// Custom domain verification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DnsConfig {
    /// DNS-over-HTTPS JSON endpoint.
    pub doh_endpoint: String,
    /// Host label the TXT record is published under.
    pub record_prefix: String,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            doh_endpoint: DohResolver::DEFAULT_ENDPOINT.to_string(),
            record_prefix: DEFAULT_RECORD_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Loads the configuration the binary runs with.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::args()
            .nth(1)
            .or_else(|| std::env::var(CONFIG_ENV).ok());
        let token = std::env::var(ADMIN_TOKEN_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new), token)
    }

    /// Reads `path` (defaults when `None`), applies the token override and
    /// validates the result.
    pub fn load_from(path: Option<&Path>, admin_token: Option<String>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(token) = admin_token {
            config.server.admin_token = Some(token);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks settings serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.server.admin_token.as_deref() {
            None => {
                return Err(ConfigError::Invalid(format!(
                    "server.admin_token is required (or set {})",
                    ADMIN_TOKEN_ENV
                )));
            }
            Some(token) if token.trim().is_empty() => {
                return Err(ConfigError::Invalid("server.admin_token must not be blank".to_string()));
            }
            Some(_) => {}
        }
        if self.webhooks.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid("webhooks.default_timeout_ms must be positive".to_string()));
        }
        if self.webhooks.retry_interval_secs == 0 {
            return Err(ConfigError::Invalid("webhooks.retry_interval_secs must be positive".to_string()));
        }
        if self.billing.trial_days < 0 {
            return Err(ConfigError::Invalid("billing.trial_days must not be negative".to_string()));
        }
        if self.billing.currency.trim().is_empty() {
            return Err(ConfigError::Invalid("billing.currency must not be blank".to_string()));
        }
        Ok(())
    }

    /// Settings for the owner services.
    pub fn admin_config(&self) -> AdminConfig {
        AdminConfig::new()
            .prices(self.billing.prices)
            .currency(self.billing.currency.to_lowercase())
            .trial_days(self.billing.trial_days)
            .domain_record_prefix(self.dns.record_prefix.clone())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.log_format, LogFormat::Plain);
        assert_eq!(config.billing.prices, PlanPrices::default());
        assert_eq!(config.webhooks.default_timeout_ms, 10_000);
        assert_eq!(config.dns.record_prefix, "_owner-verification");
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse(
            r#"
            [server]
            port = 9090
            admin_token = "s3cret"
            log_format = "json"

            [billing]
            currency = "EUR"
            prices = { pro = 19900 }

            [webhooks]
            retry_interval_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.billing.prices.pro, 19_900);
        assert_eq!(config.billing.prices.basic, PlanPrices::default().basic);
        assert_eq!(config.webhooks.retry_interval(), Duration::from_secs(5));

        let admin = config.admin_config();
        assert_eq!(admin.currency, "eur");
        assert_eq!(admin.prices.pro, 19_900);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Config::parse("[server]\nprot = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = Config::parse("[metrics]\nenabled = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_admin_token_is_required() {
        let err = Config::load_from(None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::load_from(None, Some("  ".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = Config::load_from(None, Some("from-env".to_string())).unwrap();
        assert_eq!(config.server.admin_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_env_token_overrides_file() {
        let path = std::env::temp_dir().join(format!("owner-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[server]\nadmin_token = \"from-file\"\nport = 7000\n").unwrap();

        let config = Config::load_from(Some(&path), None).unwrap();
        assert_eq!(config.server.admin_token.as_deref(), Some("from-file"));

        let config = Config::load_from(Some(&path), Some("from-env".to_string())).unwrap();
        assert_eq!(config.server.admin_token.as_deref(), Some("from-env"));
        assert_eq!(config.server.port, 7000);

        std::fs::remove_file(&path).unwrap();
        let err = Config::load_from(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_validate_intervals() {
        let mut config = Config::default();
        config.server.admin_token = Some("token".to_string());
        assert!(config.validate().is_ok());

        config.webhooks.retry_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
