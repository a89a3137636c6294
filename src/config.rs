use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::api::DmaSettings;
use crate::execution::ExecutionSettings;
use crate::strategy::MomentumParams;
use crate::trader::TraderSettings;
use crate::Result;

const DEFAULT_HOST: &str = "https://routefire.io";
const DEFAULT_API_URL: &str = "https://routefire.io/adapt/v1";
const DEFAULT_AUTH_URL: &str = "https://routefire.io/api/v1";

/// Runtime settings
///
/// Layered as defaults, then an optional TOML file, then `MOMTRADER__*`
/// environment variables (e.g. `MOMTRADER__CAPITAL=100`,
/// `MOMTRADER__ASSETS=btc,eth`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api_url: String,
    pub auth_url: String,
    /// Replaces the default host in both URLs, e.g. a staging server
    pub host_override: Option<String>,
    pub user_id: String,
    pub password: String,
    pub assets: Vec<String>,
    pub base_asset: String,
    /// Quote currency committed to each entry
    pub capital: f64,
    pub min_deviation: f64,
    pub gainer_periods: usize,
    pub deviation_periods: usize,
    pub tick_interval_secs: u64,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub order_timeout_secs: u64,
    pub token_refresh_secs: u64,
    pub history_capacity: usize,
    pub execution_safety: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            host_override: None,
            user_id: String::new(),
            password: String::new(),
            assets: vec!["btc".to_string(), "eth".to_string(), "zrx".to_string()],
            base_asset: "usd".to_string(),
            capital: 40.0,
            min_deviation: 1.0,
            gainer_periods: 5,
            deviation_periods: 10,
            tick_interval_secs: 10,
            poll_interval_secs: 3,
            max_poll_attempts: 10,
            order_timeout_secs: 60,
            token_refresh_secs: 100,
            history_capacity: 64,
            execution_safety: false,
        }
    }
}

impl AppConfig {
    /// Load settings from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("MOMTRADER")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("assets")
                .try_parsing(true),
        );

        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: AppConfig = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> { Err(ConfigError::Message(msg.to_string()).into()) };

        if self.assets.is_empty() {
            return invalid("at least one asset must be tracked");
        }
        if !(self.capital > 0.0) {
            return invalid("capital must be positive");
        }
        if self.gainer_periods == 0 || self.deviation_periods == 0 {
            return invalid("lookback periods must be at least 1");
        }
        if self.history_capacity < self.gainer_periods.max(self.deviation_periods) {
            return invalid("history_capacity must cover the longest lookback");
        }
        if self.max_poll_attempts == 0 {
            return invalid("max_poll_attempts must be at least 1");
        }
        if self.tick_interval_secs == 0 || self.token_refresh_secs == 0 {
            return invalid("intervals must be non-zero");
        }

        Ok(())
    }

    /// Fail early if there is nothing to log in with
    pub fn require_credentials(&self) -> Result<()> {
        if self.user_id.is_empty() || self.password.is_empty() {
            return Err(ConfigError::Message(
                "user_id and password are required (MOMTRADER__USER_ID / MOMTRADER__PASSWORD)"
                    .to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn momentum_params(&self) -> MomentumParams {
        MomentumParams {
            gainer_periods: self.gainer_periods,
            deviation_periods: self.deviation_periods,
            min_deviation: self.min_deviation,
        }
    }

    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_poll_attempts: self.max_poll_attempts,
            order_timeout: Duration::from_secs(self.order_timeout_secs),
            execution_safety: self.execution_safety,
        }
    }

    pub fn dma_settings(&self) -> DmaSettings {
        let resolve = |url: &str| {
            let url = match self.host_override.as_deref().filter(|h| !h.is_empty()) {
                Some(host) => url.replace(DEFAULT_HOST, host.trim_end_matches('/')),
                None => url.to_string(),
            };
            url.trim_end_matches('/').to_string()
        };

        DmaSettings {
            api_url: resolve(&self.api_url),
            auth_url: resolve(&self.auth_url),
            user_id: self.user_id.clone(),
            password: self.password.clone(),
        }
    }

    pub fn trader_settings(&self) -> Result<TraderSettings> {
        let capital = Decimal::from_f64(self.capital).ok_or_else(|| {
            ConfigError::Message(format!("capital {} is not a valid amount", self.capital))
        })?;

        Ok(TraderSettings {
            capital,
            tick_interval: self.tick_interval(),
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs)
    }
}
