//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.
//! Gateway credentials are read from prefixed variables (`VNPAY_*`, `MOMO_*`).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `SHIPPING_FEE`, `COD_FEE`, `TAX_RATE`: pricing constants (decimal strings)
/// - `PAYMENT_TIMEOUT_MINUTES`, `MAX_PAYMENT_RETRIES`, `REFUND_WINDOW_DAYS`: payment policy
/// - `DEFAULT_WAREHOUSE_CODE`: fallback warehouse when the address has no coordinates
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_fee")]
    pub shipping_fee: Decimal,

    #[serde(default = "default_fee")]
    pub cod_fee: Decimal,

    /// Fraction of the discounted subtotal, e.g. `0.08`. Zero disables tax.
    #[serde(default)]
    pub tax_rate: Decimal,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_fifteen")]
    pub payment_timeout_minutes: i64,

    #[serde(default = "default_max_payment_retries")]
    pub max_payment_retries: i32,

    #[serde(default = "default_refund_window_days")]
    pub refund_window_days: i64,

    #[serde(default = "default_fifteen")]
    pub auto_release_minutes: i64,

    #[serde(default = "default_warehouse_code")]
    pub default_warehouse_code: String,

    #[serde(default = "default_thirty")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_thirty")]
    pub gateway_timeout_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub expire_sweep_interval_secs: u64,

    #[serde(default = "default_sweep_batch")]
    pub expire_sweep_batch: i64,

    #[serde(default = "default_webhook_retry_interval")]
    pub webhook_retry_interval_secs: u64,

    #[serde(default = "default_webhook_retry_batch")]
    pub webhook_retry_batch: i64,

    /// Populated from `VNPAY_*` variables, absent when not configured.
    #[serde(skip)]
    pub vnpay: Option<GatewayConfig>,

    /// Populated from `MOMO_*` variables, absent when not configured.
    #[serde(skip)]
    pub momo: Option<GatewayConfig>,
}

/// Credentials and endpoints for one redirect payment provider.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub partner_code: String,
    #[serde(default)]
    pub access_key: String,
    pub secret_key: String,
    pub api_url: String,
    #[serde(default)]
    pub refund_url: Option<String>,
    pub return_url: String,
    #[serde(default)]
    pub ipn_url: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_fee() -> Decimal {
    dec!(15)
}

fn default_currency() -> String {
    "VND".to_string()
}

fn default_fifteen() -> i64 {
    15
}

fn default_max_payment_retries() -> i32 {
    3
}

fn default_refund_window_days() -> i64 {
    7
}

fn default_warehouse_code() -> String {
    "WH-DEFAULT".to_string()
}

fn default_thirty() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sweep_batch() -> i64 {
    100
}

fn default_webhook_retry_interval() -> u64 {
    300
}

fn default_webhook_retry_batch() -> i64 {
    50
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    /// - Values violate pricing invariants (see [`Config::validate`])
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        let mut config = envy::from_env::<Config>()?;
        config.vnpay = load_gateway("VNPAY_");
        config.momo = load_gateway("MOMO_");
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the order table relies on.
    ///
    /// The COD fee must be strictly positive because `cod_fee > 0` is how a
    /// cash-on-delivery order is recognised in persisted amounts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shipping_fee < Decimal::ZERO {
            return Err(ConfigError::Invalid("SHIPPING_FEE must not be negative".into()));
        }
        if self.cod_fee <= Decimal::ZERO {
            return Err(ConfigError::Invalid("COD_FEE must be positive".into()));
        }
        if self.tax_rate < Decimal::ZERO || self.tax_rate >= Decimal::ONE {
            return Err(ConfigError::Invalid("TAX_RATE must be in [0, 1)".into()));
        }
        if !(1..=3).contains(&self.max_payment_retries) {
            return Err(ConfigError::Invalid(
                "MAX_PAYMENT_RETRIES must be between 1 and 3".into(),
            ));
        }
        if self.payment_timeout_minutes <= 0 || self.auto_release_minutes <= 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        Ok(())
    }

    /// Configuration used by unit and integration tests.
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            server_port: 0,
            database_max_connections: 5,
            shipping_fee: dec!(15),
            cod_fee: dec!(15),
            tax_rate: Decimal::ZERO,
            currency: "VND".to_string(),
            payment_timeout_minutes: 15,
            max_payment_retries: 3,
            refund_window_days: 7,
            auto_release_minutes: 15,
            default_warehouse_code: "WH-DEFAULT".to_string(),
            request_timeout_secs: 30,
            gateway_timeout_secs: 30,
            expire_sweep_interval_secs: 60,
            expire_sweep_batch: 100,
            webhook_retry_interval_secs: 300,
            webhook_retry_batch: 50,
            vnpay: None,
            momo: None,
        }
    }
}

/// Reads one gateway's settings; a provider without variables is skipped.
fn load_gateway(prefix: &str) -> Option<GatewayConfig> {
    match envy::prefixed(prefix).from_env::<GatewayConfig>() {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::info!(prefix, error = %e, "Payment gateway not configured");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid() {
        assert!(Config::for_tests("postgres://localhost/test").validate().is_ok());
    }

    #[test]
    fn zero_cod_fee_is_rejected() {
        let mut config = Config::for_tests("postgres://localhost/test");
        config.cod_fee = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn retries_above_three_are_rejected() {
        let mut config = Config::for_tests("postgres://localhost/test");
        config.max_payment_retries = 4;
        assert!(config.validate().is_err());
    }
}
