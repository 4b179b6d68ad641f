//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtConfig,
    /// Wallet ledger policy.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Payment gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Background settlement worker settings.
    #[serde(default)]
    pub settlement: SettlementConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration. Tokens are issued by the identity provider; this
/// service only validates them.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Shared secret used to verify token signatures.
    pub secret: String,
    /// Lifetime of development tokens minted by the seeder, in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

/// Wallet ledger policy: currency, limits, holds, fees.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// ISO currency code every wallet is denominated in.
    pub currency: String,
    /// IANA timezone used for spend windows when a wallet has none.
    pub timezone: String,
    /// Owner id of the platform fee-sink wallet.
    pub fee_wallet_owner: Uuid,
    /// Default daily spend cap in minor units.
    pub daily_limit: i64,
    /// Default monthly spend cap in minor units.
    pub monthly_limit: i64,
    /// Lifetime of withdrawal/bill-payment holds, in seconds.
    pub hold_ttl_secs: u64,
    /// Failed PIN attempts allowed before lockout.
    pub pin_max_attempts: u32,
    /// Lockout window after too many failed PIN attempts, in seconds.
    pub pin_lockout_secs: u64,
    /// Validity of generated QR payment codes, in seconds.
    pub qr_validity_secs: u64,
    /// Fee schedule.
    pub fees: FeeConfig,
}

/// Default owner id of the fee-sink wallet.
pub const DEFAULT_FEE_WALLET_OWNER: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_fee0);

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            timezone: "Africa/Lagos".to_string(),
            fee_wallet_owner: DEFAULT_FEE_WALLET_OWNER,
            daily_limit: 5_000_000,
            monthly_limit: 50_000_000,
            hold_ttl_secs: 86_400,
            pin_max_attempts: 5,
            pin_lockout_secs: 900,
            qr_validity_secs: 900,
            fees: FeeConfig::default(),
        }
    }
}

/// Fee schedule. Rates are percentages (`0.5` means 0.5%); minimums and flat
/// fees are minor units.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Peer-to-peer transfer rate.
    pub transfer_rate: Decimal,
    /// Peer-to-peer transfer minimum fee.
    pub transfer_minimum: i64,
    /// Platform default merchant rate.
    pub merchant_rate: Decimal,
    /// Bill payment rate.
    pub bill_rate: Decimal,
    /// Bill payment minimum fee.
    pub bill_minimum: i64,
    /// Flat withdrawal fee.
    pub withdrawal_flat: i64,
    /// Funding (deposit) rate.
    pub deposit_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            transfer_rate: Decimal::new(5, 1),
            transfer_minimum: 100,
            merchant_rate: Decimal::ONE,
            bill_rate: Decimal::new(15, 1),
            bill_minimum: 200,
            withdrawal_flat: 1_500,
            deposit_rate: Decimal::new(15, 1),
        }
    }
}

/// Which gateway implementation backs external money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// Deterministic in-process gateway for development and tests.
    #[default]
    Sandbox,
}

/// Payment gateway settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway implementation.
    pub mode: GatewayMode,
    /// Upper bound for a single gateway call, in seconds.
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Sandbox,
            timeout_secs: 15,
        }
    }
}

/// Background settlement worker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Seconds between payout/reconciliation passes.
    pub interval_secs: u64,
    /// Maximum payouts driven per pass.
    pub payout_batch: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            payout_batch: 50,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("CAMPUSPAY").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Rejects configurations that would break ledger invariants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Configuration` naming the offending field.
    pub fn validate(&self) -> Result<(), AppError> {
        let ledger = &self.ledger;
        if ledger.daily_limit <= 0 || ledger.monthly_limit <= 0 {
            return Err(AppError::Configuration(
                "ledger limits must be positive".to_string(),
            ));
        }
        if ledger.daily_limit > ledger.monthly_limit {
            return Err(AppError::Configuration(
                "ledger.daily_limit exceeds ledger.monthly_limit".to_string(),
            ));
        }
        if ledger.pin_max_attempts == 0 {
            return Err(AppError::Configuration(
                "ledger.pin_max_attempts must be at least 1".to_string(),
            ));
        }
        let fees = &ledger.fees;
        let rates = [
            fees.transfer_rate,
            fees.merchant_rate,
            fees.bill_rate,
            fees.deposit_rate,
        ];
        if rates
            .iter()
            .any(|r| r.is_sign_negative() || *r >= Decimal::ONE_HUNDRED)
        {
            return Err(AppError::Configuration(
                "fee rates must be within [0, 100)".to_string(),
            ));
        }
        if fees.transfer_minimum < 0 || fees.bill_minimum < 0 || fees.withdrawal_flat < 0 {
            return Err(AppError::Configuration(
                "fee minimums must not be negative".to_string(),
            ));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(AppError::Configuration(
                "gateway.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_env() -> Vec<(&'static str, Option<&'static str>)> {
        vec![
            ("CAMPUSPAY__DATABASE__URL", Some("postgres://localhost/campuspay")),
            ("CAMPUSPAY__JWT__SECRET", Some("test-secret")),
        ]
    }

    #[test]
    fn test_load_applies_defaults() {
        temp_env::with_vars(required_env(), || {
            let config = AppConfig::load().unwrap();
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.database.max_connections, 10);
            assert_eq!(config.ledger.currency, "NGN");
            assert_eq!(config.ledger.fees.transfer_minimum, 100);
            assert_eq!(config.ledger.fees.withdrawal_flat, 1_500);
            assert_eq!(config.gateway.mode, GatewayMode::Sandbox);
            assert!(config.validate().is_ok());
        });
    }

    #[test]
    fn test_env_overrides_port() {
        let mut vars = required_env();
        vars.push(("CAMPUSPAY__SERVER__PORT", Some("9090")));
        temp_env::with_vars(vars, || {
            let config = AppConfig::load().unwrap();
            assert_eq!(config.server.port, 9090);
        });
    }

    #[test]
    fn test_missing_database_url_fails() {
        temp_env::with_vars(
            [
                ("CAMPUSPAY__DATABASE__URL", None::<&str>),
                ("CAMPUSPAY__JWT__SECRET", Some("s")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }

    #[test]
    fn test_validate_rejects_daily_above_monthly() {
        let mut ledger = LedgerConfig::default();
        ledger.daily_limit = ledger.monthly_limit + 1;
        let config = AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "x".into(),
                max_connections: 1,
                min_connections: 1,
            },
            jwt: JwtConfig {
                secret: "s".into(),
                access_token_expiry_secs: 60,
            },
            ledger,
            gateway: GatewayConfig::default(),
            settlement: SettlementConfig::default(),
        };
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration(_))
        ));
    }
}
