//! Configuration module for numrent-server.
//!
//! Handles loading configuration from the TOML file, CLI arguments and
//! environment variables, and converts it into the runtime types of
//! `numrent_core::config`.

pub mod file;

use crate::config::file::FileConfig;
use numrent_core::config::{
    EmailConfig, GatewayConfig, ReconcileConfig, RedeemConfig, TelegramConfig,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Validated configuration for every service.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub reconcile: ReconcileConfig,
    pub redeem: RedeemConfig,
    pub gateway: Option<GatewayConfig>,
    pub telegram: Option<TelegramConfig>,
    pub email: Option<EmailConfig>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        build_loaded_config(file_config)
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let r = &config.reconcile;
    if r.poll_interval_secs == 0 || r.countdown_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "reconcile intervals must be positive".to_owned(),
        ));
    }
    if r.min_batch == 0 || r.min_batch > r.max_batch {
        return Err(ConfigError::ValidationError(format!(
            "invalid batch bounds [{}, {}]",
            r.min_batch, r.max_batch
        )));
    }
    if r.failure_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "failure_threshold must be at least 1".to_owned(),
        ));
    }
    if !(6..=32).contains(&config.redeem.code_length) {
        return Err(ConfigError::ValidationError(format!(
            "code_length {} outside 6..=32",
            config.redeem.code_length
        )));
    }
    if config.redeem.default_max_uses == 0 {
        return Err(ConfigError::ValidationError(
            "default_max_uses must be at least 1".to_owned(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let code_ttl_secs = file_config
        .redeem
        .code_ttl_days
        .checked_mul(24 * 60 * 60)
        .ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "code_ttl_days {} is too large",
                file_config.redeem.code_ttl_days
            ))
        })?;
    let gateway = file_config.gateway.filter(|g| {
        let has_key = !g.api_key.trim().is_empty();
        if !has_key {
            tracing::warn!("[gateway] api_key is empty, treating the gateway as unconfigured");
        }
        has_key
    });

    let r = file_config.reconcile;
    Ok(LoadedConfig {
        listen: file_config.server.listen,
        reconcile: ReconcileConfig {
            poll_interval: Duration::from_secs(r.poll_interval_secs),
            countdown_interval: Duration::from_secs(r.countdown_interval_secs),
            min_batch: r.min_batch,
            max_batch: r.max_batch,
            failure_threshold: r.failure_threshold,
            cooldown: Duration::from_secs(r.cooldown_secs),
        },
        redeem: RedeemConfig {
            code_length: file_config.redeem.code_length,
            code_ttl: Duration::from_secs(code_ttl_secs),
            default_max_uses: file_config.redeem.default_max_uses,
        },
        gateway: gateway.map(|g| GatewayConfig {
            url: g.url,
            api_key: g.api_key,
            timeout: Duration::from_secs(g.timeout_secs),
        }),
        telegram: file_config.telegram.map(|t| TelegramConfig {
            bot_token: t.bot_token,
            chat_id: t.chat_id,
            api_base: t.api_base,
            timeout: Duration::from_secs(t.timeout_secs),
        }),
        email: file_config.email.map(|e| EmailConfig {
            smtp_host: e.smtp_host,
            smtp_port: e.smtp_port,
            username: e.username,
            password: e.password,
            from: e.from,
            admin_address: e.admin_address,
        }),
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

/// Get the Redis URL from the environment, if configured.
pub fn get_redis_url() -> Option<String> {
    std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> FileConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_defaults_convert_to_runtime_config() {
        let loaded = build_loaded_config(parse("")).unwrap();
        assert_eq!(loaded.reconcile.poll_interval, Duration::from_secs(5));
        assert_eq!(loaded.reconcile.initial_batch(), 50);
        assert_eq!(loaded.redeem.code_ttl, Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[test]
    fn test_inverted_batch_bounds_rejected() {
        let config = parse("[reconcile]\nmin_batch = 200\nmax_batch = 100\n");
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_huge_code_ttl_rejected() {
        let config = parse(&format!("[redeem]\ncode_ttl_days = {}\n", u64::MAX / 2));
        assert!(matches!(
            build_loaded_config(config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_empty_gateway_key_disables_gateway() {
        let config = parse("[gateway]\nurl = \"https://pay.example.com/status\"\napi_key = \"  \"\n");
        assert!(build_loaded_config(config).unwrap().gateway.is_none());

        let config = parse("[gateway]\nurl = \"https://pay.example.com/status\"\napi_key = \"k3y\"\n");
        assert!(build_loaded_config(config).unwrap().gateway.is_some());
    }

    #[test]
    fn test_telegram_timeout_defaults_to_thirty_seconds() {
        let config = parse("[telegram]\nbot_token = \"1:a\"\nchat_id = -100\n");
        let telegram = build_loaded_config(config).unwrap().telegram.unwrap();
        assert_eq!(telegram.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_listen_override_applies() {
        let dir = std::env::temp_dir().join(format!("numrent-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("numrent.toml");
        std::fs::write(&path, "[server]\nlisten = \"127.0.0.1:3000\"\n").unwrap();

        let listen: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let loaded = ConfigLoader::new(&path, Some(listen)).load().unwrap();
        assert_eq!(loaded.listen, listen);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
