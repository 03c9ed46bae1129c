use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use validator::Validate;

/// Application configuration, loaded from `config/*.toml` files and
/// `APP__*` environment variables (double underscore separator).
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub env: String,
    pub log_level: Option<String>,
    pub log_json: bool,
    pub auto_migrate: bool,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub cors_allowed_origins: Option<String>,
    /// Default tax rate applied to invoices, in percent of the discounted
    /// subtotal. Callers may override it per invoice.
    #[validate(range(max = 100))]
    pub default_tax_rate: u32,
    /// Days between invoice issue and due date.
    #[validate(range(min = 1))]
    pub invoice_due_days: u32,
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.env.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

    let cfg = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080_i64)?
        .set_default("env", env.clone())?
        .set_default("log_json", false)?
        .set_default("auto_migrate", true)?
        .set_default("db_max_connections", 20_i64)?
        .set_default("db_min_connections", 2_i64)?
        .set_default("default_tax_rate", 10_i64)?
        .set_default("invoice_due_days", 7_i64)?
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;
    Ok(app_config)
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over the
/// configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    info!("tracing initialized at level {}", level);
}
