//! Configuration management for Tiergate.
//!
//! Configuration is assembled once at startup from built-in defaults, an
//! optional YAML/TOML file and `TIERGATE_*` environment variables, then
//! validated. Nothing here changes for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, TiergateError};

/// Environment variable prefix for layered configuration.
const ENV_PREFIX: &str = "TIERGATE";
/// Legacy variable naming the store host.
const REDIS_HOST_ENV: &str = "REDIS_HOST";

/// Main configuration for the Tiergate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiergateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counting store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Plan table and default plan
    #[serde(default)]
    pub tiers: TiersConfig,

    /// Static credential to plan table
    #[serde(default = "default_directory")]
    pub directory: Vec<DirectoryEntry>,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TiergateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            tiers: TiersConfig::default(),
            directory: default_directory(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

/// Connection settings for the shared counting store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// When false the gate never consults a store and always fails open
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_store_host")]
    pub host: String,

    #[serde(default = "default_store_port")]
    pub port: u16,

    /// Logical database index
    #[serde(default)]
    pub db: i64,

    #[serde(default)]
    pub password: Option<String>,

    /// Budget for establishing the connection and the startup health check
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Budget for each store round trip during a check
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Namespace prepended to every window key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Run prune, count and insert as a single store-side script
    #[serde(default = "default_true")]
    pub atomic: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_store_host(),
            port: default_store_port(),
            db: 0,
            password: None,
            connect_timeout_ms: default_connect_timeout(),
            command_timeout_ms: default_command_timeout(),
            key_prefix: default_key_prefix(),
            atomic: true,
        }
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_store_host() -> String {
    "localhost".to_string()
}

fn default_store_port() -> u16 {
    6379
}

fn default_connect_timeout() -> u64 {
    1000
}

fn default_command_timeout() -> u64 {
    250
}

fn default_key_prefix() -> String {
    "rate_limit".to_string()
}

/// Plan table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiersConfig {
    /// Plan applied to callers without a recognised credential
    #[serde(default = "default_plan_name")]
    pub default_plan: String,

    #[serde(default = "default_plans")]
    pub plans: Vec<PlanConfig>,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            default_plan: default_plan_name(),
            plans: default_plans(),
        }
    }
}

/// A single plan and its quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConfig {
    pub name: String,
    /// Requests admitted per window
    pub limit: u64,
    /// Trailing window length in seconds
    pub window_secs: u64,
}

fn default_plan_name() -> String {
    "FREE".to_string()
}

fn default_plans() -> Vec<PlanConfig> {
    vec![
        PlanConfig {
            name: "FREE".to_string(),
            limit: 5,
            window_secs: 10,
        },
        PlanConfig {
            name: "PRO".to_string(),
            limit: 50,
            window_secs: 10,
        },
    ]
}

/// A credential and the plan it is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub credential: String,
    pub plan: String,
}

fn default_directory() -> Vec<DirectoryEntry> {
    vec![
        DirectoryEntry {
            credential: "free_user_key_123".to_string(),
            plan: "FREE".to_string(),
        },
        DirectoryEntry {
            credential: "pro_user_key_456".to_string(),
            plan: "PRO".to_string(),
        },
    ]
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TiergateConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration file");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TiergateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Build the configuration from defaults, an optional file and the
    /// environment.
    ///
    /// Environment keys use `TIERGATE_` and `__` between sections, e.g.
    /// `TIERGATE_STORE__PORT=6380`. `REDIS_HOST`, when set, wins over every
    /// other source for `store.host`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("store.host", std::env::var(REDIS_HOST_ENV).ok())
            .map_err(|e| TiergateError::Config(e.to_string()))?;

        builder
            .build()
            .and_then(|c| c.try_deserialize::<TiergateConfig>())
            .map_err(|e| TiergateError::Config(format!("Failed to load configuration: {}", e)))
    }

    /// Reject tables that could make a plan unresolvable at request time.
    pub fn validate(&self) -> Result<()> {
        if self.tiers.plans.is_empty() {
            return Err(TiergateError::Config("no plans configured".to_string()));
        }

        let mut names = HashSet::new();
        for plan in &self.tiers.plans {
            if plan.name.is_empty() {
                return Err(TiergateError::Config("plan name must not be empty".to_string()));
            }
            if !names.insert(plan.name.as_str()) {
                return Err(TiergateError::Config(format!(
                    "plan {} is defined more than once",
                    plan.name
                )));
            }
            if plan.limit == 0 {
                return Err(TiergateError::Config(format!(
                    "plan {} must allow at least one request",
                    plan.name
                )));
            }
            if plan.window_secs == 0 {
                return Err(TiergateError::Config(format!(
                    "plan {} must have a window longer than zero",
                    plan.name
                )));
            }
        }

        if !names.contains(self.tiers.default_plan.as_str()) {
            return Err(TiergateError::UnknownPlan(self.tiers.default_plan.clone()));
        }

        for entry in &self.directory {
            if !names.contains(entry.plan.as_str()) {
                return Err(TiergateError::Config(format!(
                    "credential {} maps to unknown plan {}",
                    entry.credential, entry.plan
                )));
            }
        }

        if self.store.command_timeout_ms == 0 {
            return Err(TiergateError::Config(
                "store.command_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
