use bd_client::ClientSettings;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Harness configuration loaded from multiple sources.
///
/// Configuration is loaded in priority order (lowest to highest):
/// 1. Struct defaults
/// 2. config.yaml file (if exists)
/// 3. Environment variables with BDH_ prefix (always wins)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub borrowdirect: BorrowDirectConfig,
    #[serde(default)]
    pub patrons: PatronConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Remote API settings. Unset values stay `None` all the way into the client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BorrowDirectConfig {
    pub university_code: Option<String>,
    pub api_url_root: Option<String>,
    pub partnership_id: Option<String>,
    pub pickup_location: Option<String>,

    /// Per-HTTP-call timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl BorrowDirectConfig {
    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            university_code: self.university_code.clone(),
            api_url_root: self.api_url_root.clone(),
            partnership_id: self.partnership_id.clone(),
            pickup_location: self.pickup_location.clone(),
        }
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BorrowDirectConfig {
    fn default() -> Self {
        Self {
            university_code: None,
            api_url_root: None,
            partnership_id: None,
            pickup_location: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Test patrons. The good barcode drives batch jobs; the bad one is a
/// barcode the service must refuse, used by `check-patron --bad`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PatronConfig {
    pub good_barcode: Option<String>,
    pub bad_barcode: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database host.
    #[serde(default = "default_db_host")]
    pub host: String,

    /// Database port.
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_db_name")]
    pub name: String,

    /// Database user (required for queue and store commands).
    #[serde(default)]
    pub user: String,

    /// Database password (required for queue and store commands).
    #[serde(default)]
    pub password: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Optional custom migrations directory path.
    pub migrations_dir: Option<String>,
}

impl DatabaseConfig {
    /// Assemble a `PostgreSQL` connection URL from individual fields.
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (debug, info, warn, error, or a full directive).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append logs to this file instead of stderr.
    pub path: Option<String>,
}

/// One test run: where identifiers come from, where results go, and how
/// jobs are paced.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_key")]
    pub queue_name: String,

    /// Store namespace the run's entries are accumulated under.
    #[serde(default = "default_batch_key")]
    pub namespace: String,

    /// JSON array of identifiers to test.
    pub input_path: Option<String>,

    #[serde(default = "default_output_path")]
    pub output_path: String,

    /// Hard ceiling for one job before the queue may redeliver it.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Pause before each remote phase; the test backend is slow to settle.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Deliveries per job before it is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Concurrent worker loops per process.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Idle wait between empty queue polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl BatchConfig {
    #[must_use]
    pub const fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            queue_name: default_batch_key(),
            namespace: default_batch_key(),
            input_path: None,
            output_path: default_output_path(),
            job_timeout_secs: default_job_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            max_attempts: default_max_attempts(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// These functions cannot be const because serde uses function pointers for defaults
#[allow(clippy::missing_const_for_fn)]
fn default_request_timeout_secs() -> u64 {
    60
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_connections() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "bd-harness".to_string()
}

fn default_batch_key() -> String {
    "BD_ISBN_TEST".to_string()
}

fn default_output_path() -> String {
    "isbn_test_report.json".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_job_timeout_secs() -> u64 {
    600 // 10 minutes
}

#[allow(clippy::missing_const_for_fn)]
fn default_settle_delay_ms() -> u64 {
    2_000
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_attempts() -> u32 {
    3
}

#[allow(clippy::missing_const_for_fn)]
fn default_concurrency() -> usize {
    4
}

#[allow(clippy::missing_const_for_fn)]
fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            borrowdirect: BorrowDirectConfig::default(),
            patrons: PatronConfig::default(),
            database: DatabaseConfig {
                host: default_db_host(),
                port: default_db_port(),
                name: default_db_name(),
                user: String::new(),
                password: String::new(),
                max_connections: default_max_connections(),
                migrations_dir: None,
            },
            logging: LoggingConfig {
                level: default_log_level(),
                path: None,
            },
            batch: BatchConfig::default(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Sources are merged in priority order:
    /// 1. Struct defaults (lowest)
    /// 2. The YAML file at `yaml_path` (if it exists)
    /// 3. Environment variables with BDH_ prefix (highest)
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(yaml_path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The provider stack `load_from` extracts from.
    #[must_use]
    pub fn figment(yaml_path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed("BDH_").split("__"))
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // API root, when given, must be an http(s) URL
        if let Some(root) = &self.borrowdirect.api_url_root {
            if !root.starts_with("http://") && !root.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "borrowdirect.api_url_root must start with http:// or https://, got: '{root}'"
                )));
            }
        }

        if self.borrowdirect.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "borrowdirect.request_timeout_secs cannot be 0".into(),
            ));
        }

        if self.batch.queue_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "batch.queue_name cannot be empty".into(),
            ));
        }

        if self.batch.namespace.trim().is_empty() {
            return Err(ConfigError::Validation(
                "batch.namespace cannot be empty".into(),
            ));
        }

        if self.batch.job_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "batch.job_timeout_secs cannot be 0".into(),
            ));
        }

        if self.batch.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "batch.max_attempts cannot be 0".into(),
            ));
        }

        if self.batch.concurrency == 0 {
            return Err(ConfigError::Validation(
                "batch.concurrency cannot be 0".into(),
            ));
        }

        // Database port must be non-zero
        if self.database.port == 0 {
            return Err(ConfigError::Validation(
                "database.port cannot be 0".into(),
            ));
        }

        // Max connections must be at least 1
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Validate the credentials needed by commands that touch the database.
    ///
    /// # Errors
    /// Returns an error if the database user or password is missing.
    pub fn validate_database(&self) -> Result<(), ConfigError> {
        if self.database.user.is_empty() {
            return Err(ConfigError::Validation(
                "database.user is required. Set BDH_DATABASE__USER environment variable or configure in config.yaml.".into(),
            ));
        }

        if self.database.password.is_empty() {
            return Err(ConfigError::Validation(
                "database.password is required. Set BDH_DATABASE__PASSWORD environment variable or configure in config.yaml.".into(),
            ));
        }

        Ok(())
    }

    /// The barcode batch jobs run as.
    ///
    /// # Errors
    /// Returns an error if no good test patron is configured.
    pub fn job_patron(&self) -> Result<&str, ConfigError> {
        self.patrons.good_barcode.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "patrons.good_barcode is required to run jobs. Set BDH_PATRONS__GOOD_BARCODE.".into(),
            )
        })
    }

    /// The barcode expected to fail authentication.
    ///
    /// # Errors
    /// Returns an error if no bad test patron is configured.
    pub fn rejected_patron(&self) -> Result<&str, ConfigError> {
        self.patrons.bad_barcode.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "patrons.bad_barcode is required for --bad. Set BDH_PATRONS__BAD_BARCODE.".into(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.database.user = "postgres".into();
        config.database.password = "postgres".into();
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.path.is_none());
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.batch.queue_name, "BD_ISBN_TEST");
        assert_eq!(config.batch.namespace, "BD_ISBN_TEST");
        assert_eq!(config.batch.job_timeout(), Duration::from_secs(600));
        assert_eq!(config.batch.settle_delay(), Duration::from_secs(2));
        assert!(config.borrowdirect.university_code.is_none());
        assert!(config.patrons.good_barcode.is_none());
    }

    #[test]
    fn test_validation_accepts_valid_config() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(config.validate_database().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_database_user() {
        let mut config = valid_config();
        config.database.user = String::new();
        let result = config.validate_database();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("database.user"));
    }

    #[test]
    fn test_validation_rejects_non_http_api_root() {
        let mut config = valid_config();
        config.borrowdirect.api_url_root = Some("bd.example.edu".into());
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("api_url_root"));
    }

    #[test]
    fn test_empty_borrowdirect_section_yields_unset_client_settings() {
        let settings = valid_config().borrowdirect.client_settings();
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn test_job_patron_required() {
        let mut config = valid_config();
        assert!(config.job_patron().is_err());
        config.patrons.good_barcode = Some("2222".into());
        assert_eq!(config.job_patron().expect("set"), "2222");
    }

    #[test]
    fn test_rejected_patron_is_separate_from_job_patron() {
        let mut config = valid_config();
        config.patrons.good_barcode = Some("2222".into());
        let err = config.rejected_patron().unwrap_err();
        assert!(err.to_string().contains("patrons.bad_barcode"));

        config.patrons.bad_barcode = Some("0000".into());
        assert_eq!(config.rejected_patron().expect("set"), "0000");
        assert_eq!(config.job_patron().expect("set"), "2222");
    }

    #[test]
    fn test_bad_barcode_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("BDH_PATRONS__BAD_BARCODE", "00000000000000");
            let config: Config = Config::figment("missing.yaml").extract()?;
            assert_eq!(config.rejected_patron().ok(), Some("00000000000000"));
            assert!(config.patrons.good_barcode.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "harness.yaml",
                "borrowdirect:\n  university_code: BROWN\n  api_url_root: https://bd.example.edu\nbatch:\n  settle_delay_ms: 0\n",
            )?;
            jail.set_env("BDH_BORROWDIRECT__UNIVERSITY_CODE", "YALE");
            jail.set_env("BDH_DATABASE__USER", "harness");

            let config: Config = Config::figment("harness.yaml").extract()?;
            assert_eq!(config.borrowdirect.university_code.as_deref(), Some("YALE"));
            assert_eq!(
                config.borrowdirect.api_url_root.as_deref(),
                Some("https://bd.example.edu")
            );
            assert_eq!(config.batch.settle_delay_ms, 0);
            assert_eq!(config.database.user, "harness");
            assert!(config.borrowdirect.pickup_location.is_none());
            Ok(())
        });
    }

    // Table-driven boundary tests for validation rules

    #[test]
    fn batch_boundaries() {
        let cases: [(fn(&mut BatchConfig), bool, &str); 6] = [
            (|_| {}, true, "defaults"),
            (|b| b.job_timeout_secs = 0, false, "zero timeout"),
            (|b| b.max_attempts = 0, false, "zero attempts"),
            (|b| b.concurrency = 0, false, "zero concurrency"),
            (|b| b.namespace = "  ".into(), false, "blank namespace"),
            (|b| b.settle_delay_ms = 0, true, "no settle delay"),
        ];

        for (mutate, should_pass, desc) in cases {
            let mut config = valid_config();
            mutate(&mut config.batch);
            let result = config.validate();
            assert_eq!(result.is_ok(), should_pass, "case '{}': {:?}", desc, result);
        }
    }

    #[test]
    fn api_root_boundaries() {
        let cases = [
            (None, true, "unset"),
            (Some("https://bd.example.edu"), true, "https"),
            (Some("http://localhost:8080"), true, "http with port"),
            (Some("ftp://bd.example.edu"), false, "ftp scheme"),
            (Some("bd.example.edu"), false, "no scheme"),
        ];

        for (root, should_pass, desc) in cases {
            let mut config = valid_config();
            config.borrowdirect.api_url_root = root.map(String::from);
            let result = config.validate();
            assert_eq!(result.is_ok(), should_pass, "case '{}': {:?}", desc, result);
        }
    }
}
