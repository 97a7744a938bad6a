//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public base URL of the protocol endpoint, echoed in every response.
    /// Derived from the request's Host header when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Interval between background sweeps of expired resumption tokens.
    /// 0 disables the background sweep; expired tokens are then only removed
    /// lazily or through `harvestctl prune tokens`.
    #[serde(default = "default_token_prune_interval_secs")]
    pub token_prune_interval_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_token_prune_interval_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_url: None,
            metrics_enabled: default_metrics_enabled(),
            token_prune_interval_secs: default_token_prune_interval_secs(),
        }
    }
}

impl ServerConfig {
    /// Background prune interval, or `None` when disabled.
    pub fn token_prune_interval(&self) -> Option<std::time::Duration> {
        (self.token_prune_interval_secs > 0)
            .then(|| std::time::Duration::from_secs(self.token_prune_interval_secs))
    }
}

/// How the repository keeps track of deleted records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletedRecords {
    /// Deleted records are removed without a trace.
    No,
    /// Deletions are kept forever as tombstones.
    Persistent,
    /// Deletions are kept as tombstones, but may be purged.
    #[default]
    Transient,
}

impl DeletedRecords {
    /// Parse from the configuration / wire value.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "no" => Ok(Self::No),
            "persistent" => Ok(Self::Persistent),
            "transient" => Ok(Self::Transient),
            _ => Err(crate::Error::UnknownDeletedRecords(s.to_string())),
        }
    }

    /// Get the wire representation advertised by Identify.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Persistent => "persistent",
            Self::Transient => "transient",
        }
    }

    /// Whether deletions leave a tombstone behind.
    pub fn keeps_tombstones(&self) -> bool {
        !matches!(self, Self::No)
    }
}

impl fmt::Display for DeletedRecords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository identity and flow-control settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Human-readable repository name.
    #[serde(default = "default_repository_name")]
    pub name: String,
    /// Administrator contact addresses (at least one).
    #[serde(default = "default_admin_emails")]
    pub admin_emails: Vec<String>,
    /// Deleted record policy.
    #[serde(default)]
    pub deleted_records: DeletedRecords,
    /// Maximum number of records or sets per list response (1-100).
    #[serde(default = "default_max_records")]
    pub max_records: u32,
    /// Lifetime of a resumption token in seconds.
    #[serde(default = "default_token_valid_secs")]
    pub token_valid_secs: u64,
}

fn default_repository_name() -> String {
    "OAI-PMH Repository".to_string()
}

fn default_admin_emails() -> Vec<String> {
    vec!["admin@example.org".to_string()]
}

fn default_max_records() -> u32 {
    50
}

fn default_token_valid_secs() -> u64 {
    86400 // 24 hours
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: default_repository_name(),
            admin_emails: default_admin_emails(),
            deleted_records: DeletedRecords::default(),
            max_records: default_max_records(),
            token_valid_secs: default_token_valid_secs(),
        }
    }
}

impl RepositoryConfig {
    /// Resumption token lifetime as a Duration.
    pub fn token_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.token_valid_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Page size as used by queries.
    pub fn page_size(&self) -> u64 {
        u64::from(self.max_records)
    }

    /// Validate repository settings.
    pub fn validate(&self) -> Result<(), String> {
        if !(crate::MIN_PAGE_SIZE..=crate::MAX_PAGE_SIZE).contains(&self.max_records) {
            return Err(format!(
                "repository.max_records must be between {} and {}, got {}",
                crate::MIN_PAGE_SIZE,
                crate::MAX_PAGE_SIZE,
                self.max_records
            ));
        }
        if self.token_valid_secs == 0 {
            return Err("repository.token_valid_secs cannot be 0".to_string());
        }
        if self.token_valid_secs > i64::MAX as u64 {
            return Err(format!(
                "repository.token_valid_secs {} exceeds maximum value {}",
                self.token_valid_secs,
                i64::MAX
            ));
        }
        if self.name.trim().is_empty() {
            return Err("repository.name cannot be empty".to_string());
        }
        if self.admin_emails.is_empty() {
            return Err("repository.admin_emails requires at least one address".to_string());
        }
        if let Some(bad) = self.admin_emails.iter().find(|e| !looks_like_email(e)) {
            return Err(format!("repository.admin_emails contains invalid address '{bad}'"));
        }
        Ok(())
    }
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !s.contains(' ')
        }
        None => false,
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer HARVEST_METADATA__PASSWORD over storing it in a file.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds. Bounds slow count queries on large tables.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/harvest.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Repository identity and flow control.
    #[serde(default)]
    pub repository: RepositoryConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                base_url: Some("http://localhost/oai".to_string()),
                metrics_enabled: false,
                token_prune_interval_secs: 0,
                ..ServerConfig::default()
            },
            repository: RepositoryConfig {
                name: "Test Repository".to_string(),
                admin_emails: vec!["test@example.org".to_string()],
                ..RepositoryConfig::default()
            },
            metadata: MetadataConfig::default(),
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.repository.validate()?;
        self.metadata.validate()?;
        Ok(())
    }
}
