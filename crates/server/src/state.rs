//! Application state shared across handlers.

use harvest_core::config::AppConfig;
use harvest_metadata::MetadataStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not validate.
    pub fn new(config: AppConfig, metadata: Arc<dyn MetadataStore>) -> Self {
        if let Err(error) = config.validate() {
            panic!("Invalid configuration: {}", error);
        }

        Self {
            config: Arc::new(config),
            metadata,
        }
    }

    /// Interval of the background token sweep, or None when disabled.
    pub fn token_prune_interval(&self) -> Option<Duration> {
        self.config.server.token_prune_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_metadata::SqliteStore;
    use tempfile::tempdir;

    async fn build_state(config: AppConfig) -> (tempfile::TempDir, AppState) {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(&db_path, None).await.unwrap());
        (temp, AppState::new(config, metadata))
    }

    #[tokio::test]
    async fn token_prune_interval_none_when_disabled() {
        let (_temp, state) = build_state(AppConfig::for_testing()).await;
        assert!(state.token_prune_interval().is_none());
    }

    #[tokio::test]
    async fn token_prune_interval_respects_config() {
        let mut config = AppConfig::for_testing();
        config.server.token_prune_interval_secs = 12;

        let (_temp, state) = build_state(config).await;
        assert_eq!(state.token_prune_interval(), Some(Duration::from_secs(12)));
    }

    #[tokio::test]
    #[should_panic(expected = "Invalid configuration")]
    async fn invalid_page_size_is_rejected() {
        let mut config = AppConfig::for_testing();
        config.repository.max_records = 0;
        build_state(config).await;
    }
}
