//! Set repository.

use crate::error::MetadataResult;
use crate::models::SetRow;
use async_trait::async_trait;

/// Repository for the set hierarchy.
#[async_trait]
pub trait SetRepo: Send + Sync {
    /// Insert a set, or update name and description of an existing one.
    async fn upsert_set(&self, set: &SetRow) -> MetadataResult<()>;

    /// Get a set by spec.
    async fn get_set(&self, spec: &str) -> MetadataResult<Option<SetRow>>;

    /// Whether the repository has any sets at all.
    async fn any_set_exists(&self) -> MetadataResult<bool>;

    /// One page of sets in spec order.
    async fn list_sets_page(&self, offset: u64, limit: u64) -> MetadataResult<Vec<SetRow>>;

    /// Count all sets.
    async fn count_sets(&self) -> MetadataResult<u64>;

    /// Delete sets that have no records, directly or through descendant sets.
    /// Returns the number of sets removed.
    async fn prune_orphaned_sets(&self) -> MetadataResult<u64>;
}
