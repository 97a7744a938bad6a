//! Record repository.

use crate::error::MetadataResult;
use crate::models::{RecordChange, RecordRow};
use async_trait::async_trait;
use harvest_core::DeletedRecords;
use std::collections::HashMap;
use time::OffsetDateTime;

/// Selection criteria shared by record page and count queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub metadata_prefix: String,
    /// Inclusive lower datestamp bound.
    pub from: Option<OffsetDateTime>,
    /// Inclusive upper datestamp bound.
    pub until: Option<OffsetDateTime>,
    /// Set spec; matches the set itself and all of its descendants.
    pub set_spec: Option<String>,
}

impl RecordFilter {
    /// Filter on a metadata prefix only.
    pub fn for_prefix(metadata_prefix: impl Into<String>) -> Self {
        Self {
            metadata_prefix: metadata_prefix.into(),
            ..Self::default()
        }
    }
}

/// Repository for records and their set memberships.
#[async_trait]
pub trait RecordRepo: Send + Sync {
    /// Insert or replace a record and its set memberships.
    ///
    /// A record without content is a deletion: it is tombstoned under the
    /// `persistent`/`transient` policies and removed (or never written) under `no`.
    /// Sets referenced in `set_specs` that do not exist yet are created with
    /// their spec as name.
    async fn add_or_update_record(
        &self,
        record: &RecordRow,
        set_specs: &[String],
        policy: DeletedRecords,
    ) -> MetadataResult<RecordChange>;

    /// Delete a record according to the deleted-record policy.
    /// Returns false if there was no live record to delete.
    async fn delete_record(
        &self,
        identifier: &str,
        metadata_prefix: &str,
        policy: DeletedRecords,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Get a record by its composite key.
    async fn get_record(
        &self,
        identifier: &str,
        metadata_prefix: &str,
    ) -> MetadataResult<Option<RecordRow>>;

    /// Whether the identifier exists in any format.
    async fn identifier_exists(&self, identifier: &str) -> MetadataResult<bool>;

    /// Set specs a record belongs to, ordered.
    async fn get_record_sets(
        &self,
        identifier: &str,
        metadata_prefix: &str,
    ) -> MetadataResult<Vec<String>>;

    /// Set specs for a batch of records in one format, keyed by identifier.
    async fn get_sets_for_records(
        &self,
        metadata_prefix: &str,
        identifiers: &[String],
    ) -> MetadataResult<HashMap<String, Vec<String>>>;

    /// One page of matching records in identifier order.
    async fn query_records_page(
        &self,
        filter: &RecordFilter,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<Vec<RecordRow>>;

    /// Count all records matching the filter.
    async fn count_records(&self, filter: &RecordFilter) -> MetadataResult<u64>;

    /// Oldest datestamp in the repository, if there are any records.
    async fn earliest_datestamp(&self) -> MetadataResult<Option<OffsetDateTime>>;

    /// Physically remove all tombstones. Returns the number removed.
    async fn purge_deleted_records(&self) -> MetadataResult<u64>;
}
