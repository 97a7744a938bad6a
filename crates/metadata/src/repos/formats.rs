//! Metadata format repository.

use crate::error::MetadataResult;
use crate::models::FormatRow;
use async_trait::async_trait;

/// Repository for metadata formats.
#[async_trait]
pub trait FormatRepo: Send + Sync {
    /// Insert a format, or update namespace and schema of an existing one.
    async fn upsert_format(&self, format: &FormatRow) -> MetadataResult<()>;

    /// Get a format by prefix.
    async fn get_format(&self, prefix: &str) -> MetadataResult<Option<FormatRow>>;

    /// List all formats ordered by prefix.
    async fn list_formats(&self) -> MetadataResult<Vec<FormatRow>>;

    /// List the formats a given identifier is available in (tombstones included).
    async fn list_formats_for_identifier(&self, identifier: &str)
    -> MetadataResult<Vec<FormatRow>>;

    /// Delete a format and, by cascade, all of its records.
    /// Returns false if no such format existed.
    async fn delete_format(&self, prefix: &str) -> MetadataResult<bool>;
}
