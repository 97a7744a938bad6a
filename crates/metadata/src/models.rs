//! Database models mapping to the repository schema.

use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Metadata formats
// =============================================================================

/// A metadata format records can be disseminated in.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FormatRow {
    /// Unique prefix used as the `metadataPrefix` argument.
    pub prefix: String,
    /// XML namespace URI of the format.
    pub namespace: String,
    /// XML schema URI of the format.
    pub schema_url: String,
}

// =============================================================================
// Records
// =============================================================================

/// One record in one metadata format.
///
/// `content = None` marks a deleted record (tombstone).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RecordRow {
    pub identifier: String,
    pub metadata_prefix: String,
    /// Last change, UTC at whole-second precision.
    pub datestamp: OffsetDateTime,
    /// Raw XML metadata.
    pub content: Option<String>,
}

impl RecordRow {
    /// Whether this row is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.content.is_none()
    }
}

/// Outcome of an add-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChange {
    /// Row inserted or replaced with content.
    Stored,
    /// Row kept as a tombstone with a bumped datestamp.
    Tombstoned,
    /// Row removed (or never written) because deletions are not tracked.
    Removed,
}

// =============================================================================
// Sets
// =============================================================================

/// A set in the repository's set hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SetRow {
    /// Colon-separated hierarchical spec (e.g. `math:algebra`).
    pub spec: String,
    pub name: String,
    /// Optional description (raw XML).
    pub description: Option<String>,
}

// =============================================================================
// Resumption tokens
// =============================================================================

/// A persisted resumption token.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ResumptionTokenRow {
    /// Opaque token value handed to harvesters.
    pub token: String,
    /// Verb that minted the token; only requests with the same verb may redeem it.
    pub verb: String,
    /// Serialized query parameters, cursor counter and complete list size.
    pub parameters: String,
    pub valid_until: OffsetDateTime,
}

impl ResumptionTokenRow {
    /// Whether the token has expired at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.valid_until < now
    }
}
