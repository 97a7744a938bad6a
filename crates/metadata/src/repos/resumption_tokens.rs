//! Resumption token repository.

use crate::error::MetadataResult;
use crate::models::ResumptionTokenRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Result of looking up a token for redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    /// Token exists and has not expired.
    Live(ResumptionTokenRow),
    /// Token existed but had expired; it has been deleted.
    Expired,
    /// No such token.
    Missing,
}

/// Repository for resumption tokens.
#[async_trait]
pub trait ResumptionTokenRepo: Send + Sync {
    /// Persist a newly minted token.
    async fn insert_token(&self, token: &ResumptionTokenRow) -> MetadataResult<()>;

    /// Get a token regardless of expiry.
    async fn find_token(&self, token: &str) -> MetadataResult<Option<ResumptionTokenRow>>;

    /// Look up a token for redemption.
    ///
    /// The read and the deletion of an expired row happen in one transaction,
    /// so a caller never observes a token that another request is deleting.
    async fn find_live_token(&self, token: &str, now: OffsetDateTime)
    -> MetadataResult<TokenLookup>;

    /// Delete a token. Returns false if it did not exist.
    async fn delete_token(&self, token: &str) -> MetadataResult<bool>;

    /// Delete all tokens that expired before `now`. Returns the number removed.
    async fn delete_expired_tokens(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}
