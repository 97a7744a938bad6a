//! Resumption token issuance, redemption and expiry.

use crate::arguments::ListFilter;
use crate::error::ApiResult;
use crate::metrics;
use harvest_core::Verb;
use harvest_metadata::MetadataStore;
use harvest_metadata::models::ResumptionTokenRow;
use harvest_metadata::repos::TokenLookup;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Random bytes per token id (24 characters once encoded).
pub const TOKEN_ID_BYTES: usize = 18;

/// Query state carried by a resumption token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    /// Index of the page this token resumes at.
    pub counter: u64,
    /// Size of the complete list when the lineage started.
    pub complete_list_size: u64,
}

impl TokenParams {
    /// Parameters resuming a record list.
    pub fn for_filter(filter: &ListFilter, counter: u64, complete_list_size: u64) -> Self {
        Self {
            metadata_prefix: Some(filter.metadata_prefix.clone()),
            from: filter.from.map(|from| from.to_string()),
            until: filter.until.map(|until| until.to_string()),
            set: filter.set.as_ref().map(|set| set.to_string()),
            counter,
            complete_list_size,
        }
    }

    /// Parameters resuming the set list.
    pub fn for_sets(counter: u64, complete_list_size: u64) -> Self {
        Self {
            counter,
            complete_list_size,
            ..Self::default()
        }
    }

    /// Rebuild the record filter, or None if the stored arguments do not parse.
    pub fn list_filter(&self) -> Option<ListFilter> {
        let prefix = self.metadata_prefix.as_deref()?;
        ListFilter::parse(
            prefix,
            self.from.as_deref(),
            self.until.as_deref(),
            self.set.as_deref(),
        )
        .ok()
    }
}

/// A token handed out to a harvester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub valid_until: OffsetDateTime,
}

/// Issues and resolves resumption tokens.
#[derive(Clone)]
pub struct ResumptionTokenStore {
    metadata: Arc<dyn MetadataStore>,
    ttl: Duration,
}

impl ResumptionTokenStore {
    pub fn new(metadata: Arc<dyn MetadataStore>, ttl: Duration) -> Self {
        Self { metadata, ttl }
    }

    /// Persist a new token for `verb` carrying `params`.
    pub async fn mint(&self, verb: Verb, params: &TokenParams) -> ApiResult<IssuedToken> {
        let now = OffsetDateTime::now_utc();
        let row = ResumptionTokenRow {
            token: generate_token_id(),
            verb: verb.as_str().to_string(),
            parameters: serde_json::to_string(params)?,
            valid_until: harvest_core::datestamp::normalize(now + self.ttl),
        };
        self.metadata.insert_token(&row).await?;

        metrics::TOKENS_MINTED.inc();
        tracing::debug!(
            verb = %verb,
            counter = params.counter,
            complete_list_size = params.complete_list_size,
            "Minted resumption token"
        );

        Ok(IssuedToken {
            value: row.token,
            valid_until: row.valid_until,
        })
    }

    /// Resolve a token presented with `expected` as the request verb.
    ///
    /// Unknown, expired, corrupt and foreign-verb tokens all yield None.
    /// An expired token is deleted as part of the lookup.
    pub async fn redeem(&self, token: &str, expected: Verb) -> ApiResult<Option<TokenParams>> {
        let now = OffsetDateTime::now_utc();
        let row = match self.metadata.find_live_token(token, now).await? {
            TokenLookup::Live(row) => row,
            TokenLookup::Expired => {
                tracing::debug!(verb = %expected, "Rejected expired resumption token");
                metrics::record_token_rejection("expired");
                return Ok(None);
            }
            TokenLookup::Missing => {
                metrics::record_token_rejection("unknown");
                return Ok(None);
            }
        };

        if row.verb != expected.as_str() {
            tracing::debug!(
                token_verb = %row.verb,
                verb = %expected,
                "Rejected resumption token issued for another verb"
            );
            metrics::record_token_rejection("verb_mismatch");
            return Ok(None);
        }

        match serde_json::from_str::<TokenParams>(&row.parameters) {
            Ok(params) if params.counter > 0 => {
                metrics::TOKENS_REDEEMED.inc();
                Ok(Some(params))
            }
            Ok(_) | Err(_) => {
                tracing::warn!(verb = %expected, "Stored resumption token parameters are invalid");
                metrics::record_token_rejection("corrupt");
                Ok(None)
            }
        }
    }

    /// Remove a token whose lineage can no longer be continued.
    pub async fn discard(&self, token: &str) -> ApiResult<()> {
        self.metadata.delete_token(token).await?;
        metrics::record_token_rejection("stale");
        Ok(())
    }

    /// Delete every expired token. Returns the number removed.
    pub async fn prune_expired(&self) -> ApiResult<u64> {
        let removed = self
            .metadata
            .delete_expired_tokens(OffsetDateTime::now_utc())
            .await?;
        metrics::TOKENS_PRUNED.inc_by(removed);
        Ok(removed)
    }
}

/// Generate an unguessable token id using a cryptographically secure RNG.
fn generate_token_id() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
