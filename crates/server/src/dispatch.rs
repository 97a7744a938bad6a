//! Request dispatch and list flow control.
//!
//! A request moves through validation, optional token resolution, the query
//! and response assembly. Any protocol error raised along the way replaces
//! the verb body with an error document; storage failures abort the request
//! as [`ApiError`](crate::ApiError).

use crate::accumulator::ProtocolErrors;
use crate::arguments::{ArgumentValidator, ValidatedRequest, VerbRequest};
use crate::error::ApiResult;
use crate::metrics;
use crate::query::{Page, RecordQueryEngine};
use crate::response::{OaiResponse, ResponseBody, ResumptionTokenElement};
use crate::resumption::{ResumptionTokenStore, TokenParams};
use crate::state::AppState;
use crate::verbs;
use harvest_core::config::AppConfig;
use harvest_core::{ErrorCode, Verb};
use harvest_metadata::MetadataStore;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

/// Where a list request starts.
///
/// Built once from the request arguments or from a redeemed token and not
/// changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListContext<F> {
    pub filter: F,
    /// Page index; 0 for a request without resumption token.
    pub counter: u64,
    /// List size recorded when the lineage started, if resumed.
    pub complete_list_size: Option<u64>,
}

impl<F> ListContext<F> {
    pub fn first_page(filter: F) -> Self {
        Self {
            filter,
            counter: 0,
            complete_list_size: None,
        }
    }

    pub fn resumed(filter: F, params: &TokenParams) -> Self {
        Self {
            filter,
            counter: params.counter,
            complete_list_size: Some(params.complete_list_size),
        }
    }

    pub fn is_resumed(&self) -> bool {
        self.complete_list_size.is_some()
    }
}

/// Routes validated requests to their verb handler.
pub struct Dispatcher {
    pub(crate) config: Arc<AppConfig>,
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) tokens: ResumptionTokenStore,
    pub(crate) query: RecordQueryEngine,
}

impl Dispatcher {
    pub fn new(state: &AppState) -> Self {
        let repository = &state.config.repository;
        Self {
            config: state.config.clone(),
            metadata: state.metadata.clone(),
            tokens: ResumptionTokenStore::new(state.metadata.clone(), repository.token_ttl()),
            query: RecordQueryEngine::new(state.metadata.clone(), repository.page_size()),
        }
    }

    pub(crate) fn validator(&self) -> ArgumentValidator<'_> {
        ArgumentValidator::new(self.metadata.as_ref())
    }

    /// Handle one request given as raw key/value pairs.
    pub async fn dispatch(
        &self,
        pairs: &[(String, String)],
        base_url: String,
    ) -> ApiResult<OaiResponse> {
        let started = Instant::now();
        let response_date = OffsetDateTime::now_utc();
        let mut errors = ProtocolErrors::new();

        let (arguments, body) = match self.validator().check_syntax(pairs) {
            Ok(ValidatedRequest { arguments, request }) => {
                let body = self.handle(request, &mut errors).await?;
                (Some(arguments), body)
            }
            Err(rejected) => {
                errors = rejected;
                (None, None)
            }
        };

        let verb_label = arguments
            .as_ref()
            .map(|arguments| arguments.verb.as_str())
            .unwrap_or("invalid");
        metrics::PROTOCOL_REQUESTS
            .with_label_values(&[verb_label])
            .inc();

        let body = match body {
            Some(body) if !errors.has_errors() => body,
            _ => {
                for code in errors.codes() {
                    metrics::PROTOCOL_ERRORS
                        .with_label_values(&[code.as_str()])
                        .inc();
                }
                tracing::debug!(
                    verb = verb_label,
                    codes = ?errors.codes(),
                    "Request answered with protocol errors"
                );
                ResponseBody::Errors(errors.codes().to_vec())
            }
        };

        let arguments = arguments.filter(|_| !errors.rejects_arguments());

        metrics::REQUEST_DURATION
            .with_label_values(&[verb_label])
            .observe(started.elapsed().as_secs_f64());

        Ok(OaiResponse {
            response_date,
            base_url,
            arguments,
            body,
        })
    }

    async fn handle(
        &self,
        request: VerbRequest,
        errors: &mut ProtocolErrors,
    ) -> ApiResult<Option<ResponseBody>> {
        match request {
            VerbRequest::Identify => verbs::identify::handle(self).await.map(Some),
            VerbRequest::GetRecord {
                identifier,
                metadata_prefix,
            } => verbs::get_record::handle(self, &identifier, &metadata_prefix, errors).await,
            VerbRequest::ListMetadataFormats { identifier } => {
                verbs::list_metadata_formats::handle(self, identifier.as_deref(), errors).await
            }
            VerbRequest::ListSets { resumption_token } => {
                verbs::list_sets::handle(self, resumption_token.as_deref(), errors).await
            }
            VerbRequest::ListIdentifiers(arguments) => {
                verbs::list_records::handle(self, arguments, false, errors).await
            }
            VerbRequest::ListRecords(arguments) => {
                verbs::list_records::handle(self, arguments, true, errors).await
            }
        }
    }

    /// Redeem a token for `verb`, raising `badResumptionToken` when it is unusable.
    pub(crate) async fn resume(
        &self,
        verb: Verb,
        token: &str,
        errors: &mut ProtocolErrors,
    ) -> ApiResult<Option<TokenParams>> {
        let params = self.tokens.redeem(token, verb).await?;
        if params.is_none() {
            errors.with_error(ErrorCode::BadResumptionToken);
        }
        Ok(params)
    }

    /// Build the resumption token element closing `page`.
    ///
    /// Mints a token for the next page when rows remain. The last page of a
    /// resumed list gets an empty element; a list that fits in one page gets none.
    pub(crate) async fn close_page<F, T>(
        &self,
        verb: Verb,
        context: &ListContext<F>,
        page: &Page<T>,
        next_params: impl FnOnce(u64, u64) -> TokenParams,
    ) -> ApiResult<Option<ResumptionTokenElement>> {
        let complete_list_size = context.complete_list_size.unwrap_or(page.total);

        if page.has_more() {
            let params = next_params(context.counter + 1, complete_list_size);
            let issued = self.tokens.mint(verb, &params).await?;
            Ok(Some(ResumptionTokenElement::issued(
                issued.value,
                issued.valid_until,
                complete_list_size,
                page.cursor,
            )))
        } else if context.is_resumed() {
            Ok(Some(ResumptionTokenElement::terminal(
                complete_list_size,
                page.cursor,
            )))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_is_not_resumed() {
        let context = ListContext::first_page(());
        assert_eq!(context.counter, 0);
        assert!(!context.is_resumed());
    }

    #[test]
    fn resumed_context_takes_counter_and_size_from_token() {
        let context = ListContext::resumed((), &TokenParams::for_sets(3, 120));
        assert_eq!(context.counter, 3);
        assert_eq!(context.complete_list_size, Some(120));
        assert!(context.is_resumed());
    }
}
