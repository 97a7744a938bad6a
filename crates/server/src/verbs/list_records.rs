//! ListIdentifiers and ListRecords.
//!
//! Both verbs share selection, paging and tokens; ListRecords additionally
//! carries each record's metadata.

use super::{record_body, record_header};
use crate::accumulator::ProtocolErrors;
use crate::arguments::{ListArguments, ListFilter};
use crate::dispatch::{Dispatcher, ListContext};
use crate::error::ApiResult;
use crate::response::{ListBody, ResponseBody};
use crate::resumption::TokenParams;
use harvest_core::{ErrorCode, Verb};

pub async fn handle(
    dispatcher: &Dispatcher,
    arguments: ListArguments,
    include_metadata: bool,
    errors: &mut ProtocolErrors,
) -> ApiResult<Option<ResponseBody>> {
    let verb = if include_metadata {
        Verb::ListRecords
    } else {
        Verb::ListIdentifiers
    };

    let Some(context) = resolve(dispatcher, verb, arguments, errors).await? else {
        return Ok(None);
    };

    let page = dispatcher
        .query
        .query_records(&context.filter, context.counter)
        .await?;
    if page.is_empty() && !context.is_resumed() {
        errors.with_error(ErrorCode::NoRecordsMatch);
        return Ok(None);
    }

    let filter = &context.filter;
    let resumption_token = dispatcher
        .close_page(verb, &context, &page, |counter, complete_list_size| {
            TokenParams::for_filter(filter, counter, complete_list_size)
        })
        .await?;

    let body = if include_metadata {
        ResponseBody::ListRecords(ListBody {
            items: page
                .items
                .into_iter()
                .map(|entry| record_body(entry.record, entry.set_specs))
                .collect(),
            resumption_token,
        })
    } else {
        ResponseBody::ListIdentifiers(ListBody {
            items: page
                .items
                .into_iter()
                .map(|entry| record_header(&entry.record, entry.set_specs))
                .collect(),
            resumption_token,
        })
    };
    Ok(Some(body))
}

/// Turn the request arguments into the list context to query.
///
/// A redeemed token whose format or set has since been removed is
/// discarded and reported as `badResumptionToken`.
async fn resolve(
    dispatcher: &Dispatcher,
    verb: Verb,
    arguments: ListArguments,
    errors: &mut ProtocolErrors,
) -> ApiResult<Option<ListContext<ListFilter>>> {
    match arguments {
        ListArguments::Select(selection) => {
            let filter = dispatcher
                .validator()
                .check_selection(&selection, errors)
                .await?;
            Ok(filter.map(ListContext::first_page))
        }
        ListArguments::Resume(token) => {
            let Some(params) = dispatcher.resume(verb, &token, errors).await? else {
                return Ok(None);
            };

            let filter = params.list_filter();
            let references_exist = match &filter {
                Some(filter) => dispatcher.validator().references_exist(filter).await?,
                None => false,
            };
            match filter {
                Some(filter) if references_exist => {
                    Ok(Some(ListContext::resumed(filter, &params)))
                }
                _ => {
                    tracing::debug!(verb = %verb, "Discarding resumption token with stale filter");
                    dispatcher.tokens.discard(&token).await?;
                    errors.with_error(ErrorCode::BadResumptionToken);
                    Ok(None)
                }
            }
        }
    }
}
