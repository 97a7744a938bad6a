//! ListSets.

use crate::accumulator::ProtocolErrors;
use crate::dispatch::{Dispatcher, ListContext};
use crate::error::ApiResult;
use crate::response::{ListBody, ResponseBody};
use crate::resumption::TokenParams;
use harvest_core::{ErrorCode, Verb};

pub async fn handle(
    dispatcher: &Dispatcher,
    resumption_token: Option<&str>,
    errors: &mut ProtocolErrors,
) -> ApiResult<Option<ResponseBody>> {
    let context = match resumption_token {
        None => ListContext::first_page(()),
        Some(token) => {
            let Some(params) = dispatcher.resume(Verb::ListSets, token, errors).await? else {
                return Ok(None);
            };
            ListContext::resumed((), &params)
        }
    };

    let page = dispatcher.query.query_sets(context.counter).await?;
    if page.is_empty() && !context.is_resumed() {
        errors.with_error(ErrorCode::NoSetHierarchy);
        return Ok(None);
    }

    let resumption_token = dispatcher
        .close_page(Verb::ListSets, &context, &page, TokenParams::for_sets)
        .await?;

    Ok(Some(ResponseBody::ListSets(ListBody {
        items: page.items,
        resumption_token,
    })))
}
