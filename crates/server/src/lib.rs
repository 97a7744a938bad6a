//! OAI-PMH repository server.
//!
//! This crate provides the protocol endpoint:
//! - Argument validation and error accumulation
//! - Resumption token issuance and redemption
//! - Paged record and set queries
//! - The six protocol verbs and their XML rendering

pub mod accumulator;
pub mod arguments;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod query;
pub mod response;
pub mod resumption;
pub mod routes;
pub mod state;
pub mod verbs;
pub mod xml;

pub use accumulator::ProtocolErrors;
pub use dispatch::Dispatcher;
pub use error::ApiError;
pub use resumption::ResumptionTokenStore;
pub use routes::create_router;
pub use state::AppState;
