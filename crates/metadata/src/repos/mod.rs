//! Repository traits for metadata operations.

pub mod formats;
pub mod records;
pub mod resumption_tokens;
pub mod sets;

pub use formats::FormatRepo;
pub use records::{RecordFilter, RecordRepo};
pub use resumption_tokens::{ResumptionTokenRepo, TokenLookup};
pub use sets::SetRepo;
