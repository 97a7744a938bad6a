//! Core protocol vocabulary for the harvest OAI-PMH repository server.
//!
//! This crate defines the types shared by every other crate:
//! - Verbs and the closed set of protocol error codes
//! - Datestamps and their granularities
//! - Set specs
//! - Deleted record policy and configuration

pub mod config;
pub mod datestamp;
pub mod error;
pub mod error_code;
pub mod format;
pub mod set_spec;
pub mod verb;

pub use config::DeletedRecords;
pub use datestamp::{Datestamp, Granularity, format_datestamp};
pub use error::{Error, Result};
pub use error_code::ErrorCode;
pub use format::{metadata_fragment, validate_metadata_prefix};
pub use set_spec::SetSpec;
pub use verb::Verb;

/// Protocol version implemented by this server.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Smallest allowed list page size.
pub const MIN_PAGE_SIZE: u32 = 1;

/// Largest allowed list page size.
pub const MAX_PAGE_SIZE: u32 = 100;
