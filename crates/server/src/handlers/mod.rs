//! HTTP request handlers.

pub mod health;
pub mod oai;

pub use health::*;
pub use oai::*;
