//! Per-request collection of protocol errors.

use harvest_core::ErrorCode;

/// Protocol error codes raised while handling one request.
///
/// Once any code is registered the request produces an error document
/// instead of its verb body. Codes are kept in the order they were first
/// raised; duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolErrors {
    codes: Vec<ErrorCode>,
}

impl ProtocolErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection holding a single code.
    pub fn single(code: ErrorCode) -> Self {
        let mut errors = Self::new();
        errors.with_error(code);
        errors
    }

    /// Register an error code.
    pub fn with_error(&mut self, code: ErrorCode) -> &mut Self {
        if !self.codes.contains(&code) {
            self.codes.push(code);
        }
        self
    }

    /// Whether any error has been registered.
    pub fn has_errors(&self) -> bool {
        !self.codes.is_empty()
    }

    pub fn contains(&self, code: ErrorCode) -> bool {
        self.codes.contains(&code)
    }

    /// Distinct codes in registration order.
    pub fn codes(&self) -> &[ErrorCode] {
        &self.codes
    }

    /// Whether the request arguments are unusable (`badVerb` or `badArgument`).
    ///
    /// Such responses must not echo the arguments back in the request element.
    pub fn rejects_arguments(&self) -> bool {
        self.contains(ErrorCode::BadVerb) || self.contains(ErrorCode::BadArgument)
    }
}
