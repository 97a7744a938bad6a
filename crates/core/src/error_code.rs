//! Protocol error codes.
//!
//! The set is closed: a repository may only ever report one of these codes.
//! Anything else is a bug in the server, not a condition to report to a harvester.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol-level error code reported inside an error document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCode {
    BadArgument,
    BadResumptionToken,
    BadVerb,
    CannotDisseminateFormat,
    IdDoesNotExist,
    NoRecordsMatch,
    NoMetadataFormats,
    NoSetHierarchy,
}

impl ErrorCode {
    /// Parse from the wire value.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "badArgument" => Ok(Self::BadArgument),
            "badResumptionToken" => Ok(Self::BadResumptionToken),
            "badVerb" => Ok(Self::BadVerb),
            "cannotDisseminateFormat" => Ok(Self::CannotDisseminateFormat),
            "idDoesNotExist" => Ok(Self::IdDoesNotExist),
            "noRecordsMatch" => Ok(Self::NoRecordsMatch),
            "noMetadataFormats" => Ok(Self::NoMetadataFormats),
            "noSetHierarchy" => Ok(Self::NoSetHierarchy),
            _ => Err(crate::Error::UnknownErrorCode(s.to_string())),
        }
    }

    /// Get the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadArgument => "badArgument",
            Self::BadResumptionToken => "badResumptionToken",
            Self::BadVerb => "badVerb",
            Self::CannotDisseminateFormat => "cannotDisseminateFormat",
            Self::IdDoesNotExist => "idDoesNotExist",
            Self::NoRecordsMatch => "noRecordsMatch",
            Self::NoMetadataFormats => "noMetadataFormats",
            Self::NoSetHierarchy => "noSetHierarchy",
        }
    }

    /// Human-readable explanation rendered as the error element's text.
    pub fn message(&self) -> &'static str {
        match self {
            Self::BadArgument => {
                "The request includes illegal arguments, is missing required arguments, \
                 includes a repeated argument, or values for arguments have an illegal syntax."
            }
            Self::BadResumptionToken => "The value of the resumptionToken argument is invalid or expired.",
            Self::BadVerb => {
                "Value of the verb argument is not a legal OAI-PMH verb, the verb argument is \
                 missing, or the verb argument is repeated."
            }
            Self::CannotDisseminateFormat => {
                "The metadata format identified by the value given for the metadataPrefix \
                 argument is not supported by the item or by the repository."
            }
            Self::IdDoesNotExist => {
                "The value of the identifier argument is unknown or illegal in this repository."
            }
            Self::NoRecordsMatch => {
                "The combination of the values of the from, until, set and metadataPrefix \
                 arguments results in an empty list."
            }
            Self::NoMetadataFormats => "There are no metadata formats available for the specified item.",
            Self::NoSetHierarchy => "The repository does not support sets.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 8] = [
        ErrorCode::BadArgument,
        ErrorCode::BadResumptionToken,
        ErrorCode::BadVerb,
        ErrorCode::CannotDisseminateFormat,
        ErrorCode::IdDoesNotExist,
        ErrorCode::NoRecordsMatch,
        ErrorCode::NoMetadataFormats,
        ErrorCode::NoSetHierarchy,
    ];

    #[test]
    fn wire_names_parse_back() {
        for code in ALL {
            assert_eq!(ErrorCode::parse(code.as_str()).unwrap(), code);
            assert!(!code.message().is_empty());
        }
    }

    #[test]
    fn unknown_code_is_a_programming_error() {
        let err = ErrorCode::parse("serverOnFire").unwrap_err();
        assert!(matches!(err, crate::Error::UnknownErrorCode(ref c) if c == "serverOnFire"));
    }
}
