//! Protocol verbs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six request types a repository answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Identify,
    GetRecord,
    ListIdentifiers,
    ListRecords,
    ListMetadataFormats,
    ListSets,
}

impl Verb {
    /// All verbs, in protocol order.
    pub const ALL: [Verb; 6] = [
        Self::Identify,
        Self::GetRecord,
        Self::ListIdentifiers,
        Self::ListRecords,
        Self::ListMetadataFormats,
        Self::ListSets,
    ];

    /// Parse from the wire value. Matching is case-sensitive.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "Identify" => Ok(Self::Identify),
            "GetRecord" => Ok(Self::GetRecord),
            "ListIdentifiers" => Ok(Self::ListIdentifiers),
            "ListRecords" => Ok(Self::ListRecords),
            "ListMetadataFormats" => Ok(Self::ListMetadataFormats),
            "ListSets" => Ok(Self::ListSets),
            _ => Err(crate::Error::UnknownVerb(s.to_string())),
        }
    }

    /// Get the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identify => "Identify",
            Self::GetRecord => "GetRecord",
            Self::ListIdentifiers => "ListIdentifiers",
            Self::ListRecords => "ListRecords",
            Self::ListMetadataFormats => "ListMetadataFormats",
            Self::ListSets => "ListSets",
        }
    }

    /// Whether responses to this verb are paginated with resumption tokens.
    pub fn is_paginated(&self) -> bool {
        matches!(
            self,
            Self::ListIdentifiers | Self::ListRecords | Self::ListSets
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
