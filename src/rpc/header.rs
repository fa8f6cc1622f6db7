//! Wire headers exchanged at the start of every call.

use serde::{Deserialize, Serialize};

/// First value the caller writes on a new channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHeader {
    /// Name of the remote handler.
    #[serde(rename = "S")]
    pub selector: String,
}

impl CallHeader {
    /// Create a call header for a selector.
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

/// First value the handler writes back.
///
/// Exactly one is sent per call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// Set when the handler replied with an error.
    #[serde(rename = "E", default)]
    pub error: Option<String>,
    /// Set when the channel stays open after the reply values.
    #[serde(rename = "C", default)]
    pub continued: bool,
}
