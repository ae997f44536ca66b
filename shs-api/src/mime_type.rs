use serde::{Deserialize, Serialize};
use std::fmt;

/// Content types exchanged with Sentinel Hub services.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum MimeType {
    Json,
}

impl MimeType {
    /// File extension used when a response of this type is saved to disk.
    pub fn extension(&self) -> &'static str {
        match self {
            MimeType::Json => "json",
        }
    }

    /// Full MIME string, as used in `Content-Type` and `Accept` headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Json => "application/json",
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
