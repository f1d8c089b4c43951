//! The snippet record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored code snippet.
///
/// `id`, `created`, and `modified` are assigned by the store; callers
/// leave them unset when creating or updating. `code` is omitted from
/// JSON when empty so listings stay light.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snippet {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub code: String,
}

impl Snippet {
    /// A record carrying only a name and code, the shape clients send.
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            ..Self::default()
        }
    }
}
