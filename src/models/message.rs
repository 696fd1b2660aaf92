//! Forum chat message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as stored in the `messages` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    /// Display name of the author
    pub user: String,
    pub avatar_url: String,
    /// Server-assigned commit time; `None` while pending
    pub timestamp: Option<DateTime<Utc>>,
    /// Time the author's client sent the message (advisory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Value written into a timestamp field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTimestamp {
    /// Placeholder replaced by the store's clock at commit time
    Server,
    /// Explicit value
    At(DateTime<Utc>),
    /// Leave unset
    Null,
}

/// Fields for appending a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub text: String,
    pub user: String,
    pub avatar_url: String,
    pub timestamp: WriteTimestamp,
    pub client_timestamp: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

/// Request body for posting a text message.
#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

/// Request body for posting an image as a data URI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostImageRequest {
    pub data_uri: String,
}
