//! Activity log entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the user activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}
