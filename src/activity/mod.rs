//! Best-effort user activity log.

use tokio::task::JoinHandle;

use crate::db::Repository;

/// Writes activity entries without making callers wait on them.
#[derive(Clone)]
pub struct ActivityLog {
    repo: Repository,
}

impl ActivityLog {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Record `action` for `user_id` on a background task. A failed write is
    /// logged and otherwise ignored.
    pub fn log(&self, user_id: &str, action: &str, detail: String) -> JoinHandle<()> {
        let repo = self.repo.clone();
        let user_id = user_id.to_string();
        let action = action.to_string();
        tokio::spawn(async move {
            if let Err(e) = repo.add_activity(&user_id, &action, &detail).await {
                tracing::warn!(user_id = %user_id, action = %action, "Failed to log activity: {}", e);
            }
        })
    }
}
