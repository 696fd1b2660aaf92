//! Realtime forum message feed.
//!
//! Holds the one standing subscription on `messages` and republishes every
//! snapshot as a fully ordered view. Each view replaces the previous one
//! whole; nothing is merged.

use std::cmp::Ordering;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::{Repository, Snapshot};
use crate::errors::AppError;
use crate::models::ChatMessage;

/// What feed consumers see.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedView {
    pub revision_id: i64,
    pub messages: Vec<ChatMessage>,
    /// Set when the last reload failed; `messages` is then the last good view
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Display order: timestamped ascending, then pending. Client time and id
/// break ties.
pub fn compare_messages(a: &ChatMessage, b: &ChatMessage) -> Ordering {
    match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| match (a.client_timestamp, b.client_timestamp) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
    .then_with(|| a.id.cmp(&b.id))
}

/// Build the full ordered view from a snapshot.
pub fn project_snapshot(snapshot: Snapshot<ChatMessage>) -> FeedView {
    let mut messages = snapshot.docs;
    messages.sort_by(compare_messages);
    FeedView {
        revision_id: snapshot.revision_id,
        messages,
        error: None,
    }
}

/// The live message feed.
pub struct MessageFeed {
    view: watch::Receiver<FeedView>,
    projector: Option<JoinHandle<()>>,
}

impl MessageFeed {
    /// Subscribe to `messages`. Fails if the first snapshot cannot be read.
    pub async fn open(repo: &Repository) -> Result<Self, AppError> {
        let mut subscription = repo.subscribe_messages().await?;
        let initial = project_snapshot(subscription.current()?);
        let (tx, view) = watch::channel(initial);

        let projector = tokio::spawn(async move {
            while subscription.changed().await {
                match subscription.current() {
                    Ok(snapshot) => {
                        tx.send_replace(project_snapshot(snapshot));
                    }
                    Err(e) => {
                        tx.send_modify(|view| view.error = Some(e.to_string()));
                    }
                }
            }
            subscription.unsubscribe();
        });

        tracing::info!("Message feed opened");

        Ok(Self {
            view,
            projector: Some(projector),
        })
    }

    /// Current ordered view.
    pub fn current(&self) -> FeedView {
        self.view.borrow().clone()
    }

    /// Receiver that sees every replacement of the view.
    pub fn watch(&self) -> watch::Receiver<FeedView> {
        self.view.clone()
    }

    /// Tear the feed down, releasing its subscription.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(projector) = self.projector.take() {
            // Aborting drops the subscription the task owns.
            projector.abort();
            tracing::info!("Message feed closed");
        }
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        self.release();
    }
}
