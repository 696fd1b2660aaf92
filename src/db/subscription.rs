//! Standing collection subscriptions.
//!
//! A subscription delivers a full snapshot of one collection on open and
//! again after every committed write to that collection. The consumer owns
//! the subscription and releases it with [`Subscription::unsubscribe`] or by
//! dropping it.

use std::future::Future;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::Repository;
use crate::errors::AppError;

/// Collections that can be written to and subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Events,
    Messages,
    Activity,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Events => "events",
            Collection::Messages => "messages",
            Collection::Activity => "activity",
        }
    }
}

/// Point-in-time view of a whole collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// Store revision the snapshot was read at
    pub revision_id: i64,
    pub docs: Vec<T>,
}

pub type SnapshotResult<T> = Result<Snapshot<T>, AppError>;

/// Live subscription to one collection.
pub struct Subscription<T> {
    collection: Collection,
    rx: watch::Receiver<SnapshotResult<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> Subscription<T>
where
    T: Send + Sync + 'static,
{
    /// Open a subscription. The initial load runs before this returns, so a
    /// store that cannot be read fails here with a typed error.
    pub(crate) async fn open<F, Fut>(
        repo: &Repository,
        collection: Collection,
        load: F,
    ) -> Result<Self, AppError>
    where
        F: Fn(Repository) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, AppError>> + Send + 'static,
    {
        // Listen before the first read so no commit falls between the two.
        let mut changes = repo.changes();

        let initial = read_snapshot(repo, &load).await?;
        let (tx, rx) = watch::channel(Ok(initial));

        let repo = repo.clone();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(changed) if changed != collection => continue,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(
                            collection = collection.name(),
                            skipped,
                            "Subscription lagged, reloading"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let next = read_snapshot(&repo, &load).await;
                if let Err(e) = &next {
                    tracing::warn!(collection = collection.name(), "Snapshot reload failed: {}", e);
                }
                if tx.send(next).is_err() {
                    break;
                }
            }
        });

        tracing::debug!(collection = collection.name(), "Subscription opened");

        Ok(Self {
            collection,
            rx,
            task: Some(task),
        })
    }

    /// Latest snapshot delivered.
    pub fn current(&self) -> SnapshotResult<T>
    where
        T: Clone,
    {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot. Returns `false` once the subscription can
    /// deliver nothing more.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Release the subscription.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(collection = self.collection.name(), "Subscription released");
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn read_snapshot<T, F, Fut>(repo: &Repository, load: &F) -> SnapshotResult<T>
where
    F: Fn(Repository) -> Fut,
    Fut: Future<Output = Result<Vec<T>, AppError>>,
{
    let docs = load(repo.clone()).await?;
    let revision_id = repo.get_revision_id().await?;
    Ok(Snapshot { revision_id, docs })
}
