//! Admin dashboard analytics: per-day counts of new users, events and
//! messages over a trailing 30-day window.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::{Repository, SnapshotResult, Subscription};
use crate::errors::AppError;
use crate::models::{ChatMessage, Event, User};

/// Days in the window, today included.
pub const WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    /// Chart axis label, e.g. `Oct 3`
    pub label: String,
    pub count: usize,
}

/// Count `dates` per UTC day from `today - 29` through `today`.
///
/// Always returns [`WINDOW_DAYS`] buckets, oldest first, including empty
/// days. Missing dates and dates outside the window are skipped.
pub fn aggregate_by_day<I>(dates: I, today: NaiveDate) -> Vec<DayCount>
where
    I: IntoIterator<Item = Option<DateTime<Utc>>>,
{
    let start = today - TimeDelta::days(WINDOW_DAYS - 1);
    let mut buckets: Vec<DayCount> = (0..WINDOW_DAYS)
        .map(|offset| {
            let date = start + TimeDelta::days(offset);
            DayCount {
                date,
                label: date.format("%b %-d").to_string(),
                count: 0,
            }
        })
        .collect();

    for day in dates.into_iter().flatten().map(|ts| ts.date_naive()) {
        if day < start || day > today {
            continue;
        }
        let index = day.signed_duration_since(start).num_days() as usize;
        buckets[index].count += 1;
    }

    buckets
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub generated_at: DateTime<Utc>,
    pub window_start: NaiveDate,
    pub today: NaiveDate,
    pub users: Vec<DayCount>,
    pub events: Vec<DayCount>,
    pub messages: Vec<DayCount>,
}

/// Users by sign-up day, events by event day, messages by server timestamp.
pub fn build_report(
    users: &[User],
    events: &[Event],
    messages: &[ChatMessage],
    now: DateTime<Utc>,
) -> AnalyticsReport {
    let today = now.date_naive();
    AnalyticsReport {
        generated_at: now,
        window_start: today - TimeDelta::days(WINDOW_DAYS - 1),
        today,
        users: aggregate_by_day(users.iter().map(|u| u.created_at), today),
        events: aggregate_by_day(events.iter().map(|e| e.date), today),
        messages: aggregate_by_day(messages.iter().map(|m| m.timestamp), today),
    }
}

/// Latest docs of one collection; a failed reload keeps the previous docs.
struct Latest<T> {
    docs: Vec<T>,
}

impl<T: Clone + Send + Sync + 'static> Latest<T> {
    fn open(sub: &Subscription<T>) -> Result<Self, AppError> {
        Ok(Self {
            docs: sub.current()?.docs,
        })
    }

    fn refresh(&mut self, result: SnapshotResult<T>, name: &str) {
        match result {
            Ok(snapshot) => self.docs = snapshot.docs,
            Err(e) => tracing::warn!(collection = name, "Keeping stale analytics input: {}", e),
        }
    }
}

/// Keeps an [`AnalyticsReport`] current.
pub struct AnalyticsAggregator {
    report: watch::Receiver<AnalyticsReport>,
    worker: Option<JoinHandle<()>>,
}

impl AnalyticsAggregator {
    /// Subscribe to users, events and messages. The report is rebuilt on
    /// every snapshot and every `refresh` tick, so the window follows the
    /// calendar even when nothing is written.
    pub async fn open(repo: &Repository, refresh: Duration) -> Result<Self, AppError> {
        if refresh.is_zero() {
            return Err(AppError::Validation(
                "Analytics refresh interval must be non-zero".to_string(),
            ));
        }

        let mut users_sub = repo.subscribe_users().await?;
        let mut events_sub = repo.subscribe_events().await?;
        let mut messages_sub = repo.subscribe_messages().await?;

        let mut users = Latest::open(&users_sub)?;
        let mut events = Latest::open(&events_sub)?;
        let mut messages = Latest::open(&messages_sub)?;

        let (tx, report) = watch::channel(build_report(
            &users.docs,
            &events.docs,
            &messages.docs,
            Utc::now(),
        ));

        let worker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh);
            ticker.tick().await;

            loop {
                tokio::select! {
                    open = users_sub.changed() => {
                        if !open { break; }
                        users.refresh(users_sub.current(), "users");
                    }
                    open = events_sub.changed() => {
                        if !open { break; }
                        events.refresh(events_sub.current(), "events");
                    }
                    open = messages_sub.changed() => {
                        if !open { break; }
                        messages.refresh(messages_sub.current(), "messages");
                    }
                    _ = ticker.tick() => {}
                }

                tx.send_replace(build_report(
                    &users.docs,
                    &events.docs,
                    &messages.docs,
                    Utc::now(),
                ));
            }

            users_sub.unsubscribe();
            events_sub.unsubscribe();
            messages_sub.unsubscribe();
        });

        tracing::info!("Analytics aggregator opened");

        Ok(Self {
            report,
            worker: Some(worker),
        })
    }

    pub fn current(&self) -> AnalyticsReport {
        self.report.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AnalyticsReport> {
        self.report.clone()
    }

    /// Stop recomputing and release all three subscriptions.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
            tracing::info!("Analytics aggregator closed");
        }
    }
}

impl Drop for AnalyticsAggregator {
    fn drop(&mut self) {
        self.release();
    }
}
