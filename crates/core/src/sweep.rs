//! Background job that flips due reminders to done.
//!
//! Runs beside the agent and shares only the store with it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::{Store, StoreError};
use crate::types::Reminder;

/// Mark every reminder due at `now` as done and return the ones that were
/// flipped. A reminder that fails to update is logged and skipped.
pub async fn sweep_due_reminders(
    store: &dyn Store,
    now: DateTime<Utc>,
) -> Result<Vec<Reminder>, StoreError> {
    let due = store.due_reminders(now).await?;
    let mut swept = Vec::with_capacity(due.len());

    for reminder in due {
        match store.mark_reminder_done(reminder.id).await {
            Ok(()) => {
                tracing::info!(
                    reminder_id = %reminder.id,
                    user_id = %reminder.user_id,
                    client_id = %reminder.client_id,
                    message = %reminder.message,
                    "reminder due"
                );
                swept.push(reminder);
            }
            Err(e) => {
                tracing::warn!(
                    reminder_id = %reminder.id,
                    error = %e,
                    "failed to mark reminder done"
                );
            }
        }
    }

    Ok(swept)
}

/// Sweep every `interval` until `cancel` fires.
pub fn run_reminder_sweep(
    store: Arc<dyn Store>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "reminder sweep started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("reminder sweep shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            match sweep_due_reminders(store.as_ref(), Utc::now()).await {
                Ok(swept) if !swept.is_empty() => {
                    tracing::info!(swept = swept.len(), "reminder sweep cycle done");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "reminder sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn reminder(remind_at: DateTime<Utc>) -> Reminder {
        Reminder {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_id: "c1".into(),
            message: "follow up on invoice".into(),
            remind_at,
            done: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sweeps_only_due_reminders() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let due = reminder(now - ChronoDuration::minutes(5));
        let later = reminder(now + ChronoDuration::days(2));
        store.insert_reminder(&due).await.unwrap();
        store.insert_reminder(&later).await.unwrap();

        let swept = sweep_due_reminders(&store, now).await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, due.id);

        let stored = store.list_reminders(due.user_id).await.unwrap();
        assert!(stored[0].done);
        assert!(!store.list_reminders(later.user_id).await.unwrap()[0].done);

        // Second pass finds nothing.
        assert!(sweep_due_reminders(&store, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_store_surfaces_error() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(sweep_due_reminders(&store, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn background_sweep_stops_on_cancel() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let r = reminder(Utc::now() - ChronoDuration::seconds(1));
        store.insert_reminder(&r).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = run_reminder_sweep(store.clone(), Duration::from_millis(10), cancel.clone());

        let mut done = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.list_reminders(r.user_id).await.unwrap()[0].done {
                done = true;
                break;
            }
        }
        assert!(done, "sweep should mark the due reminder");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweep task should stop")
            .unwrap();
    }
}
