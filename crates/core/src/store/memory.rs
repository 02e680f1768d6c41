use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AUDIT_PAYLOAD_MAX_CHARS, Store, StoreError, truncate_payload};
use crate::types::{
    AuditEntry, Client, DashboardStats, Invoice, PreferenceKey, Preferences, Reminder,
};

/// In-process store for tests and ephemeral mode. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

#[derive(Debug, Default)]
struct Inner {
    preferences: HashMap<(Uuid, PreferenceKey), String>,
    // Each vec is kept in insertion order; listings reverse it.
    audit: Vec<AuditEntry>,
    clients: Vec<Client>,
    invoices: Vec<Invoice>,
    reminders: Vec<Reminder>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the database were gone.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

fn newest_first<T>(items: impl DoubleEndedIterator<Item = T>) -> Vec<T> {
    items.rev().collect()
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_preferences(&self, user_id: Uuid) -> Result<Preferences, StoreError> {
        let inner = self.lock()?;
        let pairs = inner
            .preferences
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((_, key), value)| (key.as_db_str().to_owned(), value.clone()))
            .collect::<Vec<_>>();
        Ok(Preferences::from_pairs(pairs))
    }

    async fn set_preference(
        &self,
        user_id: Uuid,
        key: PreferenceKey,
        value: &str,
    ) -> Result<(), StoreError> {
        self.lock()?.preferences.insert((user_id, key), value.to_owned());
        Ok(())
    }

    async fn append_audit(
        &self,
        user_id: Uuid,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<AuditEntry, StoreError> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            user_id,
            action: action.to_owned(),
            payload: truncate_payload(payload, AUDIT_PAYLOAD_MAX_CHARS),
            created_at: Utc::now(),
        };
        self.lock()?.audit.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let inner = self.lock()?;
        Ok(newest_first(
            inner
                .audit
                .iter()
                .filter(|e| e.user_id == user_id)
                .filter(|e| since.is_none_or(|s| e.created_at >= s))
                .cloned(),
        ))
    }

    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        self.lock()?.clients.push(client.clone());
        Ok(())
    }

    async fn list_clients(&self, user_id: Uuid) -> Result<Vec<Client>, StoreError> {
        let inner = self.lock()?;
        Ok(newest_first(inner.clients.iter().filter(|c| c.user_id == user_id).cloned()))
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        self.lock()?.invoices.push(invoice.clone());
        Ok(())
    }

    async fn list_invoices(&self, user_id: Uuid) -> Result<Vec<Invoice>, StoreError> {
        let inner = self.lock()?;
        Ok(newest_first(inner.invoices.iter().filter(|i| i.user_id == user_id).cloned()))
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<(), StoreError> {
        self.lock()?.reminders.push(reminder.clone());
        Ok(())
    }

    async fn list_reminders(&self, user_id: Uuid) -> Result<Vec<Reminder>, StoreError> {
        let inner = self.lock()?;
        Ok(newest_first(inner.reminders.iter().filter(|r| r.user_id == user_id).cloned()))
    }

    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StoreError> {
        let inner = self.lock()?;
        let mut due: Vec<Reminder> = inner
            .reminders
            .iter()
            .filter(|r| !r.done && r.remind_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|r| r.remind_at);
        Ok(due)
    }

    async fn mark_reminder_done(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let reminder = inner
            .reminders
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("reminder {id}")))?;
        reminder.done = true;
        Ok(())
    }

    async fn dashboard(&self, user_id: Uuid) -> Result<DashboardStats, StoreError> {
        let inner = self.lock()?;
        let invoices: Vec<&Invoice> =
            inner.invoices.iter().filter(|i| i.user_id == user_id).collect();
        Ok(DashboardStats {
            total_revenue: invoices.iter().map(|i| i.amount).sum(),
            total_clients: inner.clients.iter().filter(|c| c.user_id == user_id).count() as i64,
            total_invoices: invoices.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn reminder(user_id: Uuid, remind_at: DateTime<Utc>) -> Reminder {
        Reminder {
            id: Uuid::new_v4(),
            user_id,
            client_id: "c1".into(),
            message: "pay".into(),
            remind_at,
            done: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn preferences_default_for_new_user() {
        let store = MemoryStore::new();
        let prefs = store.get_preferences(Uuid::new_v4()).await.unwrap();
        assert_eq!(prefs, Preferences::default());
    }

    #[tokio::test]
    async fn set_preference_is_idempotent_and_scoped() {
        let store = MemoryStore::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        store.set_preference(alice, PreferenceKey::EmailTone, "friendly").await.unwrap();
        let once = store.get_preferences(alice).await.unwrap();
        store.set_preference(alice, PreferenceKey::EmailTone, "friendly").await.unwrap();
        let twice = store.get_preferences(alice).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.email_tone, "friendly");
        assert_eq!(store.get_preferences(bob).await.unwrap(), Preferences::default());
    }

    #[tokio::test]
    async fn last_preference_write_wins() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.set_preference(user, PreferenceKey::ReminderDelay, "5").await.unwrap();
        store.set_preference(user, PreferenceKey::ReminderDelay, "9").await.unwrap();
        assert_eq!(store.get_preferences(user).await.unwrap().reminder_delay_days, 9.0);
    }

    #[tokio::test]
    async fn audit_listed_newest_first_and_filtered_by_since() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.append_audit(user, "create_client", &json!({"name": "A"})).await.unwrap();
        let second = store.append_audit(user, "send_email", &json!({"to": "a@b.c"})).await.unwrap();
        store.append_audit(Uuid::new_v4(), "create_client", &json!({})).await.unwrap();

        let all = store.list_audit(user, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action, "send_email");
        assert_eq!(all[1].action, "create_client");

        let later = store
            .list_audit(user, Some(second.created_at + Duration::seconds(1)))
            .await
            .unwrap();
        assert!(later.is_empty());
    }

    #[tokio::test]
    async fn audit_payload_truncated() {
        let store = MemoryStore::new();
        let entry = store
            .append_audit(Uuid::new_v4(), "send_email", &json!({"text": "z".repeat(4000)}))
            .await
            .unwrap();
        assert_eq!(entry.payload.chars().count(), AUDIT_PAYLOAD_MAX_CHARS);
    }

    #[tokio::test]
    async fn due_reminders_skip_future_and_done() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let past = reminder(user, now - Duration::hours(1));
        let future = reminder(user, now + Duration::hours(1));
        store.insert_reminder(&past).await.unwrap();
        store.insert_reminder(&future).await.unwrap();

        let due = store.due_reminders(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past.id);

        store.mark_reminder_done(past.id).await.unwrap();
        assert!(store.due_reminders(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_unknown_reminder_not_found() {
        let store = MemoryStore::new();
        let err = store.mark_reminder_done(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(store.get_preferences(Uuid::new_v4()).await.is_err());
        store.set_offline(false);
        assert!(store.get_preferences(Uuid::new_v4()).await.is_ok());
    }
}
