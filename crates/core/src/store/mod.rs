//! Durable per-user state: preferences, the audit log, and the CRM tables the
//! actions write to.

pub mod memory;
pub mod pg;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{
    AuditEntry, Client, DashboardStats, Invoice, PreferenceKey, Preferences, Reminder,
};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Maximum stored length of an audit payload, in characters.
pub const AUDIT_PAYLOAD_MAX_CHARS: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Storage backend used by the agent, its actions and the reminder sweep.
///
/// List operations return newest first unless stated otherwise.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Resolved preferences; defaults fill every key not stored.
    async fn get_preferences(&self, user_id: Uuid) -> Result<Preferences, StoreError>;

    /// Upsert one preference. Last write wins.
    async fn set_preference(
        &self,
        user_id: Uuid,
        key: PreferenceKey,
        value: &str,
    ) -> Result<(), StoreError>;

    /// Append one audit row; `payload` is serialized and truncated to
    /// [`AUDIT_PAYLOAD_MAX_CHARS`].
    async fn append_audit(
        &self,
        user_id: Uuid,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<AuditEntry, StoreError>;

    /// Audit rows newest first, optionally only those at or after `since`.
    async fn list_audit(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, StoreError>;

    async fn insert_client(&self, client: &Client) -> Result<(), StoreError>;
    async fn list_clients(&self, user_id: Uuid) -> Result<Vec<Client>, StoreError>;

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError>;
    async fn list_invoices(&self, user_id: Uuid) -> Result<Vec<Invoice>, StoreError>;

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<(), StoreError>;
    async fn list_reminders(&self, user_id: Uuid) -> Result<Vec<Reminder>, StoreError>;

    /// Reminders across all users that are not done and due at or before
    /// `now`, oldest first.
    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StoreError>;
    async fn mark_reminder_done(&self, id: Uuid) -> Result<(), StoreError>;

    async fn dashboard(&self, user_id: Uuid) -> Result<DashboardStats, StoreError>;
}

/// Serialize an audit payload and cut it to `max` characters.
/// The cut lands on a char boundary; the result need not be valid JSON.
pub fn truncate_payload(payload: &serde_json::Value, max: usize) -> String {
    let text = payload.to_string();
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_owned(),
        None => text,
    }
}
