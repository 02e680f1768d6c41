use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AUDIT_PAYLOAD_MAX_CHARS, Store, StoreError, truncate_payload};
use crate::types::{
    AuditEntry, Client, DashboardStats, Invoice, PreferenceKey, Preferences, Reminder,
};

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ── Row types ──────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: Uuid,
    action: String,
    payload: String,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            action: row.action,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ClientRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    email: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            email: row.email,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    user_id: Uuid,
    client_id: String,
    amount: f64,
    currency: String,
    description: String,
    format: String,
    due_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            client_id: row.client_id,
            amount: row.amount,
            currency: row.currency,
            description: row.description,
            format: row.format,
            due_at: row.due_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReminderRow {
    id: Uuid,
    user_id: Uuid,
    client_id: String,
    message: String,
    remind_at: DateTime<Utc>,
    done: bool,
    created_at: DateTime<Utc>,
}

impl From<ReminderRow> for Reminder {
    fn from(row: ReminderRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            client_id: row.client_id,
            message: row.message,
            remind_at: row.remind_at,
            done: row.done,
            created_at: row.created_at,
        }
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn get_preferences(&self, user_id: Uuid) -> Result<Preferences, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM user_preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(Preferences::from_pairs(rows))
    }

    async fn set_preference(
        &self,
        user_id: Uuid,
        key: PreferenceKey,
        value: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_preferences (user_id, key, value, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (user_id, key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(user_id)
        .bind(key.as_db_str())
        .bind(value)
        .execute(&self.pool)
        .await?;
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
        sqlx::query(
            "INSERT INTO audit_logs (id, user_id, action, payload, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn list_audit(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT id, user_id, action, payload, created_at FROM audit_logs
             WHERE user_id = $1 AND ($2::timestamptz IS NULL OR created_at >= $2)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO clients (id, user_id, name, email, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(client.id)
        .bind(client.user_id)
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.metadata)
        .bind(client.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_clients(&self, user_id: Uuid) -> Result<Vec<Client>, StoreError> {
        let rows: Vec<ClientRow> = sqlx::query_as(
            "SELECT id, user_id, name, email, metadata, created_at FROM clients
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO invoices
             (id, user_id, client_id, amount, currency, description, format, due_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(invoice.id)
        .bind(invoice.user_id)
        .bind(&invoice.client_id)
        .bind(invoice.amount)
        .bind(&invoice.currency)
        .bind(&invoice.description)
        .bind(&invoice.format)
        .bind(invoice.due_at)
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_invoices(&self, user_id: Uuid) -> Result<Vec<Invoice>, StoreError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(
            "SELECT id, user_id, client_id, amount, currency, description, format,
             due_at, created_at FROM invoices WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reminders (id, user_id, client_id, message, remind_at, done, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(reminder.id)
        .bind(reminder.user_id)
        .bind(&reminder.client_id)
        .bind(&reminder.message)
        .bind(reminder.remind_at)
        .bind(reminder.done)
        .bind(reminder.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_reminders(&self, user_id: Uuid) -> Result<Vec<Reminder>, StoreError> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT id, user_id, client_id, message, remind_at, done, created_at
             FROM reminders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StoreError> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT id, user_id, client_id, message, remind_at, done, created_at
             FROM reminders WHERE NOT done AND remind_at <= $1 ORDER BY remind_at ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_reminder_done(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE reminders SET done = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("reminder {id}")));
        }
        Ok(())
    }

    async fn dashboard(&self, user_id: Uuid) -> Result<DashboardStats, StoreError> {
        let (total_revenue, total_invoices): (f64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0)::float8, COUNT(*) FROM invoices WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let (total_clients,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM clients WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(DashboardStats { total_revenue, total_clients, total_invoices })
    }
}
