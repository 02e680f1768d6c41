use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::schema::{optional_number, optional_str, require_number, require_str};
use super::{ActionContext, ActionError};
use crate::types::{Invoice, days_from};

/// Unset options fall back to config (currency, due offset, description) and
/// to the caller's `invoice_format` preference.
pub(super) async fn create_invoice(
    ctx: &ActionContext<'_>,
    args: &Map<String, Value>,
    user_id: Uuid,
) -> Result<Value, ActionError> {
    let client_id = require_str(args, "clientId")?;
    let amount = require_number(args, "amount", 0.0)?;
    let due_in_days =
        optional_number(args, "dueInDays", 0.0)?.unwrap_or(ctx.cfg.default_invoice_due_days);
    let due_at = days_from(ctx.now, due_in_days).ok_or_else(|| {
        ActionError::InvalidArguments(format!("dueInDays {due_in_days} is too far out"))
    })?;

    let invoice = Invoice {
        id: Uuid::new_v4(),
        user_id,
        client_id: client_id.to_owned(),
        amount,
        currency: optional_str(args, "currency")
            .unwrap_or(ctx.cfg.default_currency.as_str())
            .to_owned(),
        description: optional_str(args, "description")
            .unwrap_or(ctx.cfg.default_invoice_description.as_str())
            .to_owned(),
        format: optional_str(args, "format")
            .unwrap_or(ctx.prefs.invoice_format.as_str())
            .to_owned(),
        due_at,
        created_at: ctx.now,
    };
    ctx.store.insert_invoice(&invoice).await?;
    tracing::info!(
        %user_id,
        invoice_id = %invoice.id,
        amount,
        currency = %invoice.currency,
        "invoice created"
    );
    Ok(json!({ "invoice": invoice }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentCfg;
    use crate::mail::DisabledMailer;
    use crate::store::{MemoryStore, Store};
    use crate::types::Preferences;
    use chrono::{Duration, Utc};

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn defaults_come_from_config_and_preferences() {
        let store = MemoryStore::new();
        let cfg = AgentCfg::default();
        let prefs = Preferences { invoice_format: "compact".into(), ..Preferences::default() };
        let now = Utc::now();
        let ctx = ActionContext {
            store: &store,
            mailer: &DisabledMailer,
            cfg: &cfg,
            prefs: &prefs,
            now,
        };
        let user = Uuid::new_v4();

        create_invoice(&ctx, &obj(json!({"clientId": "c9", "amount": 250})), user)
            .await
            .unwrap();

        let invoices = store.list_invoices(user).await.unwrap();
        assert_eq!(invoices.len(), 1);
        let inv = &invoices[0];
        assert_eq!(inv.currency, "INR");
        assert_eq!(inv.description, "Invoice");
        assert_eq!(inv.format, "compact");
        assert_eq!(inv.due_at, now + Duration::days(7));
    }

    #[tokio::test]
    async fn negative_amount_rejected_without_write() {
        let store = MemoryStore::new();
        let cfg = AgentCfg::default();
        let prefs = Preferences::default();
        let ctx = ActionContext {
            store: &store,
            mailer: &DisabledMailer,
            cfg: &cfg,
            prefs: &prefs,
            now: Utc::now(),
        };
        let user = Uuid::new_v4();

        let err = create_invoice(&ctx, &obj(json!({"clientId": "c1", "amount": -5})), user)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidArguments(_)));
        assert!(store.list_invoices(user).await.unwrap().is_empty());
    }
}
