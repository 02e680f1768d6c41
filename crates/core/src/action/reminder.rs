use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::schema::{require_number, require_str};
use super::{ActionContext, ActionError};
use crate::types::{Reminder, days_from};

pub(super) async fn schedule_reminder(
    ctx: &ActionContext<'_>,
    args: &Map<String, Value>,
    user_id: Uuid,
) -> Result<Value, ActionError> {
    let client_id = require_str(args, "clientId")?;
    let message = require_str(args, "message")?;
    let remind_in_days = require_number(args, "remindInDays", 0.0)?;
    let remind_at = days_from(ctx.now, remind_in_days).ok_or_else(|| {
        ActionError::InvalidArguments(format!("remindInDays {remind_in_days} is too far out"))
    })?;

    let reminder = Reminder {
        id: Uuid::new_v4(),
        user_id,
        client_id: client_id.to_owned(),
        message: message.to_owned(),
        remind_at,
        done: false,
        created_at: ctx.now,
    };
    ctx.store.insert_reminder(&reminder).await?;
    tracing::info!(
        %user_id,
        reminder_id = %reminder.id,
        remind_at = %reminder.remind_at,
        "reminder scheduled"
    );
    Ok(json!({ "reminder": reminder }))
}
