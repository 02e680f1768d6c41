use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::schema::{optional_str, require_str};
use super::{ActionContext, ActionError};
use crate::mail::validate_email_like;
use crate::types::Client;

pub(super) async fn create_client(
    ctx: &ActionContext<'_>,
    args: &Map<String, Value>,
    user_id: Uuid,
) -> Result<Value, ActionError> {
    let name = require_str(args, "name")?;
    let email = optional_str(args, "email");
    if let Some(email) = email {
        validate_email_like(email).map_err(|e| ActionError::InvalidArguments(e.to_string()))?;
    }
    let metadata = match args.get("metadata") {
        Some(Value::Object(m)) => Value::Object(m.clone()),
        _ => json!({}),
    };

    let client = Client {
        id: Uuid::new_v4(),
        user_id,
        name: name.to_owned(),
        email: email.map(str::to_owned),
        metadata,
        created_at: ctx.now,
    };
    ctx.store.insert_client(&client).await?;
    tracing::info!(%user_id, client_id = %client.id, "client created");
    Ok(json!({ "client": client }))
}
