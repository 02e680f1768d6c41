use serde_json::{Map, Value, json};

use super::schema::{optional_str, require_str};
use super::{ActionContext, ActionError};
use crate::mail::OutgoingEmail;

pub(super) async fn send_email(
    ctx: &ActionContext<'_>,
    args: &Map<String, Value>,
) -> Result<Value, ActionError> {
    let email = OutgoingEmail {
        to: require_str(args, "to")?.to_owned(),
        subject: require_str(args, "subject")?.to_owned(),
        text: optional_str(args, "text").map(str::to_owned),
        html: optional_str(args, "html").map(str::to_owned),
    };
    let sent = ctx.mailer.send(email).await?;
    Ok(json!({ "email": sent }))
}
