//! The closed set of side-effecting actions the agent may invoke.
//!
//! Each [`ActionKind`] owns a single declared record: wire name, description,
//! parameter schema, handler and preference-learning rule. Adding an action
//! means adding a variant and filling in its arms below.

mod client;
mod email;
mod invoice;
mod reminder;
pub mod schema;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::config::AgentCfg;
use crate::mail::{MailError, Mailer};
use crate::store::{Store, StoreError};
use crate::types::{PreferenceKey, Preferences, format_days};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CreateClient,
    CreateInvoice,
    SendEmail,
    ScheduleReminder,
}

/// Name, description and parameter schema of one action, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Everything a handler may touch besides its arguments.
pub struct ActionContext<'a> {
    pub store: &'a dyn Store,
    pub mailer: &'a dyn Mailer,
    pub cfg: &'a AgentCfg,
    /// The caller's preferences, for defaults.
    pub prefs: &'a Preferences,
    pub now: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Mail(#[from] MailError),
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        Self::CreateClient,
        Self::CreateInvoice,
        Self::SendEmail,
        Self::ScheduleReminder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateClient => "create_client",
            Self::CreateInvoice => "create_invoice",
            Self::SendEmail => "send_email",
            Self::ScheduleReminder => "schedule_reminder",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn spec(self) -> ActionSpec {
        let (description, parameters) = match self {
            Self::CreateClient => (
                "Create a client in the CRM with name and email",
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "email": { "type": "string" },
                        "metadata": { "type": "object" }
                    },
                    "required": ["name"]
                }),
            ),
            Self::CreateInvoice => (
                "Create invoice for a client id with amount and options",
                json!({
                    "type": "object",
                    "properties": {
                        "clientId": { "type": "string" },
                        "amount": { "type": "number" },
                        "currency": { "type": "string" },
                        "dueInDays": { "type": "number" },
                        "description": { "type": "string" },
                        "format": { "type": "string" }
                    },
                    "required": ["clientId", "amount"]
                }),
            ),
            Self::SendEmail => (
                "Send an email",
                json!({
                    "type": "object",
                    "properties": {
                        "to": { "type": "string" },
                        "subject": { "type": "string" },
                        "text": { "type": "string" },
                        "html": { "type": "string" }
                    },
                    "required": ["to", "subject"]
                }),
            ),
            Self::ScheduleReminder => (
                "Schedule a reminder for a client",
                json!({
                    "type": "object",
                    "properties": {
                        "clientId": { "type": "string" },
                        "message": { "type": "string" },
                        "remindInDays": { "type": "number" }
                    },
                    "required": ["clientId", "message", "remindInDays"]
                }),
            ),
        };
        ActionSpec { name: self.name(), description, parameters }
    }

    /// Check `args` against this action's parameter schema.
    pub fn validate(self, args: &Map<String, Value>) -> Result<(), String> {
        schema::validate(args, &self.spec().parameters)
    }

    /// Run the handler. `args` must already have passed [`Self::validate`].
    pub async fn execute(
        self,
        ctx: &ActionContext<'_>,
        args: &Map<String, Value>,
        user_id: Uuid,
    ) -> Result<Value, ActionError> {
        match self {
            Self::CreateClient => client::create_client(ctx, args, user_id).await,
            Self::CreateInvoice => invoice::create_invoice(ctx, args, user_id).await,
            Self::SendEmail => email::send_email(ctx, args).await,
            Self::ScheduleReminder => reminder::schedule_reminder(ctx, args, user_id).await,
        }
    }

    /// Preference a successful call teaches, if any.
    pub fn learned_preference(self, args: &Map<String, Value>) -> Option<(PreferenceKey, String)> {
        match self {
            Self::ScheduleReminder => args
                .get("remindInDays")
                .and_then(Value::as_f64)
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(|d| (PreferenceKey::ReminderDelay, format_days(d))),
            Self::CreateInvoice => args
                .get("format")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(|f| (PreferenceKey::InvoiceFormat, f.to_owned())),
            Self::CreateClient | Self::SendEmail => None,
        }
    }
}

/// Specs of every action, in declaration order.
pub fn registry() -> Vec<ActionSpec> {
    ActionKind::ALL.into_iter().map(ActionKind::spec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ActionKind::from_name("nonexistent_fn"), None);
    }

    #[test]
    fn registry_lists_required_actions() {
        let names: Vec<_> = registry().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["create_client", "create_invoice", "send_email", "schedule_reminder"]
        );
    }

    #[test]
    fn spec_serializes_with_parameters() {
        let spec = serde_json::to_value(ActionKind::ScheduleReminder.spec()).unwrap();
        assert_eq!(spec["name"], "schedule_reminder");
        assert_eq!(spec["parameters"]["required"][2], "remindInDays");
    }

    #[test]
    fn validate_uses_declared_schema() {
        let ok = obj(json!({"clientId": "c1", "amount": 120.5}));
        assert!(ActionKind::CreateInvoice.validate(&ok).is_ok());

        let wrong_type = obj(json!({"clientId": "c1", "amount": "120"}));
        assert!(ActionKind::CreateInvoice.validate(&wrong_type).is_err());

        let missing = obj(json!({"message": "pay", "remindInDays": 5}));
        assert!(ActionKind::ScheduleReminder.validate(&missing).is_err());
    }

    #[test]
    fn reminder_teaches_delay() {
        let args = obj(json!({"clientId": "c1", "message": "pay", "remindInDays": 5}));
        assert_eq!(
            ActionKind::ScheduleReminder.learned_preference(&args),
            Some((PreferenceKey::ReminderDelay, "5".to_string()))
        );
    }

    #[test]
    fn invoice_teaches_format_only_when_given() {
        let with = obj(json!({"clientId": "c1", "amount": 10, "format": "detailed"}));
        assert_eq!(
            ActionKind::CreateInvoice.learned_preference(&with),
            Some((PreferenceKey::InvoiceFormat, "detailed".to_string()))
        );
        let without = obj(json!({"clientId": "c1", "amount": 10}));
        assert_eq!(ActionKind::CreateInvoice.learned_preference(&without), None);
    }

    #[test]
    fn other_actions_teach_nothing() {
        let args = obj(json!({"name": "Acme"}));
        assert_eq!(ActionKind::CreateClient.learned_preference(&args), None);
        assert_eq!(ActionKind::SendEmail.learned_preference(&args), None);
    }
}
