use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ── Preferences ────────────────────────────────────────────────

pub const DEFAULT_REMINDER_DELAY_DAYS: f64 = 3.0;
pub const DEFAULT_EMAIL_TONE: &str = "professional";
pub const DEFAULT_INVOICE_FORMAT: &str = "standard";

/// Closed set of per-user preference keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceKey {
    ReminderDelay,
    EmailTone,
    InvoiceFormat,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 3] = [Self::ReminderDelay, Self::EmailTone, Self::InvoiceFormat];

    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::ReminderDelay => "reminder_delay",
            Self::EmailTone => "email_tone",
            Self::InvoiceFormat => "invoice_format",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_db_str() == s)
    }

    /// Normalize a user-supplied value, rejecting values the key cannot hold.
    pub fn normalize(self, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match self {
            Self::ReminderDelay => parse_days(value).map(format_days),
            Self::EmailTone | Self::InvoiceFormat => Some(value.to_owned()),
        }
    }
}

/// A user's resolved preferences. Missing or unparseable stored values resolve
/// to the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub reminder_delay_days: f64,
    pub email_tone: String,
    pub invoice_format: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            reminder_delay_days: DEFAULT_REMINDER_DELAY_DAYS,
            email_tone: DEFAULT_EMAIL_TONE.to_owned(),
            invoice_format: DEFAULT_INVOICE_FORMAT.to_owned(),
        }
    }
}

impl Preferences {
    /// Resolve stored `(key, value)` rows. Unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut prefs = Self::default();
        for (key, value) in pairs {
            match PreferenceKey::from_db(&key) {
                Some(PreferenceKey::ReminderDelay) => {
                    if let Some(days) = parse_days(&value) {
                        prefs.reminder_delay_days = days;
                    }
                }
                Some(PreferenceKey::EmailTone) if !value.trim().is_empty() => {
                    prefs.email_tone = value;
                }
                Some(PreferenceKey::InvoiceFormat) if !value.trim().is_empty() => {
                    prefs.invoice_format = value;
                }
                _ => {}
            }
        }
        prefs
    }

    pub fn get(&self, key: PreferenceKey) -> String {
        match key {
            PreferenceKey::ReminderDelay => format_days(self.reminder_delay_days),
            PreferenceKey::EmailTone => self.email_tone.clone(),
            PreferenceKey::InvoiceFormat => self.invoice_format.clone(),
        }
    }

    /// Preference name → stored value.
    pub fn as_map(&self) -> BTreeMap<&'static str, String> {
        PreferenceKey::ALL
            .into_iter()
            .map(|k| (k.as_db_str(), self.get(k)))
            .collect()
    }

    /// Plain `key: value` lines, for prompt construction.
    pub fn summary(&self) -> String {
        format!(
            "reminder_delay: {} days\nemail_tone: {}\ninvoice_format: {}",
            format_days(self.reminder_delay_days),
            self.email_tone,
            self.invoice_format,
        )
    }
}

fn parse_days(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// `5.0` → `"5"`, `2.5` → `"2.5"`.
pub fn format_days(days: f64) -> String {
    format!("{days}")
}

/// `now + days`, with fractional days honored to the second. `None` when the
/// offset does not fit a timestamp.
pub fn days_from(now: DateTime<Utc>, days: f64) -> Option<DateTime<Utc>> {
    if !days.is_finite() {
        return None;
    }
    // `as` saturates; out-of-range seconds are then rejected by `try_seconds`.
    let delta = TimeDelta::try_seconds((days * 86_400.0).round() as i64)?;
    now.checked_add_signed(delta)
}

// ── CRM records ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Client reference exactly as supplied; not resolved against `clients`.
    pub client_id: String,
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub format: String,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: String,
    pub message: String,
    pub remind_at: DateTime<Utc>,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

/// Append-only action log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    /// Serialized input arguments, truncated; not guaranteed to parse.
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_revenue: f64,
    pub total_clients: i64,
    pub total_invoices: i64,
}

// ── Agent protocol ─────────────────────────────────────────────

/// The interpreter's decision for one command.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedInstruction {
    Text { message: String },
    FunctionCall { name: String, args: Map<String, Value> },
}

/// Uniform response returned to callers of the agent.
///
/// Exactly one of the shapes is populated:
/// `{ok:true, message}`, `{ok:true, function, result}`, `{ok:false, error}`
/// (optionally with `raw` when the model output could not be parsed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Envelope {
    pub fn message(message: impl Into<String>) -> Self {
        Self { ok: true, message: Some(message.into()), ..Self::empty() }
    }

    pub fn function(name: impl Into<String>, result: Value) -> Self {
        Self {
            ok: true,
            function: Some(name.into()),
            result: Some(result),
            ..Self::empty()
        }
    }

    pub fn result(result: Value) -> Self {
        Self { ok: true, result: Some(result), ..Self::empty() }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::empty() }
    }

    /// Model output that should have been JSON but was not.
    pub fn parse_error(raw: impl Into<String>) -> Self {
        Self {
            error: Some("parse_error".into()),
            raw: Some(raw.into()),
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            ok: false,
            message: None,
            function: None,
            result: None,
            error: None,
            raw: None,
        }
    }
}
