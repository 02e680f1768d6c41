use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;

/// Agent tuning parameters. Loaded from the `agent_config` table at startup.
/// First boot writes defaults; subsequent boots read existing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCfg {
    // command interpretation
    pub model_max_tokens: u32,
    pub model_temperature: f32,

    // payment risk analysis
    pub risk_max_tokens: u32,

    // invoice defaults
    pub default_currency: String,
    pub default_invoice_due_days: f64,
    pub default_invoice_description: String,

    // reminder sweep
    pub reminder_sweep_interval_secs: u64,
}

impl Default for AgentCfg {
    fn default() -> Self {
        Self {
            model_max_tokens: 1024,
            model_temperature: 0.2,
            risk_max_tokens: 1024,
            default_currency: "INR".into(),
            default_invoice_due_days: 7.0,
            default_invoice_description: "Invoice".into(),
            reminder_sweep_interval_secs: 60,
        }
    }
}

impl AgentCfg {
    /// Load config from `agent_config` table. If table is empty, seed with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM agent_config")
            .fetch_all(pool)
            .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            tracing::info!("agent_config seeded with defaults");
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Write all default values into `agent_config` table.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        for (key, value, desc) in &self.to_entries() {
            sqlx::query(
                "INSERT INTO agent_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            model_max_tokens: get_or(m, "model_max_tokens", d.model_max_tokens),
            model_temperature: get_or(m, "model_temperature", d.model_temperature),
            risk_max_tokens: get_or(m, "risk_max_tokens", d.risk_max_tokens),
            default_currency: get_or(m, "default_currency", d.default_currency),
            default_invoice_due_days: get_or(
                m,
                "default_invoice_due_days",
                d.default_invoice_due_days,
            ),
            default_invoice_description: get_or(
                m,
                "default_invoice_description",
                d.default_invoice_description,
            ),
            reminder_sweep_interval_secs: get_or(
                m,
                "reminder_sweep_interval_secs",
                d.reminder_sweep_interval_secs,
            )
            .max(1),
        }
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            (
                "model_max_tokens",
                self.model_max_tokens.to_string(),
                "Max tokens for command interpretation",
            ),
            (
                "model_temperature",
                self.model_temperature.to_string(),
                "Sampling temperature for command interpretation",
            ),
            (
                "risk_max_tokens",
                self.risk_max_tokens.to_string(),
                "Max tokens for payment risk analysis",
            ),
            (
                "default_currency",
                self.default_currency.clone(),
                "Invoice currency when none is given",
            ),
            (
                "default_invoice_due_days",
                self.default_invoice_due_days.to_string(),
                "Invoice due offset in days when none is given",
            ),
            (
                "default_invoice_description",
                self.default_invoice_description.clone(),
                "Invoice description when none is given",
            ),
            (
                "reminder_sweep_interval_secs",
                self.reminder_sweep_interval_secs.to_string(),
                "Reminder sweep period seconds",
            ),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
