//! Read-only views over a user's records: payment risk (model-assisted),
//! today's activity and dashboard totals (local).

use agentflow_llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::AgentCfg;
use crate::error::AgentError;
use crate::store::Store;
use crate::types::{DashboardStats, Envelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub client_id: String,
    pub risk_level: RiskLevel,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentRisk {
    Flagged(Vec<RiskAssessment>),
    /// The model's answer was not the expected JSON array.
    Unparseable { raw: String },
}

impl PaymentRisk {
    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::Flagged(list) => Envelope::result(json!(list)),
            Self::Unparseable { raw } => Envelope::parse_error(raw),
        }
    }
}

/// Ask the model which clients look risky. Users without invoices get an
/// empty list and no model call.
pub async fn payment_risk(
    store: &dyn Store,
    llm: &dyn LlmProvider,
    cfg: &AgentCfg,
    user_id: Uuid,
) -> Result<PaymentRisk, AgentError> {
    let invoices = store.list_invoices(user_id).await?;
    if invoices.is_empty() {
        return Ok(PaymentRisk::Flagged(Vec::new()));
    }

    let invoices_json = serde_json::to_string(&invoices).unwrap_or_else(|_| "[]".to_string());
    let request = CompletionRequest {
        messages: vec![
            ChatMessage::system(
                "You are a credit analyst. Output ONLY valid JSON. No markdown, no explanation.",
            ),
            ChatMessage::user(format!(
                "Analyze these invoices and return risky clients only as a JSON array:\n\n\
                 {invoices_json}\n\n\
                 Format:\n\
                 [{{\"clientId\": \"...\", \"riskLevel\": \"LOW|MEDIUM|HIGH\", \
                 \"reason\": \"...\"}}]\n\
                 Return [] if no client is risky."
            )),
        ],
        max_tokens: cfg.risk_max_tokens,
        temperature: 0.0,
    };

    let response = llm.complete(request).await?;
    match serde_json::from_str::<Vec<RiskAssessment>>(response.content.trim()) {
        Ok(list) => {
            tracing::info!(
                %user_id,
                flagged = list.len(),
                invoices = invoices.len(),
                "payment risk assessed"
            );
            Ok(PaymentRisk::Flagged(list))
        }
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "payment risk response unparseable");
            Ok(PaymentRisk::Unparseable { raw: response.content })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaySummary {
    pub total_actions: usize,
    /// Action names, oldest first.
    pub actions: Vec<String>,
}

/// Count today's (UTC) audited actions. No model call.
pub async fn explain_today(
    store: &dyn Store,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<TodaySummary, AgentError> {
    let midnight = now.date_naive().and_hms_opt(0, 0, 0).map(|t| t.and_utc()).unwrap_or(now);
    let entries = store.list_audit(user_id, Some(midnight)).await?;
    let actions: Vec<String> = entries
        .into_iter()
        .rev()
        .filter(|e| e.created_at <= now)
        .map(|e| e.action)
        .collect();
    Ok(TodaySummary { total_actions: actions.len(), actions })
}

pub async fn dashboard(store: &dyn Store, user_id: Uuid) -> Result<DashboardStats, AgentError> {
    Ok(store.dashboard(user_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Invoice;
    use agentflow_llm::provider::MockProvider;
    use chrono::Duration;

    async fn store_with_invoice(user: Uuid) -> MemoryStore {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_invoice(&Invoice {
                id: Uuid::new_v4(),
                user_id: user,
                client_id: "c1".into(),
                amount: 900.0,
                currency: "INR".into(),
                description: "Invoice".into(),
                format: "standard".into(),
                due_at: now - Duration::days(30),
                created_at: now - Duration::days(37),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn no_invoices_skips_model() {
        let store = MemoryStore::new();
        let mock = MockProvider::new("[]");
        let risk = payment_risk(&store, &mock, &AgentCfg::default(), Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(risk, PaymentRisk::Flagged(vec![]));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn parses_flagged_clients() {
        let user = Uuid::new_v4();
        let store = store_with_invoice(user).await;
        let mock = MockProvider::new(
            r#"[{"clientId":"c1","riskLevel":"HIGH","reason":"30 days overdue"}]"#,
        );

        let risk = payment_risk(&store, &mock, &AgentCfg::default(), user).await.unwrap();
        let PaymentRisk::Flagged(list) = risk else {
            panic!("expected parsed list");
        };
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].risk_level, RiskLevel::High);
        assert!(mock.requests()[0].messages[1].content.contains("\"client_id\":\"c1\""));
    }

    #[tokio::test]
    async fn unparseable_response_becomes_parse_error_envelope() {
        let user = Uuid::new_v4();
        let store = store_with_invoice(user).await;
        let mock = MockProvider::new("Client c1 looks risky.");

        let risk = payment_risk(&store, &mock, &AgentCfg::default(), user).await.unwrap();
        let envelope = risk.into_envelope();
        assert!(!envelope.ok);
        assert_eq!(envelope.error.as_deref(), Some("parse_error"));
        assert_eq!(envelope.raw.as_deref(), Some("Client c1 looks risky."));
    }

    #[tokio::test]
    async fn unknown_risk_level_or_missing_reason_is_unparseable() {
        let user = Uuid::new_v4();
        let store = store_with_invoice(user).await;
        for reply in [
            r#"[{"clientId":"c1","riskLevel":"CRITICAL","reason":"90 days overdue"}]"#,
            r#"[{"clientId":"c1","riskLevel":"HIGH"}]"#,
        ] {
            let mock = MockProvider::new(reply);
            let risk = payment_risk(&store, &mock, &AgentCfg::default(), user).await.unwrap();
            assert_eq!(risk, PaymentRisk::Unparseable { raw: reply.to_string() });
        }
    }

    #[tokio::test]
    async fn today_counts_only_today_in_order() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.append_audit(user, "create_client", &json!({})).await.unwrap();
        store.append_audit(user, "send_email", &json!({})).await.unwrap();

        let summary = explain_today(&store, user, Utc::now()).await.unwrap();
        assert_eq!(summary.total_actions, 2);
        assert_eq!(summary.actions, vec!["create_client", "send_email"]);

        let tomorrow = explain_today(&store, user, Utc::now() + Duration::days(1)).await.unwrap();
        assert_eq!(tomorrow.total_actions, 0);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let s = TodaySummary { total_actions: 1, actions: vec!["send_email".into()] };
        assert_eq!(
            serde_json::to_value(s).unwrap(),
            json!({"totalActions": 1, "actions": ["send_email"]})
        );
    }
}
