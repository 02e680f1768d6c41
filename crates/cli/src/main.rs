mod command;
mod repl;

use std::sync::Arc;
use std::time::Duration;

use agentflow_core::agent::Agent;
use agentflow_core::config::AgentCfg;
use agentflow_core::mail::{DisabledMailer, GmailMailer, Mailer};
use agentflow_core::store::{MemoryStore, PgStore, Store};
use agentflow_core::sweep;
use agentflow_llm::provider::LlmProvider;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing goes to a file so it does not interleave with the prompt.
    if std::env::var("RUST_LOG").is_ok() {
        let file = std::fs::File::create("/tmp/agentflow.log")?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(file))
            .init();
    }

    let mut startup_notice: Option<String> = None;
    let pool = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let mut fallback = |reason: String| {
                tracing::warn!(%reason, "falling back to ephemeral mode");
                startup_notice = Some(format!(
                    "notice: {reason}; running in ephemeral mode, nothing will be persisted."
                ));
            };
            match tokio::time::timeout(
                Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
                sqlx::postgres::PgPoolOptions::new().max_connections(8).connect(&url),
            )
            .await
            {
                Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
                    Ok(()) => {
                        tracing::info!("database connected and migrations applied");
                        Some(pool)
                    }
                    Err(e) => {
                        fallback(format!("database migration failed ({e})"));
                        None
                    }
                },
                Ok(Err(e)) => {
                    fallback(format!("could not connect to DATABASE_URL ({e})"));
                    None
                }
                Err(_) => {
                    fallback(format!(
                        "database connect timed out after {DB_CONNECT_TIMEOUT_SECS}s"
                    ));
                    None
                }
            }
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, running in ephemeral mode");
            startup_notice =
                Some("notice: DATABASE_URL not set; running in ephemeral mode.".to_string());
            None
        }
    };

    let cfg = match &pool {
        Some(pool) => AgentCfg::load(pool).await?,
        None => AgentCfg::default(),
    };
    let cfg = Arc::new(cfg);

    let store: Arc<dyn Store> = match pool {
        Some(pool) => Arc::new(PgStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };

    let Some(provider) = agentflow_llm::http::from_env() else {
        anyhow::bail!("AGENTFLOW_LLM_API_KEY is not set; a text-generation provider is required");
    };
    tracing::info!(name = provider.name(), model = provider.model(), "LLM provider initialized");
    let llm: Arc<dyn LlmProvider> = Arc::new(provider);

    let mailer: Arc<dyn Mailer> = match GmailMailer::from_env() {
        Some(mailer) => Arc::new(mailer),
        None => {
            tracing::warn!("AGENTFLOW_GMAIL_TOKEN not set, send_email will fail");
            Arc::new(DisabledMailer)
        }
    };

    let token = CancellationToken::new();
    spawn_sigint_canceler(token.clone());
    let sweep_handle = sweep::run_reminder_sweep(
        store.clone(),
        Duration::from_secs(cfg.reminder_sweep_interval_secs),
        token.clone(),
    );

    let session = repl::Session {
        agent: Agent::new(store.clone(), llm.clone(), mailer, cfg.clone()),
        store,
        llm,
        cfg,
        user_id: resolve_user_id(),
    };
    let result = repl::run(session, token.clone(), startup_notice).await;

    token.cancel();
    if let Err(e) = sweep_handle.await {
        tracing::warn!(error = %e, "reminder sweep task ended abnormally");
    }
    result
}

/// `AGENTFLOW_USER_ID` if it is a UUID, else a stable id derived from `$USER`.
fn resolve_user_id() -> Uuid {
    if let Ok(raw) = std::env::var("AGENTFLOW_USER_ID") {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => return id,
            Err(e) => tracing::warn!(error = %e, "AGENTFLOW_USER_ID is not a UUID, ignoring"),
        }
    }
    let name = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("agentflow:{name}").as_bytes())
}

fn spawn_sigint_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            if let Ok(mut sigint) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            {
                let _ = sigint.recv().await;
                token.cancel();
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });
}
