use std::sync::Arc;

use agentflow_llm::provider::LlmProvider;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::action::{ActionContext, ActionKind};
use crate::config::AgentCfg;
use crate::error::AgentError;
use crate::interpreter::Interpreter;
use crate::mail::Mailer;
use crate::store::Store;
use crate::types::{Envelope, ParsedInstruction, Preferences};

/// Command agent: interprets one command, runs at most one action, records
/// the audit entry and learned preferences, and always answers with an
/// [`Envelope`].
///
/// Holds no per-user state; concurrent runs share nothing but the store.
pub struct Agent {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    interpreter: Interpreter,
    cfg: Arc<AgentCfg>,
}

impl Agent {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LlmProvider>,
        mailer: Arc<dyn Mailer>,
        cfg: Arc<AgentCfg>,
    ) -> Self {
        let interpreter = Interpreter::new(llm, &cfg);
        Self { store, mailer, interpreter, cfg }
    }

    /// Never fails: every error becomes `{ok:false, error}`.
    pub async fn run(&self, user_id: Uuid, command: &str) -> Envelope {
        tracing::info!(%user_id, command_len = command.len(), "agent run started");
        match self.try_run(user_id, command).await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "agent run failed");
                Envelope::error(e.to_string())
            }
        }
    }

    async fn try_run(&self, user_id: Uuid, command: &str) -> Result<Envelope, AgentError> {
        let prefs = self.store.get_preferences(user_id).await?;

        match self.interpreter.interpret(&prefs, command).await? {
            ParsedInstruction::Text { message } => Ok(Envelope::message(message)),
            ParsedInstruction::FunctionCall { name, args } => {
                let kind = ActionKind::from_name(&name).ok_or(AgentError::UnknownFunction(name))?;
                let result = self.dispatch(user_id, &prefs, kind, &args).await?;
                Ok(Envelope::function(kind.name(), result))
            }
        }
    }

    /// Validate, execute, then audit and learn. Nothing is recorded unless
    /// the handler succeeds, and nothing already committed is rolled back.
    pub async fn dispatch(
        &self,
        user_id: Uuid,
        prefs: &Preferences,
        kind: ActionKind,
        args: &Map<String, Value>,
    ) -> Result<Value, AgentError> {
        let action = kind.name();
        kind.validate(args)
            .map_err(|reason| AgentError::InvalidArguments { action, reason })?;

        let ctx = ActionContext {
            store: self.store.as_ref(),
            mailer: self.mailer.as_ref(),
            cfg: &self.cfg,
            prefs,
            now: Utc::now(),
        };
        let result = kind
            .execute(&ctx, args, user_id)
            .await
            .map_err(|source| AgentError::HandlerFailure { action, source })?;

        self.store
            .append_audit(user_id, action, &Value::Object(args.clone()))
            .await?;

        if let Some((key, value)) = kind.learned_preference(args) {
            self.store.set_preference(user_id, key, &value).await?;
            tracing::info!(%user_id, key = key.as_db_str(), value = %value, "preference learned");
        }

        tracing::info!(%user_id, action, "action dispatched");
        Ok(result)
    }
}
