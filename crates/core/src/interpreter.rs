//! Free text → [`ParsedInstruction`] via one model call.
//!
//! The model must answer with exactly one of two JSON objects:
//! `{"type":"text","message":…}` or `{"type":"function","name":…,"args":{…}}`.
//! Anything else is an [`InterpretError`]; nothing is repaired or re-asked.

use std::sync::Arc;

use agentflow_llm::provider::{ChatMessage, CompletionRequest, LlmError, LlmProvider};
use serde_json::{Map, Value};

use crate::action::registry;
use crate::config::AgentCfg;
use crate::types::{ParsedInstruction, Preferences};

const SYSTEM_INSTRUCTION: &str = "You are the command agent of a small-business CRM. \
You ONLY reply with a single JSON object. No markdown, no code fences, no explanation.\n\
If one of the available functions should run, reply exactly:\n\
{\"type\": \"function\", \"name\": \"<function name>\", \"args\": { <arguments> }}\n\
Otherwise reply exactly:\n\
{\"type\": \"text\", \"message\": \"<your reply>\"}";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpretError {
    #[error("model response is empty")]
    Empty,
    #[error("model response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("model response is not a JSON object")]
    NotAnObject,
    #[error("unknown response type {0:?}")]
    UnknownType(String),
    #[error("response field {0:?} is missing")]
    MissingField(&'static str),
    #[error("response field {field:?} must be {expected}")]
    WrongFieldType { field: &'static str, expected: &'static str },
    #[error("unexpected response field {0:?}")]
    UnexpectedField(String),
}

/// Strictly parse a raw model response. Only surrounding whitespace is
/// tolerated.
pub fn parse_instruction(raw: &str) -> Result<ParsedInstruction, InterpretError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InterpretError::Empty);
    }
    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| InterpretError::InvalidJson(e.to_string()))?;
    let Value::Object(mut obj) = value else {
        return Err(InterpretError::NotAnObject);
    };

    let kind = match obj.remove("type") {
        Some(Value::String(s)) => s,
        Some(_) => {
            return Err(InterpretError::WrongFieldType { field: "type", expected: "a string" });
        }
        None => return Err(InterpretError::MissingField("type")),
    };

    let instruction = match kind.as_str() {
        "text" => ParsedInstruction::Text { message: take_string(&mut obj, "message")? },
        "function" => {
            let name = take_string(&mut obj, "name")?;
            let args = match obj.remove("args") {
                Some(Value::Object(args)) => args,
                Some(_) => {
                    return Err(InterpretError::WrongFieldType {
                        field: "args",
                        expected: "an object",
                    });
                }
                None => return Err(InterpretError::MissingField("args")),
            };
            ParsedInstruction::FunctionCall { name, args }
        }
        _ => return Err(InterpretError::UnknownType(kind)),
    };

    if let Some(extra) = obj.keys().next() {
        return Err(InterpretError::UnexpectedField(extra.clone()));
    }
    Ok(instruction)
}

fn take_string(
    obj: &mut Map<String, Value>,
    field: &'static str,
) -> Result<String, InterpretError> {
    match obj.remove(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(InterpretError::WrongFieldType { field, expected: "a string" }),
        None => Err(InterpretError::MissingField(field)),
    }
}

/// System instruction + a user message carrying preferences, the command and
/// the action schema.
pub fn build_messages(prefs: &Preferences, command: &str) -> Vec<ChatMessage> {
    let functions = serde_json::to_string_pretty(&registry()).unwrap_or_else(|_| "[]".to_string());
    vec![
        ChatMessage::system(SYSTEM_INSTRUCTION),
        ChatMessage::user(format!(
            "User preferences:\n{}\n\nUser command:\n{}\n\nAvailable functions:\n{}",
            prefs.summary(),
            command.trim(),
            functions
        )),
    ]
}

/// Failure of one interpretation: either the call or the response.
#[derive(Debug, thiserror::Error)]
pub enum InterpretFailure {
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error(transparent)]
    Parse(#[from] InterpretError),
}

/// Stateless wrapper around the text-generation provider.
pub struct Interpreter {
    llm: Arc<dyn LlmProvider>,
    max_tokens: u32,
    temperature: f32,
}

impl Interpreter {
    pub fn new(llm: Arc<dyn LlmProvider>, cfg: &AgentCfg) -> Self {
        Self {
            llm,
            max_tokens: cfg.model_max_tokens,
            temperature: cfg.model_temperature,
        }
    }

    pub async fn interpret(
        &self,
        prefs: &Preferences,
        command: &str,
    ) -> Result<ParsedInstruction, InterpretFailure> {
        let request = CompletionRequest {
            messages: build_messages(prefs, command),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let response = self.llm.complete(request).await?;
        tracing::debug!(
            provider = self.llm.name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            response_len = response.content.len(),
            "interpreter response received"
        );

        parse_instruction(&response.content).map_err(|e| {
            tracing::debug!(
                error = %e,
                raw = %preview(&response.content, 240),
                "interpreter parse failed"
            );
            InterpretFailure::Parse(e)
        })
    }
}

fn preview(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_llm::provider::{MockProvider, Role};
    use serde_json::json;

    #[test]
    fn parses_text_shape() {
        let parsed = parse_instruction(r#"{"type":"text","message":"Hello"}"#).unwrap();
        assert_eq!(parsed, ParsedInstruction::Text { message: "Hello".into() });
    }

    #[test]
    fn parses_function_shape_with_whitespace() {
        let raw = json!({"type": "function", "name": "create_client", "args": {"name": "Acme"}});
        let parsed = parse_instruction(&format!("\n  {raw}  \n")).unwrap();
        let ParsedInstruction::FunctionCall { name, args } = parsed else {
            panic!("expected function call");
        };
        assert_eq!(name, "create_client");
        assert_eq!(args.get("name"), Some(&json!("Acme")));
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            parse_instruction("Sure! I'll create that client."),
            Err(InterpretError::InvalidJson(_))
        ));
        assert_eq!(parse_instruction("   "), Err(InterpretError::Empty));
    }

    #[test]
    fn does_not_strip_code_fences() {
        let fenced = "```json\n{\"type\":\"text\",\"message\":\"hi\"}\n```";
        assert!(matches!(parse_instruction(fenced), Err(InterpretError::InvalidJson(_))));
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert_eq!(parse_instruction("[1,2]"), Err(InterpretError::NotAnObject));
        assert_eq!(
            parse_instruction(r#"{"type":"tool","name":"x"}"#),
            Err(InterpretError::UnknownType("tool".into()))
        );
        assert_eq!(
            parse_instruction(r#"{"message":"hi"}"#),
            Err(InterpretError::MissingField("type"))
        );
        assert_eq!(
            parse_instruction(r#"{"type":"text","message":5}"#),
            Err(InterpretError::WrongFieldType { field: "message", expected: "a string" })
        );
        assert_eq!(
            parse_instruction(r#"{"type":"function","name":"send_email"}"#),
            Err(InterpretError::MissingField("args"))
        );
        assert_eq!(
            parse_instruction(r#"{"type":"function","name":"send_email","args":"to=a"}"#),
            Err(InterpretError::WrongFieldType { field: "args", expected: "an object" })
        );
    }

    #[test]
    fn rejects_extra_fields() {
        assert_eq!(
            parse_instruction(r#"{"type":"text","message":"hi","name":"create_client"}"#),
            Err(InterpretError::UnexpectedField("name".into()))
        );
    }

    #[test]
    fn prompt_carries_preferences_command_and_schema() {
        let prefs = Preferences { email_tone: "friendly".into(), ..Preferences::default() };
        let messages = build_messages(&prefs, "  invoice Acme 500  ");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("\"type\": \"function\""));

        let user = &messages[1].content;
        assert!(user.contains("email_tone: friendly"));
        assert!(user.contains("reminder_delay: 3 days"));
        assert!(user.contains("User command:\ninvoice Acme 500\n"));
        for name in ["create_client", "create_invoice", "send_email", "schedule_reminder"] {
            assert!(user.contains(name), "schema should list {name}");
        }
    }

    #[tokio::test]
    async fn interpret_makes_one_call_with_config() {
        let mock = Arc::new(MockProvider::new(r#"{"type":"text","message":"ok"}"#));
        let cfg = AgentCfg { model_max_tokens: 321, ..AgentCfg::default() };
        let interpreter = Interpreter::new(mock.clone(), &cfg);

        let parsed = interpreter.interpret(&Preferences::default(), "hi").await.unwrap();
        assert_eq!(parsed, ParsedInstruction::Text { message: "ok".into() });
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.requests()[0].max_tokens, 321);
    }

    #[tokio::test]
    async fn interpret_surfaces_model_failure() {
        let interpreter =
            Interpreter::new(Arc::new(MockProvider::unavailable("down")), &AgentCfg::default());
        let err = interpreter.interpret(&Preferences::default(), "hi").await.unwrap_err();
        assert!(matches!(err, InterpretFailure::Model(_)));
    }
}
