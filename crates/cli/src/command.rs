//! REPL line parsing. Anything not starting with `/` goes to the agent.

use agentflow_core::types::PreferenceKey;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Empty,
    Agent(String),
    Prefs,
    Set { key: PreferenceKey, value: String },
    Audit,
    Today,
    Risk,
    Dashboard,
    Clients,
    Invoices,
    Reminders,
    Help,
    Quit,
}

pub const HELP: &str = "\
Type a request in plain words, or one of:
  /prefs                 show your preferences
  /set <key> <value>     set reminder_delay, email_tone or invoice_format
  /audit                 show the action log
  /today                 summarize today's actions
  /risk                  ask the model which clients look risky
  /dashboard             revenue, client and invoice totals
  /clients /invoices /reminders
  /q                     quit";

pub fn parse(line: &str) -> Result<Command, String> {
    let text = line.trim();
    if text.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = text.strip_prefix('/') else {
        return Ok(Command::Agent(text.to_owned()));
    };

    let (name, tail) = match rest.split_once(char::is_whitespace) {
        Some((name, tail)) => (name, tail.trim()),
        None => (rest, ""),
    };

    let cmd = match name {
        "q" | "quit" | "exit" => Command::Quit,
        "help" | "h" => Command::Help,
        "prefs" => Command::Prefs,
        "audit" => Command::Audit,
        "today" => Command::Today,
        "risk" => Command::Risk,
        "dashboard" => Command::Dashboard,
        "clients" => Command::Clients,
        "invoices" => Command::Invoices,
        "reminders" => Command::Reminders,
        "set" => parse_set(tail)?,
        other => return Err(format!("unknown command /{other}, try /help")),
    };
    Ok(cmd)
}

fn parse_set(tail: &str) -> Result<Command, String> {
    let Some((key, value)) = tail.split_once(char::is_whitespace) else {
        return Err("usage: /set <key> <value>".into());
    };
    let key = PreferenceKey::from_db(key).ok_or_else(|| {
        format!("unknown preference {key:?}; expected reminder_delay, email_tone or invoice_format")
    })?;
    let value = key
        .normalize(value)
        .ok_or_else(|| format!("invalid value {:?} for {}", value.trim(), key.as_db_str()))?;
    Ok(Command::Set { key, value })
}
