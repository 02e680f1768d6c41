use std::io::{self, Write};
use std::sync::Arc;

use agentflow_core::agent::Agent;
use agentflow_core::config::AgentCfg;
use agentflow_core::insights;
use agentflow_core::store::Store;
use agentflow_llm::provider::LlmProvider;
use chrono::Utc;
use rustyline::error::ReadlineError;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::command::{self, Command, HELP};

/// Everything one REPL session needs.
pub struct Session {
    pub agent: Agent,
    pub store: Arc<dyn Store>,
    pub llm: Arc<dyn LlmProvider>,
    pub cfg: Arc<AgentCfg>,
    pub user_id: Uuid,
}

pub async fn run(
    session: Session,
    token: CancellationToken,
    startup_notice: Option<String>,
) -> anyhow::Result<()> {
    if let Some(notice) = startup_notice {
        println!("{notice}");
    }
    println!("agentflow ready (user {}). /help for commands.", session.user_id);

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    spawn_input_thread(line_tx, ready_rx);
    request_next_prompt(&ready_tx);

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = line_rx.recv() => line,
        };
        let Some(event) = line else {
            break;
        };

        let line = match event {
            InputEvent::Line(line) => line,
            InputEvent::Interrupted => {
                token.cancel();
                break;
            }
            InputEvent::Eof => break,
            InputEvent::Error(err) => {
                eprintln!("input error: {err}");
                break;
            }
        };

        match command::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(cmd) => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    result = execute(&session, cmd) => {
                        if let Err(e) = result {
                            println!("error: {e}");
                        }
                    }
                }
            }
            Err(msg) => println!("{msg}"),
        }
        io::stdout().flush()?;
        request_next_prompt(&ready_tx);
    }
    drop(ready_tx);
    println!();
    Ok(())
}

async fn execute(s: &Session, cmd: Command) -> anyhow::Result<()> {
    let store = s.store.as_ref();
    match cmd {
        Command::Empty | Command::Quit => {}
        Command::Help => println!("{HELP}"),
        Command::Agent(text) => print_json(&s.agent.run(s.user_id, &text).await)?,
        Command::Prefs => print_json(&store.get_preferences(s.user_id).await?.as_map())?,
        Command::Set { key, value } => {
            store.set_preference(s.user_id, key, &value).await?;
            println!("{} = {value}", key.as_db_str());
        }
        Command::Audit => {
            let entries = store.list_audit(s.user_id, None).await?;
            if entries.is_empty() {
                println!("no actions recorded");
            }
            for e in entries {
                println!(
                    "{}  {:<18} {}",
                    e.created_at.format("%Y-%m-%d %H:%M:%S"),
                    e.action,
                    e.payload
                );
            }
        }
        Command::Today => {
            print_json(&insights::explain_today(store, s.user_id, Utc::now()).await?)?
        }
        Command::Risk => {
            let risk = insights::payment_risk(store, s.llm.as_ref(), &s.cfg, s.user_id).await?;
            print_json(&risk.into_envelope())?;
        }
        Command::Dashboard => print_json(&insights::dashboard(store, s.user_id).await?)?,
        Command::Clients => print_json(&store.list_clients(s.user_id).await?)?,
        Command::Invoices => print_json(&store.list_invoices(s.user_id).await?)?,
        Command::Reminders => print_json(&store.list_reminders(s.user_id).await?)?,
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn request_next_prompt(ready_tx: &std::sync::mpsc::Sender<()>) {
    let _ = ready_tx.send(());
}

// rustyline blocks, so it lives on its own thread and only prompts when asked.
fn spawn_input_thread(
    line_tx: mpsc::UnboundedSender<InputEvent>,
    ready_rx: std::sync::mpsc::Receiver<()>,
) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            match editor.readline("agentflow> ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                    if line_tx.send(InputEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    let _ = line_tx.send(InputEvent::Interrupted);
                    break;
                }
                Err(ReadlineError::Eof) => {
                    let _ = line_tx.send(InputEvent::Eof);
                    break;
                }
                Err(e) => {
                    let _ = line_tx.send(InputEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });
}

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}
