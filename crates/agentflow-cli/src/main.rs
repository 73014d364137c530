//! CLI entry point for agentflow.
//!
//! This binary provides the `agentflow` command: list agents, probe their
//! status, ask a single question, or chat interactively.

mod cli;
mod session;
mod status;

use std::io::{self, Write as _};

use agentflow_core::{AgentRegistry, Settings};
use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::session::Conversation;
use crate::status::StatusBoard;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" }, cli.json_logs);

    let settings = Settings::load(&cli.env_file);
    let registry = AgentRegistry::new(settings);
    info!(env_file = %cli.env_file.display(), "configuration loaded");

    match cli.command {
        Commands::Agents { json } => cmd_agents(&registry, json),
        Commands::Status { agent, json } => {
            cmd_status(&registry, &cli.access_token, agent.as_deref(), json).await
        }
        Commands::Ask {
            agent,
            session,
            question,
        } => {
            let agent = resolve_agent(&registry, agent.as_deref())?;
            let conversation = match session {
                Some(id) => Conversation::with_session_id(id),
                None => Conversation::new(),
            };
            cmd_ask(&registry, &cli.access_token, &agent, conversation, &question.join(" ")).await
        }
        Commands::Chat { agent } => {
            let agent = resolve_agent(&registry, agent.as_deref())?;
            cmd_chat(&registry, &cli.access_token, agent).await
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_agents(registry: &AgentRegistry, json: bool) -> Result<()> {
    let agents = registry.list_available_agents();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&agents).context("failed to encode agent list")?
        );
        return Ok(());
    }

    for agent in agents {
        let requirements = registry
            .env_requirements(&agent.id)
            .map(|r| r.required.join(", "))
            .unwrap_or_default();
        println!("  {:<10} {:<14} requires {requirements}", agent.id, agent.label);
    }
    Ok(())
}

async fn cmd_status(
    registry: &AgentRegistry,
    access_token: &str,
    agent: Option<&str>,
    json: bool,
) -> Result<()> {
    let ids: Vec<String> = match agent {
        Some(id) => vec![id.to_owned()],
        None => registry
            .list_available_agents()
            .into_iter()
            .map(|a| a.id)
            .collect(),
    };

    let mut board = StatusBoard::new(registry, access_token);
    let mut statuses = Vec::with_capacity(ids.len());
    for id in &ids {
        statuses.push(board.status(id, true).await);
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&statuses).context("failed to encode status")?
        );
    } else {
        for status in &statuses {
            println!("{}\n", status::render(status));
        }
    }
    Ok(())
}

async fn cmd_ask(
    registry: &AgentRegistry,
    access_token: &str,
    agent: &str,
    mut conversation: Conversation,
    question: &str,
) -> Result<()> {
    info!(agent, session_id = %conversation.session_id(), "asking question");
    session::ask(registry, agent, access_token, &mut conversation, question, print_chunk).await;
    println!();
    Ok(())
}

async fn cmd_chat(registry: &AgentRegistry, access_token: &str, mut agent: String) -> Result<()> {
    let mut conversation = Conversation::new();
    let mut board = StatusBoard::new(registry, access_token);
    board.select(&agent);

    println!();
    println!("  agentflow v{}", env!("CARGO_PKG_VERSION"));
    println!("  Agent: {agent}");
    println!("  Session: {}", conversation.session_id());
    println!("  Commands: /agent <id>, /status, /refresh, /reset, /quit");
    println!();

    let stdin = io::stdin();
    let mut line_buf = String::new();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                info!("EOF received, exiting");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                continue;
            }
        }

        let trimmed = line_buf.trim();
        if trimmed.is_empty() {
            continue;
        }

        match trimmed.split_once(' ').unwrap_or((trimmed, "")) {
            ("/quit" | "/exit" | "quit" | "exit", _) => break,
            ("/reset", _) => {
                conversation.reset();
                println!("  New session: {}\n", conversation.session_id());
            }
            ("/status", _) => {
                let status = board.status(&agent, false).await;
                println!("{}\n", status::render(&status));
            }
            ("/refresh", _) => {
                board.invalidate(&agent);
                let status = board.status(&agent, false).await;
                println!("{}\n", status::render(&status));
            }
            ("/agent", id) => {
                let id = id.trim();
                if registry.contains(id) {
                    agent = id.to_owned();
                    board.select(&agent);
                    conversation.reset();
                    println!("  Agent: {agent} (session {})\n", conversation.session_id());
                } else {
                    eprintln!("  Unknown agent `{id}`; run `agentflow agents` for the list.\n");
                }
            }
            (command, _) if command.starts_with('/') => {
                eprintln!("  Unknown command `{command}`.\n");
            }
            _ => {
                session::ask(registry, &agent, access_token, &mut conversation, trimmed, print_chunk)
                    .await;
                println!("\n");
            }
        }
    }

    info!("shutting down");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pick the requested agent, or the first available one.
fn resolve_agent(registry: &AgentRegistry, requested: Option<&str>) -> Result<String> {
    match requested {
        Some(id) if registry.contains(id) => Ok(id.to_owned()),
        Some(id) => bail!("unknown agent `{id}`; run `agentflow agents` for the list"),
        None => registry
            .list_available_agents()
            .into_iter()
            .next()
            .map(|a| a.id)
            .context("no agents are registered"),
    }
}

fn print_chunk(chunk: &str) {
    print!("{chunk}");
    io::stdout().flush().ok();
}

/// Initialize the tracing subscriber.  Logs go to stderr so streamed
/// answers on stdout stay clean.
fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
