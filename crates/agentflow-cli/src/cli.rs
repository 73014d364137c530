//! CLI argument definitions for agentflow.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// agentflow -- talk to agent workflow backends from the terminal.
#[derive(Parser)]
#[command(
    name = "agentflow",
    version,
    about = "agentflow -- chat with n8n, Dify, Langflow and Flowise workflows",
    long_about = "Streams answers from agent workflow backends through one adapter layer. \
                  Backends are configured through environment variables or a .env file."
)]
pub struct Cli {
    /// `.env` file filling variables the process environment does not set.
    #[arg(long, global = true, default_value = ".env")]
    pub env_file: PathBuf,

    /// Access token forwarded to every backend in the `access_token` header.
    #[arg(
        long,
        global = true,
        env = "AGENTFLOW_ACCESS_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    pub access_token: String,

    /// Log at debug level (`RUST_LOG` still wins).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the available agents.
    Agents {
        /// Print the list as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Probe agents and show their connection status.
    Status {
        /// Agent id to probe; all agents when omitted.
        agent: Option<String>,

        /// Print the snapshots as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ask one question and stream the answer.
    Ask {
        /// Agent id; the first available agent when omitted.
        #[arg(long, short)]
        agent: Option<String>,

        /// Session id sent to the backend; a fresh one when omitted.
        #[arg(long, short)]
        session: Option<String>,

        /// The question.
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },

    /// Start an interactive chat session.
    Chat {
        /// Agent id; the first available agent when omitted.
        #[arg(long, short)]
        agent: Option<String>,
    },
}
