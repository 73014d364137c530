//! Agent workflow adapters: one text-chunk streaming contract over webhook,
//! SSE chat, flow-run and prediction backends.
//!
//! The [`AgentRegistry`] maps agent ids to adapters; every adapter implements
//! [`AgentClient`], whose streams never fail: faults arrive as a single chunk
//! prefixed with [`WARNING_MARKER`].

pub mod adapters;
pub mod config;
pub mod error;
pub mod registry;
pub mod stream;
pub mod transport;
pub mod types;

pub use adapters::{AgentClient, DifyAgent, FlowiseAgent, LangflowAgent, WebhookAgent};
pub use config::{ResponseMode, Settings};
pub use error::{AgentflowError, Result};
pub use registry::{AgentConstructor, AgentRegistry};
pub use stream::{TextStream, WARNING_MARKER};
pub use transport::ACCESS_TOKEN_HEADER;
pub use types::{
    AgentDescriptor, AgentEnvConfig, ChatRole, ChatTurn, ConnectionInfo, EnvRequirements,
    HealthSnapshot, Platform,
};
