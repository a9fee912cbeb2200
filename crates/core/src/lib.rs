//! Role-play trainer core.
//!
//! Scenario catalogue, conversation sessions and the boundary to the external
//! chat-completion provider. The HTTP service and the terminal client are thin
//! shells around the types exported here.

pub mod config;
pub mod llm_client;
pub mod questions;
pub mod retry;
pub mod scenario;
pub mod session;
pub mod transcript;

pub use llm_client::{CompletionSettings, ProviderError, TurnExecutor};
pub use scenario::{Scenario, ScenarioId, ScenarioKey, ScenarioRegistry};
pub use session::{Role, Session, SessionController, SessionError, Turn};
