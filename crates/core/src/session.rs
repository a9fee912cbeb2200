//! Conversation sessions and the controller that drives them.
//!
//! A [`Session`] is an append-only log of [`Turn`]s bound to one active
//! scenario. The log always starts with the scenario's partner directive as a
//! system turn; after that, user and partner turns alternate. Sessions are
//! plain values: callers own them and hand them to the [`SessionController`]
//! by `&mut` for each operation.

use crate::{
    llm_client::{CompletionSettings, TurnExecutor},
    scenario::{Scenario, ScenarioRegistry},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Errors a caller can recover from by correcting its input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Scenario not found: {0}")]
    NotFound(String),
}

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Partner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Partner => write!(f, "partner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn partner(content: impl Into<String>) -> Self {
        Self {
            role: Role::Partner,
            content: content.into(),
        }
    }
}

/// A single user's role-play conversation.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    scenario: Arc<Scenario>,
    turns: Vec<Turn>,
}

impl Session {
    fn seeded(scenario: Arc<Scenario>) -> Self {
        let mut session = Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            scenario,
            turns: Vec::new(),
        };
        session.reseed();
        session
    }

    /// Discards every turn and puts the partner directive back as the only one.
    fn reseed(&mut self) {
        self.turns.clear();
        self.turns
            .push(Turn::system(self.scenario.partner_directive));
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn scenario(&self) -> &Arc<Scenario> {
        &self.scenario
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns visible to the participant, i.e. everything but the system directive.
    pub fn dialogue(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|t| t.role != Role::System)
    }
}

/// Owns the collaborators a session needs and applies the lifecycle rules.
pub struct SessionController {
    registry: Arc<ScenarioRegistry>,
    executor: Arc<dyn TurnExecutor>,
    settings: CompletionSettings,
}

impl SessionController {
    pub fn new(
        registry: Arc<ScenarioRegistry>,
        executor: Arc<dyn TurnExecutor>,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            registry,
            executor,
            settings,
        }
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// Creates a fresh session for `scenario` (`slug` or `slug@version`).
    pub fn start(&self, scenario: &str) -> Result<Session, SessionError> {
        let scenario = self.registry.resolve(scenario)?;
        let session = Session::seeded(scenario);
        info!(session_id = %session.id, scenario = %session.scenario.key, "Session started");
        Ok(session)
    }

    /// Appends `text` as a user turn and the provider's reply as a partner turn.
    ///
    /// Blank input is rejected without touching the session. A provider
    /// failure does not fail the call: the error description is appended as
    /// the partner turn so the transcript stays consistent and the user can
    /// simply try again.
    #[instrument(skip_all, fields(session_id = %session.id, scenario = %session.scenario.key))]
    pub async fn submit_user_turn<'s>(
        &self,
        session: &'s mut Session,
        text: &str,
    ) -> Result<&'s Turn, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::Validation(
                "message must not be empty".to_string(),
            ));
        }

        session.turns.push(Turn::user(text));

        let reply = match self.executor.complete(&session.turns, &self.settings).await {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Completion failed; recording error as partner turn");
                format!("Error: {e}")
            }
        };
        session.turns.push(Turn::partner(reply));
        info!(turns = session.turns.len(), "Turn completed");

        let Some(reply) = session.turns.last() else {
            unreachable!("a partner turn was just appended");
        };
        Ok(reply)
    }

    /// Restarts the conversation on the current scenario.
    pub fn reset(&self, session: &mut Session) {
        session.reseed();
        info!(session_id = %session.id, scenario = %session.scenario.key, "Session reset");
    }

    /// Moves the session to another scenario and restarts it.
    ///
    /// An unknown scenario leaves the session untouched.
    pub fn switch_scenario(&self, session: &mut Session, scenario: &str) -> Result<(), SessionError> {
        let scenario = self.registry.resolve(scenario)?;
        session.scenario = scenario;
        session.reseed();
        info!(session_id = %session.id, scenario = %session.scenario.key, "Scenario switched");
        Ok(())
    }
}
