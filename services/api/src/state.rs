//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared session
//! controller, question generator and session store.

use crate::store::SessionStore;
use roleplay_core::{SessionController, questions::QuestionGenerator};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
    pub questions: Arc<QuestionGenerator>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(controller: SessionController, questions: QuestionGenerator) -> Self {
        Self {
            controller: Arc::new(controller),
            questions: Arc::new(questions),
            sessions: Arc::new(SessionStore::new()),
        }
    }
}
