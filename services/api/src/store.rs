//! In-memory session storage.
//!
//! Each session sits behind its own async mutex, which is held for the whole
//! provider call of a submission: a session never has two turns in flight,
//! while different sessions proceed independently. Sessions leave the store
//! when deleted or after sitting idle past the configured timeout.

use roleplay_core::Session;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::Instant,
};
use tracing::info;
use uuid::Uuid;

pub type SharedSession = Arc<Mutex<Session>>;

struct Entry {
    session: SharedSession,
    last_access: Instant,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `session` under its own id and returns the shared handle.
    pub async fn insert(&self, session: Session) -> SharedSession {
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));
        let entry = Entry {
            session: handle.clone(),
            last_access: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        handle
    }

    /// Looks up a session and marks it as recently used.
    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_access = Instant::now();
        Some(entry.session.clone())
    }

    /// Drops a session. Returns `false` if it was not stored.
    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Drops every session not accessed within `max_idle` and returns how many went.
    ///
    /// A submission already holding a session's handle finishes normally.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_access.elapsed() < max_idle);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Runs [`Self::evict_idle`] every `period` until the task is aborted.
    pub fn spawn_idle_sweeper(
        self: Arc<Self>,
        max_idle: Duration,
        period: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = self.evict_idle(max_idle).await;
                if evicted > 0 {
                    let remaining = self.len().await;
                    info!(evicted, remaining, "Evicted idle sessions");
                }
            }
        })
    }
}
