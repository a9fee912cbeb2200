//! Transcript rendering and export.

use crate::session::{Role, Session, Turn};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Text rendering of the visible dialogue. The system directive is left out.
pub fn render_text(session: &Session) -> String {
    let partner = session.scenario().partner_label;
    session
        .dialogue()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "You",
                _ => partner,
            };
            format!("{speaker}: {}\n", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// JSON dump of a session, system turn included.
#[derive(Debug, Serialize)]
pub struct TranscriptExport<'a> {
    pub session_id: Uuid,
    pub scenario: String,
    pub title: &'a str,
    pub exported_at: DateTime<Utc>,
    pub turns: &'a [Turn],
}

impl<'a> TranscriptExport<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session_id: session.id(),
            scenario: session.scenario().key.to_string(),
            title: session.scenario().title,
            exported_at: Utc::now(),
            turns: session.turns(),
        }
    }
}

pub fn export_json(session: &Session) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&TranscriptExport::new(session))
}
