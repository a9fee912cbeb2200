//! API Models
//!
//! Request and response bodies of the HTTP API, with `utoipa` schemas for the
//! generated OpenAPI document.

use chrono::{DateTime, Utc};
use roleplay_core::{
    Role, Scenario, Session, Turn,
    questions::{QuestionFormat, TopicSpec},
    scenario::{CommunicationType, SocialRole},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ScenarioSummary {
    #[schema(example = "feedback@1")]
    pub key: String,
    pub title: String,
    #[schema(example = "Principal")]
    pub partner_label: String,
    #[schema(value_type = String, example = "understanding_oriented")]
    pub communication_type: CommunicationType,
    #[schema(value_type = String, example = "subordinate")]
    pub social_role: SocialRole,
}

impl From<&Scenario> for ScenarioSummary {
    fn from(scenario: &Scenario) -> Self {
        Self {
            key: scenario.key.to_string(),
            title: scenario.title.to_string(),
            partner_label: scenario.partner_label.to_string(),
            communication_type: scenario.communication_type,
            social_role: scenario.social_role,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ScenarioDetail {
    #[serde(flatten)]
    pub summary: ScenarioSummary,
    /// Instructions for the human participant.
    pub instructions: String,
    /// The behavior directive the partner model follows.
    pub partner_directive: String,
}

impl From<&Scenario> for ScenarioDetail {
    fn from(scenario: &Scenario) -> Self {
        Self {
            summary: scenario.into(),
            instructions: scenario.instructions.to_string(),
            partner_directive: scenario.partner_directive.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TurnView {
    #[schema(value_type = String, example = "user")]
    pub role: Role,
    pub content: String,
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionView {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(example = "feedback@1")]
    pub scenario: String,
    pub created_at: DateTime<Utc>,
    /// The full turn log, starting with the system directive.
    pub turns: Vec<TurnView>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id(),
            scenario: session.scenario().key.to_string(),
            created_at: session.created_at(),
            turns: session.turns().iter().map(TurnView::from).collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSessionPayload {
    #[schema(example = "feedback")]
    pub scenario: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SwitchScenarioPayload {
    #[schema(example = "feedback@2")]
    pub scenario: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitTurnPayload {
    #[schema(example = "I have concerns about the criteria")]
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SubmitTurnResponse {
    pub user: TurnView,
    pub partner: TurnView,
}

#[derive(Deserialize, ToSchema, Debug, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptFormat {
    #[default]
    Text,
    Json,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TranscriptQuery {
    /// `text` (default) or `json`.
    #[param(value_type = Option<String>)]
    pub format: Option<TranscriptFormat>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct TopicView {
    pub title: String,
    pub default_count: u32,
}

impl From<&TopicSpec> for TopicView {
    fn from(topic: &TopicSpec) -> Self {
        Self {
            title: topic.title.to_string(),
            default_count: topic.default_count,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateQuestionsPayload {
    /// Plain text the questions are drawn from.
    pub source_text: String,
    #[schema(example = "Teil 2: Bildung und Ungleichheit")]
    pub topic: String,
    #[schema(example = 8)]
    pub count: u32,
    #[serde(default)]
    #[schema(value_type = String, example = "multiple_choice")]
    pub format: QuestionFormat,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct GenerateQuestionsResponse {
    pub topic: String,
    pub questions: Vec<String>,
    /// Plain-text export of the questions.
    pub export: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleplay_core::ScenarioRegistry;

    #[test]
    fn test_scenario_detail_flattens_summary() {
        let registry = ScenarioRegistry::builtin();
        let scenario = registry.resolve("club-choice").unwrap();
        let detail = ScenarioDetail::from(scenario.as_ref());

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["key"], "club-choice@1");
        assert_eq!(json["partner_label"], "Student");
        assert_eq!(json["communication_type"], "strategic");
        assert_eq!(json["social_role"], "superior");
        assert!(json["instructions"].as_str().unwrap().contains("Günter"));
    }

    #[test]
    fn test_turn_view_serialization() {
        let view = TurnView::from(&Turn::partner("Come in."));
        let json = serde_json::to_string(&view).unwrap();
        assert_eq!(json, r#"{"role":"partner","content":"Come in."}"#);
    }

    #[test]
    fn test_create_session_payload_missing_field() {
        let result: Result<CreateSessionPayload, _> = serde_json::from_str("{}");
        assert!(result.is_err());
    }

    #[test]
    fn test_transcript_format_deserialization() {
        let query: TranscriptQuery = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(query.format, Some(TranscriptFormat::Json));
        assert!(serde_json::from_str::<TranscriptFormat>(r#""pdf""#).is_err());
        assert_eq!(TranscriptFormat::default(), TranscriptFormat::Text);
    }

    #[test]
    fn test_generate_questions_payload_defaults_format() {
        let json = r#"{"source_text":"Text","topic":"Teil 3: INTER_A","count":5}"#;
        let payload: GenerateQuestionsPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.format, QuestionFormat::Mixed);
        assert_eq!(payload.count, 5);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Session not found"}"#);
    }
}
