//! Axum Handlers for the REST API
//!
//! Scenario browsing, the role-play session lifecycle and exam question
//! generation. It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{FromRequest, Path, Query, Request, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use roleplay_core::{
    SessionError,
    questions::{DEFAULT_TOPICS, QuestionError, QuestionRequest, render_export},
    transcript,
};
use std::sync::Arc;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{
    models::{
        CreateSessionPayload, ErrorResponse, GenerateQuestionsPayload, GenerateQuestionsResponse,
        ScenarioDetail, ScenarioSummary, SessionView, SubmitTurnPayload, SubmitTurnResponse,
        SwitchScenarioPayload, TopicView, TranscriptFormat, TranscriptQuery, TurnView,
    },
    state::AppState,
    store::SharedSession,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::BadGateway(message) => {
                warn!(%message, "Upstream provider failure");
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Validation(_) => Self::BadRequest(err.to_string()),
            SessionError::NotFound(_) => Self::NotFound(err.to_string()),
        }
    }
}

impl From<QuestionError> for ApiError {
    fn from(err: QuestionError) -> Self {
        match err {
            QuestionError::Validation(_) => Self::BadRequest(err.to_string()),
            QuestionError::Provider(_) => Self::BadGateway(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// `Json` whose rejections come back as `400` with an [`ErrorResponse`] body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalServerError(err.into())
    }
}

async fn find_session(state: &AppState, id: Uuid) -> Result<SharedSession, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))
}

/// List all available role-play scenarios.
#[utoipa::path(
    get,
    path = "/scenarios",
    responses(
        (status = 200, description = "List of scenarios", body = [ScenarioSummary])
    )
)]
pub async fn list_scenarios(State(state): State<Arc<AppState>>) -> Json<Vec<ScenarioSummary>> {
    let scenarios = state
        .controller
        .registry()
        .list()
        .map(|s| ScenarioSummary::from(s.as_ref()))
        .collect();
    Json(scenarios)
}

/// Get a scenario with its instructions and partner directive.
#[utoipa::path(
    get,
    path = "/scenarios/{key}",
    responses(
        (status = 200, description = "Scenario details", body = ScenarioDetail),
        (status = 404, description = "Scenario not found", body = ErrorResponse)
    ),
    params(
        ("key" = String, Path, description = "Scenario key, `slug` or `slug@version`")
    )
)]
pub async fn get_scenario(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ScenarioDetail>, ApiError> {
    let scenario = state.controller.registry().resolve(&key)?;
    Ok(Json(ScenarioDetail::from(scenario.as_ref())))
}

/// Start a new role-play session.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created successfully", body = SessionView),
        (status = 404, description = "Scenario not found", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(scenario = %payload.scenario))]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CreateSessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.controller.start(&payload.scenario)?;
    let view = SessionView::from(&session);
    state.sessions.insert(session).await;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Get a session and its full turn log.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session details", body = SessionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, id).await?;
    let session = session.lock().await;
    Ok(Json(SessionView::from(&*session)))
}

/// Delete a session and its turn log.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Session with id '{}' not found",
            id
        )))
    }
}

/// Submit the participant's next message and receive the partner's reply.
///
/// Provider failures do not fail the request: the error description comes
/// back as the partner turn.
#[utoipa::path(
    post,
    path = "/sessions/{id}/turns",
    request_body = SubmitTurnPayload,
    responses(
        (status = 200, description = "User and partner turns appended", body = SubmitTurnResponse),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
#[instrument(skip_all, fields(session_id = %id))]
pub async fn submit_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<SubmitTurnPayload>,
) -> Result<Json<SubmitTurnResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;

    state
        .controller
        .submit_user_turn(&mut session, &payload.text)
        .await?;

    let turns = session.turns();
    let (user, partner) = match turns {
        [.., user, partner] => (TurnView::from(user), TurnView::from(partner)),
        _ => {
            return Err(ApiError::InternalServerError(anyhow::anyhow!(
                "turn log shorter than one exchange after submission"
            )));
        }
    };
    Ok(Json(SubmitTurnResponse { user, partner }))
}

/// Restart the session on its current scenario.
#[utoipa::path(
    post,
    path = "/sessions/{id}/reset",
    responses(
        (status = 200, description = "Session reset", body = SessionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    state.controller.reset(&mut session);
    Ok(Json(SessionView::from(&*session)))
}

/// Switch the session to another scenario, discarding the conversation.
#[utoipa::path(
    put,
    path = "/sessions/{id}/scenario",
    request_body = SwitchScenarioPayload,
    responses(
        (status = 200, description = "Scenario switched", body = SessionView),
        (status = 404, description = "Session or scenario not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn switch_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<SwitchScenarioPayload>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    state
        .controller
        .switch_scenario(&mut session, &payload.scenario)?;
    Ok(Json(SessionView::from(&*session)))
}

/// Export the conversation as plain text or JSON.
#[utoipa::path(
    get,
    path = "/sessions/{id}/transcript",
    responses(
        (status = 200, description = "Transcript", body = String),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        TranscriptQuery
    )
)]
pub async fn get_transcript(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<TranscriptQuery>,
) -> Result<Response, ApiError> {
    let session = find_session(&state, id).await?;
    let session = session.lock().await;

    let response = match query.format.unwrap_or_default() {
        TranscriptFormat::Text => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            transcript::render_text(&session),
        )
            .into_response(),
        TranscriptFormat::Json => (
            [(header::CONTENT_TYPE, "application/json")],
            transcript::export_json(&session)?,
        )
            .into_response(),
    };
    Ok(response)
}

/// List the default topic catalogue for question generation.
#[utoipa::path(
    get,
    path = "/questions/topics",
    responses(
        (status = 200, description = "Default topics", body = [TopicView])
    )
)]
pub async fn list_question_topics() -> Json<Vec<TopicView>> {
    Json(DEFAULT_TOPICS.iter().map(TopicView::from).collect())
}

/// Generate exam questions for a topic from supplied plain text.
#[utoipa::path(
    post,
    path = "/questions",
    request_body = GenerateQuestionsPayload,
    responses(
        (status = 200, description = "Generated questions", body = GenerateQuestionsResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(topic = %payload.topic, count = payload.count))]
pub async fn generate_questions(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<GenerateQuestionsPayload>,
) -> Result<Json<GenerateQuestionsResponse>, ApiError> {
    let request = QuestionRequest {
        source_text: payload.source_text,
        topic: payload.topic,
        count: payload.count,
        format: payload.format,
    };
    let questions = state.questions.generate(&request).await?;
    let topic = request.topic.trim().to_string();
    let export = render_export(&topic, &questions);
    Ok(Json(GenerateQuestionsResponse {
        topic,
        questions,
        export,
    }))
}
