//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CreateSessionPayload, ErrorResponse, GenerateQuestionsPayload, GenerateQuestionsResponse,
        ScenarioDetail, ScenarioSummary, SessionView, SubmitTurnPayload, SubmitTurnResponse,
        SwitchScenarioPayload, TopicView, TurnView,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_scenarios,
        handlers::get_scenario,
        handlers::create_session,
        handlers::get_session,
        handlers::delete_session,
        handlers::submit_turn,
        handlers::reset_session,
        handlers::switch_scenario,
        handlers::get_transcript,
        handlers::list_question_topics,
        handlers::generate_questions,
    ),
    components(
        schemas(
            ScenarioSummary, ScenarioDetail, SessionView, TurnView, CreateSessionPayload,
            SwitchScenarioPayload, SubmitTurnPayload, SubmitTurnResponse, TopicView,
            GenerateQuestionsPayload, GenerateQuestionsResponse, ErrorResponse
        )
    ),
    tags(
        (name = "Role-Play API", description = "Scenario role-play sessions and exam question generation for teacher training")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/scenarios", get(handlers::list_scenarios))
        .route("/scenarios/{key}", get(handlers::get_scenario))
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/turns", post(handlers::submit_turn))
        .route("/sessions/{id}/reset", post(handlers::reset_session))
        .route("/sessions/{id}/scenario", put(handlers::switch_scenario))
        .route("/sessions/{id}/transcript", get(handlers::get_transcript))
        .route("/questions", post(handlers::generate_questions))
        .route("/questions/topics", get(handlers::list_question_topics))
        .with_state(app_state);

    // Swagger UI is stateless and merged alongside the API routes.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
}
