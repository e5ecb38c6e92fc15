use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use localdocs_rag_core::{BuildRequest, Diagnostics, QueryError, QueryRequest, RagService};
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

const BUILD_STARTED: &str = "Index creation started in background";
const BUILD_RUNNING: &str = "Index creation is already running";

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    response: String,
    session_context: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(service: RagService) -> Router {
    Router::new()
        .route("/create_index/", post(create_index))
        .route("/query/", post(query))
        .route("/debug/", get(debug))
        .route("/health", get(health))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_index(State(service): State<RagService>) -> Json<MessageBody> {
    let message = match service.coordinator().request_build() {
        BuildRequest::Accepted(handle) => {
            // The build outlives the request and reports its own outcome.
            drop(handle);
            BUILD_STARTED
        }
        BuildRequest::Rejected => BUILD_RUNNING,
    };
    Json(MessageBody { message })
}

async fn query(
    State(service): State<RagService>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let answer = service.engine().answer(request).await.map_err(query_error)?;
    Ok(Json(QueryResponse {
        response: answer.response,
        session_context: answer.session_context,
    }))
}

async fn debug(State(service): State<RagService>) -> Json<Diagnostics> {
    Json(service.diagnostics().await)
}

fn query_error(failure: QueryError) -> ApiError {
    match failure {
        QueryError::InvalidRequest(message) => bad_request(message),
        other => {
            error!(error = %other, "query failed");
            internal_error(other.to_string())
        }
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: "bad_request",
            message: message.into(),
        }),
    )
}

fn internal_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "internal_error",
            message: message.into(),
        }),
    )
}
