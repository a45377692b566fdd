use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::feedback::FeedbackSink;
use crate::models::{ChatRequest, ChatResponse, FeedbackRequest, FeedbackResponse};

#[derive(Clone)]
struct AppState {
    config: AppConfig,
    chat: ChatService,
    feedback: FeedbackSink,
}

pub async fn run_server(
    config: AppConfig,
    chat_service: ChatService,
    feedback: FeedbackSink,
) -> Result<()> {
    log_data_files(&config).await;

    let state = AppState {
        chat: chat_service,
        feedback,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/", get(index_page))
        .route("/chat", post(chat_handler))
        .route("/feedback", post(feedback_handler))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .nest_service("/data_files", ServeDir::new(&config.data_files_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Log what the viewer will be able to fetch. Missing directory is not fatal;
/// chat still works without locally served documents.
async fn log_data_files(config: &AppConfig) {
    match tokio::fs::read_dir(&config.data_files_dir).await {
        Ok(mut entries) => {
            while let Ok(Some(entry)) = entries.next_entry().await {
                tracing::info!("serving data file: {}", entry.file_name().to_string_lossy());
            }
        }
        Err(err) => {
            tracing::warn!(
                "could not read data files dir {}: {}",
                config.data_files_dir.display(),
                err
            );
        }
    }
}

async fn index_page(State(state): State<AppState>) -> axum::response::Response {
    match tokio::fs::read_to_string(state.config.index_page()).await {
        Ok(body) => Html(body).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            "static/index.html not found".to_string(),
        )
            .into_response(),
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let response = state.chat.answer(request).await?;
    Ok(Json(response))
}

async fn feedback_handler(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    state.feedback.record(&request).await?;
    Ok(Json(FeedbackResponse {
        status: "success".to_string(),
        message: "Feedback securely saved!".to_string(),
    }))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        tracing::error!("request failed: {:#}", value);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::InvokeError;

    #[test]
    fn run_failures_map_to_contract_details() {
        let err: anyhow::Error = InvokeError::RunFailed.into();
        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.detail, "Run Failed");

        let err: anyhow::Error = InvokeError::RunTimedOut.into();
        let api: ApiError = err.into();
        assert_eq!(api.detail, "Run Timed Out");
    }
}
