//! HTTP routes
//!
//! `GET /data` reads the chain, `POST /data/post` writes to it and
//! `POST /data/reaction` reacts to a post. Every JSON reply carries a
//! `marker`: 0 for failures, 1 for success, 2 for the genesis write.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::service::{ChainService, ChainView};
use crate::types::{NewPost, NewReaction, RelayError};

pub const MARKER_FAILURE: u8 = 0;
pub const MARKER_SUCCESS: u8 = 1;
pub const MARKER_GENESIS: u8 = 2;

/// Service shared across handlers
pub type SharedService = Arc<ChainService>;

/// Reply envelope for writes and failures
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub marker: u8,
}

impl ApiResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
            marker: MARKER_FAILURE,
        }
    }
}

/// Chain read reply
#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub marker: u8,
    #[serde(flatten)]
    pub view: ChainView,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_rejection() {
            debug!(error = %self, "Request rejected");
            self.to_string()
        } else {
            error!(error = %self, "Request failed");
            "internal failure, try again later".to_string()
        };
        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

/// Create the chain router
pub fn create_router(service: SharedService, cors_allow_any: bool) -> Router {
    let router = Router::new()
        .route("/data", get(get_chain))
        .route("/data/post", post(add_post))
        .route("/data/reaction", post(add_reaction))
        .route("/health", get(health))
        .with_state(service);

    if cors_allow_any {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// GET /data
pub async fn get_chain(State(service): State<SharedService>) -> Result<Json<ChainResponse>, RelayError> {
    let view = service.chain().await?;
    Ok(Json(ChainResponse {
        marker: MARKER_SUCCESS,
        view,
    }))
}

/// POST /data/post
pub async fn add_post(
    State(service): State<SharedService>,
    body: Result<Json<NewPost>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse>), RelayError> {
    let Json(post) = body.map_err(bad_body)?;
    let receipt = service.add_post(post).await?;

    let (message, marker) = if receipt.genesis {
        ("genesis post successfully added", MARKER_GENESIS)
    } else {
        ("post successfully added", MARKER_SUCCESS)
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            message: message.to_string(),
            data: Some(receipt.ciphertext.into_string()),
            marker,
        }),
    ))
}

/// POST /data/reaction
pub async fn add_reaction(
    State(service): State<SharedService>,
    body: Result<Json<NewReaction>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse>), RelayError> {
    let Json(reaction) = body.map_err(bad_body)?;
    let receipt = service.add_reaction(reaction).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            message: format!("reaction added with gravitas {}", receipt.gravitas.value()),
            data: Some(receipt.flourish),
            marker: MARKER_SUCCESS,
        }),
    ))
}

fn bad_body(rejection: JsonRejection) -> RelayError {
    debug!(error = %rejection, "Unreadable request body");
    RelayError::BadRequest("invalid request body".to_string())
}
