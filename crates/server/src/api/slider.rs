//! Cursor ("slider") handlers.
//!
//! `POST /slider` reads the raw body rather than using the `Json` extractor,
//! so every malformed request gets the same `400 {"error": ...}` shape,
//! whatever the content type or JSON error.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use invoq_core::Uid;

use super::handlers::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SliderRequest {
    pub value: Uid,
}

#[derive(Debug, Serialize)]
pub struct SliderResponse {
    pub value: Uid,
}

type Rejection = (StatusCode, Json<ErrorResponse>);

fn bad_request(reason: impl Into<String>) -> Rejection {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(reason)))
}

/// Extract the new cursor value from a request body.
fn parse_slider_body(body: &[u8]) -> Result<Uid, String> {
    let json: Value =
        serde_json::from_slice(body).map_err(|e| format!("invalid JSON body: {}", e))?;
    // A derived struct would also accept `[5]`
    if !json.is_object() {
        return Err("body must be a JSON object".to_string());
    }
    let request =
        SliderRequest::deserialize(json).map_err(|e| format!("invalid slider body: {}", e))?;
    Ok(request.value)
}

pub async fn get_slider(State(state): State<Arc<AppState>>) -> Json<SliderResponse> {
    Json(SliderResponse {
        value: state.cursor().get().await,
    })
}

/// Move the cursor. Takes effect at the worker's next scan.
pub async fn set_slider(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SliderResponse>, Rejection> {
    let value = parse_slider_body(&body).map_err(bad_request)?;
    let previous = state.cursor().get().await;
    let value = state.cursor().set(value).await;
    info!(previous, value, "Cursor set by operator");
    Ok(Json(SliderResponse { value }))
}
