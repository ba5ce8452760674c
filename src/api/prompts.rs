use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::api::AppState;
use crate::prompts::{astock_prompt_from_files, forex_prompt_from_files};
use crate::types::{AstockPromptRequest, ForexPromptRequest, PromptResponse, ResponseMetadata};
use crate::Result;

pub async fn astock_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AstockPromptRequest>,
) -> Result<Json<PromptResponse>> {
    let start = Instant::now();

    let prompt = astock_prompt_from_files(
        &state.settings,
        &request.today_date,
        &request.signature,
        request.symbols,
    )
    .map_err(|e| {
        tracing::error!("Failed to build A-share prompt: {}", e);
        e
    })?;

    Ok(Json(PromptResponse {
        prompt,
        metadata: metadata(start),
    }))
}

pub async fn forex_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForexPromptRequest>,
) -> Result<Json<PromptResponse>> {
    let start = Instant::now();

    let prompt = forex_prompt_from_files(
        &state.settings,
        &request.today_date,
        &request.signature,
        request.pairs,
    )
    .map_err(|e| {
        tracing::error!("Failed to build forex prompt: {}", e);
        e
    })?;

    Ok(Json(PromptResponse {
        prompt,
        metadata: metadata(start),
    }))
}

pub(crate) fn metadata(start: Instant) -> ResponseMetadata {
    ResponseMetadata {
        timestamp: Utc::now().to_rfc3339(),
        execution_time_ms: start.elapsed().as_millis() as u64,
    }
}
