use axum::{extract::State, Json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::api::prompts::metadata;
use crate::api::AppState;
use crate::pipelines::crypto_index::IndexSpec;
use crate::pipelines::index_metrics::{comparison, compute_metrics, load_index_document, MetricsOptions};
use crate::types::{IndexMetricsRequest, IndexMetricsResponse};
use crate::{AppError, Result};

/// Computes CD5 benchmark metrics without writing report files.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IndexMetricsRequest>,
) -> Result<Json<IndexMetricsResponse>> {
    let start = Instant::now();

    let file_name = request
        .index_file
        .unwrap_or_else(|| IndexSpec::cd5().output_file_name());
    // only files inside the crypto data directory
    if file_name.contains(|c: char| c == '/' || c == '\\') || file_name.contains("..") {
        return Err(AppError::Validation(format!(
            "index_file must be a bare file name, got {:?}",
            file_name
        )));
    }
    let path: PathBuf = state.settings.crypto_dir().join(file_name);

    let mut options = MetricsOptions::cd5();
    if let Some(date) = request.agent_start_date {
        options.agent_start_date = Some(date);
    }

    let doc = load_index_document(&path)?;
    let metrics = compute_metrics(&doc, &options)?;
    let comparison = comparison(&metrics);

    Ok(Json(IndexMetricsResponse {
        metrics,
        comparison,
        metadata: metadata(start),
    }))
}
