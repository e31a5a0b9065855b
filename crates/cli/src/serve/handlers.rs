//! HTTP route handlers: ping, query, history, result.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cadastre_storage::{HistoryFilter, Page, StorageError, MAX_PAGE_SIZE};
use cadastre_verify::{validate_cadastral_number, QueryError, QueryRequest, VerifyError};
use serde::Deserialize;

use super::state::AppState;
use super::{json_error, json_error_with_details};

/// Page size used when `page` is given without `size`.
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "not found")
}

/// GET /ping
pub(crate) async fn handle_ping() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Server is running" })),
    )
}

/// POST /query
pub(crate) async fn handle_query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            // Oversized bodies keep their 413; every other parse failure is a 400.
            let status = match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            };
            return json_error(status, "INVALID_QUERY", &rejection.body_text()).into_response();
        }
    };

    match state.orchestrator.submit(request).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => query_error_response(e),
    }
}

/// `/history` query string. `page`/`size` are optional; without both the
/// whole history is returned. An empty `cadastral_number` means no filter.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryParams {
    pub(crate) cadastral_number: Option<String>,
    pub(crate) page: Option<u32>,
    pub(crate) size: Option<u32>,
}

impl HistoryParams {
    pub(crate) fn into_filter(self) -> Result<HistoryFilter, String> {
        let mut filter = HistoryFilter::all();
        if let Some(number) = self.cadastral_number.filter(|n| !n.is_empty()) {
            validate_cadastral_number(&number).map_err(|e| e.to_string())?;
            filter.cadastral_number = Some(number);
        }
        if self.page.is_some() || self.size.is_some() {
            let number = self.page.unwrap_or(1);
            let size = self.size.unwrap_or(DEFAULT_PAGE_SIZE);
            let page = Page::new(number, size).ok_or_else(|| {
                format!("page must be >= 1 and size within 1..={MAX_PAGE_SIZE}")
            })?;
            filter = filter.with_page(page);
        }
        Ok(filter)
    }
}

/// GET /history
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Response {
    let filter = match params {
        Ok(Query(p)) => p.into_filter(),
        Err(rejection) => Err(rejection.body_text()),
    };
    let filter = match filter {
        Ok(f) => f,
        Err(message) => {
            return json_error(StatusCode::BAD_REQUEST, "INVALID_FILTER", &message).into_response()
        }
    };

    tracing::debug!(
        cadastral_number = filter.cadastral_number.as_deref(),
        page = filter.page.map(|p| p.number()),
        size = filter.page.map(|p| p.size()),
        "reading history"
    );
    match state.ledger().list(&filter).await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => storage_error_response(&e),
    }
}

/// GET /result
///
/// The simulated authority itself: waits the drawn delay, then answers.
pub(crate) async fn handle_result(
    State(state): State<Arc<AppState>>,
    params: Result<Query<QueryRequest>, QueryRejection>,
) -> Response {
    let request = match params {
        Ok(Query(r)) => r,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, "INVALID_QUERY", &rejection.body_text())
                .into_response()
        }
    };
    if let Err(e) = request.validate() {
        return json_error(StatusCode::BAD_REQUEST, "INVALID_QUERY", &e.to_string())
            .into_response();
    }

    let mut shutdown = state.orchestrator.shutdown_signal();
    tokio::select! {
        biased;
        _ = shutdown.recv() => query_error_response(VerifyError::Aborted.into()),
        verdict = state.authority.answer() => {
            (StatusCode::OK, Json(serde_json::json!({ "result": verdict }))).into_response()
        }
    }
}

/// Map an orchestrator failure to its status and error code.
pub(crate) fn query_error_response(err: QueryError) -> Response {
    let message = err.to_string();
    match err {
        QueryError::Invalid(_) => {
            json_error(StatusCode::BAD_REQUEST, "INVALID_QUERY", &message).into_response()
        }
        QueryError::Verification(VerifyError::Timeout { .. }) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "VERIFICATION_TIMEOUT", &message)
                .into_response()
        }
        QueryError::Verification(VerifyError::Aborted) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "VERIFICATION_ABORTED", &message)
                .into_response()
        }
        QueryError::Verification(VerifyError::Unavailable(_)) | QueryError::Task(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "VERIFICATION_FAILED", &message)
                .into_response()
        }
        QueryError::Persistence { query, .. } => json_error_with_details(
            StatusCode::INTERNAL_SERVER_ERROR,
            "PERSISTENCE_ERROR",
            &message,
            serde_json::json!(query),
        )
        .into_response(),
    }
}

fn storage_error_response(err: &StorageError) -> Response {
    tracing::error!(error = %err, "history read failed");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "PERSISTENCE_ERROR",
        &err.to_string(),
    )
    .into_response()
}
