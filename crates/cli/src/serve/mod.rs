//! `cadastre serve` -- HTTP JSON API for cadastral query verification.
//!
//! Security features:
//! - CORS headers on all responses (permissive)
//! - Request bodies capped at 64 KiB
//! - Optional API key authentication (`--api-key` / `CADASTRE_API_KEY`)
//!
//! Endpoints:
//! - GET  /ping      - Liveness (exempt from auth)
//! - POST /query     - Verify a cadastral query and record the verdict
//! - GET  /history   - Recorded queries, oldest first; optional
//!   `cadastral_number`, `page`, `size`
//! - GET  /result    - The simulated authority: `{"result": bool}`
//!
//! Error bodies are `{"error": <message>, "code": <CODE>, "details"?: ..}`.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use cadastre_verify::{
    HttpVerifier, Orchestrator, OrchestratorConfig, SimulatedAuthority, Verifier,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::handlers::{handle_history, handle_not_found, handle_ping, handle_query, handle_result};
use self::middleware::auth_middleware;
use self::state::AppState;
use crate::config::{open_ledger, ServeConfig, VerifierConfig};

/// Maximum request body size: 64 KiB.
const MAX_BODY_SIZE: usize = 64 * 1024;

pub(crate) const PING_PATH: &str = "/ping";

/// Construct a JSON error response with the given status code, code and message.
fn json_error(status: StatusCode, code: &str, message: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({"error": message, "code": code})),
    )
}

/// Like [`json_error`], with a `details` payload.
fn json_error_with_details(
    status: StatusCode,
    code: &str,
    message: &str,
    details: serde_json::Value,
) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({"error": message, "code": code, "details": details})),
    )
}

/// Build the routed application over `state`.
fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route(PING_PATH, get(handle_ping))
        .route("/query", post(handle_query))
        .route("/history", get(handle_history))
        .route("/result", get(handle_result))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the ledger, authority and orchestrator described by `config`.
async fn build_state(config: &ServeConfig) -> Result<Arc<AppState>, Box<dyn std::error::Error>> {
    let ledger = open_ledger(&config.database).await?;
    let authority = Arc::new(SimulatedAuthority::new(config.simulation));

    let verifier: Arc<dyn Verifier> = match &config.verifier {
        VerifierConfig::Local => authority.clone(),
        VerifierConfig::Http { authority_url } => Arc::new(
            HttpVerifier::new(authority_url, config.verification_timeout)
                .with_api_key(config.api_key.clone()),
        ),
    };
    tracing::info!(
        verifier = verifier.verifier_id(),
        database = %config.database,
        max_delay_ms = authority.max_delay().as_millis() as u64,
        "verification pipeline ready"
    );

    let orchestrator = Orchestrator::new(
        verifier,
        ledger,
        OrchestratorConfig {
            verification_timeout: config.verification_timeout,
        },
    );

    Ok(Arc::new(AppState {
        orchestrator,
        authority,
        api_key: config.api_key.clone(),
    }))
}

/// Start the HTTP server and run until Ctrl+C.
///
/// On shutdown the orchestrator is told to abort pending verifications
/// first, so in-flight `/query` requests answer promptly and axum's graceful
/// shutdown can complete; then the orchestrator is drained and the ledger
/// closed.
pub async fn start_server(config: ServeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config).await?;
    if state.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }
    let app = router(state.clone());

    let stop = {
        let state = state.clone();
        async move {
            shutdown_signal().await;
            state.orchestrator.begin_shutdown();
        }
    };

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let Some(tls) = &config.tls {
        let rustls =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
        let handle = axum_server::Handle::new();
        {
            let handle = handle.clone();
            tokio::spawn(async move {
                stop.await;
                handle.graceful_shutdown(None);
            });
        }
        tracing::info!(addr = %config.addr, "cadastre listening on https");
        axum_server::bind_rustls(config.addr, rustls)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
        state.orchestrator.shutdown().await;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "cadastre listening on http");
    axum::serve(listener, app)
        .with_graceful_shutdown(stop)
        .await?;

    state.orchestrator.shutdown().await;
    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
