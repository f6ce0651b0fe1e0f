use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use codeguard_archive::{ArchiveError, ArchiveStore};
use codeguard_contracts::{normalize, AuditRecord};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::config::{GatewayConfig, StartupError};
use crate::review::ReviewClient;

pub const HISTORY_LIMIT: i64 = 10;

const DB_STATUS_LOGGED: &str = "Successfully logged to cloud archive";
const DB_STATUS_OFFLINE: &str = "Analysis complete (DB offline)";
const ERR_INVALID_BODY: &str = "invalid JSON body";
const ERR_REVIEW_DISABLED: &str = "GEMINI_API_KEY is not configured; code review is disabled";

/// Handles are constructed once at startup and cloned per request; no
/// handler mutates them.
#[derive(Clone)]
pub struct AppState {
    pub review: Option<ReviewClient>,
    pub archive: ArchiveStore,
}

pub async fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let review = match &config.gemini_api_key {
        Some(api_key) => Some(
            ReviewClient::new(
                config.review_url.clone(),
                config.review_model.clone(),
                api_key.clone(),
            )
            .map_err(|err| StartupError {
                code: "ERR_REVIEW_CLIENT",
                message: format!("failed to initialize review client: {}", err),
            })?,
        ),
        None => {
            tracing::warn!("GEMINI_API_KEY not set; code review is disabled");
            None
        }
    };

    let archive = ArchiveStore::connect(config.mongodb_url.as_deref()).await;
    if archive.is_offline() {
        tracing::warn!("audit archive is offline; submissions will not be persisted");
    }

    Ok(router_with_state(AppState { review, archive }))
}

/// Split out from [`router`] so tests can inject a stubbed review client or
/// an offline store.
pub fn router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/analyze", post(analyze))
        .route("/history", get(history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct RootResponse {
    message: &'static str,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "CodeGuard is active!",
    })
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    code: String,
}

// Failures ride in the same 200-status channel as successes; clients inspect
// the payload for an `error` field, not the transport status.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnalyzeResponse {
    Report {
        audit_report: String,
        db_status: String,
    },
    Error {
        error: String,
    },
}

async fn analyze(
    State(state): State<AppState>,
    req: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Json<AnalyzeResponse> {
    let Ok(Json(req)) = req else {
        return Json(AnalyzeResponse::Error {
            error: ERR_INVALID_BODY.to_string(),
        });
    };

    let Some(review) = &state.review else {
        return Json(AnalyzeResponse::Error {
            error: ERR_REVIEW_DISABLED.to_string(),
        });
    };

    // Review first; a failure here aborts before any store write.
    let audit_report = match review.review(&req.code).await {
        Ok(report) => report,
        Err(err) => {
            tracing::warn!(error = %err, "gateway.review_failed");
            return Json(AnalyzeResponse::Error {
                error: err.to_string(),
            });
        }
    };

    // Best effort: a store failure must not discard the generated review.
    let db_status = match state.archive.insert(&req.code, &audit_report).await {
        Ok(()) => DB_STATUS_LOGGED.to_string(),
        Err(ArchiveError::Unavailable) => DB_STATUS_OFFLINE.to_string(),
        Err(err) => {
            tracing::warn!(error = %err, "gateway.archive_write_failed");
            err.to_string()
        }
    };

    tracing::info!(
        code_bytes = req.code.len(),
        report_bytes = audit_report.len(),
        db_status = %db_status,
        "gateway.analyze"
    );

    Json(AnalyzeResponse::Report {
        audit_report,
        db_status,
    })
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum HistoryResponse {
    History { history: Vec<AuditRecord> },
    Error { error: String },
}

async fn history(State(state): State<AppState>) -> Json<HistoryResponse> {
    if state.archive.is_offline() {
        return Json(HistoryResponse::History {
            history: Vec::new(),
        });
    }

    let documents = match state.archive.recent(HISTORY_LIMIT).await {
        Ok(documents) => documents,
        Err(err) => {
            tracing::warn!(error = %err, "gateway.archive_read_failed");
            return Json(HistoryResponse::Error {
                error: err.to_string(),
            });
        }
    };

    let mut history = Vec::with_capacity(documents.len());
    for document in &documents {
        match normalize(document) {
            Ok(record) => history.push(record),
            // Never serve a partial list.
            Err(err) => {
                return Json(HistoryResponse::Error {
                    error: err.to_string(),
                })
            }
        }
    }

    tracing::info!(records = history.len(), "gateway.history");
    Json(HistoryResponse::History { history })
}
