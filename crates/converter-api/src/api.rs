use axum::{
    extract::{rejection::QueryRejection, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::resolver::{ConversionError, ConversionRequest};
use crate::AppState;

const MIN_ASSET_LEN: usize = 2;
const MAX_ASSET_LEN: usize = 10;

/// Build the axum router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/convert", get(convert))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// GET /convert
#[derive(Debug, Deserialize)]
pub struct ConvertParams {
    pub amount: Option<f64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub timestamp: Option<String>,
}

impl ConvertParams {
    fn into_request(self) -> Result<ConversionRequest, String> {
        let amount = self.amount.ok_or("amount is required")?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err("amount must be a positive number".to_string());
        }
        let from = asset_code("from", self.from)?;
        let to = asset_code("to", self.to)?;
        let timestamp = self
            .timestamp
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_timestamp(&raw))
            .transpose()?;

        Ok(ConversionRequest {
            amount,
            from,
            to,
            timestamp,
        })
    }
}

fn asset_code(field: &str, value: Option<String>) -> Result<String, String> {
    let value = value.ok_or_else(|| format!("{} is required", field))?;
    let value = value.trim();
    let len = value.chars().count();
    if !(MIN_ASSET_LEN..=MAX_ASSET_LEN).contains(&len) {
        return Err(format!(
            "{} must be {}-{} characters",
            field, MIN_ASSET_LEN, MAX_ASSET_LEN
        ));
    }
    Ok(value.to_string())
}

/// RFC 3339, or a naive ISO-8601 date/datetime taken as UTC
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("invalid timestamp: {}", raw))
}

fn invalid_request(detail: impl Into<String>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({"code": "invalid_request", "detail": detail.into()})),
    )
        .into_response()
}

impl IntoResponse for ConversionError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ConversionError::InvalidAmount => return invalid_request(self.to_string()),
            ConversionError::PairNotAvailable { .. } => (
                StatusCode::NOT_FOUND,
                "Conversion not available for this pair",
            ),
            ConversionError::ZeroPriceInversion { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_quote_zero_price")
            }
            ConversionError::StaleQuote { .. } => (StatusCode::BAD_REQUEST, "quotes_outdated"),
            ConversionError::Store(e) => {
                error!(error = %e, "Quote lookup failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };
        (
            status,
            Json(serde_json::json!({"code": self.code(), "detail": detail})),
        )
            .into_response()
    }
}

async fn convert(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ConvertParams>, QueryRejection>,
) -> Response {
    let request = match query {
        Ok(Query(params)) => params.into_request(),
        Err(rejection) => Err(rejection.body_text()),
    };
    let request = match request {
        Ok(request) => request,
        Err(detail) => {
            state
                .metrics
                .conversions
                .with_label_values(&["invalid_request"])
                .inc();
            return invalid_request(detail);
        }
    };

    match state.resolver.convert(&request, Utc::now()).await {
        Ok(conversion) => {
            state.metrics.conversions.with_label_values(&["ok"]).inc();
            (StatusCode::OK, Json(conversion)).into_response()
        }
        Err(e) => {
            state
                .metrics
                .conversions
                .with_label_values(&[e.code()])
                .inc();
            e.into_response()
        }
    }
}

/// GET /health
async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// GET /ready
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "ready"}))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "unavailable", "error": e.to_string()})),
        )
            .into_response(),
    }
}

/// GET /metrics
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = prometheus::TextEncoder::new();
    let families = state.metrics.registry.gather();
    match encoder.encode_to_string(&families) {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding error: {}", e),
        )
            .into_response(),
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_secs_f64() * 1000.0,
        "request"
    );
    response
}
