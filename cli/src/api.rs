//! HTTP surface: `GET /api/transactions?start_date=..&stop_date=..`.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chainstream_core::{FilterExpression, Interrupt};
use chainstream_firehose::FirehoseServices;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::stats::{self, ErrorReport, StatsReport};

pub const CACHE_CONTROL: &str = "s-maxage=1, stale-while-revalidate=59";

/// Shared by every request.
pub struct AppState {
    pub services: FirehoseServices,
    pub interrupt: Interrupt,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    pub start_date: Option<String>,
    pub stop_date: Option<String>,
    pub include: Option<String>,
    pub exclude: Option<String>,
}

impl TransactionsQuery {
    fn filter(&self) -> FilterExpression {
        let mut filter = stats::default_filter();
        if let Some(include) = &self.include {
            filter = filter.include(include.as_str());
        }
        if let Some(exclude) = &self.exclude {
            filter = filter.exclude(exclude.as_str());
        }
        filter
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/transactions", get(transactions))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn transactions(State(state): State<Arc<AppState>>, Query(query): Query<TransactionsQuery>) -> Response {
    respond(run(&state, &query).await)
}

async fn run(state: &AppState, query: &TransactionsQuery) -> Result<StatsReport> {
    let start = query
        .start_date
        .as_deref()
        .ok_or_else(|| anyhow!("[start_date] is required"))?;
    let stop = query
        .stop_date
        .as_deref()
        .ok_or_else(|| anyhow!("[stop_date] is required"))?;

    let resolved = state.services.lookup.resolve(start, stop).await?;
    tracing::info!(start_date = start, stop_date = stop, range = %resolved.range(), "serving transactions");

    let resumer = state.services.resumer(state.interrupt.clone());
    stats::collect(&resumer, resolved, query.filter()).await
}

/// 200 with the report or 400 with `{ "error": .. }`, both cacheable.
pub fn respond(result: Result<StatsReport>) -> Response {
    let mut response = match result {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "transactions request failed");
            (StatusCode::BAD_REQUEST, Json(ErrorReport::from(&e))).into_response()
        }
    };
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    response
}
