//! Proxy selection handlers

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::server::AppState;
use crate::error::IkaError;
use crate::models::{ProxyOutcome, QueueId};

/// Query parameters for reporting a proxy outcome
#[derive(Debug, Deserialize, Default)]
pub struct OutcomeQuery {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub error: String,
}

impl OutcomeQuery {
    fn split(self) -> (QueueId, ProxyOutcome) {
        (
            QueueId::new(self.channel, self.domain),
            ProxyOutcome {
                addr: self.addr,
                error: self.error,
            },
        )
    }
}

/// Get a proxy for a channel and domain
pub async fn get_proxy(
    State(state): State<AppState>,
    Query(queue): Query<QueueId>,
) -> Result<impl IntoResponse, IkaError> {
    let proxy = state.service.get_proxy(&queue).await?;
    Ok(Json(proxy))
}

/// Report how a proxy fared
pub async fn report_outcome(
    State(state): State<AppState>,
    Query(query): Query<OutcomeQuery>,
) -> Result<impl IntoResponse, IkaError> {
    let (queue, outcome) = query.split();

    if !outcome.is_success() && outcome.addr.is_empty() {
        return Err(IkaError::InvalidRequest(
            "addr is required when reporting an error".to_string(),
        ));
    }

    state.service.report_outcome(&queue, &outcome)?;
    Ok(StatusCode::OK)
}

/// Rebuild the default proxy queue from the store
pub async fn refresh_proxies(State(state): State<AppState>) -> Result<impl IntoResponse, IkaError> {
    state.service.refresh_default().await?;
    info!("Default proxy queue refreshed");
    Ok(StatusCode::OK)
}

/// Report materialized queues, loaded routes and connection pool usage
pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, IkaError> {
    let manager = state.service.manager();
    let queues: Vec<_> = manager
        .keys()
        .into_iter()
        .map(|key| {
            let proxies = manager.queue_len(&key).unwrap_or(0);
            json!({ "key": key, "proxies": proxies })
        })
        .collect();
    let (domains, channels) = state.service.resolver().route_counts();

    Ok(Json(json!({
        "queues": queues,
        "routes": {
            "domains": domains,
            "channels": channels,
        },
        "failure_weight": manager.config().failure_weight,
        "database": state.database.as_ref().map(|db| db.pool_stats()),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    })))
}
