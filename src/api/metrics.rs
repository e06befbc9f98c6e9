//! Prometheus metrics endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::metrics;
use crate::registry::Transport;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_metrics_from_state(&state).await;

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Refresh gauges from the registry's diagnostic snapshot at scrape time.
async fn update_metrics_from_state(state: &AppState) {
    let registry_stats = state.hub.registry().stats().await;

    metrics::ACTIVE_SUBSCRIBERS
        .with_label_values(&[Transport::Datagram.as_str()])
        .set(registry_stats.datagram_subscribers as i64);
    metrics::ACTIVE_SUBSCRIBERS
        .with_label_values(&[Transport::Stream.as_str()])
        .set(registry_stats.stream_subscribers as i64);
    metrics::ACTIVE_SUBSCRIBERS
        .with_label_values(&[Transport::Duplex.as_str()])
        .set(registry_stats.duplex_subscribers as i64);
    metrics::ROOMS_ACTIVE.set(registry_stats.rooms.len() as i64);
}
