use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::api::state::AppState;

/// Per-route accumulator.
#[derive(Debug, Clone, Copy, Default)]
struct RouteAccum {
    hits: u64,
    errors: u64,
    total_latency_ms: u64,
}

/// In-memory request stats, reset on server restart.
#[derive(Debug, Clone)]
pub struct TrafficStats {
    started_at: DateTime<Utc>,
    total_requests: u64,
    by_route: HashMap<String, RouteAccum>,
}

impl Default for TrafficStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            total_requests: 0,
            by_route: HashMap::new(),
        }
    }
}

impl TrafficStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one served request. `route` is the matched route pattern,
    /// e.g. `GET /v1/analysis/opponents/:id`, so path parameters do not
    /// blow up the key space.
    pub fn record(&mut self, route: &str, status: u16, latency_ms: u64) {
        self.total_requests += 1;
        let accum = self.by_route.entry(route.to_string()).or_default();
        accum.hits += 1;
        accum.total_latency_ms += latency_ms;
        if status >= 500 {
            accum.errors += 1;
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }
}

pub type SharedTrafficStats = Arc<RwLock<TrafficStats>>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficResponse {
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub total_requests: u64,
    pub routes: Vec<RouteSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub route: String,
    pub hits: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
}

/// Middleware that times every request and records it against the
/// matched route.
pub async fn record_traffic(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = match request.extensions().get::<MatchedPath>() {
        Some(matched) => format!("{} {}", request.method(), matched.as_str()),
        None => format!("{} {}", request.method(), request.uri().path()),
    };

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    state
        .traffic_stats
        .write()
        .await
        .record(&route, response.status().as_u16(), latency_ms);
    response
}

/// `GET /v1/meta/traffic`
pub async fn traffic_stats(State(state): State<AppState>) -> Json<TrafficResponse> {
    let stats = state.traffic_stats.read().await;
    let uptime = (Utc::now() - stats.started_at).num_seconds();

    let mut routes: Vec<RouteSummary> = stats
        .by_route
        .iter()
        .map(|(route, accum)| RouteSummary {
            route: route.clone(),
            hits: accum.hits,
            errors: accum.errors,
            avg_latency_ms: if accum.hits > 0 {
                let avg = accum.total_latency_ms as f64 / accum.hits as f64;
                (avg * 10.0).round() / 10.0
            } else {
                0.0
            },
        })
        .collect();
    routes.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.route.cmp(&b.route)));

    Json(TrafficResponse {
        started_at: stats.started_at,
        uptime_seconds: uptime,
        total_requests: stats.total_requests,
        routes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_stats_new() {
        let stats = TrafficStats::new();
        assert_eq!(stats.total_requests, 0);
        assert!(stats.by_route.is_empty());
    }

    #[test]
    fn test_record_increments_totals() {
        let mut stats = TrafficStats::new();
        stats.record("GET /v1/sessions", 200, 3);
        stats.record("GET /v1/sessions", 200, 5);
        assert_eq!(stats.total_requests, 2);
        let accum = stats.by_route.get("GET /v1/sessions").unwrap();
        assert_eq!(accum.hits, 2);
        assert_eq!(accum.total_latency_ms, 8);
        assert_eq!(accum.errors, 0);
    }

    #[test]
    fn test_record_counts_server_errors_only() {
        let mut stats = TrafficStats::new();
        stats.record("POST /v1/sync/push", 200, 1);
        stats.record("POST /v1/sync/push", 400, 1);
        stats.record("POST /v1/sync/push", 500, 1);
        let accum = stats.by_route.get("POST /v1/sync/push").unwrap();
        assert_eq!(accum.hits, 3);
        assert_eq!(accum.errors, 1, "4xx is a client problem, not an error");
    }

    #[test]
    fn test_routes_keyed_separately() {
        let mut stats = TrafficStats::new();
        stats.record("GET /v1/sessions", 200, 1);
        stats.record("POST /v1/sessions", 201, 1);
        assert_eq!(stats.by_route.len(), 2);
    }
}
