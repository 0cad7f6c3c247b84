//! # Application State Management
//!
//! Shared state accessed by HTTP handlers and connection actors.
//!
//! ## Sharing Pattern:
//! - **Configuration** is fixed at process start, so it is stored as a
//!   plain value and cloned out; no lock is involved.
//! - **Metrics** are mutated by every request and every pipeline stage, so
//!   they live behind `Arc<RwLock<..>>`: many readers or one writer at a
//!   time, all updates are single-field increments held for nanoseconds.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all HTTP request handlers and stream actors.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration, fixed at startup
    config: AppConfig,

    /// Runtime counters (constantly updated)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Runtime counters across all connections and requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total HTTP requests processed since start
    pub request_count: u64,

    /// Total HTTP errors since start
    pub error_count: u64,

    /// Currently open stream connections
    pub active_connections: u32,

    /// Decode windows handed to the speech model
    pub decoded_windows: u64,

    /// Transcription messages sent to clients (non-empty decodes)
    pub transcripts_sent: u64,

    /// Decode calls that failed outright (distinct from empty output)
    pub decode_failures: u64,

    /// context_partial messages delivered
    pub contexts_sent: u64,

    /// Enrichment attempts that were dropped (no credential, network or
    /// extraction failure)
    pub enrichment_failures: u64,

    /// Per-endpoint HTTP statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the configuration.
    pub fn get_config(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record per-endpoint statistics, called by the metrics middleware.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A stream connection opened.
    pub fn connection_opened(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_connections += 1;
    }

    /// A stream connection closed.
    pub fn connection_closed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_connections > 0 {
            metrics.active_connections -= 1;
        }
    }

    /// Record the outcome of one decode window.
    pub fn record_decode(&self, outcome: DecodeOutcome) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.decoded_windows += 1;
        match outcome {
            DecodeOutcome::Transcribed => metrics.transcripts_sent += 1,
            DecodeOutcome::Silent => {}
            DecodeOutcome::Failed => metrics.decode_failures += 1,
        }
    }

    /// Record the outcome of one enrichment attempt.
    pub fn record_enrichment(&self, delivered: bool) {
        let mut metrics = self.metrics.write().unwrap();
        if delivered {
            metrics.contexts_sent += 1;
        } else {
            metrics.enrichment_failures += 1;
        }
    }

    /// Consistent snapshot for the /metrics endpoint.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_connections: metrics.active_connections,
            decoded_windows: metrics.decoded_windows,
            transcripts_sent: metrics.transcripts_sent,
            decode_failures: metrics.decode_failures,
            contexts_sent: metrics.contexts_sent,
            enrichment_failures: metrics.enrichment_failures,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// What a decode window produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Non-empty text, sent to the client
    Transcribed,
    /// Empty text: silence or no speech, nothing sent
    Silent,
    /// The decode call itself errored
    Failed,
}

impl EndpointMetric {
    /// Average response time for this endpoint in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn connection_counters_never_underflow() {
        let state = AppState::new(AppConfig::default());
        state.connection_closed();
        assert_eq!(state.get_metrics_snapshot().active_connections, 0);

        state.connection_opened();
        state.connection_opened();
        state.connection_closed();
        assert_eq!(state.get_metrics_snapshot().active_connections, 1);
    }

    #[test]
    fn decode_outcomes_split_counters() {
        let state = AppState::new(AppConfig::default());
        state.record_decode(DecodeOutcome::Transcribed);
        state.record_decode(DecodeOutcome::Silent);
        state.record_decode(DecodeOutcome::Failed);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.decoded_windows, 3);
        assert_eq!(snapshot.transcripts_sent, 1);
        assert_eq!(snapshot.decode_failures, 1);
    }

    #[test]
    fn endpoint_metric_averages() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
