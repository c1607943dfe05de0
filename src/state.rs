//! # Application State Management
//!
//! This module manages shared state that needs to be accessed by multiple HTTP request handlers
//! simultaneously. This is one of the most complex parts of the application from a Rust perspective.
//!
//! ## Key Rust Concepts (IMPORTANT for beginners):
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Allows multiple parts of the program to safely share ownership of data
//! - **Why needed**: Multiple HTTP requests run simultaneously and all need access to the same state
//! - **Memory safety**: Automatically cleans up data when the last reference is dropped
//! - **Thread safety**: Safe to share between threads
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Allows multiple readers OR one writer at a time (but not both)
//! - **Why needed**: Multiple requests can read config simultaneously, but only one can update it
//! - **Performance**: Reading is fast (no blocking), writing blocks everything else
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (many HTTP handlers can hold a reference)
//! - **RwLock**: Thread-safe read/write access
//! - **T**: The actual data type being protected
//!
//! ## What lives here and what doesn't:
//! Request-scoped HTTP metrics and the runtime configuration live here. Live
//! detection sessions do NOT: they are owned by the session registry, which
//! is the single source of truth for how many connections are active.

use crate::config::AppConfig;        // Our configuration types
use std::sync::{Arc, RwLock};        // Thread-safe shared ownership and locking
use std::time::Instant;              // For tracking server uptime
use std::collections::HashMap;       // For storing per-endpoint metrics

/// The main application state that's shared across all HTTP request handlers.
///
/// ## Thread Safety Pattern:
/// This struct uses Arc<RwLock<T>> for all mutable data, which means:
/// - Multiple HTTP requests can read the same data simultaneously
/// - Only one request can modify data at a time
/// - No data races or memory corruption possible
///
/// ## Rust Concepts:
/// - **#[derive(Debug, Clone)]**: Automatically implements debug printing and cloning
/// - **Arc<RwLock<T>>**: Thread-safe shared mutable data
/// - **Instant**: A point in time (for measuring duration)
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    /// Arc<RwLock<AppConfig>> means:
    /// - Arc: Multiple HTTP handlers can hold a reference to this
    /// - RwLock: Multiple readers OR one writer (thread-safe)
    /// - AppConfig: The actual configuration data
    pub config: Arc<RwLock<AppConfig>>,

    /// Performance metrics (constantly being updated by requests)
    /// This needs to be mutable because every HTTP request updates the metrics
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes, so no Arc<RwLock> needed)
    /// Instant is Copy, so it's safe to share directly
    pub start_time: Instant,
}

/// Performance metrics collected across all HTTP requests.
///
/// ## Rust Concepts:
/// - **#[derive(Debug, Default)]**: Automatically implements:
///   - `Debug`: Can be printed with {:?} for debugging
///   - `Default`: Can create with AppMetrics::default() (all zeros)
/// - **HashMap**: Key-value map (like a dictionary in Python)
///
/// ## Why these metrics matter:
/// - **request_count**: Total requests processed (for load monitoring)
/// - **error_count**: Total errors (for reliability monitoring)
/// - **endpoint_metrics**: Per-endpoint statistics (for performance optimization)
///
/// Note that WebSocket traffic is not counted here; these are HTTP request
/// metrics only. Session activity is reported by the session registry.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Detailed metrics for each API endpoint (URL path)
    /// Key: endpoint name (e.g., "GET /health")
    /// Value: detailed metrics for that endpoint
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
///
/// ## Performance calculations:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

/// Implementation of methods for AppState.
impl AppState {
    /// Create a new AppState with the given configuration.
    ///
    /// ## Rust Concepts:
    /// - **Arc::new()**: Creates a new reference-counted pointer
    /// - **RwLock::new()**: Creates a new reader-writer lock
    /// - **AppMetrics::default()**: Creates metrics with all zeros
    /// - **Instant::now()**: Captures the current moment in time
    pub fn new(config: AppConfig) -> Self {
        Self {
            // Wrap config for thread-safe sharing and updating
            config: Arc::new(RwLock::new(config)),
            // Start with empty metrics
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            // Record when the server started
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// ## Why clone:
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    /// AppConfig is designed to be cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Update the configuration with validation.
    ///
    /// ## Error handling:
    /// Configuration is validated before updating to ensure it's always valid.
    ///
    /// Note that pipeline dimensions only apply to sessions created after the
    /// update; live sessions keep the settings they were built with.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                // Validation passed, update the config
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => {
                // Validation failed, return the error
                Err(e.to_string())
            }
        }
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    ///
    /// ## When this is called:
    /// - HTTP 4xx errors (client errors like 404 Not Found)
    /// - HTTP 5xx errors (server errors like 500 Internal Server Error)
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// ## Parameters:
    /// - **endpoint**: The API endpoint (e.g., "GET /health", "PUT /config")
    /// - **duration_ms**: How long the request took to process (in milliseconds)
    /// - **is_error**: Whether this request resulted in an error
    ///
    /// ## HashMap operations:
    /// The first time we see an endpoint, we create a new EndpointMetric with
    /// default values. Subsequent requests update the existing metrics.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        // Get or create metrics for this specific endpoint
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        // Update the metrics for this endpoint
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// ## Why a snapshot:
    /// - Takes a read lock to get consistent data
    /// - Clones the data so we don't hold the lock while sending HTTP response
    /// - Ensures metrics don't change while we're serializing them to JSON
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Get server uptime in seconds.
    ///
    /// ## Rust Concepts:
    /// - **.elapsed()**: Returns a Duration since start_time
    /// - **.as_secs()**: Converts Duration to seconds (u64)
    /// - **No locking needed**: start_time never changes, so it's safe to read directly
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Implementation of utility methods for EndpointMetric.
impl EndpointMetric {
    /// Calculate the average response time for this endpoint.
    ///
    /// ## Formula:
    /// Average = Total Duration ÷ Number of Requests
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no average to calculate
        }
    }

    /// Calculate the error rate for this endpoint as a fraction (0.0 to 1.0).
    ///
    /// ## Formula:
    /// Error Rate = Number of Errors ÷ Total Requests
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no errors possible
        }
    }
}
