//! # Structured Logging Module
//!
//! Environment-aware structured logging for the dispatch loop and the per-truck
//! cycle tasks. Console output is human readable by default; JSON output can be
//! switched on through [`LoggingConfig`](crate::config::LoggingConfig).

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific defaults
pub fn init_structured_logging() {
    init_with_config(&LoggingConfig::default());
}

/// Initialize structured logging from configuration. Only the first call has
/// any effect.
pub fn init_with_config(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        // RUST_LOG wins over configured levels
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let layer = if config.json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(config.ansi)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = config.json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Current environment: HAUL_ENV, then APP_ENV, defaulting to development
pub fn get_environment() -> String {
    std::env::var("HAUL_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "test" => "debug",
        "development" => "debug",
        "production" => "info",
        _ => "debug",
    }
}

/// Log a cycle state change or cycle-level operation
pub fn log_cycle_operation(
    operation: &str,
    activity_id: Option<&str>,
    truck_id: &str,
    phase: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        activity_id = activity_id,
        truck_id = %truck_id,
        phase = %phase,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🚚 CYCLE_OPERATION"
    );
}

/// Log a loading point queue movement
pub fn log_queue_operation(
    operation: &str,
    loading_point_id: &str,
    truck_id: &str,
    occupancy: usize,
    backlog: usize,
) {
    tracing::debug!(
        operation = %operation,
        loading_point_id = %loading_point_id,
        truck_id = %truck_id,
        occupancy = occupancy,
        backlog = backlog,
        "⛏️ QUEUE_OPERATION"
    );
}

/// Log a dispatch decision or tick summary
pub fn log_dispatch_operation(
    operation: &str,
    truck_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        truck_id = truck_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📡 DISPATCH_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
