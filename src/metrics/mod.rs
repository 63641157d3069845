//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Turn store metrics
    pub turns_recorded: Counter,
    pub overflow_drops: Counter,

    // Window selection metrics
    pub windows_built: Counter,
    pub windows_degraded: Counter,
    pub window_tokens: Histogram,

    // Summarization metrics
    pub summarizations: CounterVec,
    pub tokens_reclaimed: Counter,
    pub summarization_duration: HistogramVec,

    // Adapter metrics
    pub adapter_fallbacks: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let turns_recorded = register_counter_with_registry!(
            Opts::new("context_turns_recorded_total", "Total conversation turns recorded"),
            registry
        )?;

        let overflow_drops = register_counter_with_registry!(
            Opts::new("context_overflow_drops_total", "Turns dropped by store capacity overflow"),
            registry
        )?;

        let windows_built = register_counter_with_registry!(
            Opts::new("context_windows_built_total", "Total context windows built"),
            registry
        )?;

        let windows_degraded = register_counter_with_registry!(
            Opts::new(
                "context_windows_degraded_total",
                "Windows whose reserves exhausted the token budget"
            ),
            registry
        )?;

        let window_tokens = register_histogram_with_registry!(
            HistogramOpts::new("context_window_tokens", "Total tokens per built window").buckets(
                vec![250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0, 32000.0]
            ),
            registry
        )?;

        let summarizations = register_counter_vec_with_registry!(
            Opts::new("context_summarizations_total", "Summarization passes by outcome"),
            &["status"],
            registry
        )?;

        let tokens_reclaimed = register_counter_with_registry!(
            Opts::new("context_tokens_reclaimed_total", "Tokens reclaimed by summarization"),
            registry
        )?;

        let summarization_duration = register_histogram_vec_with_registry!(
            "context_summarization_duration_seconds",
            "Summarization pass duration in seconds",
            &["stage"],
            registry
        )?;

        let adapter_fallbacks = register_counter_vec_with_registry!(
            Opts::new("context_adapter_fallbacks_total", "Adapter failures recovered by fallback"),
            &["adapter"],
            registry
        )?;

        Ok(Self {
            registry,
            turns_recorded,
            overflow_drops,
            windows_built,
            windows_degraded,
            window_tokens,
            summarizations,
            tokens_reclaimed,
            summarization_duration,
            adapter_fallbacks,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record an appended turn and whether it forced an overflow drop
    pub fn record_turn(&self, dropped: bool) {
        self.turns_recorded.inc();
        if dropped {
            self.overflow_drops.inc();
        }
    }

    /// Record a built window
    pub fn record_window(&self, total_tokens: usize, degraded: bool) {
        self.windows_built.inc();
        self.window_tokens.observe(total_tokens as f64);
        if degraded {
            self.windows_degraded.inc();
        }
    }

    /// Record a summarization pass outcome
    pub fn record_summarization(&self, status: &str, tokens_saved: i64) {
        self.summarizations.with_label_values(&[status]).inc();
        if tokens_saved > 0 {
            self.tokens_reclaimed.inc_by(tokens_saved as f64);
        }
    }

    /// Record an adapter failure absorbed by its fallback
    pub fn record_adapter_fallback(&self, adapter: &str) {
        self.adapter_fallbacks.with_label_values(&[adapter]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Helper macro to time operations
#[macro_export]
macro_rules! time_operation {
    ($histogram:expr, $label:expr, $operation:expr) => {{
        let timer = $histogram.with_label_values(&[$label]).start_timer();
        let result = $operation;
        timer.observe_duration();
        result
    }};
}
