//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Submission pipeline metrics
pub struct Metrics {
    registry: Registry,

    // Counters
    pub submissions_total: IntCounter,
    pub submissions_confirmed: IntCounter,
    pub submissions_failed: IntCounterVec,
    pub rebroadcasts_total: IntCounter,
    pub rebroadcast_errors: IntCounter,
    pub poll_requests: IntCounter,
    pub poll_errors: IntCounter,
    pub subscription_failures: IntCounter,
    pub race_wins: IntCounterVec,
    pub simulations_total: IntCounter,
    pub simulation_failures: IntCounter,

    // Histograms
    pub confirmation_latency: Histogram,
    pub simulation_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let submissions_total = IntCounter::with_opts(Opts::new(
            "solray_submissions_total",
            "Total number of transaction submissions started",
        ))?;

        let submissions_confirmed = IntCounter::with_opts(Opts::new(
            "solray_submissions_confirmed_total",
            "Number of submissions that reached a confirmed status",
        ))?;

        let submissions_failed = IntCounterVec::new(
            Opts::new(
                "solray_submissions_failed_total",
                "Number of failed submissions by error kind",
            ),
            &["kind"],
        )?;

        let rebroadcasts_total = IntCounter::with_opts(Opts::new(
            "solray_rebroadcasts_total",
            "Number of raw transaction resubmissions",
        ))?;

        let rebroadcast_errors = IntCounter::with_opts(Opts::new(
            "solray_rebroadcast_errors_total",
            "Resubmissions rejected by the transport (ignored)",
        ))?;

        let poll_requests = IntCounter::with_opts(Opts::new(
            "solray_status_polls_total",
            "Number of signature status queries",
        ))?;

        let poll_errors = IntCounter::with_opts(Opts::new(
            "solray_status_poll_errors_total",
            "Transient errors swallowed by the status poll loop",
        ))?;

        let subscription_failures = IntCounter::with_opts(Opts::new(
            "solray_subscription_failures_total",
            "Signature subscriptions that could not be established",
        ))?;

        let race_wins = IntCounterVec::new(
            Opts::new(
                "solray_confirmation_race_wins_total",
                "Which observer resolved the confirmation race",
            ),
            &["source"],
        )?;

        let simulations_total = IntCounter::with_opts(Opts::new(
            "solray_simulations_total",
            "Diagnostic simulations requested",
        ))?;

        let simulation_failures = IntCounter::with_opts(Opts::new(
            "solray_simulation_failures_total",
            "Diagnostic simulations that could not be executed",
        ))?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "solray_confirmation_latency_seconds",
                "Time from first submission to confirmation",
            )
            .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0]),
        )?;

        let simulation_latency = Histogram::with_opts(
            HistogramOpts::new("solray_simulation_latency_seconds", "Simulation call latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(submissions_total.clone()))?;
        registry.register(Box::new(submissions_confirmed.clone()))?;
        registry.register(Box::new(submissions_failed.clone()))?;
        registry.register(Box::new(rebroadcasts_total.clone()))?;
        registry.register(Box::new(rebroadcast_errors.clone()))?;
        registry.register(Box::new(poll_requests.clone()))?;
        registry.register(Box::new(poll_errors.clone()))?;
        registry.register(Box::new(subscription_failures.clone()))?;
        registry.register(Box::new(race_wins.clone()))?;
        registry.register(Box::new(simulations_total.clone()))?;
        registry.register(Box::new(simulation_failures.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;
        registry.register(Box::new(simulation_latency.clone()))?;

        Ok(Self {
            registry,
            submissions_total,
            submissions_confirmed,
            submissions_failed,
            rebroadcasts_total,
            rebroadcast_errors,
            poll_requests,
            poll_errors,
            subscription_failures,
            race_wins,
            simulations_total,
            simulation_failures,
            confirmation_latency,
            simulation_latency,
        })
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_export() {
        let m = Metrics::new().unwrap();
        m.submissions_total.inc();
        m.submissions_failed.with_label_values(&["timeout"]).inc();
        m.race_wins.with_label_values(&["poll"]).inc();

        let text = m.gather_text().unwrap();
        assert!(text.contains("solray_submissions_total 1"));
        assert!(text.contains("solray_submissions_failed_total{kind=\"timeout\"} 1"));
        assert!(text.contains("solray_confirmation_race_wins_total{source=\"poll\"} 1"));
    }

    #[test]
    fn test_timer_observes() {
        let m = Metrics::new().unwrap();
        let timer = Timer::new();
        timer.observe_duration(&m.simulation_latency);
        assert_eq!(m.simulation_latency.get_sample_count(), 1);
    }
}
