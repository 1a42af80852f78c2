use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Pre-register counters so they appear even before the first increment.
    counter!("oracle_checks_total").absolute(0);
    counter!("oracle_signals_collected_total").absolute(0);
    counter!("oracle_markets_resolved_total").absolute(0);
    counter!("oracle_llm_corroborations_total").absolute(0);
    counter!("oracle_llm_fallbacks_total").absolute(0);

    // Pre-register gauges at zero.
    gauge!("oracle_pending_markets").set(0.0);

    // Histogram is lazily created on first record; force creation.
    histogram!("oracle_check_seconds").record(0.0);

    handle
}
