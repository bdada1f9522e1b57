use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;
use tracing::warn;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Predictions served, by label
    pub static ref PREDICTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dspd_predictions_total", "Predictions served by label"),
        &["label"]
    ).expect("valid metric definition");

    pub static ref STAND_IN_PREDICTIONS_TOTAL: IntCounter = IntCounter::new(
        "dspd_stand_in_predictions_total",
        "Predictions produced by the deterministic stand-in"
    ).expect("valid metric definition");

    pub static ref INFERENCE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "dspd_inference_failures_total",
        "Classifier calls that failed and fell back to the stand-in"
    ).expect("valid metric definition");

    pub static ref REJECTED_REQUESTS_TOTAL: IntCounter = IntCounter::new(
        "dspd_rejected_requests_total",
        "Requests rejected because of bad input"
    ).expect("valid metric definition");

    pub static ref MODEL_LOADED: IntGauge = IntGauge::new(
        "dspd_model_loaded",
        "1 when a real classifier is loaded, 0 when the stand-in is active"
    ).expect("valid metric definition");

    // End-to-end time for one prediction request
    pub static ref PREDICTION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "dspd_prediction_seconds",
            "Time to preprocess and classify one upload"
        ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("valid metric definition");
}

static REGISTER: Once = Once::new();

pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(PREDICTIONS_TOTAL.clone()),
            Box::new(STAND_IN_PREDICTIONS_TOTAL.clone()),
            Box::new(INFERENCE_FAILURES_TOTAL.clone()),
            Box::new(REJECTED_REQUESTS_TOTAL.clone()),
            Box::new(MODEL_LOADED.clone()),
            Box::new(PREDICTION_SECONDS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!("Failed to register metric: {}", e);
            }
        }
    });
}

pub fn metrics_text() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_text_lists_registered_metrics() {
        register_metrics();
        register_metrics();
        PREDICTIONS_TOTAL.with_label_values(&["DSPD"]).inc();
        MODEL_LOADED.set(1);

        let text = metrics_text();
        assert!(text.contains("dspd_predictions_total"));
        assert!(text.contains("dspd_model_loaded"));
    }
}
