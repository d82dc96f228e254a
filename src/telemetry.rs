use prometheus::{
    exponential_buckets, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts,
    Registry,
};
use std::{collections::BTreeSet, time::Duration};

pub struct Metrics {
    request_counter: IntCounterVec,
    prediction_duration: HistogramVec,
    model_load_duration: Histogram,
    model_ready: IntGauge,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_counter = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of requests"),
            &["route"],
        )?;

        let boundaries = generate_boundaries(&[5, 25, 50, 250, 1000], &[5, 5, 25, 250]);
        let prediction_duration = HistogramVec::new(
            HistogramOpts::new(
                "prediction_duration_ms",
                "Duration of prediction operations in milliseconds",
            )
            .buckets(boundaries),
            &["route"],
        )?;

        let model_load_duration = Histogram::with_opts(
            HistogramOpts::new(
                "model_load_duration_ms",
                "Duration of model loading and warmup in milliseconds",
            )
            .buckets(exponential_buckets(100., 2., 10)?),
        )?;

        let model_ready = IntGauge::new("model_ready", "1 when the classifier is ready to serve")?;

        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(prediction_duration.clone()))?;
        registry.register(Box::new(model_load_duration.clone()))?;
        registry.register(Box::new(model_ready.clone()))?;

        Ok(Metrics {
            request_counter,
            prediction_duration,
            model_load_duration,
            model_ready,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.request_counter.with_label_values(&[route]).inc();
    }

    pub fn record_prediction_duration(&self, duration: Duration, route: &str) {
        self.prediction_duration
            .with_label_values(&[route])
            .observe(duration.as_secs_f64() * 1000.);
    }

    pub fn record_model_load_duration(&self, duration: Duration) {
        self.model_load_duration
            .observe(duration.as_secs_f64() * 1000.);
    }

    pub fn set_model_ready(&self, ready: bool) {
        self.model_ready.set(i64::from(ready));
    }
}

/// Histogram boundaries spanning consecutive `edges`, stepping through each
/// span `edges[i]..=edges[i + 1]` by `steps[i]`.
fn generate_boundaries(edges: &[u32], steps: &[usize]) -> Vec<f64> {
    let mut seen = BTreeSet::new();
    for (span, step) in edges.windows(2).zip(steps) {
        seen.extend((span[0]..=span[1]).step_by((*step).max(1)));
    }
    seen.into_iter().map(f64::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn test_generate_boundaries() {
        let get = generate_boundaries(&[2, 22, 26, 46, 146], &[10, 2, 20, 100]);
        let expected = vec![2.0, 12.0, 22.0, 24.0, 26.0, 46.0, 146.0];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_metrics_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("/predict");
        metrics.record_prediction_duration(Duration::from_millis(12), "/predict");
        metrics.set_model_ready(true);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("http_requests_total{route=\"/predict\"} 1"));
        assert!(text.contains("prediction_duration_ms_count{route=\"/predict\"} 1"));
        assert!(text.contains("model_ready 1"));
    }
}
