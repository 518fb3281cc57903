//! Shared helpers for pipeline scenarios.

#![allow(dead_code)]

use granite_core::metrics::SharedSink;
use granite_core::MetricsSink;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A metrics sink that captures counter totals and histogram samples.
#[derive(Default)]
pub struct CaptureSink {
    counters: Mutex<HashMap<String, u64>>,
    histograms: Mutex<HashMap<String, Vec<f64>>>,
}

impl CaptureSink {
    pub fn shared() -> (Arc<CaptureSink>, SharedSink) {
        let capture = Arc::new(CaptureSink::default());
        let sink: SharedSink = capture.clone();
        (capture, sink)
    }

    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn histogram_samples(&self, name: &str) -> Vec<f64> {
        self.histograms
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

impl MetricsSink for CaptureSink {
    fn counter(&self, name: &str, _labels: &[(&'static str, &str)], value: u64) {
        *self
            .counters
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert(0) += value;
    }

    fn histogram(&self, name: &str, _labels: &[(&'static str, &str)], value: f64) {
        self.histograms
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn gauge(&self, _name: &str, _labels: &[(&'static str, &str)], _value: f64) {}
}
