//! Request counters in the Prometheus text exposition format.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::RwLock;

const COUNTER_NAME: &str = "requests_total";

/// Counts requests per `"<path> - <METHOD>"` label.
#[derive(Debug, Default)]
pub struct RequestCounter {
    counts: RwLock<BTreeMap<String, u64>>,
}

impl RequestCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, path: &str, method: &str) {
        if let Ok(mut counts) = self.counts.write() {
            *counts.entry(format!("{path} - {method}")).or_insert(0) += 1;
        }
    }

    #[must_use]
    pub fn get(&self, path: &str, method: &str) -> u64 {
        self.counts
            .read()
            .ok()
            .and_then(|counts| counts.get(&format!("{path} - {method}")).copied())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn export(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "# HELP {COUNTER_NAME} Total number of requests");
        let _ = writeln!(output, "# TYPE {COUNTER_NAME} counter");
        if let Ok(counts) = self.counts.read() {
            for (label, count) in counts.iter() {
                let _ = writeln!(output, "{COUNTER_NAME}{{method=\"{}\"}} {count}", escape_label(label));
            }
        }
        output
    }
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_format() {
        let counter = RequestCounter::new();
        counter.increment("/predict", "GET");
        counter.increment("/predict", "GET");
        counter.increment("/status", "GET");

        let text = counter.export();
        assert!(text.starts_with("# HELP requests_total Total number of requests\n# TYPE requests_total counter\n"));
        assert!(text.contains("requests_total{method=\"/predict - GET\"} 2\n"));
        assert!(text.contains("requests_total{method=\"/status - GET\"} 1\n"));
        assert_eq!(counter.get("/predict", "GET"), 2);
        assert_eq!(counter.get("/metrics", "GET"), 0);
    }

    #[test]
    fn test_label_escaping() {
        assert_eq!(escape_label("a\"b"), "a\\\"b");
    }
}
