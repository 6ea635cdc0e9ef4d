//! Metrics definitions for the LLM analyzer.

use shared::metrics_defs::{MetricDef, MetricType};

pub const ANALYZER_CALL_DURATION: MetricDef = MetricDef {
    name: "analyzer.call.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of one chat-completions call in seconds. Tagged with status (ok, error).",
};

pub const ANALYZER_RETRIES: MetricDef = MetricDef {
    name: "analyzer.call.retry",
    metric_type: MetricType::Counter,
    description: "Number of chat-completions calls retried",
};

pub const ALL_METRICS: &[MetricDef] = &[ANALYZER_CALL_DURATION, ANALYZER_RETRIES];
