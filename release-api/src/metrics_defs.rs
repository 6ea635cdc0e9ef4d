use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status, handler.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of requests currently being processed",
};

pub const ANALYSES_INFLIGHT: MetricDef = MetricDef {
    name: "batch.analyses.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of issues currently holding a concurrency permit",
};

pub const BATCH_ITEM_OUTCOMES: MetricDef = MetricDef {
    name: "batch.item.outcome",
    metric_type: MetricType::Counter,
    description: "Per-issue batch outcomes. Tagged with status (success, failure, timeout, skipped).",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    ANALYSES_INFLIGHT,
    BATCH_ITEM_OUTCOMES,
];
