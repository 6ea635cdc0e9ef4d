//! Metrics definitions for the Atlassian clients.

use shared::metrics_defs::{MetricDef, MetricType};

pub const ATLASSIAN_RETRIES: MetricDef = MetricDef {
    name: "atlassian.request.retry",
    metric_type: MetricType::Counter,
    description: "Number of Jira/Confluence requests retried after a retriable status",
};

pub const PAGES_PUBLISHED: MetricDef = MetricDef {
    name: "confluence.pages.published",
    metric_type: MetricType::Counter,
    description: "Number of wiki pages written. Tagged with action (created, updated).",
};

pub const ALL_METRICS: &[MetricDef] = &[ATLASSIAN_RETRIES, PAGES_PUBLISHED];
