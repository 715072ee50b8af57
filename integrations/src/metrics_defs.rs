use shared::metrics_defs::{MetricDef, MetricType};

pub const HOOK_CALLS: MetricDef = MetricDef {
    name: "integrations.hook.calls",
    metric_type: MetricType::Counter,
    description: "Integration hook calls, tagged by integration and outcome (continue, hijacked, rejected).",
};

pub const HOOK_DURATION: MetricDef = MetricDef {
    name: "integrations.hook.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent waiting for a single integration hook, in seconds.",
};

pub const INTEGRATIONS_REGISTERED: MetricDef = MetricDef {
    name: "integrations.registered",
    metric_type: MetricType::Gauge,
    description: "Number of enabled integrations.",
};

pub const ALL_METRICS: &[MetricDef] = &[HOOK_CALLS, HOOK_DURATION, INTEGRATIONS_REGISTERED];
