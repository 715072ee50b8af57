use shared::metrics_defs::{MetricDef, MetricType};

pub const RUNNER_REQUESTS: MetricDef = MetricDef {
    name: "runner.requests",
    metric_type: MetricType::Counter,
    description: "Requests to the runner API, tagged by resource and the status returned.",
};

pub const RUNNER_REQUEST_DURATION: MetricDef = MetricDef {
    name: "runner.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time until the runner responded with headers, in seconds.",
};

pub const LOG_LINES_STREAMED: MetricDef = MetricDef {
    name: "runner.logs.lines",
    metric_type: MetricType::Counter,
    description: "Service log lines relayed to clients.",
};

pub const ALL_METRICS: &[MetricDef] = &[RUNNER_REQUESTS, RUNNER_REQUEST_DURATION, LOG_LINES_STREAMED];
