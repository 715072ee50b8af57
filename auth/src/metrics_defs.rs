use shared::metrics_defs::{MetricDef, MetricType};

pub const TOKEN_CHECKS: MetricDef = MetricDef {
    name: "auth.token_checks",
    metric_type: MetricType::Counter,
    description: "Token checks, tagged by resource and outcome (allowed, denied, error).",
};

pub const TOKENS_ISSUED: MetricDef = MetricDef {
    name: "auth.tokens_issued",
    metric_type: MetricType::Counter,
    description: "Tokens signed by the gateway, tagged by role.",
};

pub const ALL_METRICS: &[MetricDef] = &[TOKEN_CHECKS, TOKENS_ISSUED];
