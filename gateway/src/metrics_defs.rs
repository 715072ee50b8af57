use shared::metrics_defs::{MetricDef, MetricType};

pub const PROJECTS_LOADED: MetricDef = MetricDef {
    name: "gateway.projects.loaded",
    metric_type: MetricType::Gauge,
    description: "Number of project configs held by the gateway.",
};

pub const ALL_METRICS: &[MetricDef] = &[PROJECTS_LOADED];
