use shared::metrics_defs::{MetricDef, MetricType};

pub const BATCH_SIZE: MetricDef = MetricDef {
    name: "crud.batch.size",
    metric_type: MetricType::Histogram,
    description: "Number of reads dispatched together by a data loader.",
};

pub const MERGED_READS: MetricDef = MetricDef {
    name: "crud.reads.merged",
    metric_type: MetricType::Counter,
    description: "Merged reads sent to a database, tagged by whether they succeeded.",
};

pub const INDIVIDUAL_READS: MetricDef = MetricDef {
    name: "crud.reads.individual",
    metric_type: MetricType::Counter,
    description: "Reads with options that bypass merging.",
};

pub const ALL_METRICS: &[MetricDef] = &[BATCH_SIZE, MERGED_READS, INDIVIDUAL_READS];
