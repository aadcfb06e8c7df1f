// Application layer - Engine components, collaborator traits and use cases
pub mod alert;
pub mod history;
pub mod monitor_service;
pub mod monitoring_source;
pub mod platform_service;
pub mod qc_gaps;
pub mod range_evaluator;
pub mod reconciler;
pub mod rollup;
pub mod snapshot_diff;
pub mod source_queries;
pub mod stats_service;
