// Domain layer - Monitoring keys, readings, thresholds and annotations
pub mod annotation;
pub mod coverage;
pub mod deployment;
pub mod error;
pub mod reading;
pub mod scope;
pub mod snapshot;
pub mod threshold;
