//! Metrics and monitoring for the star-tally service

pub mod collector;

pub use collector::MetricsCollector;
