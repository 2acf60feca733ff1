pub mod api;
pub mod cache;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod resolver;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{build_series_set, Envelope, Outcome, PipelineSettings};
pub use resolver::{resolve, SeriesSet};
