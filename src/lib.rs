pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod rate_limiter;
pub mod report;
pub mod sheet;
pub mod store;
