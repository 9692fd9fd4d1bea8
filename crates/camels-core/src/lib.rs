pub mod attributes;
pub mod config;
pub mod error;
pub mod fetch;
pub mod join;
pub mod normalize;
pub mod outputs;
pub mod pipeline;
pub mod reshape;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use join::JoinPolicy;
pub use pipeline::{run, RunSummary};
