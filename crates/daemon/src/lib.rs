pub mod api;
pub mod assign;
pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod jobs;
pub mod media;
pub mod pipeline;
pub mod retrieval;
pub mod stock;

pub use config::AppConfig;
pub use errors::PipelineError;
pub use pipeline::{GenerationRun, RunDeps, RunRequest};
