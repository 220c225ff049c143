// Core modules: schema registry, dataset sources, transcription, and both build pipelines.
pub mod dataset;
pub mod error;
pub mod populate;
pub mod record;
pub mod report;
pub mod schema;
pub mod script;
