//! Experiment orchestration: task stores, model providers, concurrent run
//! execution and the end-to-end pipeline.

pub mod dataset;
pub mod executor;
pub mod pipeline;
pub mod provider;

pub use dataset::*;
pub use executor::*;
pub use pipeline::*;
pub use provider::*;
