//! # Run Orchestration
//!
//! The engine wires configuration, probing, the audio and frame pipelines,
//! the encoder and the metadata pass into one run with scoped cleanup.

pub mod engine;

pub use engine::{RemixEngine, RunReport};
