//! Configuration, secret resolution, the retrieval QA flow, and application
//! wiring.

pub mod bootstrap;
pub mod config;
pub mod flow;
pub mod vault;

pub use config::{Config, ConfigError};
pub use flow::{FlowError, GraphState, RetrievalQaFlow};
