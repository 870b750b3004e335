//! Model gateway implementations for agentflow.
//!
//! All gateways implement `agentflow_core::ModelGateway`. `build_from_config`
//! turns the configured models into the two bindings the loops use.

pub mod bindings;
pub mod openai_compat;

pub use bindings::{ModelBindings, build_from_config};
pub use openai_compat::OpenAiCompatGateway;
