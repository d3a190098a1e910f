//! Integration adapters.

pub mod rig_adapter;

pub use rig_adapter::{init_tracing, ollama_client};
