//! Module registry contract and descriptor types

pub mod service;
pub mod types;

pub use service::{InMemoryRegistry, ModuleRegistry, DEFAULT_EVENT_CAPACITY};
pub use types::*;
