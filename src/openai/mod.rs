//! OpenAI function-calling compatibility
//!
//! Exposes registry modules as chat-completions `tools` definitions.

pub mod converter;
pub mod types;

pub use converter::OpenAiConverter;
pub use types::*;
