//! Uniform reply interface over heterogeneous dialogue backends.

mod model;
mod prompt;

pub use model::ModelResponder;
pub use prompt::{DecodePolicy, PromptStyle, PromptTokens};

use crate::error::Result;

/// A backend that turns one conversational turn into a reply.
///
/// Implementations are shared read-only across request threads.
pub trait Responder: Send + Sync {
    fn respond(&self, user_input: &str, history: &[String], personas: &[String]) -> Result<String>;
}
