//! Generation backends.
//!
//! The responder layer owns prompt assembly and tokenization; a backend only
//! maps prompt token ids to output token ids under [`GenerationParams`].

mod worker;

pub use worker::{WorkerBridge, WorkerModel, WorkerRequest, WorkerResponse};

use crate::error::Result;

/// Per-call generation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    /// Bound on the total output length, prompt included for causal models.
    pub max_length: usize,
    /// Padding token id, the model's end-of-sequence id.
    pub pad_token_id: u32,
}

/// A pretrained sequence model's `generate` procedure.
pub trait SequenceGenerator: Send + Sync {
    /// Run generation for one prompt and return the raw output ids.
    ///
    /// Causal models return the prompt followed by the continuation;
    /// sequence-to-sequence models return only decoder output.
    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>>;
}
