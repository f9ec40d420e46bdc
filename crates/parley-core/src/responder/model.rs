//! Responder backed by a pretrained sequence model.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::prompt::{DecodePolicy, PromptStyle, PromptTokens};
use super::Responder;
use crate::backends::{GenerationParams, SequenceGenerator, WorkerBridge, WorkerModel};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::hub;
use crate::tokenizer::{TextCodec, Tokenizer};

/// Runs the encode → generate → decode cycle for one prompt convention.
pub struct ModelResponder {
    name: String,
    style: PromptStyle,
    codec: Arc<dyn TextCodec>,
    generator: Arc<dyn SequenceGenerator>,
    tokens: PromptTokens,
    params: GenerationParams,
}

impl ModelResponder {
    pub fn new(
        name: impl Into<String>,
        style: PromptStyle,
        codec: Arc<dyn TextCodec>,
        generator: Arc<dyn SequenceGenerator>,
        tokens: PromptTokens,
        max_length: usize,
    ) -> Result<Self> {
        let name = name.into();
        let pad_token_id = codec.token_to_id(&tokens.eos).ok_or_else(|| {
            Error::Config(format!(
                "Backend '{name}': end-of-sequence token {:?} is not in the vocabulary",
                tokens.eos
            ))
        })?;

        Ok(Self {
            name,
            style,
            codec,
            generator,
            tokens,
            params: GenerationParams {
                max_length,
                pad_token_id,
            },
        })
    }

    /// Build a worker-backed responder: fetch the tokenizer, resolve the
    /// sequence markers and have the worker load the weights.
    pub fn load(
        backend: &BackendConfig,
        models_dir: &Path,
        bridge: Arc<WorkerBridge>,
        max_length: usize,
    ) -> Result<Self> {
        let style = backend.kind.prompt_style().ok_or_else(|| {
            Error::Config(format!(
                "Backend '{}' ({}) is not model-backed",
                backend.name, backend.kind
            ))
        })?;
        let repo_id = backend.repo_id().ok_or_else(|| {
            Error::Config(format!("Backend '{}' has no model repository", backend.name))
        })?;

        let tokenizer_dir = hub::resolve_tokenizer_dir(backend, repo_id, models_dir)?;
        let tokenizer = Tokenizer::from_path(&tokenizer_dir)?;

        let defaults = style.default_tokens();
        let declared = tokenizer.special_tokens();
        let tokens = PromptTokens {
            bos: declared.bos.clone().unwrap_or(defaults.bos),
            eos: declared.eos.clone().unwrap_or(defaults.eos),
        };

        bridge.ensure_running()?;
        bridge.preload(repo_id)?;

        info!(
            "Loaded backend '{}' ({}) from {} with {} tokens",
            backend.name,
            backend.kind,
            repo_id,
            tokenizer.vocab_size()
        );

        Self::new(
            backend.name.clone(),
            style,
            Arc::new(tokenizer),
            Arc::new(WorkerModel::new(bridge, repo_id)),
            tokens,
            max_length,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn prompt(&self, user_input: &str, history: &[String], personas: &[String]) -> String {
        self.style
            .build_prompt(user_input, history, personas, &self.tokens)
    }
}

impl Responder for ModelResponder {
    fn respond(&self, user_input: &str, history: &[String], personas: &[String]) -> Result<String> {
        let prompt = self.prompt(user_input, history, personas);
        let input_ids = self.codec.encode(&prompt)?;
        debug!(
            "Backend '{}' prompt has {} tokens",
            self.name,
            input_ids.len()
        );

        let output_ids = self.generator.generate(&input_ids, &self.params)?;

        let reply_ids = match self.style.decode_policy() {
            DecodePolicy::Full => output_ids.as_slice(),
            DecodePolicy::Continuation => output_ids.get(input_ids.len()..).unwrap_or(&[]),
        };
        self.codec.decode(reply_ids)
    }
}
