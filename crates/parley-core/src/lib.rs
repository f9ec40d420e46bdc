//! Parley core: persona-conditioned dialogue over pretrained chat models.
//!
//! Requests name a backend, carry the user's turn plus prior turns, and may
//! opt into a seeded persona sample. Each backend turns that into a reply:
//! - `qc` answers with a canned reply and ignores context.
//! - Model backends assemble a model-specific prompt, encode it with the
//!   model's tokenizer, run generation in an out-of-process worker and decode
//!   the result.

pub mod backends;
pub mod catalog;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod fallback;
pub mod hub;
pub mod persona;
pub mod registry;
pub mod responder;
pub mod tokenizer;

pub use catalog::{parse_backend_kind, BackendKind};
pub use config::{BackendConfig, LoadPolicy, ServiceConfig, WorkerConfig};
pub use dialogue::{InteractionRequest, InteractionResponse};
pub use error::{Error, Result};
pub use fallback::FallbackResponder;
pub use persona::PersonaStore;
pub use registry::ResponderRegistry;
pub use responder::{ModelResponder, PromptStyle, Responder};
