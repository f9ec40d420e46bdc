//! Known backend kinds, their model repositories and identifier parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::responder::PromptStyle;

/// Every backend family the service knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Canned replies, no model.
    Fallback,
    /// BART fine-tuned on PersonaChat with `[CONTEXT]`/`[KNOWLEDGE]` markers.
    BartPersona,
    /// personaGPT (GPT-2) with `<|p2|>` persona blocks.
    PersonaGpt,
    /// DialoGPT without persona conditioning.
    DialoGpt,
    /// BlenderBot small 90M.
    BlenderbotSmall,
}

impl BackendKind {
    pub fn all() -> &'static [BackendKind] {
        use BackendKind::*;
        &[Fallback, BartPersona, PersonaGpt, DialoGpt, BlenderbotSmall]
    }

    /// Name the backend is registered under when the configuration does not
    /// say otherwise.
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Fallback => "qc",
            Self::BartPersona => "bart",
            Self::PersonaGpt => "dialogpt",
            Self::DialoGpt => "vanilla_dialogpt",
            Self::BlenderbotSmall => "vanilla_blenderbot_small",
        }
    }

    /// Model hub repository holding weights and tokenizer files.
    pub fn repo_id(&self) -> Option<&'static str> {
        match self {
            Self::Fallback => None,
            Self::BartPersona => Some("DeepPavlov/bart-base-en-persona-chat"),
            Self::PersonaGpt => Some("af1tang/personaGPT"),
            Self::DialoGpt => Some("microsoft/DialoGPT-small"),
            Self::BlenderbotSmall => Some("facebook/blenderbot_small-90M"),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fallback => "Canned Fallback",
            Self::BartPersona => "PersonaChat BART",
            Self::PersonaGpt => "PersonaGPT",
            Self::DialoGpt => "DialoGPT Small",
            Self::BlenderbotSmall => "BlenderBot Small 90M",
        }
    }

    pub fn prompt_style(&self) -> Option<PromptStyle> {
        match self {
            Self::Fallback => None,
            Self::BartPersona => Some(PromptStyle::Seq2SeqPersona),
            Self::PersonaGpt => Some(PromptStyle::CausalPersona),
            Self::DialoGpt => Some(PromptStyle::CausalVanilla),
            Self::BlenderbotSmall => Some(PromptStyle::Seq2SeqSmall),
        }
    }

    pub fn is_model_backed(&self) -> bool {
        !matches!(self, Self::Fallback)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone)]
pub struct ParseBackendKindError {
    input: String,
}

impl fmt::Display for ParseBackendKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.input.trim().is_empty() {
            "<empty>"
        } else {
            self.input.trim()
        };
        write!(f, "Unsupported backend identifier: {shown}")
    }
}

impl std::error::Error for ParseBackendKindError {}

/// Resolve a backend kind from its registered name, repository id, repository
/// tail or display name. Matching ignores case and punctuation.
pub fn parse_backend_kind(input: &str) -> Result<BackendKind, ParseBackendKindError> {
    let normalized = normalize_identifier(input);
    if normalized.is_empty() {
        return Err(ParseBackendKindError {
            input: input.to_string(),
        });
    }

    BackendKind::all()
        .iter()
        .copied()
        .find(|kind| {
            let repo = kind.repo_id().unwrap_or_default();
            let repo_tail = repo.rsplit('/').next().unwrap_or(repo);
            [kind.default_name(), repo, repo_tail, kind.display_name()]
                .iter()
                .filter(|alias| !alias.is_empty())
                .any(|alias| normalize_identifier(alias) == normalized)
        })
        .ok_or_else(|| ParseBackendKindError {
            input: input.to_string(),
        })
}

fn normalize_identifier(input: &str) -> String {
    input
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_by_registered_name() {
        assert_eq!(parse_backend_kind("qc").unwrap(), BackendKind::Fallback);
        assert_eq!(
            parse_backend_kind("vanilla_blenderbot_small").unwrap(),
            BackendKind::BlenderbotSmall
        );
    }

    #[test]
    fn parse_by_repo_id_and_tail() {
        assert_eq!(
            parse_backend_kind("af1tang/personaGPT").unwrap(),
            BackendKind::PersonaGpt
        );
        assert_eq!(
            parse_backend_kind("DialoGPT-small").unwrap(),
            BackendKind::DialoGpt
        );
    }

    #[test]
    fn parse_rejects_unknown_and_empty() {
        assert!(parse_backend_kind("gpt-5").is_err());
        let err = parse_backend_kind("  ").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported backend identifier: <empty>");
    }

    #[test]
    fn only_fallback_lacks_a_prompt_style() {
        for kind in BackendKind::all() {
            assert_eq!(kind.prompt_style().is_none(), !kind.is_model_backed());
            assert_eq!(kind.repo_id().is_none(), !kind.is_model_backed());
        }
    }
}
