//! Prompt conventions of the supported dialogue models.

/// Turn separator the PersonaChat BART checkpoint was trained with.
const BART_TURN_SEPARATOR: &str = " EOS ";

const PERSONA_BLOCK_MARKER: &str = "<|p2|>";
const PERSONA_SEPARATOR_MARKER: &str = "<|sep|>";
const DIALOGUE_START_MARKER: &str = "<|start|>";

/// Joins personas and turns for BlenderBot small.
const SMALL_SEPARATOR: &str = "</s> <s>";

/// Sequence markers a prompt is assembled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTokens {
    pub bos: String,
    pub eos: String,
}

/// Which part of the generated ids becomes the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Sequence-to-sequence: decoder output is the reply.
    Full,
    /// Causal continuation: only ids past the prompt are the reply.
    Continuation,
}

/// How a backend serializes personas, history and the user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptStyle {
    /// `<bos> [CONTEXT] history+input [KNOWLEDGE] personas <eos>`
    Seq2SeqPersona,
    /// `<|p2|>` persona block, then eos-separated turns.
    CausalPersona,
    /// `personas<eos>history<eos>input<eos>`
    CausalVanilla,
    /// `<bos>personas<eos>history<eos>input<eos>` with `</s> <s>` joins.
    Seq2SeqSmall,
}

impl PromptStyle {
    pub fn decode_policy(&self) -> DecodePolicy {
        match self {
            Self::Seq2SeqPersona | Self::Seq2SeqSmall => DecodePolicy::Full,
            Self::CausalPersona | Self::CausalVanilla => DecodePolicy::Continuation,
        }
    }

    /// Markers used when the tokenizer configuration does not declare them.
    pub fn default_tokens(&self) -> PromptTokens {
        let (bos, eos) = match self {
            Self::Seq2SeqPersona => ("<s>", "</s>"),
            Self::CausalPersona | Self::CausalVanilla => ("<|endoftext|>", "<|endoftext|>"),
            Self::Seq2SeqSmall => ("__start__", "__end__"),
        };
        PromptTokens {
            bos: bos.to_string(),
            eos: eos.to_string(),
        }
    }

    pub fn format_persona(&self, personas: &[String], tokens: &PromptTokens) -> String {
        match self {
            Self::Seq2SeqPersona | Self::CausalVanilla => personas.join(" "),
            Self::CausalPersona => {
                let mut block = String::from(PERSONA_BLOCK_MARKER);
                for fact in personas {
                    block.push_str(fact);
                    block.push_str(&tokens.eos);
                }
                block.push_str(PERSONA_SEPARATOR_MARKER);
                block.push_str(DIALOGUE_START_MARKER);
                block
            }
            Self::Seq2SeqSmall => personas.join(SMALL_SEPARATOR),
        }
    }

    pub fn format_history(&self, history: &[String], tokens: &PromptTokens) -> String {
        match self {
            Self::Seq2SeqPersona => history.join(BART_TURN_SEPARATOR),
            Self::CausalPersona => history.join(tokens.eos.as_str()),
            Self::CausalVanilla => history.join(" "),
            Self::Seq2SeqSmall => history.join(SMALL_SEPARATOR),
        }
    }

    /// Assemble the full prompt string for one turn.
    pub fn build_prompt(
        &self,
        user_input: &str,
        history: &[String],
        personas: &[String],
        tokens: &PromptTokens,
    ) -> String {
        let persona = self.format_persona(personas, tokens);
        let PromptTokens { bos, eos } = tokens;

        match self {
            Self::Seq2SeqPersona => {
                // The current turn is part of the context block.
                let mut turns = history.to_vec();
                turns.push(user_input.to_string());
                let context = self.format_history(&turns, tokens);
                format!("{bos} [CONTEXT] {context} [KNOWLEDGE] {persona} {eos}")
            }
            Self::CausalPersona => {
                let context = self.format_history(history, tokens);
                format!("{persona}{context}{eos}{user_input}{eos}")
            }
            Self::CausalVanilla => {
                let context = self.format_history(history, tokens);
                format!("{persona}{eos}{context}{eos}{user_input}{eos}")
            }
            Self::Seq2SeqSmall => {
                let context = self.format_history(history, tokens);
                format!("{bos}{persona}{eos}{context}{eos}{user_input}{eos}")
            }
        }
    }
}
