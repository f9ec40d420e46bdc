//! Tokenizer loading and special-token resolution for dialogue models.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tokenizers::decoders::byte_fallback::ByteFallback;
use tokenizers::decoders::sequence::Sequence;
use tokenizers::decoders::DecoderWrapper;
use tokenizers::models::bpe::BPE;
use tokenizers::pre_tokenizers::byte_level::ByteLevel;
use tokenizers::AddedToken;
use tokenizers::Tokenizer as HfTokenizer;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Text ↔ token id conversion as seen by a responder.
pub trait TextCodec: Send + Sync {
    /// Encode text, letting the tokenizer add its own special tokens.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode ids with special and control tokens stripped.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    fn token_to_id(&self, token: &str) -> Option<u32>;
}

/// Marker strings declared by a model's tokenizer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialTokens {
    pub bos: Option<String>,
    pub eos: Option<String>,
    pub pad: Option<String>,
    pub unk: Option<String>,
    /// `additional_special_tokens`, such as persona control markers
    pub additional: Vec<String>,
}

impl SpecialTokens {
    /// Read `tokenizer_config.json`, then fill gaps from `special_tokens_map.json`.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let mut tokens = Self::default();
        for file in ["tokenizer_config.json", "special_tokens_map.json"] {
            let path = model_dir.join(file);
            if !path.exists() {
                continue;
            }
            let declared: SpecialTokensFile = serde_json::from_str(&fs::read_to_string(&path)?)?;
            tokens.bos = tokens.bos.or(declared.bos_token.map(TokenSpec::into_content));
            tokens.eos = tokens.eos.or(declared.eos_token.map(TokenSpec::into_content));
            tokens.pad = tokens.pad.or(declared.pad_token.map(TokenSpec::into_content));
            tokens.unk = tokens.unk.or(declared.unk_token.map(TokenSpec::into_content));
            for extra in declared.additional_special_tokens {
                let content = extra.into_content();
                if !tokens.additional.contains(&content) {
                    tokens.additional.push(content);
                }
            }
        }
        Ok(tokens)
    }

    fn declared(&self) -> impl Iterator<Item = &str> {
        [&self.bos, &self.eos, &self.pad, &self.unk]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .chain(self.additional.iter().map(String::as_str))
    }

    fn is_declared(&self, content: &str) -> bool {
        self.declared().any(|token| token == content)
    }
}

pub struct Tokenizer {
    inner: HfTokenizer,
    special_tokens: SpecialTokens,
}

impl Tokenizer {
    /// Load from a model directory holding `tokenizer.json`, or `vocab.json`
    /// with `merges.txt`.
    pub fn from_path(model_dir: &Path) -> Result<Self> {
        let special_tokens = SpecialTokens::from_model_dir(model_dir)?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        if tokenizer_path.exists() {
            let inner = HfTokenizer::from_file(&tokenizer_path)
                .map_err(|e| Error::Tokenization(e.to_string()))?;
            debug!("Loaded tokenizer from {:?}", tokenizer_path);
            return Ok(Self {
                inner,
                special_tokens,
            });
        }

        let vocab_path = model_dir.join("vocab.json");
        let merges_path = model_dir.join("merges.txt");
        if vocab_path.exists() && merges_path.exists() {
            let inner = build_bpe(model_dir, &vocab_path, &merges_path, &special_tokens)?;
            return Ok(Self {
                inner,
                special_tokens,
            });
        }

        Err(Error::Tokenization(format!(
            "No tokenizer found in {:?}",
            model_dir
        )))
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl TextCodec for Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| Error::Tokenization(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| Error::Tokenization(e.to_string()))
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }
}

/// Byte-level BPE for GPT-2 style repositories that ship no `tokenizer.json`.
fn build_bpe(
    model_dir: &Path,
    vocab_path: &Path,
    merges_path: &Path,
    special_tokens: &SpecialTokens,
) -> Result<HfTokenizer> {
    info!("Building BPE tokenizer from vocab.json + merges.txt");
    let vocab_str = vocab_path
        .to_str()
        .ok_or_else(|| Error::Tokenization("Invalid vocab path".to_string()))?;
    let merges_str = merges_path
        .to_str()
        .ok_or_else(|| Error::Tokenization("Invalid merges path".to_string()))?;

    let bpe = BPE::from_file(vocab_str, merges_str)
        .byte_fallback(true)
        .build()
        .map_err(|e| Error::Tokenization(format!("BPE build failed: {}", e)))?;

    let mut inner = HfTokenizer::new(bpe);

    let config = load_tokenizer_config(model_dir)?;
    let add_prefix_space = config
        .as_ref()
        .and_then(|cfg| cfg.add_prefix_space)
        .unwrap_or(false);
    let byte_level = ByteLevel::new(add_prefix_space, true, true);
    inner.with_pre_tokenizer(byte_level.clone());
    inner.with_decoder(DecoderWrapper::Sequence(Sequence::new(vec![
        DecoderWrapper::ByteFallback(ByteFallback::new()),
        DecoderWrapper::ByteLevel(byte_level),
    ])));

    // Older GPT-2 repositories list their extra tokens in `added_tokens.json`;
    // `added_tokens_decoder` wins where both name an id.
    let mut added: BTreeMap<u32, (AddedToken, bool)> = BTreeMap::new();
    for (content, id) in load_added_tokens(model_dir)? {
        let is_special = special_tokens.is_declared(&content);
        added.insert(id, (AddedToken::from(content, is_special), is_special));
    }
    if let Some(cfg) = config {
        for (id, entry) in cfg.added_tokens_decoder {
            let Ok(id) = id.parse::<u32>() else {
                continue;
            };
            let is_special = entry.special || special_tokens.is_declared(&entry.content);
            added.insert(id, (entry.into_added_token(), is_special));
        }
    }

    // Insert in id order so control tokens keep their upstream ids.
    for (expected_id, (token, is_special)) in added {
        let current_size = inner.get_vocab_size(true) as u32;
        if expected_id < current_size {
            continue;
        }
        if expected_id > current_size {
            let fillers: Vec<AddedToken> = (current_size..expected_id)
                .map(|idx| AddedToken::from(format!("<|gap_{idx}|>"), false))
                .collect();
            inner.add_tokens(&fillers);
        }

        if is_special {
            inner.add_special_tokens(&[token]);
        } else {
            inner.add_tokens(&[token]);
        }
    }

    // Declared markers must be matched whole and dropped on decode.
    let declared: Vec<AddedToken> = special_tokens
        .declared()
        .map(|content| AddedToken::from(content.to_string(), true))
        .collect();
    inner.add_special_tokens(&declared);

    Ok(inner)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenSpec {
    Text(String),
    Object { content: String },
}

impl TokenSpec {
    fn into_content(self) -> String {
        match self {
            Self::Text(content) | Self::Object { content } => content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpecialTokensFile {
    #[serde(default)]
    bos_token: Option<TokenSpec>,
    #[serde(default)]
    eos_token: Option<TokenSpec>,
    #[serde(default)]
    pad_token: Option<TokenSpec>,
    #[serde(default)]
    unk_token: Option<TokenSpec>,
    #[serde(default)]
    additional_special_tokens: Vec<TokenSpec>,
}

#[derive(Debug, Deserialize)]
struct TokenizerConfigFile {
    #[serde(default)]
    add_prefix_space: Option<bool>,
    #[serde(default)]
    added_tokens_decoder: HashMap<String, AddedTokenConfig>,
}

#[derive(Debug, Deserialize)]
struct AddedTokenConfig {
    content: String,
    #[serde(default)]
    single_word: bool,
    #[serde(default)]
    lstrip: bool,
    #[serde(default)]
    rstrip: bool,
    #[serde(default)]
    normalized: bool,
    #[serde(default)]
    special: bool,
}

impl AddedTokenConfig {
    fn into_added_token(self) -> AddedToken {
        AddedToken::from(self.content, self.special)
            .single_word(self.single_word)
            .lstrip(self.lstrip)
            .rstrip(self.rstrip)
            .normalized(self.normalized)
    }
}

fn load_added_tokens(model_dir: &Path) -> Result<HashMap<String, u32>> {
    let path = model_dir.join("added_tokens.json");
    if !path.exists() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn load_tokenizer_config(model_dir: &Path) -> Result<Option<TokenizerConfigFile>> {
    let config_path = model_dir.join("tokenizer_config.json");
    if !config_path.exists() {
        return Ok(None);
    }
    let config_str = fs::read_to_string(config_path)?;
    let config: TokenizerConfigFile = serde_json::from_str(&config_str)?;
    Ok(Some(config))
}
