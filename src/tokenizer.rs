//! Tokenizers usable by the evaluation adapter

use crate::error::{EvalError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tokenizers::Tokenizer;

const BOS_CANDIDATES: &[&str] = &["<s>", "<|begin_of_text|>", "<|startoftext|>", "<bos>"];
const EOS_CANDIDATES: &[&str] = &["</s>", "<|end_of_text|>", "<|endoftext|>", "<eos>", "<|eot_id|>"];

pub trait EvalTokenizer {
    /// Encode text without adding special tokens
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode ids, dropping special tokens
    fn decode(&self, ids: &[u32]) -> Result<String>;

    fn bos_id(&self) -> u32;

    fn eos_id(&self) -> u32;
}

/// Subset of `tokenizer_config.json` used to locate BOS/EOS
#[derive(Debug, Default, Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    bos_token_id: Option<u32>,
    #[serde(default)]
    eos_token_id: Option<u32>,
    // either a plain string or an AddedToken object with `content`
    #[serde(default)]
    bos_token: Option<Value>,
    #[serde(default)]
    eos_token: Option<Value>,
}

fn token_content(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("content").and_then(Value::as_str),
        _ => None,
    }
}

/// `tokenizer.json` backed tokenizer
pub struct HfTokenizer {
    inner: Tokenizer,
    bos: u32,
    eos: u32,
}

impl HfTokenizer {
    /// Load `tokenizer.json`, reading a sibling `tokenizer_config.json` when present.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path)?;

        let config_path = path.with_file_name("tokenizer_config.json");
        let config = if config_path.exists() {
            tracing::debug!("reading special tokens from {}", config_path.display());
            serde_json::from_str(&std::fs::read_to_string(&config_path)?)?
        } else {
            TokenizerConfig::default()
        };

        let tokenizer = Self::from_tokenizer(inner, &config)?;
        tracing::info!(
            "🔤 Tokenizer loaded: vocab={}, bos={}, eos={}",
            tokenizer.inner.get_vocab_size(true),
            tokenizer.bos,
            tokenizer.eos
        );
        Ok(tokenizer)
    }

    fn from_tokenizer(inner: Tokenizer, config: &TokenizerConfig) -> Result<Self> {
        let bos = Self::resolve(&inner, config.bos_token_id, config.bos_token.as_ref(), BOS_CANDIDATES)
            .ok_or(EvalError::MissingSpecialToken("BOS"))?;
        let eos = Self::resolve(&inner, config.eos_token_id, config.eos_token.as_ref(), EOS_CANDIDATES)
            .ok_or(EvalError::MissingSpecialToken("EOS"))?;
        Ok(Self { inner, bos, eos })
    }

    fn resolve(
        inner: &Tokenizer,
        id: Option<u32>,
        token: Option<&Value>,
        candidates: &[&str],
    ) -> Option<u32> {
        id.or_else(|| token.and_then(token_content).and_then(|t| inner.token_to_id(t)))
            .or_else(|| candidates.iter().find_map(|t| inner.token_to_id(t)))
    }
}

impl EvalTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.inner.encode(text, false)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        Ok(self.inner.decode(ids, true)?)
    }

    fn bos_id(&self) -> u32 {
        self.bos
    }

    fn eos_id(&self) -> u32 {
        self.eos
    }
}
