use crate::adapter::ForwardMode;
use crate::device::DeviceConfig;
use crate::prefill::{CacheSetup, PrefillBuilder, DEFAULT_BLOCK_SIZE};
use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser};
use serde::Serialize;
use std::path::PathBuf;

/// Checkpoint and runtime options shared by every command that loads a model
#[derive(Debug, Clone, Args, Serialize)]
pub struct ModelArgs {
    /// GGUF checkpoint to evaluate
    #[arg(long, env = "MODEL_PATH", default_value = "models/llama2.gguf")]
    pub checkpoint: PathBuf,

    /// tokenizer.json; a sibling tokenizer_config.json is read when present
    #[arg(long, env = "TOKENIZER_PATH", default_value = "models/tokenizer.json")]
    pub tokenizer_path: PathBuf,

    /// Maximum context length exposed to the harness (default 2048)
    #[arg(long)]
    pub max_seq_length: Option<usize>,

    /// auto, cpu, cuda, cuda:N or metal
    #[arg(long, env = "DEVICE", default_value = "auto")]
    pub device: DeviceConfig,

    /// Set up model caches while building prefill buffers.
    /// Only takes effect with --forward-mode prefill.
    #[arg(long)]
    pub setup_caches: bool,

    #[arg(long, value_enum, default_value_t = ForwardMode::Direct)]
    pub forward_mode: ForwardMode,
}

impl ModelArgs {
    pub fn cache_setup(&self) -> CacheSetup {
        match (self.setup_caches, self.forward_mode) {
            (true, ForwardMode::Prefill) => CacheSetup::Enabled,
            (true, ForwardMode::Direct) => {
                tracing::warn!("⚠️ --setup-caches has no effect without --forward-mode prefill");
                CacheSetup::Disabled
            }
            (false, _) => CacheSetup::Disabled,
        }
    }

    /// The adapter always passes its max length, so the block size stays at
    /// its default.
    pub fn prefill_builder(&self) -> PrefillBuilder {
        PrefillBuilder::new(DEFAULT_BLOCK_SIZE, self.cache_setup())
    }
}

#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "llama-eval")]
#[command(version)]
#[command(about = "Evaluate an exported LLaMA checkpoint on lm-eval style tasks")]
pub struct EvalArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Tasks to evaluate, e.g. --tasks wikitext hendrycks_test
    #[arg(long, num_args = 1.., default_values_t = vec!["wikitext".to_string()])]
    pub tasks: Vec<String>,

    /// Number of samples to evaluate per task (at least 1)
    #[arg(long, default_value_t = 5, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub limit: usize,

    /// Directory holding <task>.txt documents
    #[arg(long, env = "EVAL_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Also write results as JSON
    #[arg(long)]
    pub output_json: Option<PathBuf>,
}
