//! Models that can be driven by the evaluation adapter

pub mod gguf;

pub use gguf::GgufLlama;

use crate::error::Result;
use candle_core::{Device, Tensor};

/// A causal language model that produces logits for every input position.
pub trait EvalModel {
    /// `[1, T]` token ids to `[1, T, vocab]` logits, positions starting at 0.
    fn forward(&mut self, input_ids: &Tensor) -> Result<Tensor>;

    /// Forward pass with explicit position indices for each input token.
    fn forward_at(&mut self, input_ids: &Tensor, input_pos: &Tensor) -> Result<Tensor>;

    /// Prepare model-internal caches. Models without explicit caches ignore this.
    fn setup_caches(&mut self, _max_batch_size: usize, _max_seq_length: usize) -> Result<()> {
        Ok(())
    }

    fn device(&self) -> &Device;
}
