//! Prefill buffer setup
//!
//! Before the first forward pass over a prompt, the prompt is copied into a
//! zero-padded buffer sized for the prompt plus the tokens that may still be
//! generated, and the positions of the real tokens are recorded.

use crate::error::{EvalError, Result};
use crate::model::EvalModel;
use candle_core::Tensor;
use serde::Serialize;

pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// Whether building a prefill buffer also sets up the model's caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CacheSetup {
    #[default]
    Disabled,
    Enabled,
}

#[derive(Debug, Clone)]
pub struct Prefill {
    /// Prompt padded with zeros to `prompt_len + max_new_tokens`
    pub seq: Tensor,
    /// `0..prompt_len`
    pub input_pos: Tensor,
    pub max_seq_length: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PrefillBuilder {
    pub block_size: usize,
    pub cache_setup: CacheSetup,
}

impl Default for PrefillBuilder {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_setup: CacheSetup::Disabled,
        }
    }
}

impl PrefillBuilder {
    pub fn new(block_size: usize, cache_setup: CacheSetup) -> Self {
        Self { block_size, cache_setup }
    }

    /// Build the prefill buffer for `prompt`, setting up `model`'s caches
    /// when cache setup is enabled.
    pub fn build<M: EvalModel + ?Sized>(
        &self,
        model: &mut M,
        prompt: &Tensor,
        max_new_tokens: usize,
        max_seq_length: Option<usize>,
    ) -> Result<Prefill> {
        let prefill = setup_prefill(prompt, max_new_tokens, max_seq_length, self.block_size)?;

        if self.cache_setup == CacheSetup::Enabled {
            tracing::debug!("setting up caches for {} positions", prefill.max_seq_length);
            model.setup_caches(1, prefill.max_seq_length)?;
        }

        Ok(prefill)
    }
}

/// Pad `prompt` (rank 1) to `len + max_new_tokens` and compute its positions.
///
/// `max_seq_length` defaults to `min(len + max_new_tokens, block_size)`.
pub fn setup_prefill(
    prompt: &Tensor,
    max_new_tokens: usize,
    max_seq_length: Option<usize>,
    block_size: usize,
) -> Result<Prefill> {
    let t = prompt.dims1()?;
    if t == 0 {
        return Err(EvalError::EmptyPrompt);
    }
    let t_new = t + max_new_tokens;
    let max_seq_length = max_seq_length.unwrap_or_else(|| t_new.min(block_size));

    let device = prompt.device();
    let empty = Tensor::zeros(t_new, prompt.dtype(), device)?;
    let seq = empty.slice_assign(&[0..t], prompt)?;
    let input_pos = Tensor::arange(0u32, t as u32, device)?;

    Ok(Prefill {
        seq,
        input_pos,
        max_seq_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    struct CacheRecorder {
        device: Device,
        calls: Vec<(usize, usize)>,
    }

    impl EvalModel for CacheRecorder {
        fn forward(&mut self, input_ids: &Tensor) -> Result<Tensor> {
            Ok(input_ids.clone())
        }

        fn forward_at(&mut self, input_ids: &Tensor, _input_pos: &Tensor) -> Result<Tensor> {
            Ok(input_ids.clone())
        }

        fn setup_caches(&mut self, max_batch_size: usize, max_seq_length: usize) -> Result<()> {
            self.calls.push((max_batch_size, max_seq_length));
            Ok(())
        }

        fn device(&self) -> &Device {
            &self.device
        }
    }

    fn prompt(ids: &[u32]) -> Tensor {
        Tensor::new(ids, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_pads_prompt_with_zeros() -> Result<()> {
        let p = setup_prefill(&prompt(&[5, 6, 7]), 2, None, DEFAULT_BLOCK_SIZE)?;
        assert_eq!(p.seq.to_vec1::<u32>()?, vec![5, 6, 7, 0, 0]);
        assert_eq!(p.input_pos.to_vec1::<u32>()?, vec![0, 1, 2]);
        assert_eq!(p.max_seq_length, 5);
        Ok(())
    }

    #[test]
    fn test_single_token_no_new_tokens() -> Result<()> {
        let p = setup_prefill(&prompt(&[1]), 0, None, DEFAULT_BLOCK_SIZE)?;
        assert_eq!(p.seq.to_vec1::<u32>()?, vec![1]);
        assert_eq!(p.input_pos.to_vec1::<u32>()?, vec![0]);
        assert_eq!(p.max_seq_length, 1);
        Ok(())
    }

    #[test]
    fn test_max_length_capped_by_block_size() -> Result<()> {
        let ids: Vec<u32> = (1..=10).collect();
        let p = setup_prefill(&prompt(&ids), 10, None, 16)?;
        assert_eq!(p.seq.dims1()?, 20);
        assert_eq!(p.max_seq_length, 16);
        Ok(())
    }

    #[test]
    fn test_explicit_max_length_wins() -> Result<()> {
        let p = setup_prefill(&prompt(&[3, 4]), 1, Some(4096), 8)?;
        assert_eq!(p.max_seq_length, 4096);
        // explicit max does not change the buffer
        assert_eq!(p.seq.to_vec1::<u32>()?, vec![3, 4, 0]);
        Ok(())
    }

    #[test]
    fn test_buffer_keeps_dtype_and_device() -> Result<()> {
        let p64 = Tensor::new(&[9i64, 8, 7], &Device::Cpu)?;
        let p = setup_prefill(&p64, 3, None, DEFAULT_BLOCK_SIZE)?;
        assert_eq!(p.seq.dtype(), DType::I64);
        assert!(p.seq.device().is_cpu());
        assert_eq!(p.seq.to_vec1::<i64>()?, vec![9, 8, 7, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_positions_strictly_increasing() -> Result<()> {
        let ids: Vec<u32> = (0..37).map(|i| i * 3 + 1).collect();
        let p = setup_prefill(&prompt(&ids), 5, None, DEFAULT_BLOCK_SIZE)?;
        let pos = p.input_pos.to_vec1::<u32>()?;
        assert_eq!(pos.len(), ids.len());
        assert_eq!(pos.first(), Some(&0));
        assert_eq!(pos.last(), Some(&36));
        assert!(pos.windows(2).all(|w| w[1] == w[0] + 1));

        let seq = p.seq.to_vec1::<u32>()?;
        assert_eq!(&seq[..ids.len()], ids.as_slice());
        assert!(seq[ids.len()..].iter().all(|&t| t == 0));
        Ok(())
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let empty = Tensor::zeros(0, DType::U32, &Device::Cpu).unwrap();
        let err = setup_prefill(&empty, 4, None, DEFAULT_BLOCK_SIZE).unwrap_err();
        assert!(matches!(err, EvalError::EmptyPrompt));
    }

    #[test]
    fn test_rank2_prompt_rejected() {
        let batched = Tensor::new(&[[1u32, 2]], &Device::Cpu).unwrap();
        assert!(matches!(
            setup_prefill(&batched, 1, None, DEFAULT_BLOCK_SIZE),
            Err(EvalError::Candle(_))
        ));
    }

    #[test]
    fn test_cache_setup_disabled_is_noop() -> Result<()> {
        let mut model = CacheRecorder { device: Device::Cpu, calls: Vec::new() };
        PrefillBuilder::default().build(&mut model, &prompt(&[1, 2]), 3, None)?;
        assert!(model.calls.is_empty());
        Ok(())
    }

    #[test]
    fn test_cache_setup_enabled_uses_effective_max() -> Result<()> {
        let mut model = CacheRecorder { device: Device::Cpu, calls: Vec::new() };
        let builder = PrefillBuilder::new(4, CacheSetup::Enabled);
        let p = builder.build(&mut model, &prompt(&[1, 2]), 3, None)?;
        assert_eq!(p.max_seq_length, 4);
        assert_eq!(model.calls, vec![(1, 4)]);
        Ok(())
    }
}
