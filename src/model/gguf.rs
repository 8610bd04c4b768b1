//! Quantized LLaMA checkpoints loaded from GGUF

use super::EvalModel;
use crate::error::{EvalError, Result};
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::models::quantized_llama::ModelWeights;
use std::io::Read;
use std::path::Path;

const GGUF_MAGIC: [u8; 4] = [0x47, 0x47, 0x55, 0x46];

pub struct GgufLlama {
    weights: ModelWeights,
    device: Device,
    context_length: Option<usize>,
    cache_capacity: Option<usize>,
}

impl GgufLlama {
    /// Load a GGUF checkpoint onto `device`.
    pub fn load<P: AsRef<Path>>(path: P, device: &Device) -> Result<Self> {
        let path = path.as_ref();
        Self::validate(path)?;

        tracing::info!("📦 Loading GGUF checkpoint from {}", path.display());

        let mut file = std::fs::File::open(path)?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| {
            EvalError::InvalidCheckpoint {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        tracing::info!(
            "📊 GGUF: {} tensors, {} metadata entries",
            content.tensor_infos.len(),
            content.metadata.len()
        );

        let context_length = content
            .metadata
            .get("llama.context_length")
            .and_then(|v| v.to_u32().ok())
            .map(|v| v as usize);

        let weights = ModelWeights::from_gguf(content, &mut file, device)?;
        tracing::info!("✅ Model weights loaded");

        Ok(Self {
            weights,
            device: device.clone(),
            context_length,
            cache_capacity: None,
        })
    }

    /// Check that `path` exists and starts with the GGUF magic.
    pub fn validate(path: &Path) -> Result<()> {
        let invalid = |reason: &str| EvalError::InvalidCheckpoint {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        if !path.exists() {
            return Err(invalid("file not found"));
        }
        if !Self::is_gguf(path) {
            return Err(invalid("missing GGUF magic"));
        }
        Ok(())
    }

    pub fn is_gguf(path: &Path) -> bool {
        let mut magic = [0u8; 4];
        std::fs::File::open(path)
            .and_then(|mut file| file.read_exact(&mut magic))
            .map(|_| magic == GGUF_MAGIC)
            .unwrap_or(false)
    }

    /// Trained context length advertised by the checkpoint metadata
    pub fn context_length(&self) -> Option<usize> {
        self.context_length
    }

    fn check_capacity(&self, pos: usize) -> Result<()> {
        match self.cache_capacity {
            Some(capacity) if pos >= capacity => Err(EvalError::CacheOverflow {
                requested: pos + 1,
                capacity,
            }),
            _ => Ok(()),
        }
    }
}

impl EvalModel for GgufLlama {
    fn forward(&mut self, input_ids: &Tensor) -> Result<Tensor> {
        let (_, seq_len) = input_ids.dims2()?;
        let input_pos = Tensor::arange(0u32, seq_len as u32, &self.device)?;
        self.forward_at(input_ids, &input_pos)
    }

    fn forward_at(&mut self, input_ids: &Tensor, input_pos: &Tensor) -> Result<Tensor> {
        let (batch, seq_len) = input_ids.dims2()?;
        if batch != 1 {
            return Err(EvalError::Unimplemented("batched forward"));
        }
        let positions = input_pos.to_vec1::<u32>()?;
        if positions.len() != seq_len {
            return Err(candle_core::Error::Msg(format!(
                "got {} positions for {} tokens",
                positions.len(),
                seq_len
            ))
            .into());
        }

        // quantized_llama only returns logits for the last input token, so feed
        // one token at a time. Position 0 resets the internal KV cache.
        let mut rows = Vec::with_capacity(seq_len);
        for (i, &pos) in positions.iter().enumerate() {
            self.check_capacity(pos as usize)?;
            let token = input_ids.narrow(1, i, 1)?;
            rows.push(self.weights.forward(&token, pos as usize)?);
        }
        tracing::debug!("forward over {} positions", seq_len);

        Ok(Tensor::stack(&rows, 1)?)
    }

    fn setup_caches(&mut self, max_batch_size: usize, max_seq_length: usize) -> Result<()> {
        if max_batch_size != 1 {
            return Err(EvalError::Unimplemented("batched caches"));
        }
        if let Some(trained) = self.context_length {
            if max_seq_length > trained {
                tracing::warn!(
                    "⚠️ cache length {} exceeds trained context length {}",
                    max_seq_length,
                    trained
                );
            }
        }
        self.cache_capacity = Some(max_seq_length);
        Ok(())
    }

    fn device(&self) -> &Device {
        &self.device
    }
}
