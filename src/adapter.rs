//! Harness adapter
//!
//! Wraps an [`EvalModel`] and an [`EvalTokenizer`] behind the
//! [`LanguageModel`] contract the evaluation harness drives.

use crate::error::{EvalError, Result};
use crate::harness::LanguageModel;
use crate::model::EvalModel;
use crate::prefill::PrefillBuilder;
use crate::tokenizer::EvalTokenizer;
use candle_core::{Device, Tensor};
use serde::Serialize;

pub const DEFAULT_MAX_SEQ_LENGTH: usize = 2048;
pub const MAX_GEN_TOKS: usize = 50;
pub const BATCH_SIZE: usize = 1;

/// How `model_call` feeds the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// Pass the input ids straight to the model
    #[default]
    Direct,
    /// Build a prefill buffer first and forward the prompt slots with their positions
    Prefill,
}

pub struct HarnessAdapter<M, T> {
    model: M,
    tokenizer: T,
    device: Device,
    max_seq_length: usize,
    forward_mode: ForwardMode,
    prefill: PrefillBuilder,
}

impl<M: EvalModel, T: EvalTokenizer> HarnessAdapter<M, T> {
    pub fn new(model: M, tokenizer: T, max_seq_length: Option<usize>) -> Self {
        let device = model.device().clone();
        Self {
            model,
            tokenizer,
            device,
            max_seq_length: max_seq_length.unwrap_or(DEFAULT_MAX_SEQ_LENGTH),
            forward_mode: ForwardMode::default(),
            prefill: PrefillBuilder::default(),
        }
    }

    pub fn with_forward_mode(mut self, mode: ForwardMode) -> Self {
        self.forward_mode = mode;
        self
    }

    pub fn with_prefill(mut self, prefill: PrefillBuilder) -> Self {
        self.prefill = prefill;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    fn prefill_call(&mut self, inps: &Tensor) -> Result<Tensor> {
        // TODO: batches larger than one
        let prompt = inps.squeeze(0)?;
        let prefill = self
            .prefill
            .build(&mut self.model, &prompt, 1, Some(self.max_seq_length))?;
        let x = prefill.seq.index_select(&prefill.input_pos, 0)?.unsqueeze(0)?;
        self.model.forward_at(&x, &prefill.input_pos)
    }
}

impl<M: EvalModel, T: EvalTokenizer> LanguageModel for HarnessAdapter<M, T> {
    fn eot_token_id(&self) -> u32 {
        self.tokenizer.eos_id()
    }

    fn max_length(&self) -> usize {
        self.max_seq_length
    }

    fn max_gen_toks(&self) -> usize {
        MAX_GEN_TOKS
    }

    fn batch_size(&self) -> usize {
        BATCH_SIZE
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn tok_encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut tokens = vec![self.tokenizer.bos_id()];
        tokens.extend(self.tokenizer.encode(text)?);
        Ok(tokens)
    }

    fn tok_decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer.decode(tokens)
    }

    fn model_call(&mut self, inps: &Tensor) -> Result<Tensor> {
        match self.forward_mode {
            ForwardMode::Direct => self.model.forward(inps),
            ForwardMode::Prefill => self.prefill_call(inps),
        }
    }

    fn model_generate(&mut self, _context: &Tensor, _max_length: usize, _eos_token_id: u32) -> Result<Tensor> {
        Err(EvalError::Unimplemented("model_generate"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefill::CacheSetup;

    const VOCAB: usize = 8;

    /// Byte tokenizer: each byte maps to `byte % 6 + 2`
    struct ByteTokenizer;

    impl EvalTokenizer for ByteTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            Ok(text.bytes().map(|b| (b % 6) as u32 + 2).collect())
        }
        fn decode(&self, ids: &[u32]) -> Result<String> {
            Ok(ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" "))
        }
        fn bos_id(&self) -> u32 {
            1
        }
        fn eos_id(&self) -> u32 {
            0
        }
    }

    /// Logits are one-hot on the input token, offset by its position.
    struct EchoModel {
        device: Device,
        cache_calls: Vec<(usize, usize)>,
        positions_seen: Vec<Vec<u32>>,
    }

    impl EchoModel {
        fn new() -> Self {
            Self {
                device: Device::Cpu,
                cache_calls: Vec::new(),
                positions_seen: Vec::new(),
            }
        }

        fn logits(&self, ids: &[u32], positions: &[u32]) -> Result<Tensor> {
            let mut data = vec![0f32; ids.len() * VOCAB];
            for (i, (id, pos)) in ids.iter().zip(positions).enumerate() {
                data[i * VOCAB + *id as usize % VOCAB] = 1.0 + *pos as f32;
            }
            Ok(Tensor::from_vec(data, (1, ids.len(), VOCAB), &self.device)?)
        }
    }

    impl EvalModel for EchoModel {
        fn forward(&mut self, input_ids: &Tensor) -> Result<Tensor> {
            let ids = input_ids.squeeze(0)?.to_vec1::<u32>()?;
            let positions: Vec<u32> = (0..ids.len() as u32).collect();
            self.logits(&ids, &positions)
        }

        fn forward_at(&mut self, input_ids: &Tensor, input_pos: &Tensor) -> Result<Tensor> {
            let ids = input_ids.squeeze(0)?.to_vec1::<u32>()?;
            let positions = input_pos.to_vec1::<u32>()?;
            self.positions_seen.push(positions.clone());
            self.logits(&ids, &positions)
        }

        fn setup_caches(&mut self, max_batch_size: usize, max_seq_length: usize) -> Result<()> {
            self.cache_calls.push((max_batch_size, max_seq_length));
            Ok(())
        }

        fn device(&self) -> &Device {
            &self.device
        }
    }

    fn adapter() -> HarnessAdapter<EchoModel, ByteTokenizer> {
        HarnessAdapter::new(EchoModel::new(), ByteTokenizer, None)
    }

    #[test]
    fn test_fixed_properties() {
        let lm = adapter();
        assert_eq!(lm.eot_token_id(), 0);
        assert_eq!(lm.max_length(), 2048);
        assert_eq!(lm.max_gen_toks(), 50);
        assert_eq!(lm.batch_size(), 1);
        assert!(lm.device().is_cpu());

        let custom = HarnessAdapter::new(EchoModel::new(), ByteTokenizer, Some(512));
        assert_eq!(custom.max_length(), 512);
    }

    #[test]
    fn test_tok_encode_prepends_bos() -> Result<()> {
        let lm = adapter();
        let ids = lm.tok_encode("hi")?;
        let mut expected = vec![1];
        expected.extend(ByteTokenizer.encode("hi")?);
        assert_eq!(ids, expected);
        assert_eq!(ids.len(), 3);
        Ok(())
    }

    #[test]
    fn test_tok_decode_delegates() -> Result<()> {
        assert_eq!(adapter().tok_decode(&[4, 5])?, "4 5");
        Ok(())
    }

    #[test]
    fn test_direct_model_call() -> Result<()> {
        let mut lm = adapter();
        let inps = Tensor::new(&[[1u32, 3, 4]], &Device::Cpu)?;
        let logits = lm.model_call(&inps)?;
        assert_eq!(logits.dims(), &[1, 3, VOCAB]);
        assert!(lm.model().positions_seen.is_empty());
        Ok(())
    }

    #[test]
    fn test_prefill_matches_direct() -> Result<()> {
        let inps = Tensor::new(&[[1u32, 3, 4, 7]], &Device::Cpu)?;
        let direct = adapter().model_call(&inps)?;

        let mut lm = adapter().with_forward_mode(ForwardMode::Prefill);
        let prefilled = lm.model_call(&inps)?;

        assert_eq!(direct.to_vec3::<f32>()?, prefilled.to_vec3::<f32>()?);
        assert_eq!(lm.model().positions_seen, vec![vec![0, 1, 2, 3]]);
        assert!(lm.model().cache_calls.is_empty());
        Ok(())
    }

    #[test]
    fn test_prefill_sets_up_caches_when_enabled() -> Result<()> {
        let mut lm = HarnessAdapter::new(EchoModel::new(), ByteTokenizer, Some(64))
            .with_forward_mode(ForwardMode::Prefill)
            .with_prefill(PrefillBuilder::new(2048, CacheSetup::Enabled));
        lm.model_call(&Tensor::new(&[[1u32, 2]], &Device::Cpu)?)?;
        assert_eq!(lm.model().cache_calls, vec![(1, 64)]);
        Ok(())
    }

    #[test]
    fn test_model_generate_always_fails() {
        let mut lm = adapter();
        let context = Tensor::new(&[[1u32, 2, 3]], &Device::Cpu).unwrap();
        for (max_length, eos) in [(0, 0), (10, 2), (4096, 7)] {
            let err = lm.model_generate(&context, max_length, eos).unwrap_err();
            assert!(matches!(err, EvalError::Unimplemented(_)));
        }
    }
}
