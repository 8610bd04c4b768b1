//! End-to-end evaluation of a GGUF checkpoint

use crate::adapter::HarnessAdapter;
use crate::config::{EvalArgs, ModelArgs};
use crate::device::device_info;
use crate::error::Result;
use crate::harness::{self, EvalResults, LanguageModel, PerplexityHarness, TaskRegistry};
use crate::model::GgufLlama;
use crate::tokenizer::HfTokenizer;
use std::io::Write;

pub type GgufEvalWrapper = HarnessAdapter<GgufLlama, HfTokenizer>;

/// Load the tokenizer and checkpoint and wrap them for the harness.
pub fn gen_eval_wrapper(args: &ModelArgs) -> Result<GgufEvalWrapper> {
    let device = args.device.resolve();
    tracing::info!("🖥️ Device: {}", device_info(&device));

    let tokenizer = HfTokenizer::from_file(&args.tokenizer_path)?;
    let model = GgufLlama::load(&args.checkpoint, &device)?;

    let wrapper = HarnessAdapter::new(model, tokenizer, args.max_seq_length)
        .with_forward_mode(args.forward_mode)
        .with_prefill(args.prefill_builder());

    if let Some(trained) = wrapper.model().context_length() {
        if wrapper.max_length() > trained {
            tracing::warn!(
                "⚠️ max sequence length {} exceeds trained context length {}",
                wrapper.max_length(),
                trained
            );
        }
    }

    Ok(wrapper)
}

/// Run the configured tasks against `lm`, writing one `task: metrics` line per
/// task to `out` and the JSON results to `--output-json` when set.
pub fn run_eval<W: Write>(lm: &mut dyn LanguageModel, args: &EvalArgs, out: &mut W) -> Result<EvalResults> {
    let mut registry = TaskRegistry::default();
    registry.discover(&args.data_dir)?;
    let ppl_harness = PerplexityHarness::new(&args.data_dir);

    let results = harness::eval(
        &ppl_harness,
        lm,
        &registry,
        Some(args.tasks.clone()),
        Some(args.limit),
    )?;

    write!(out, "{}", results)?;

    if let Some(path) = &args.output_json {
        std::fs::write(path, serde_json::to_string_pretty(&results)?)?;
        tracing::info!("💾 Results written to {}", path.display());
    }

    Ok(results)
}

/// Evaluate the configured checkpoint, printing results to stdout.
pub fn eval_llama(args: &EvalArgs) -> Result<EvalResults> {
    let mut eval_wrapper = gen_eval_wrapper(&args.model)?;
    let stdout = std::io::stdout();
    run_eval(&mut eval_wrapper, args, &mut stdout.lock())
}
