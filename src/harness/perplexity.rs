//! Rolling log-likelihood harness
//!
//! Scores plain-text documents from `<data_dir>/<task>.txt` and reports
//! word/byte perplexity the way wikitext results are usually quoted.

use super::{EvalResults, Harness, LanguageModel, TaskDict, TaskKind, TaskMetrics};
use crate::error::{EvalError, Result};
use candle_core::{DType, Tensor, D};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct PerplexityHarness {
    data_dir: PathBuf,
}

impl PerplexityHarness {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// First `limit` documents of `task`
    pub fn load_documents(&self, task: &str, limit: Option<usize>) -> Result<Vec<String>> {
        let path = self.data_dir.join(format!("{}.txt", task));
        let text = std::fs::read_to_string(&path)?;
        let mut docs = split_documents(&text);
        if let Some(limit) = limit {
            docs.truncate(limit);
        }
        if docs.is_empty() {
            return Err(EvalError::UnsupportedTask {
                task: task.to_string(),
                reason: format!("no documents in {}", path.display()),
            });
        }
        Ok(docs)
    }

    fn score_task(&self, lm: &mut dyn LanguageModel, task: &str, limit: Option<usize>) -> Result<TaskMetrics> {
        let docs = self.load_documents(task, limit)?;
        tracing::info!("📝 {}: scoring {} document(s)", task, docs.len());

        let mut nll = 0.0;
        let mut words = 0usize;
        let mut bytes = 0usize;
        for doc in &docs {
            let tokens = lm.tok_encode(doc)?;
            nll += rolling_nll(lm, &tokens)?;
            words += doc.split_whitespace().count();
            bytes += doc.len();
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("word_perplexity".to_string(), (nll / words as f64).exp());
        metrics.insert("byte_perplexity".to_string(), (nll / bytes as f64).exp());
        metrics.insert(
            "bits_per_byte".to_string(),
            nll / bytes as f64 / std::f64::consts::LN_2,
        );
        Ok(TaskMetrics(metrics))
    }
}

impl Harness for PerplexityHarness {
    fn evaluate(
        &self,
        lm: &mut dyn LanguageModel,
        tasks: &TaskDict,
        limit: Option<usize>,
    ) -> Result<EvalResults> {
        let mut results = EvalResults::default();
        for task in tasks.iter() {
            if task.kind != TaskKind::RollingLoglikelihood {
                return Err(EvalError::UnsupportedTask {
                    task: task.name.clone(),
                    reason: "only rolling log-likelihood tasks can be scored".to_string(),
                });
            }
            let metrics = self.score_task(lm, &task.name, limit)?;
            results.push(task.name.clone(), metrics);
        }
        Ok(results)
    }
}

/// Documents are separated by blank lines.
pub fn split_documents(text: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                docs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        docs.push(current.join("\n"));
    }
    docs
}

/// Negative log-likelihood of `tokens[1..]`, each conditioned on its prefix.
///
/// Predictions are scored in disjoint windows of at most `max_length`, each
/// window seeing up to `max_length` tokens of context.
pub fn rolling_nll(lm: &mut dyn LanguageModel, tokens: &[u32]) -> Result<f64> {
    let n = tokens.len();
    let max_len = lm.max_length().max(1);
    let mut nll = 0.0;

    let mut a = 1;
    while a < n {
        let b = (a + max_len).min(n);
        let start = (b - 1).saturating_sub(max_len);

        let input = Tensor::new(&tokens[start..b - 1], lm.device())?.unsqueeze(0)?;
        let logits = lm.model_call(&input)?.squeeze(0)?.to_dtype(DType::F32)?;
        let logp = candle_nn::ops::log_softmax(&logits, D::Minus1)?;

        let targets = Tensor::new(&tokens[start + 1..b], lm.device())?.unsqueeze(1)?;
        let picked = logp.gather(&targets, 1)?.squeeze(1)?;
        let scored = picked.narrow(0, a - 1 - start, b - a)?;
        nll -= scored.sum_all()?.to_scalar::<f32>()? as f64;

        tracing::debug!("window [{}, {}) context={} nll={:.3}", a, b, b - 1 - start, nll);
        a = b;
    }
    Ok(nll)
}
