//! Evaluation harness interface
//!
//! A [`Harness`] scores a [`LanguageModel`] on a set of tasks. [`eval`] is the
//! entry point: it applies the default task list, expands task aliases and
//! hands the resolved tasks to the harness.

pub mod perplexity;
pub mod tasks;

pub use perplexity::PerplexityHarness;
pub use tasks::{expand_tasks, TaskDefinition, TaskDict, TaskKind, TaskRegistry};

use crate::error::Result;
use candle_core::{Device, Tensor};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// What a harness needs from a model
pub trait LanguageModel {
    fn eot_token_id(&self) -> u32;

    fn max_length(&self) -> usize;

    fn max_gen_toks(&self) -> usize;

    fn batch_size(&self) -> usize;

    fn device(&self) -> &Device;

    fn tok_encode(&self, text: &str) -> Result<Vec<u32>>;

    fn tok_decode(&self, tokens: &[u32]) -> Result<String>;

    /// `[batch, T]` token ids to `[batch, T, vocab]` logits
    fn model_call(&mut self, inps: &Tensor) -> Result<Tensor>;

    fn model_generate(&mut self, context: &Tensor, max_length: usize, eos_token_id: u32) -> Result<Tensor>;
}

pub trait Harness {
    fn evaluate(
        &self,
        lm: &mut dyn LanguageModel,
        tasks: &TaskDict,
        limit: Option<usize>,
    ) -> Result<EvalResults>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskMetrics(pub BTreeMap<String, f64>);

impl TaskMetrics {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.0.get(metric).copied()
    }
}

impl fmt::Display for TaskMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:.4}", name, value)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub task: String,
    pub metrics: TaskMetrics,
}

/// Per-task metrics in the order the harness produced them
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvalResults {
    pub results: Vec<TaskResult>,
}

impl EvalResults {
    pub fn push(&mut self, task: impl Into<String>, metrics: TaskMetrics) {
        self.results.push(TaskResult {
            task: task.into(),
            metrics,
        });
    }

    pub fn get(&self, task: &str) -> Option<&TaskMetrics> {
        self.results.iter().find(|r| r.task == task).map(|r| &r.metrics)
    }
}

impl fmt::Display for EvalResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            writeln!(f, "{}: {}", result.task, result.metrics)?;
        }
        Ok(())
    }
}

/// Evaluate `lm` on `tasks` (default `wikitext`) with at most `limit` samples per task.
pub fn eval<H: Harness + ?Sized>(
    harness: &H,
    lm: &mut dyn LanguageModel,
    registry: &TaskRegistry,
    tasks: Option<Vec<String>>,
    limit: Option<usize>,
) -> Result<EvalResults> {
    let tasks = expand_tasks(tasks);
    let task_dict = registry.get_task_dict(tasks.as_slice())?;
    tracing::info!("📋 Evaluating {} task(s), limit={:?}", task_dict.len(), limit);

    harness.evaluate(lm, &task_dict, limit)
}
