//! Task registry

use crate::error::{EvalError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_TASK: &str = "wikitext";
pub const HENDRYCKS_TEST: &str = "hendrycks_test";

/// MMLU subjects behind the `hendrycks_test` alias
pub const HENDRYCKS_SUBJECTS: [&str; 57] = [
    "abstract_algebra",
    "anatomy",
    "astronomy",
    "business_ethics",
    "clinical_knowledge",
    "college_biology",
    "college_chemistry",
    "college_computer_science",
    "college_mathematics",
    "college_medicine",
    "college_physics",
    "computer_security",
    "conceptual_physics",
    "econometrics",
    "electrical_engineering",
    "elementary_mathematics",
    "formal_logic",
    "global_facts",
    "high_school_biology",
    "high_school_chemistry",
    "high_school_computer_science",
    "high_school_european_history",
    "high_school_geography",
    "high_school_government_and_politics",
    "high_school_macroeconomics",
    "high_school_mathematics",
    "high_school_microeconomics",
    "high_school_physics",
    "high_school_psychology",
    "high_school_statistics",
    "high_school_us_history",
    "high_school_world_history",
    "human_aging",
    "human_sexuality",
    "international_law",
    "jurisprudence",
    "logical_fallacies",
    "machine_learning",
    "management",
    "marketing",
    "medical_genetics",
    "miscellaneous",
    "moral_disputes",
    "moral_scenarios",
    "nutrition",
    "philosophy",
    "prehistory",
    "professional_accounting",
    "professional_law",
    "professional_medicine",
    "professional_psychology",
    "public_relations",
    "security_studies",
    "sociology",
    "us_foreign_policy",
    "virology",
    "world_religions",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Whole-document log-likelihood (perplexity)
    RollingLoglikelihood,
    MultipleChoice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDefinition {
    pub name: String,
    pub kind: TaskKind,
}

/// Task definitions in the order they were requested
#[derive(Debug, Clone, Default)]
pub struct TaskDict {
    tasks: Vec<TaskDefinition>,
}

impl TaskDict {
    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, TaskKind>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        let mut registry = Self { tasks: BTreeMap::new() };
        registry.register(DEFAULT_TASK, TaskKind::RollingLoglikelihood);
        for subject in HENDRYCKS_SUBJECTS {
            registry.register(format!("{}-{}", HENDRYCKS_TEST, subject), TaskKind::MultipleChoice);
        }
        registry
    }
}

impl TaskRegistry {
    pub fn register(&mut self, name: impl Into<String>, kind: TaskKind) {
        self.tasks.insert(name.into(), kind);
    }

    /// Register every `<name>.txt` in `data_dir` as a perplexity task.
    pub fn discover(&mut self, data_dir: &Path) -> Result<usize> {
        if !data_dir.is_dir() {
            return Ok(0);
        }
        let mut found = 0;
        for entry in std::fs::read_dir(data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !self.tasks.contains_key(stem) {
                    tracing::debug!("discovered task {}", stem);
                    self.register(stem, TaskKind::RollingLoglikelihood);
                    found += 1;
                }
            }
        }
        Ok(found)
    }

    pub fn get(&self, name: &str) -> Option<TaskKind> {
        self.tasks.get(name).copied()
    }

    /// Resolve task names, keeping request order and dropping duplicates.
    pub fn get_task_dict<S: AsRef<str>>(&self, names: &[S]) -> Result<TaskDict> {
        let mut dict = TaskDict::default();
        for name in names {
            let name = name.as_ref();
            let kind = self
                .get(name)
                .ok_or_else(|| EvalError::UnknownTask(name.to_string()))?;
            if dict.tasks.iter().all(|t| t.name != name) {
                dict.tasks.push(TaskDefinition {
                    name: name.to_string(),
                    kind,
                });
            }
        }
        Ok(dict)
    }
}

/// Apply the default task list and expand the `hendrycks_test` alias.
pub fn expand_tasks(tasks: Option<Vec<String>>) -> Vec<String> {
    let mut tasks = tasks.unwrap_or_else(|| vec![DEFAULT_TASK.to_string()]);
    if let Some(idx) = tasks.iter().position(|t| t == HENDRYCKS_TEST) {
        tasks.remove(idx);
        tasks.extend(
            HENDRYCKS_SUBJECTS
                .iter()
                .map(|s| format!("{}-{}", HENDRYCKS_TEST, s)),
        );
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tasks() {
        assert_eq!(expand_tasks(None), vec!["wikitext".to_string()]);
    }

    #[test]
    fn test_hendrycks_alias_expands() {
        let tasks = expand_tasks(Some(vec!["wikitext".into(), "hendrycks_test".into()]));
        assert_eq!(tasks.len(), 1 + 57);
        assert_eq!(tasks[0], "wikitext");
        assert!(!tasks.iter().any(|t| t == "hendrycks_test"));
        assert!(tasks.iter().any(|t| t == "hendrycks_test-world_religions"));
    }

    #[test]
    fn test_registry_resolves_in_order() {
        let registry = TaskRegistry::default();
        let dict = registry
            .get_task_dict(&["hendrycks_test-anatomy", "wikitext", "wikitext"])
            .unwrap();
        assert_eq!(dict.names(), vec!["hendrycks_test-anatomy", "wikitext"]);
        assert_eq!(dict.iter().next().unwrap().kind, TaskKind::MultipleChoice);
    }

    #[test]
    fn test_unknown_task() {
        let registry = TaskRegistry::default();
        let err = registry.get_task_dict(&["lambada"]).unwrap_err();
        assert!(matches!(err, EvalError::UnknownTask(name) if name == "lambada"));
    }

    #[test]
    fn test_discover_text_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ptb.txt"), "some text").unwrap();
        std::fs::write(dir.path().join("wikitext.txt"), "more text").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let mut registry = TaskRegistry::default();
        assert_eq!(registry.discover(dir.path()).unwrap(), 1);
        assert_eq!(registry.get("ptb"), Some(TaskKind::RollingLoglikelihood));
        assert_eq!(registry.get("notes"), None);
    }
}
