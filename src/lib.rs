// Core modules
pub mod adapter;
pub mod config;
pub mod device;
pub mod error;
pub mod harness;
pub mod model;
pub mod prefill;
pub mod runner;
pub mod tokenizer;

// Re-exports
pub use adapter::{ForwardMode, HarnessAdapter};
pub use config::{EvalArgs, ModelArgs};
pub use device::DeviceConfig;
pub use error::{EvalError, Result};
pub use harness::{eval, EvalResults, Harness, LanguageModel};
pub use model::{EvalModel, GgufLlama};
pub use prefill::{setup_prefill, CacheSetup, Prefill, PrefillBuilder};
pub use tokenizer::{EvalTokenizer, HfTokenizer};
