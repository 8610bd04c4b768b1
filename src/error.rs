//! Evaluation error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("prompt must contain at least one token")]
    EmptyPrompt,

    #[error("{0} is not implemented")]
    Unimplemented(&'static str),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("task {task} is not supported by this harness: {reason}")]
    UnsupportedTask { task: String, reason: String },

    #[error("tokenizer has no {0} token")]
    MissingSpecialToken(&'static str),

    #[error("invalid checkpoint {path}: {reason}")]
    InvalidCheckpoint { path: String, reason: String },

    #[error("cache overflow: {requested} > {capacity}")]
    CacheOverflow { requested: usize, capacity: usize },

    #[error("invalid device: {0}")]
    InvalidDevice(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokenizers::Error> for EvalError {
    fn from(e: tokenizers::Error) -> Self {
        EvalError::Tokenizer(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
