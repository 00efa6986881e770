//! Error types for the benchmark harness.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that can occur while extracting, answering or scoring.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A results or metrics table could not be written.
    #[error("Failed to persist '{path}': {message}")]
    Persistence { path: PathBuf, message: String },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The input directory does not exist or is not a directory.
    #[error("Input path '{0}' does not exist or is not a directory")]
    InvalidInputDir(PathBuf),

    /// No question set exists for a document stem.
    #[error("Question set not found at '{0}'")]
    QuestionSetNotFound(PathBuf),

    /// An extraction strategy failed.
    #[error("Strategy '{strategy}' failed: {message}")]
    Strategy { strategy: String, message: String },

    /// Duplicate or unknown strategy name in the registry.
    #[error("Registry error: {0}")]
    Registry(String),

    /// An external command (pdftotext, tesseract, ...) failed.
    #[error("External tool '{tool}' failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Remote parsing service error.
    #[error("Parse service error: {0}")]
    ParseService(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BenchError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a strategy error for the named strategy.
    pub fn strategy(strategy: impl Into<String>, message: impl ToString) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.to_string(),
        }
    }

    /// Create an external tool error.
    pub fn external_tool(tool: impl Into<String>, message: impl ToString) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error for a table file.
    pub fn persistence(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for BenchError {
    fn from(err: reqwest::Error) -> Self {
        BenchError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::LlmParse(err.to_string())
    }
}
