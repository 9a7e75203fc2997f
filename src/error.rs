//! Error taxonomy for the plugin.
//!
//! Configuration and LLM errors end the query with a visible item.
//! TTS, audio, clipboard and log-file errors are logged and skipped.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PluginError>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unable to load prompt templates from {path:?}: {message}")]
    Templates { path: PathBuf, message: String },

    #[error("{0}")]
    Llm(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl PluginError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
