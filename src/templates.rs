//! Keyword → system instruction table, loaded from a semicolon-delimited CSV.

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PluginError, Result};

pub const TEMPLATE_FILE: &str = "system_messages.csv";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PromptTemplate {
    #[serde(rename = "Key Word")]
    pub keyword: String,
    #[serde(rename = "System Message")]
    pub system_message: String,
}

impl PromptTemplate {
    pub fn new(keyword: impl Into<String>, system_message: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            system_message: system_message.into(),
        }
    }
}

/// Immutable, ordered template rows. Keywords may repeat.
#[derive(Debug, Clone, Default)]
pub struct TemplateTable {
    rows: Vec<PromptTemplate>,
}

impl TemplateTable {
    pub fn from_rows(rows: Vec<PromptTemplate>) -> Self {
        Self { rows }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let err = |message: String| PluginError::Templates {
            path: path.to_path_buf(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .trim(csv::Trim::Headers)
            .from_path(path)
            .map_err(|e| err(e.to_string()))?;

        let mut rows = Vec::new();
        for record in reader.deserialize::<PromptTemplate>() {
            let row = record.map_err(|e| err(e.to_string()))?;
            debug!("Found prompt: {row:?}");
            rows.push(row);
        }

        let table = Self { rows };
        info!("Loaded {} prompt templates from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn rows(&self) -> &[PromptTemplate] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
