//! Flow Launcher JSON-RPC wire types.
//!
//! The launcher starts the plugin with one JSON request as its argument and
//! reads a `{"result": [...]}` document from stdout. Selecting an item
//! sends that item's `JsonRPCAction` back as a new request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{PluginError, Result};

pub const ICON: &str = "Images/app.png";

#[derive(Debug, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
    #[serde(default)]
    pub settings: Option<Value>,
}

impl Request {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PluginError::Protocol(format!("Invalid request: {e}")))
    }

    /// The query text of a `query` request.
    pub fn query_text(&self) -> &str {
        self.parameters.first().and_then(Value::as_str).unwrap_or("")
    }

    pub fn host_settings(&self) -> Option<&Value> {
        self.settings.as_ref().filter(|s| s.as_object().is_some_and(|o| !o.is_empty()))
    }
}

/// What selecting a result item does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CopyText(String),
    PlayAudio(PathBuf),
    OpenPath(PathBuf),
    /// Write text to a scratch file and open it.
    OpenText(String),
}

impl Action {
    fn method(&self) -> &'static str {
        match self {
            Self::CopyText(_) => "copy_text",
            Self::PlayAudio(_) => "play_audio",
            Self::OpenPath(_) => "open_path",
            Self::OpenText(_) => "open_text",
        }
    }

    fn parameter(&self) -> String {
        match self {
            Self::CopyText(text) | Self::OpenText(text) => text.clone(),
            Self::PlayAudio(path) | Self::OpenPath(path) => path.display().to_string(),
        }
    }

    pub fn to_rpc(&self) -> RpcAction {
        RpcAction {
            method: self.method().to_string(),
            parameters: vec![Value::String(self.parameter())],
        }
    }

    /// Map a launcher callback back to an action.
    pub fn from_request(request: &Request) -> Option<Self> {
        let param = request.parameters.first().and_then(Value::as_str)?.to_string();
        match request.method.as_str() {
            "copy_text" => Some(Self::CopyText(param)),
            "play_audio" => Some(Self::PlayAudio(PathBuf::from(param))),
            "open_path" => Some(Self::OpenPath(PathBuf::from(param))),
            "open_text" => Some(Self::OpenText(param)),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcAction {
    pub method: String,
    pub parameters: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultItem {
    pub title: String,
    pub subtitle: String,
    pub action: Option<Action>,
}

impl ResultItem {
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

#[derive(Serialize)]
struct WireItem<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "SubTitle")]
    subtitle: &'a str,
    #[serde(rename = "IcoPath")]
    icon: &'a str,
    #[serde(rename = "Score")]
    score: i32,
    #[serde(rename = "JsonRPCAction", skip_serializing_if = "Option::is_none")]
    action: Option<RpcAction>,
}

#[derive(Serialize)]
struct Response<'a> {
    result: Vec<WireItem<'a>>,
}

/// Serialize items in display order. Earlier items score higher.
pub fn render_response(items: &[ResultItem]) -> Result<String> {
    let count = items.len() as i32;
    let result = items
        .iter()
        .enumerate()
        .map(|(i, item)| WireItem {
            title: &item.title,
            subtitle: &item.subtitle,
            icon: ICON,
            score: count - i as i32,
            action: item.action.as_ref().map(Action::to_rpc),
        })
        .collect();

    serde_json::to_string(&Response { result })
        .map_err(|e| PluginError::Protocol(format!("Failed to serialize response: {e}")))
}
