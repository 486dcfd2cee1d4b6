use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AutofillError, Result};

// ============================================================================
// Flow / action vocabulary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Save,
    Fill,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Save => "save",
            FlowKind::Fill => "fill",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "save" => Some(FlowKind::Save),
            "fill" => Some(FlowKind::Fill),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// background -> content: show the overlay
    Open,
    /// either direction: tear the overlay down
    Close,
    /// overlay -> content (forwarded by the background)
    Resize,
    /// background -> overlay: initial data
    Populate,
    /// content -> background: a form was submitted
    Submit,
    /// content -> background: start a flow
    Init,
    /// background -> content: values to write into the page
    Fill,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Open => "open",
            Action::Close => "close",
            Action::Resize => "resize",
            Action::Populate => "populate",
            Action::Submit => "submit",
            Action::Init => "init",
            Action::Fill => "fill",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Action::Open),
            "close" => Some(Action::Close),
            "resize" => Some(Action::Resize),
            "populate" => Some(Action::Populate),
            "submit" => Some(Action::Submit),
            "init" => Some(Action::Init),
            "fill" => Some(Action::Fill),
            _ => None,
        }
    }
}

/// Parsed `"<flow>.<action>"` message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageType {
    pub flow: FlowKind,
    pub action: Action,
}

impl MessageType {
    pub fn new(flow: FlowKind, action: Action) -> Self {
        Self { flow, action }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let (flow, action) = raw
            .split_once('.')
            .ok_or_else(|| AutofillError::protocol("messages", format!("malformed message type {:?}", raw)))?;
        let flow = FlowKind::parse(flow)
            .ok_or_else(|| AutofillError::protocol("messages", format!("unknown flow in {:?}", raw)))?;
        let action = Action::parse(action)
            .ok_or_else(|| AutofillError::protocol("messages", format!("unknown action in {:?}", raw)))?;
        Ok(Self { flow, action })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.flow.as_str(), self.action.as_str())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// `{ type: "<flow>.<action>", data?: json }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Message {
    pub fn new(flow: FlowKind, action: Action) -> Self {
        Self {
            message_type: MessageType::new(flow, action).to_string(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn kind(&self) -> Result<MessageType> {
        MessageType::parse(&self.message_type)
    }

    pub fn is(&self, flow: FlowKind, action: Action) -> bool {
        self.kind().is_ok_and(|k| k == MessageType::new(flow, action))
    }

    /// Deserialize the payload, failing with a protocol error when absent or malformed.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let data = self.data.clone().ok_or_else(|| {
            AutofillError::protocol("messages", format!("{} carries no data", self.message_type))
        })?;
        serde_json::from_value(data).map_err(|e| {
            AutofillError::protocol("messages", format!("malformed {} payload", self.message_type))
                .with_source(e)
        })
    }
}

/// Overlay size requested through `*.resize`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: f64,
    pub height: f64,
}

/// Payload of `save.submit`/`save.init`: submitted `[name, value]` pairs plus
/// page context.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubmitData {
    pub fields: Vec<(String, String)>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}
