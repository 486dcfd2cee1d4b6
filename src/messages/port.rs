use serde::{Deserialize, Serialize};

use crate::messages::message_model::FlowKind;

pub type PortId = u64;
pub type TabId = u32;

/// Channel name used by the content script.
pub const PORT_CONTENT: &str = "content_script";

/// Tab a port was opened from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSender {
    pub tab_id: TabId,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// A connected channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub id: PortId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<PortSender>,
}

impl PortInfo {
    pub fn new(id: PortId, name: &str, sender: Option<PortSender>) -> Self {
        Self {
            id,
            name: name.to_string(),
            sender,
        }
    }

    pub fn tab_id(&self) -> Option<TabId> {
        self.sender.as_ref().map(|s| s.tab_id)
    }

    pub fn url(&self) -> &str {
        self.sender.as_ref().map(|s| s.url.as_str()).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.sender.as_ref().map(|s| s.title.as_str()).unwrap_or("")
    }

    pub fn role(&self) -> Option<PortRole> {
        PortRole::parse(&self.name)
    }
}

/// What an overlay port is for, from the suffix of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayPurpose {
    /// Overlay finished loading and waits for `populate`
    Connected,
    Close,
    Resize,
    /// Overlay relays the selected result (fill flow only)
    Fill,
}

impl OverlayPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayPurpose::Connected => "connected",
            OverlayPurpose::Close => "close",
            OverlayPurpose::Resize => "resize",
            OverlayPurpose::Fill => "fill",
        }
    }

    /// e.g. `save_connected`
    pub fn port_name(&self, flow: FlowKind) -> String {
        format!("{}_{}", flow.as_str(), self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    Content,
    Overlay { flow: FlowKind, purpose: OverlayPurpose },
}

impl PortRole {
    pub fn parse(name: &str) -> Option<Self> {
        if name == PORT_CONTENT {
            return Some(PortRole::Content);
        }
        let (flow, purpose) = name.split_once('_')?;
        let flow = match flow {
            "save" => FlowKind::Save,
            "fill" => FlowKind::Fill,
            _ => return None,
        };
        let purpose = match (flow, purpose) {
            (_, "connected") => OverlayPurpose::Connected,
            (_, "close") => OverlayPurpose::Close,
            (_, "resize") => OverlayPurpose::Resize,
            (FlowKind::Fill, "fill") => OverlayPurpose::Fill,
            _ => return None,
        };
        Some(PortRole::Overlay { flow, purpose })
    }
}
