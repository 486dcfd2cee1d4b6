use std::collections::HashMap;

use tracing::debug;

use crate::dom::dom_model::{Document, NodeId};
use crate::messages::message_model::{FlowKind, FrameSize};

/// Container all overlay frames are mounted in.
pub const FRAME_ROOT: &str = "vault-autofill-root";
/// Page the overlay frame loads; the fragment selects the flow.
pub const OVERLAY_PAGE: &str = "index.html";

const Z_INDEX: &str = "2147483646";

const BASE_STYLE: [(&str, &str); 9] = [
    ("border", "0"),
    ("padding", "0"),
    ("margin", "0"),
    ("position", "fixed"),
    ("top", "10px"),
    ("right", "10px"),
    ("width", "400px"),
    ("height", "300px"),
    ("z-index", Z_INDEX),
];

/// An injected overlay `<iframe>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: String,
    pub node: NodeId,
    pub flow: FlowKind,
    style: Vec<(String, String)>,
}

impl Frame {
    pub fn style(&self, prop: &str) -> Option<&str> {
        self.style.iter().find(|(k, _)| k == prop).map(|(_, v)| v.as_str())
    }

    fn set_style(&mut self, prop: &str, value: String) {
        match self.style.iter_mut().find(|(k, _)| k == prop) {
            Some((_, v)) => *v = value,
            None => self.style.push((prop.to_string(), value)),
        }
    }

    fn style_attr(&self) -> String {
        self.style
            .iter()
            .map(|(k, v)| format!("{}: {};", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One overlay frame per flow kind, mounted under a shared root element.
#[derive(Debug, Default)]
pub struct FrameManager {
    root: Option<NodeId>,
    frames: HashMap<FlowKind, Frame>,
}

impl FrameManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_id(flow: FlowKind) -> String {
        format!("vault-autofill-{}", flow.as_str())
    }

    pub fn frame(&self, flow: FlowKind) -> Option<&Frame> {
        self.frames.get(&flow)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Mount the overlay for `flow`, reusing a frame that is still attached.
    pub fn inject(&mut self, doc: &mut Document, flow: FlowKind) -> NodeId {
        if let Some(frame) = self.frames.get(&flow) {
            if doc.is_connected(frame.node) {
                debug!(frame = %frame.id, "overlay already mounted");
                return frame.node;
            }
        }

        let root = self.root(doc);
        let id = Self::frame_id(flow);
        let src = format!("{}#{}", OVERLAY_PAGE, flow.as_str());
        let node = doc.create_element("iframe", &[("id", id.as_str()), ("src", src.as_str())]);

        let frame = Frame {
            id,
            node,
            flow,
            style: BASE_STYLE.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        };
        doc.set_attr(node, "style", &frame.style_attr());
        doc.append_child(root, node);
        debug!(frame = %frame.id, "overlay mounted");

        self.frames.insert(flow, frame);
        node
    }

    /// Unmount the overlay for `flow`; false when there was none.
    pub fn remove(&mut self, doc: &mut Document, flow: FlowKind) -> bool {
        match self.frames.remove(&flow) {
            Some(frame) => {
                doc.remove(frame.node);
                debug!(frame = %frame.id, "overlay removed");
                true
            }
            None => false,
        }
    }

    /// Apply a size requested by the overlay; false when there is no frame.
    pub fn resize(&mut self, doc: &mut Document, flow: FlowKind, size: FrameSize) -> bool {
        let Some(frame) = self.frames.get_mut(&flow) else {
            return false;
        };
        frame.set_style("width", format!("{}px", size.width));
        frame.set_style("height", format!("{}px", size.height));
        doc.set_attr(frame.node, "style", &frame.style_attr());
        true
    }

    fn root(&mut self, doc: &mut Document) -> NodeId {
        if let Some(root) = self.root.filter(|&r| doc.is_connected(r)) {
            return root;
        }
        let style = format!("z-index: {};", Z_INDEX);
        let root = doc.create_element("div", &[("id", FRAME_ROOT), ("style", style.as_str())]);
        let body = doc.body();
        doc.append_child(body, root);
        self.root = Some(root);
        root
    }
}
