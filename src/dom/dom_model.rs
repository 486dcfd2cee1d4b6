use std::collections::HashMap;

use serde::Serialize;

use crate::dom::mutation::{MutationBatch, MutationRecord};

/// Handle into the document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The document node
    pub const ROOT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ElementData {
    /// Lowercase tag name
    pub tag: String,
    /// Attributes in source order, names lowercase
    pub attrs: Vec<(String, String)>,
    /// Current form control value (initialized from the `value` attribute)
    pub value: String,
}

impl ElementData {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub data: NodeData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomEventKind {
    Input,
    Change,
}

/// An event dispatched on an element by this crate (page scripts observe these).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub target: NodeId,
    pub kind: DomEventKind,
}

const TEXTLESS_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Arena-backed document. Structural changes made through `append_child` and
/// `remove` are queued as mutation records until `take_mutations` is called.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    url: String,
    focused: Option<NodeId>,
    events: Vec<DomEvent>,
    pending: Vec<MutationRecord>,
}

impl Document {
    /// Document with only the document node.
    pub fn empty(url: &str) -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: vec![],
                data: NodeData::Document,
            }],
            url: url.to_string(),
            focused: None,
            events: vec![],
            pending: vec![],
        }
    }

    /// Document with an `html`, `head` and `body` skeleton.
    pub fn new(url: &str) -> Self {
        let mut doc = Self::empty(url);
        let html = doc.create_element("html", &[]);
        let head = doc.create_element("head", &[]);
        let body = doc.create_element("body", &[]);
        doc.link(NodeId::ROOT, html);
        doc.link(html, head);
        doc.link(html, body);
        doc
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Text of the first `<title>` element, whitespace collapsed.
    pub fn title(&self) -> String {
        self.query_tags(NodeId::ROOT, &["title"])
            .first()
            .map(|&t| self.inner_text(t))
            .unwrap_or_default()
    }

    /// First `<body>` element, or the document node when there is none.
    pub fn body(&self) -> NodeId {
        self.query_tags(NodeId::ROOT, &["body"])
            .first()
            .copied()
            .unwrap_or(NodeId::ROOT)
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs: Vec<(String, String)> = attrs
            .iter()
            .map(|(n, v)| (n.to_ascii_lowercase(), v.to_string()))
            .collect();
        self.push_element(tag, attrs)
    }

    pub(crate) fn push_element(&mut self, tag: &str, attrs: Vec<(String, String)>) -> NodeId {
        let value = attrs
            .iter()
            .find(|(n, _)| n == "value")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        self.push(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs,
            value,
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: None,
            children: vec![],
            data,
        });
        id
    }

    /// Attach without recording a mutation (used while building a document).
    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes[child.index()].parent.take()?;
        self.nodes[parent.index()].children.retain(|&c| c != child);
        Some(parent)
    }

    /// Append `child` to `parent`, moving it if it is already attached.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old_parent) = self.nodes[child.index()].parent {
            self.pending.push(MutationRecord::removed(old_parent, child));
        }
        self.link(parent, child);
        self.pending.push(MutationRecord::added(parent, child));
    }

    /// Detach `node` from its parent. Returns the former parent.
    pub fn remove(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.detach(node)?;
        self.pending.push(MutationRecord::removed(parent, node));
        Some(parent)
    }

    /// Drain the mutation records queued since the last call.
    pub fn take_mutations(&mut self) -> MutationBatch {
        std::mem::take(&mut self.pending)
    }

    // ------------------------------------------------------------------
    // Tree queries
    // ------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(id.index())?.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.index())?.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id) == Some(tag)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.index()).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Ancestors from the parent upwards, ending at the document node.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// `a` is `b` or an ancestor of `b`.
    pub fn contains(&self, a: NodeId, b: NodeId) -> bool {
        a == b || self.ancestors(b).any(|n| n == a)
    }

    /// Whether the node is reachable from the document node.
    pub fn is_connected(&self, id: NodeId) -> bool {
        id == NodeId::ROOT || self.ancestors(id).any(|n| n == NodeId::ROOT)
    }

    /// Pre-order descendants of `root`, excluding `root` itself.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Elements under `root` whose tag is in `tags`, in document order.
    pub fn query_tags(&self, root: NodeId, tags: &[&str]) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&id| self.tag(id).is_some_and(|t| tags.contains(&t)))
            .collect()
    }

    /// Closest inclusive ancestor with the given tag.
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|&n| self.is_tag(n, tag))
    }

    /// Position of every connected node in document order.
    pub fn document_order(&self) -> HashMap<NodeId, usize> {
        std::iter::once(NodeId::ROOT)
            .chain(self.descendants(NodeId::ROOT))
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect()
    }

    // ------------------------------------------------------------------
    // Element content
    // ------------------------------------------------------------------

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            let name = name.to_ascii_lowercase();
            match el.attrs.iter_mut().find(|(n, _)| *n == name) {
                Some((_, v)) => *v = value.to_string(),
                None => el.attrs.push((name, value.to_string())),
            }
        }
    }

    /// The `type` the DOM reports for form controls: lowercase attribute value,
    /// `text` for inputs and `submit` for buttons when the attribute is absent.
    pub fn input_type(&self, id: NodeId) -> String {
        let Some(el) = self.element(id) else {
            return String::new();
        };
        let declared = el.attr("type").map(|t| t.trim().to_ascii_lowercase());
        match (el.tag.as_str(), declared) {
            ("input", Some(t)) if !t.is_empty() => t,
            ("input", _) => "text".to_string(),
            ("button", Some(t)) if t == "button" || t == "reset" => t,
            ("button", _) => "submit".to_string(),
            (_, t) => t.unwrap_or_default(),
        }
    }

    /// Serialized opening tag, e.g. `<form id="login" class="auth">`.
    pub fn opening_tag(&self, id: NodeId) -> String {
        let Some(el) = self.element(id) else {
            return String::new();
        };
        let mut out = format!("<{}", el.tag);
        for (name, value) in &el.attrs {
            out.push_str(&format!(" {}=\"{}\"", name, value.replace('"', "&quot;")));
        }
        out.push('>');
        out
    }

    /// Concatenated text of all descendant text nodes, skipping script-like
    /// elements, with whitespace collapsed.
    pub fn inner_text(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        self.collect_text(id, &mut parts);
        parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text<'a>(&'a self, id: NodeId, parts: &mut Vec<&'a str>) {
        for &child in self.children(id) {
            match &self.node(child).data {
                NodeData::Text(t) => parts.push(t),
                NodeData::Element(e) if TEXTLESS_TAGS.contains(&e.tag.as_str()) => {}
                NodeData::Element(_) => self.collect_text(child, parts),
                NodeData::Document => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Form control state, events and focus
    // ------------------------------------------------------------------

    pub fn value(&self, id: NodeId) -> &str {
        self.element(id).map(|e| e.value.as_str()).unwrap_or("")
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) {
        if let Some(el) = self.element_mut(id) {
            el.value = value.to_string();
        }
    }

    pub fn dispatch_event(&mut self, target: NodeId, kind: DomEventKind) {
        self.events.push(DomEvent { target, kind });
    }

    pub fn events(&self) -> &[DomEvent] {
        &self.events
    }

    pub fn focus(&mut self, id: NodeId) {
        self.focused = Some(id);
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }
}
