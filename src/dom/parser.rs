//! HTML parsing into the arena document.
//!
//! Uses html5ever's RcDom and converts it, so the page model sees the same
//! tree a browser would build (implied `html`/`head`/`body`, misnested tags
//! repaired).

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};
use tracing::debug;

use crate::dom::dom_model::{Document, NodeId};
use crate::error::{AutofillError, Result};

/// Parse an HTML string into a `Document` located at `url`.
pub fn parse_html(html: &str, url: &str) -> Result<Document> {
    debug!(url, bytes = html.len(), "parsing HTML document");

    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| AutofillError::parse("parser", "failed to read HTML input").with_source(e))?;

    let mut document = Document::empty(url);
    convert_node(&dom.document, &mut document, NodeId::ROOT);
    // Building the tree is not a page mutation
    document.take_mutations();

    debug!(nodes = document.len(), "parsed HTML document");
    Ok(document)
}

fn convert_node(handle: &Handle, document: &mut Document, parent: NodeId) {
    match &handle.data {
        RcNodeData::Document => {
            for child in handle.children.borrow().iter() {
                convert_node(child, document, parent);
            }
        }
        RcNodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            if !text.trim().is_empty() {
                let id = document.create_text(&text);
                document.link(parent, id);
            }
        }
        RcNodeData::Element { name, attrs, .. } => {
            let attrs: Vec<(String, String)> = attrs
                .borrow()
                .iter()
                .map(|a| (a.name.local.to_ascii_lowercase().to_string(), a.value.to_string()))
                .collect();
            let id = document.push_element(&name.local, attrs);
            document.link(parent, id);

            for child in handle.children.borrow().iter() {
                convert_node(child, document, id);
            }

            if document.is_tag(id, "textarea") {
                let text = document.inner_text(id);
                document.set_value(id, &text);
            }
        }
        // Doctype, comments and processing instructions carry nothing the scanner reads
        RcNodeData::Doctype { .. }
        | RcNodeData::Comment { .. }
        | RcNodeData::ProcessingInstruction { .. } => {}
    }
}
