use std::collections::HashMap;

use tracing::debug;

use crate::dom::dom_model::{Document, DomEventKind, NodeId};
use crate::forms::form_model::Forms;
use crate::forms::matchers::is_hidden;

const INTERACTIVE_TAGS: [&str; 5] = ["input", "button", "a", "select", "textarea"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Inputs written, in document order
    pub filled: Vec<NodeId>,
    /// Element focused afterwards
    pub focused: Option<NodeId>,
}

/// Fill every input of every fillable form whose type has a value in
/// `values`, then move focus past the last filled field.
pub fn fill_forms(doc: &mut Document, forms: &Forms, values: &HashMap<String, String>) -> FillReport {
    let order = doc.document_order();
    let mut targets: Vec<(NodeId, &str)> = forms
        .values()
        .filter(|form| form.form_type.is_fillable())
        .flat_map(|form| form.fillable_inputs())
        .filter_map(|(el, input_type)| {
            values
                .get(input_type.as_str())
                .map(|value| (el, value.as_str()))
        })
        .filter(|(el, _)| order.contains_key(el))
        .collect();
    targets.sort_by_key(|(el, _)| order.get(el).copied().unwrap_or(usize::MAX));
    targets.dedup_by_key(|(el, _)| *el);

    let mut report = FillReport::default();
    for (el, value) in targets {
        doc.set_value(el, value);
        doc.dispatch_event(el, DomEventKind::Input);
        doc.dispatch_event(el, DomEventKind::Change);
        report.filled.push(el);
    }

    if let Some(&last) = report.filled.last() {
        let next = next_interactive(doc, last).unwrap_or(last);
        doc.focus(next);
        report.focused = Some(next);
    }

    debug!(filled = report.filled.len(), "filled page");
    report
}

/// First visible interactive element after `el` in document order.
fn next_interactive(doc: &Document, el: NodeId) -> Option<NodeId> {
    let interactive = doc.query_tags(NodeId::ROOT, &INTERACTIVE_TAGS);
    let position = interactive.iter().position(|&n| n == el)?;
    interactive[position + 1..]
        .iter()
        .copied()
        .find(|&n| !is_hidden(doc, n) && !doc.has_attr(n, "disabled"))
}
