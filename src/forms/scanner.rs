use std::collections::{BTreeMap, HashMap};

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::dom::dom_model::{Document, NodeId};
use crate::dom::mutation::MutationBatch;
use crate::error::{AutofillError, Result};
use crate::forms::filler::{FillReport, fill_forms};
use crate::forms::form_model::{ContainerKind, FormType, FormValues, Forms, RescanScope, ScannerOptions};
use crate::forms::forms_tools::parse_result;
use crate::forms::matchers::Matchers;
use crate::vault::client::VaultClient;
use crate::vault::vault_model::VaultObject;

/// Text that marks an element as a likely submit control.
pub const SUBMIT_LANGUAGE: &str = "login|log in|signin|sign in|submit";

/// Tags whose insertion or removal can change the page model.
const CANDIDATE_TAGS: [&str; 2] = ["input", "button"];

pub type FormsListener = Box<dyn FnMut(&Forms) + Send>;

/// Builds and maintains the page model: real forms plus pseudo-forms
/// inferred from loose inputs, each classified by `Matchers`.
pub struct PageScanner {
    matchers: Matchers,
    options: ScannerOptions,
    submit_language: Regex,
    forms: Forms,
    listener: Option<FormsListener>,
}

impl PageScanner {
    pub fn new(options: ScannerOptions) -> Result<Self> {
        let submit_language = RegexBuilder::new(SUBMIT_LANGUAGE)
            .case_insensitive(true)
            .build()
            .map_err(|e| AutofillError::invariant("scanner", "invalid submit pattern").with_source(e))?;
        Ok(Self {
            matchers: Matchers::new()?,
            options,
            submit_language,
            forms: Forms::new(),
            listener: None,
        })
    }

    pub fn matchers(&self) -> &Matchers {
        &self.matchers
    }

    pub fn options(&self) -> ScannerOptions {
        self.options
    }

    /// Current page model.
    pub fn forms(&self) -> &Forms {
        &self.forms
    }

    /// Rescan the whole page and replace the model.
    pub fn scan_page(&mut self, doc: &Document) -> Result<&Forms> {
        self.forms = self.scan(doc, doc.body())?;
        debug!(forms = self.forms.len(), url = doc.url(), "page scanned");
        Ok(&self.forms)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    /// Discover, classify and deduplicate every form under `root`.
    pub fn scan(&self, doc: &Document, root: NodeId) -> Result<Forms> {
        let (inputs, submits) = self.candidates(doc, root);

        // Innermost <form> ancestor, or none for loose elements
        let owner = |el: NodeId| doc.parent(el).and_then(|p| doc.closest(p, "form"));

        let mut real: BTreeMap<NodeId, (Vec<NodeId>, Vec<NodeId>)> = doc
            .query_tags(root, &["form"])
            .into_iter()
            .map(|f| (f, (vec![], vec![])))
            .collect();
        let mut free_inputs = Vec::new();
        let mut free_submits = Vec::new();

        for &input in &inputs {
            match owner(input) {
                Some(form) => real.entry(form).or_default().0.push(input),
                None => free_inputs.push(input),
            }
        }
        for &submit in &submits {
            match owner(submit) {
                Some(form) => real.entry(form).or_default().1.push(submit),
                None => free_submits.push(submit),
            }
        }

        let mut forms: Vec<(NodeId, FormValues)> = real
            .into_iter()
            .map(|(form, (ins, subs))| {
                let values = self.build_values(doc, form, ContainerKind::Form, &ins, &subs);
                (form, values)
            })
            .collect();

        let mut pseudo = self.find_pseudo_forms(doc, root, &free_inputs, &free_submits)?;
        forms.append(&mut pseudo);

        if self.options.second_pass {
            for (container, values) in forms.iter_mut() {
                if values.form_type == FormType::Unknown {
                    self.second_pass(doc, *container, values);
                }
            }
        }

        Ok(self.deduplicate(doc, forms))
    }

    /// Input candidates and submit candidates under `root`, in document order.
    fn candidates(&self, doc: &Document, root: NodeId) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut inputs = Vec::new();
        let mut submits = Vec::new();
        for el in doc.query_tags(root, &CANDIDATE_TAGS) {
            let input_type = doc.input_type(el);
            match (doc.tag(el), input_type.as_str()) {
                (_, "reset") => {}
                (Some("input"), "submit" | "image" | "button") => submits.push(el),
                (Some("input"), _) => inputs.push(el),
                (Some("button"), "submit") => submits.push(el),
                (Some("button"), _) if self.speaks_submit(doc, el) => submits.push(el),
                _ => {}
            }
        }
        (inputs, submits)
    }

    fn speaks_submit(&self, doc: &Document, el: NodeId) -> bool {
        self.submit_language.is_match(&doc.opening_tag(el))
            || self.submit_language.is_match(&doc.inner_text(el))
    }

    fn build_values(
        &self,
        doc: &Document,
        container: NodeId,
        kind: ContainerKind,
        inputs: &[NodeId],
        submits: &[NodeId],
    ) -> FormValues {
        let input_elements: BTreeMap<NodeId, _> = inputs
            .iter()
            .map(|&el| (el, self.matchers.classify_input(doc, el)))
            .collect();
        let submit_elements = self.filter_submits(doc, submits);
        let form_type = self
            .matchers
            .classify_form(doc, container, &input_elements, &submit_elements);
        FormValues {
            form_type,
            kind,
            input_elements,
            submit_elements,
        }
    }

    /// Keep the highest scoring submit candidates (ties included).
    ///
    /// +3 when the opening tag or text speaks submit language, +1 for a
    /// `<button>`, +1 more when its `type` attribute is literally `submit`.
    pub fn filter_submits(&self, doc: &Document, submits: &[NodeId]) -> Vec<NodeId> {
        let scored: Vec<(NodeId, u32)> = submits
            .iter()
            .map(|&el| {
                let mut score = 0;
                if self.speaks_submit(doc, el) {
                    score += 3;
                }
                if doc.is_tag(el, "button") {
                    score += 1;
                    if doc.attr(el, "type") == Some("submit") {
                        score += 1;
                    }
                }
                (el, score)
            })
            .collect();

        let Some(best) = scored.iter().map(|(_, s)| *s).max() else {
            return vec![];
        };
        scored
            .into_iter()
            .filter(|(_, s)| *s == best)
            .map(|(el, _)| el)
            .collect()
    }

    /// Group loose elements under their common ancestors. Smallest groups first.
    fn find_pseudo_forms(
        &self,
        doc: &Document,
        root: NodeId,
        inputs: &[NodeId],
        submits: &[NodeId],
    ) -> Result<Vec<(NodeId, FormValues)>> {
        let all: Vec<NodeId> = inputs.iter().chain(submits).copied().collect();
        let input_groups = map_common_elements(doc, inputs, &all, root)?;
        let submit_groups = map_common_elements(doc, submits, &all, root)?;

        let mut forms: Vec<(NodeId, FormValues)> = input_groups
            .into_iter()
            .map(|(container, ins)| {
                let subs = submit_groups.get(&container).cloned().unwrap_or_default();
                let values = self.build_values(doc, container, ContainerKind::Pseudo, &ins, &subs);
                (container, values)
            })
            .collect();

        forms.sort_by_key(|(container, values)| (values.element_count(), *container));
        Ok(forms)
    }

    /// Anchors that speak submit language become submit candidates.
    fn second_pass(&self, doc: &Document, container: NodeId, values: &mut FormValues) {
        let anchors: Vec<NodeId> = doc
            .query_tags(container, &["a"])
            .into_iter()
            .filter(|&a| self.speaks_submit(doc, a))
            .filter(|a| !values.submit_elements.contains(a))
            .collect();
        if anchors.is_empty() {
            return;
        }
        values.submit_elements.extend(anchors);
        values.form_type = self.matchers.classify_form(
            doc,
            container,
            &values.input_elements,
            &values.submit_elements,
        );
        debug!(container = container.0, form_type = values.form_type.as_str(), "second pass");
    }

    /// Drop unknown/hidden forms and pseudo-forms wrapping an accepted form.
    fn deduplicate(&self, doc: &Document, forms: Vec<(NodeId, FormValues)>) -> Forms {
        let (real, pseudo): (Vec<_>, Vec<_>) = forms.into_iter().partition(|(_, v)| !v.is_pseudo());

        let mut accepted = Forms::new();
        for (container, values) in real {
            if values.form_type.is_actionable() {
                accepted.insert(container, values);
            }
        }
        for (container, values) in pseudo {
            if !values.form_type.is_actionable() {
                continue;
            }
            if accepted.keys().any(|&other| doc.contains(container, other)) {
                continue;
            }
            accepted.insert(container, values);
        }
        accepted
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Decide what a batch of mutations requires, without scanning.
    pub fn plan_rescan(&self, doc: &Document, model: &Forms, batch: &MutationBatch) -> RescanScope {
        let mut roots: Vec<NodeId> = Vec::new();

        for record in batch {
            for &node in &record.added {
                if doc.element(node).is_none() || !doc.is_connected(node) {
                    continue;
                }
                if doc.is_tag(node, "form") || !doc.query_tags(node, &["form"]).is_empty() {
                    return RescanScope::Full;
                }
                let is_candidate = CANDIDATE_TAGS.iter().any(|t| doc.is_tag(node, t));
                if !is_candidate && doc.query_tags(node, &CANDIDATE_TAGS).is_empty() {
                    continue;
                }
                if doc.closest(record.target, "form").is_some() {
                    return RescanScope::Full;
                }
                let root = match outermost_pseudo(model, doc, record.target) {
                    Some(container) => container,
                    None if is_candidate => record.target,
                    None => node,
                };
                roots.push(root);
            }

            if !self.options.prune_removed || record.removed.is_empty() {
                continue;
            }
            if !doc.is_connected(record.target) {
                continue;
            }
            if doc.closest(record.target, "form").is_some() {
                return RescanScope::Full;
            }
            if let Some(container) = outermost_pseudo(model, doc, record.target) {
                roots.push(container);
            }
        }

        let order = doc.document_order();
        roots.sort_by_key(|r| order.get(r).copied().unwrap_or(usize::MAX));
        roots.dedup();
        let outermost: Vec<NodeId> = roots
            .iter()
            .copied()
            .filter(|&r| !roots.iter().any(|&o| o != r && doc.contains(o, r)))
            .collect();

        if outermost.is_empty() {
            RescanScope::None
        } else {
            RescanScope::Scoped(outermost)
        }
    }

    /// Apply a batch of mutations to `model`, returning the new model and the
    /// scope that was rescanned.
    pub fn apply_mutations(
        &self,
        doc: &Document,
        model: &Forms,
        batch: &MutationBatch,
    ) -> Result<(Forms, RescanScope)> {
        let mut next = model.clone();
        if self.options.prune_removed {
            next.retain(|&container, _| doc.is_connected(container));
        }

        let scope = self.plan_rescan(doc, &next, batch);
        match &scope {
            RescanScope::None => {}
            RescanScope::Full => next = self.scan(doc, doc.body())?,
            RescanScope::Scoped(roots) => {
                for &root in roots {
                    next.retain(|&container, _| !doc.contains(root, container));
                    let found = self.scan(doc, root)?;
                    next.extend(found);
                }
            }
        }
        Ok((next, scope))
    }

    /// Register the listener notified after every model update.
    pub fn subscribe_to_mutations(&mut self, listener: impl FnMut(&Forms) + Send + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn unsubscribe_from_mutations(&mut self) {
        self.listener = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener.is_some()
    }

    /// Drain the document's pending mutations. Without a subscription they
    /// are discarded, like records of a disconnected observer.
    pub fn process_mutations(&mut self, doc: &mut Document) -> Result<RescanScope> {
        let batch = doc.take_mutations();
        if self.listener.is_none() || batch.is_empty() {
            return Ok(RescanScope::None);
        }

        let (next, scope) = self.apply_mutations(doc, &self.forms, &batch)?;
        let changed = next != self.forms;
        self.forms = next;
        if changed {
            debug!(?scope, forms = self.forms.len(), "page model updated");
            if let Some(listener) = self.listener.as_mut() {
                listener(&self.forms);
            }
        }
        Ok(scope)
    }

    // ========================================================================
    // Fill
    // ========================================================================

    /// Write decrypted values into every fillable form.
    pub fn fill_values(&self, doc: &mut Document, values: &HashMap<String, String>) -> FillReport {
        fill_forms(doc, &self.forms, values)
    }

    /// Decrypt `object` if needed, then fill.
    pub async fn fill_result(
        &self,
        doc: &mut Document,
        vault: &dyn VaultClient,
        object: &VaultObject,
    ) -> Result<FillReport> {
        let values = parse_result(vault, object).await?;
        let report = self.fill_values(doc, &values);
        if report.filled.is_empty() {
            warn!(object = %object.id, "no fillable field matched the result");
        }
        Ok(report)
    }
}

/// The outermost pseudo-form of `model` containing `node`.
fn outermost_pseudo(model: &Forms, doc: &Document, node: NodeId) -> Option<NodeId> {
    model
        .iter()
        .filter(|(container, values)| values.is_pseudo() && doc.contains(**container, node))
        .map(|(container, _)| *container)
        .find(|&c| {
            !model
                .iter()
                .any(|(o, v)| v.is_pseudo() && *o != c && doc.contains(*o, c))
        })
}

/// For each element, walk up from its parent and record it at every ancestor
/// where another element becomes jointly contained, until all are accounted
/// for. Running past `root` with elements left over is a broken model.
fn map_common_elements(
    doc: &Document,
    elements: &[NodeId],
    others: &[NodeId],
    root: NodeId,
) -> Result<BTreeMap<NodeId, Vec<NodeId>>> {
    let stop = doc.parent(root);
    let mut groups: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();

    for &element in elements {
        let mut remaining: Vec<NodeId> = others.iter().copied().filter(|&o| o != element).collect();
        let mut cursor = doc.parent(element);

        while !remaining.is_empty() {
            let Some(parent) = cursor else { break };
            if Some(parent) == stop {
                break;
            }
            let before = remaining.len();
            remaining.retain(|&o| !doc.contains(parent, o));
            if remaining.len() != before {
                groups.entry(parent).or_default().push(element);
            }
            cursor = doc.parent(parent);
        }

        if !remaining.is_empty() {
            return Err(AutofillError::invariant(
                "scanner",
                format!(
                    "reached the scan root without finding all common elements ({} left)",
                    remaining.len()
                ),
            ));
        }
    }
    Ok(groups)
}
