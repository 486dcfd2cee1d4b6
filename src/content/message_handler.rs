use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::background::session_tools::origin_and_path;
use crate::content::frame_manager::FrameManager;
use crate::dom::dom_model::{Document, NodeId};
use crate::error::Result;
use crate::forms::filler::FillReport;
use crate::forms::form_model::{FormValues, RescanScope, ScannerOptions};
use crate::forms::scanner::PageScanner;
use crate::messages::message_model::{Action, FlowKind, FrameSize, Message, SubmitData};

/// Repeated submits closer together than this are one submit.
pub const SUBMIT_LOCK_MS: u64 = 100;
/// Longest page title sent along with a submit.
pub const MAX_NAME_LEN: usize = 128;

/// Page side of the extension: owns the document and its scanner, reacts to
/// messages from the background and queues messages for it.
pub struct ContentScript {
    doc: Document,
    scanner: PageScanner,
    frames: FrameManager,
    outgoing: Vec<Message>,
    forms_changed: Arc<AtomicBool>,
    fill_requested: bool,
    last_submit: Option<u64>,
    last_fill: Option<FillReport>,
}

impl ContentScript {
    /// Scan `doc` and start watching it for mutations.
    pub fn new(doc: Document, options: ScannerOptions) -> Result<Self> {
        let mut scanner = PageScanner::new(options)?;
        let forms_changed = Arc::new(AtomicBool::new(false));
        let flag = forms_changed.clone();
        scanner.subscribe_to_mutations(move |_| flag.store(true, Ordering::SeqCst));

        let mut script = Self {
            doc,
            scanner,
            frames: FrameManager::new(),
            outgoing: vec![],
            forms_changed,
            fill_requested: false,
            last_submit: None,
            last_fill: None,
        };
        script.scanner.scan_page(&script.doc)?;
        info!(url = script.doc.url(), forms = script.scanner.forms().len(), "content script initialized");
        script.on_forms_change();
        Ok(script)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Mutable access for page scripts; call `sync` afterwards.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn scanner(&self) -> &PageScanner {
        &self.scanner
    }

    pub fn frames(&self) -> &FrameManager {
        &self.frames
    }

    pub fn last_fill(&self) -> Option<&FillReport> {
        self.last_fill.as_ref()
    }

    /// Messages queued for the background, oldest first.
    pub fn take_outgoing(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outgoing)
    }

    /// Feed pending DOM mutations to the scanner.
    pub fn sync(&mut self) -> Result<RescanScope> {
        let scope = self.scanner.process_mutations(&mut self.doc)?;
        if self.forms_changed.swap(false, Ordering::SeqCst) {
            self.on_forms_change();
        }
        Ok(scope)
    }

    /// Ask for autofill once per page when a fillable form is present.
    fn on_forms_change(&mut self) {
        let fillable = self
            .scanner
            .forms()
            .values()
            .any(|f| f.form_type.is_fillable());
        if fillable && !self.fill_requested {
            debug!("fillable form found, requesting results");
            self.fill_requested = true;
            self.outgoing.push(Message::new(FlowKind::Fill, Action::Init));
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Apply a message from the background. Returns whether it was acted
    /// on; unknown or malformed messages are logged and dropped.
    pub fn handle_message(&mut self, message: &Message) -> bool {
        let kind = match message.kind() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, "dropping message");
                return false;
            }
        };
        debug!(message = %kind, "message received");

        match (kind.flow, kind.action) {
            (flow, Action::Open) => {
                self.frames.inject(&mut self.doc, flow);
                true
            }
            (flow, Action::Close) => self.frames.remove(&mut self.doc, flow),
            (flow, Action::Resize) => match message.data_as::<FrameSize>() {
                Ok(size) => self.frames.resize(&mut self.doc, flow, size),
                Err(e) => {
                    warn!(error = %e, "dropping resize");
                    false
                }
            },
            (FlowKind::Fill, Action::Fill) => match message.data_as::<HashMap<String, String>>() {
                Ok(values) => {
                    let report = self.scanner.fill_values(&mut self.doc, &values);
                    info!(filled = report.filled.len(), "page filled");
                    self.last_fill = Some(report);
                    true
                }
                Err(e) => {
                    warn!(error = %e, "dropping fill");
                    false
                }
            },
            _ => {
                debug!(message = %kind, "no handler, dropped");
                false
            }
        }
    }

    // ========================================================================
    // Submit capture
    // ========================================================================

    /// A submit on `target` (a form container or one of its submit
    /// elements). Queues `save.submit` when the form is saveable.
    pub fn submit(&mut self, target: NodeId, now_ms: u64) -> bool {
        if self
            .last_submit
            .is_some_and(|last| now_ms.saturating_sub(last) < SUBMIT_LOCK_MS)
        {
            debug!("submit locked");
            return false;
        }

        let Some(form) = self.form_for(target) else {
            debug!(?target, "submit outside any known form");
            return false;
        };
        if !form.form_type.is_saveable() {
            debug!(form_type = form.form_type.as_str(), "form is not saveable");
            return false;
        }

        let data = SubmitData {
            fields: form
                .fillable_inputs()
                .map(|(el, input_type)| (input_type.as_str().to_string(), self.doc.value(el).to_string()))
                .collect(),
            name: self.doc.title().chars().take(MAX_NAME_LEN).collect(),
            url: origin_and_path(self.doc.url()),
        };

        self.last_submit = Some(now_ms);
        match serde_json::to_value(&data) {
            Ok(value) => {
                info!(fields = data.fields.len(), "form submitted");
                self.outgoing.push(Message::new(FlowKind::Save, Action::Submit).with_data(value));
                true
            }
            Err(e) => {
                warn!(error = %e, "could not encode submit");
                false
            }
        }
    }

    fn form_for(&self, target: NodeId) -> Option<FormValues> {
        let forms = self.scanner.forms();
        forms
            .get(&target)
            .or_else(|| forms.values().find(|f| f.submit_elements.contains(&target)))
            .cloned()
    }
}
