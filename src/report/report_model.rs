use serde::Serialize;

use crate::dom::dom_model::{Document, NodeId};
use crate::forms::form_model::{ContainerKind, FormType, FormValues, Forms, InputType};

// ============================================================================
// Scan report: the classified page model in a printable shape
// ============================================================================

/// Result of scanning one page.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub url: String,
    pub title: String,
    pub forms: Vec<FormReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormReport {
    pub container: u32,
    /// Opening tag of the container
    pub tag: String,
    pub kind: ContainerKind,
    pub form_type: FormType,
    /// Structural fingerprint, stable across values and node ids
    pub fingerprint: String,
    pub inputs: Vec<InputReport>,
    pub submits: Vec<SubmitReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputReport {
    pub node: u32,
    pub name: Option<String>,
    pub input_type: InputType,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReport {
    pub node: u32,
    pub tag: String,
    pub text: String,
}

impl ScanReport {
    pub fn from_forms(doc: &Document, forms: &Forms) -> Self {
        Self {
            url: doc.url().to_string(),
            title: doc.title(),
            forms: forms
                .iter()
                .map(|(&container, values)| FormReport::new(doc, container, values))
                .collect(),
        }
    }

    pub fn count(&self, form_type: FormType) -> usize {
        self.forms.iter().filter(|f| f.form_type == form_type).count()
    }

    pub fn fillable(&self) -> usize {
        self.forms.iter().filter(|f| f.form_type.is_fillable()).count()
    }
}

impl FormReport {
    fn new(doc: &Document, container: NodeId, values: &FormValues) -> Self {
        let inputs: Vec<InputReport> = values
            .input_elements
            .iter()
            .map(|(&el, &input_type)| InputReport {
                node: el.0,
                name: doc
                    .attr(el, "name")
                    .or_else(|| doc.attr(el, "id"))
                    .map(str::to_string),
                input_type,
            })
            .collect();
        let submits: Vec<SubmitReport> = values
            .submit_elements
            .iter()
            .map(|&el| SubmitReport {
                node: el.0,
                tag: doc.tag(el).unwrap_or_default().to_string(),
                text: doc.inner_text(el),
            })
            .collect();

        Self {
            container: container.0,
            tag: doc.opening_tag(container),
            kind: values.kind,
            form_type: values.form_type,
            fingerprint: form_fingerprint(values, &inputs),
            inputs,
            submits,
        }
    }
}

/// SHA-1 over the form's type, kind and input names/types.
pub fn form_fingerprint(values: &FormValues, inputs: &[InputReport]) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(values.form_type.as_str().as_bytes());
    hasher.update(format!("{:?}", values.kind).as_bytes());
    for input in inputs {
        hasher.update(b"|");
        hasher.update(input.name.as_deref().unwrap_or("").as_bytes());
        hasher.update(b":");
        hasher.update(input.input_type.as_str().as_bytes());
    }
    hasher.update(format!("#{}", values.submit_elements.len()).as_bytes());
    format!("{:x}", hasher.finalize())
}
