use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dom::dom_model::NodeId;

// ============================================================================
// Classification results
// ============================================================================

/// Semantic purpose of a single input. Names double as vault field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Username,
    Password,
    PinCode,
    CardNo,
    Expires,
    Cvc,
    Hidden,
    Unknown,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Username => "username",
            InputType::Password => "password",
            InputType::PinCode => "pincode",
            InputType::CardNo => "cardno",
            InputType::Expires => "expires",
            InputType::Cvc => "cvc",
            InputType::Hidden => "hidden",
            InputType::Unknown => "unknown",
        }
    }

    /// Whether the input takes part in fill and save.
    pub fn is_fillable(&self) -> bool {
        !matches!(self, InputType::Hidden | InputType::Unknown)
    }
}

/// Semantic purpose of a form or pseudo-form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormType {
    Login,
    Card,
    Search,
    ContactInfo,
    NewsLetter,
    Register,
    Menu,
    Hidden,
    Unknown,
}

impl FormType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormType::Login => "login",
            FormType::Card => "card",
            FormType::Search => "search",
            FormType::ContactInfo => "contactinfo",
            FormType::NewsLetter => "newsletter",
            FormType::Register => "register",
            FormType::Menu => "menu",
            FormType::Hidden => "hidden",
            FormType::Unknown => "unknown",
        }
    }

    pub fn is_fillable(&self) -> bool {
        matches!(self, FormType::Login | FormType::Card)
    }

    pub fn is_saveable(&self) -> bool {
        matches!(self, FormType::Login | FormType::Register)
    }

    /// Unknown and Hidden forms never reach the page model.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, FormType::Unknown | FormType::Hidden)
    }
}

// ============================================================================
// Page model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// A genuine `<form>` element
    Form,
    /// Nearest common ancestor of loose inputs
    Pseudo,
}

/// Everything known about one form or pseudo-form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormValues {
    pub form_type: FormType,
    pub kind: ContainerKind,
    pub input_elements: BTreeMap<NodeId, InputType>,
    pub submit_elements: Vec<NodeId>,
}

impl FormValues {
    pub fn element_count(&self) -> usize {
        self.input_elements.len() + self.submit_elements.len()
    }

    pub fn is_pseudo(&self) -> bool {
        self.kind == ContainerKind::Pseudo
    }

    /// Inputs that take part in fill and save.
    pub fn fillable_inputs(&self) -> impl Iterator<Item = (NodeId, InputType)> + '_ {
        self.input_elements
            .iter()
            .filter(|(_, t)| t.is_fillable())
            .map(|(&id, &t)| (id, t))
    }
}

/// Container element -> its classified contents.
pub type Forms = BTreeMap<NodeId, FormValues>;

/// What a batch of DOM mutations requires from the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescanScope {
    /// Nothing relevant changed
    None,
    /// Rescan the whole page
    Full,
    /// Rescan only these subtrees (outermost roots, document order)
    Scoped(Vec<NodeId>),
}

/// Scanner switches (`scanner` config section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerOptions {
    /// Widen the submit search to anchors for still-unknown forms
    pub second_pass: bool,
    /// Drop forms whose container left the document
    pub prune_removed: bool,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            second_pass: true,
            prune_removed: true,
        }
    }
}
