use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use crate::dom::dom_model::{Document, NodeId};
use crate::error::{AutofillError, Result};
use crate::forms::form_model::{FormType, InputType};

// ============================================================================
// Rule tables
// ============================================================================

/// `(attribute constraints, name/id pattern)` per input rule.
type InputRule = (&'static [(&'static str, &'static str)], &'static str);

const USERNAME: &[InputRule] = &[(&[("type", "text|email")], "user|name|mail|login|namn|id|session_key")];
const PASSWORD: &[InputRule] = &[(&[("type", "password")], ".*")];
const PINCODE: &[InputRule] = &[(&[("type", "password")], ".*")];
const CARD_NUMBER: &[InputRule] = &[(&[("type", "text|tel")], "card")];
const EXPIRES: &[InputRule] = &[(&[("type", "text|tel")], "exp")];
const CVC: &[InputRule] = &[(&[("type", "text|tel")], "sec|code|cvv|cvc")];
const RETYPE_PASSWORD: &[InputRule] = &[(&[("type", "password")], "confirm|register|retype")];
const SEARCH: &[InputRule] = &[(&[("type", "text|search")], "search")];

/// Input classification order; the first matching type wins.
const INPUT_RULES: &[(InputType, &[InputRule])] = &[
    (InputType::Username, USERNAME),
    (InputType::Password, PASSWORD),
    (InputType::PinCode, PINCODE),
    (InputType::CardNo, CARD_NUMBER),
    (InputType::Expires, EXPIRES),
    (InputType::Cvc, CVC),
];

/// Named input patterns counted by form rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldGroup {
    Username,
    Password,
    PinCode,
    RetypePassword,
    Search,
    CardNumber,
    Cvc,
}

impl FieldGroup {
    const ALL: [FieldGroup; 7] = [
        FieldGroup::Username,
        FieldGroup::Password,
        FieldGroup::PinCode,
        FieldGroup::RetypePassword,
        FieldGroup::Search,
        FieldGroup::CardNumber,
        FieldGroup::Cvc,
    ];

    fn rules(&self) -> &'static [InputRule] {
        match self {
            FieldGroup::Username => USERNAME,
            FieldGroup::Password => PASSWORD,
            FieldGroup::PinCode => PINCODE,
            FieldGroup::RetypePassword => RETYPE_PASSWORD,
            FieldGroup::Search => SEARCH,
            FieldGroup::CardNumber => CARD_NUMBER,
            FieldGroup::Cvc => CVC,
        }
    }
}

/// Required match count: at least one.
pub const ANY: i32 = -1;
/// Required match count: every input of the form.
pub const ALL: i32 = -2;

struct FormRule {
    form_type: FormType,
    name: Option<&'static str>,
    attributes: &'static [(&'static str, &'static str)],
    fields: &'static [(FieldGroup, i32)],
}

/// Form classification order; the first rule with any hit wins.
const FORM_RULES: &[FormRule] = &[
    FormRule {
        form_type: FormType::Search,
        name: Some("search"),
        attributes: &[("role", "search")],
        fields: &[(FieldGroup::Search, ANY)],
    },
    FormRule {
        form_type: FormType::Login,
        name: Some("signin|sign-in"),
        attributes: &[],
        fields: &[],
    },
    FormRule {
        form_type: FormType::Register,
        name: Some("createaccount|reg|signup"),
        attributes: &[],
        fields: &[(FieldGroup::Password, 2)],
    },
    FormRule {
        form_type: FormType::Register,
        name: None,
        attributes: &[],
        fields: &[(FieldGroup::RetypePassword, ANY)],
    },
    FormRule {
        form_type: FormType::Login,
        name: None,
        attributes: &[],
        fields: &[(FieldGroup::Username, ANY), (FieldGroup::Password, 1)],
    },
    FormRule {
        form_type: FormType::Login,
        name: None,
        attributes: &[],
        fields: &[(FieldGroup::Username, ANY), (FieldGroup::PinCode, 1)],
    },
    FormRule {
        form_type: FormType::Card,
        name: None,
        attributes: &[],
        fields: &[(FieldGroup::CardNumber, ANY), (FieldGroup::Cvc, ANY)],
    },
    FormRule {
        form_type: FormType::NewsLetter,
        name: Some("news|letter"),
        attributes: &[],
        fields: &[],
    },
    FormRule {
        form_type: FormType::ContactInfo,
        name: Some("contact"),
        attributes: &[],
        fields: &[],
    },
    FormRule {
        form_type: FormType::Menu,
        name: Some("nav|menu"),
        attributes: &[],
        fields: &[],
    },
];

// ============================================================================
// Compiled matchers
// ============================================================================

fn pattern(source: &str) -> Result<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            AutofillError::invariant("matchers", format!("invalid pattern {:?}", source))
                .with_source(e)
        })
}

fn attribute_patterns(
    attributes: &[(&'static str, &'static str)],
) -> Result<Vec<(&'static str, Regex)>> {
    attributes
        .iter()
        .map(|(name, source)| Ok((*name, pattern(source)?)))
        .collect()
}

/// Rule for a single input: attribute constraints AND a name/id pattern.
#[derive(Debug, Clone)]
pub struct Matcher {
    attributes: Vec<(&'static str, Regex)>,
    name: Regex,
}

impl Matcher {
    fn compile(rule: &InputRule) -> Result<Self> {
        Ok(Self {
            attributes: attribute_patterns(rule.0)?,
            name: pattern(rule.1)?,
        })
    }

    pub fn matches(&self, doc: &Document, element: NodeId) -> bool {
        match_attributes(doc, element, &self.attributes) && self.matches_name(doc, element)
    }

    fn matches_name(&self, doc: &Document, element: NodeId) -> bool {
        let name = doc.attr(element, "name");
        let id = doc.attr(element, "id");
        if name.is_none() && id.is_none() {
            return self.name.is_match("");
        }
        [name, id].into_iter().flatten().any(|v| self.name.is_match(v))
    }
}

/// Every constraint holds. `type` is checked against the effective input type,
/// other attributes against their value (missing = empty).
fn match_attributes(doc: &Document, element: NodeId, attributes: &[(&'static str, Regex)]) -> bool {
    attributes.iter().all(|(name, regex)| {
        if *name == "type" {
            regex.is_match(&doc.input_type(element))
        } else {
            regex.is_match(doc.attr(element, name).unwrap_or(""))
        }
    })
}

#[derive(Debug, Clone)]
pub struct FormMatcher {
    pub form_type: FormType,
    name: Option<Regex>,
    attributes: Vec<(&'static str, Regex)>,
    fields: Vec<(FieldGroup, i32)>,
}

/// Compiled classification rules for inputs and forms.
#[derive(Debug, Clone)]
pub struct Matchers {
    inputs: Vec<(InputType, Vec<Matcher>)>,
    groups: BTreeMap<FieldGroup, Vec<Matcher>>,
    forms: Vec<FormMatcher>,
}

impl Matchers {
    pub fn new() -> Result<Self> {
        let compile_all = |rules: &[InputRule]| -> Result<Vec<Matcher>> {
            rules.iter().map(Matcher::compile).collect()
        };

        let inputs = INPUT_RULES
            .iter()
            .map(|(t, rules)| Ok((*t, compile_all(*rules)?)))
            .collect::<Result<Vec<_>>>()?;

        let groups = FieldGroup::ALL
            .iter()
            .map(|g| Ok((*g, compile_all(g.rules())?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let forms = FORM_RULES
            .iter()
            .map(|rule| {
                Ok(FormMatcher {
                    form_type: rule.form_type,
                    name: rule.name.map(pattern).transpose()?,
                    attributes: attribute_patterns(rule.attributes)?,
                    fields: rule.fields.to_vec(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { inputs, groups, forms })
    }

    /// Classify one input element.
    pub fn classify_input(&self, doc: &Document, element: NodeId) -> InputType {
        if is_hidden(doc, element) {
            return InputType::Hidden;
        }
        self.inputs
            .iter()
            .find(|(_, rules)| rules.iter().any(|m| m.matches(doc, element)))
            .map(|(t, _)| *t)
            .unwrap_or(InputType::Unknown)
    }

    /// Classify a container from its classified inputs and filtered submits.
    pub fn classify_form(
        &self,
        doc: &Document,
        container: NodeId,
        inputs: &BTreeMap<NodeId, InputType>,
        submits: &[NodeId],
    ) -> FormType {
        if inputs.values().all(|t| *t == InputType::Hidden) {
            return FormType::Hidden;
        }
        if submits.is_empty() {
            return FormType::Unknown;
        }

        // Every name rule is tried before any attribute rule, and those
        // before any field rule
        let opening_tag = doc.opening_tag(container);
        let by_name = |rule: &&FormMatcher| rule.name.as_ref().is_some_and(|n| n.is_match(&opening_tag));
        let by_attributes = |rule: &&FormMatcher| {
            !rule.attributes.is_empty() && match_attributes(doc, container, &rule.attributes)
        };
        let by_fields =
            |rule: &&FormMatcher| !rule.fields.is_empty() && self.match_fields(doc, inputs, &rule.fields);

        self.forms
            .iter()
            .find(by_name)
            .or_else(|| self.forms.iter().find(by_attributes))
            .or_else(|| self.forms.iter().find(by_fields))
            .map(|rule| rule.form_type)
            .unwrap_or(FormType::Unknown)
    }

    fn match_fields(
        &self,
        doc: &Document,
        inputs: &BTreeMap<NodeId, InputType>,
        fields: &[(FieldGroup, i32)],
    ) -> bool {
        let visible: Vec<NodeId> = inputs
            .iter()
            .filter(|(_, t)| **t != InputType::Hidden)
            .map(|(id, _)| *id)
            .collect();

        fields.iter().all(|(group, required)| {
            let matchers = self.groups.get(group).map(Vec::as_slice).unwrap_or(&[]);
            let count = visible
                .iter()
                .filter(|&&id| matchers.iter().any(|m| m.matches(doc, id)))
                .count();
            satisfies(count, *required, visible.len())
        })
    }
}

fn satisfies(count: usize, required: i32, total: usize) -> bool {
    match required {
        ANY => count >= 1,
        ALL => count == total,
        n if n >= 0 => count == n as usize,
        _ => false,
    }
}

/// `type="hidden"` or the `hidden` attribute.
pub fn is_hidden(doc: &Document, element: NodeId) -> bool {
    doc.input_type(element) == "hidden" || doc.has_attr(element, "hidden")
}
