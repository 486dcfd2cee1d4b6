mod common;

use std::collections::BTreeMap;

use common::pages::{find, first, parse};
use vault_autofill::dom::dom_model::NodeId;
use vault_autofill::forms::form_model::{FormType, InputType};
use vault_autofill::forms::matchers::{Matchers, is_hidden};

fn classify_all(html: &str) -> (FormType, BTreeMap<NodeId, InputType>) {
    let doc = parse(html);
    let matchers = Matchers::new().unwrap();
    let form = first(&doc, "form");
    let inputs: BTreeMap<NodeId, InputType> = doc
        .query_tags(form, &["input"])
        .into_iter()
        .map(|el| (el, matchers.classify_input(&doc, el)))
        .collect();
    let submits = doc.query_tags(form, &["button"]);
    (matchers.classify_form(&doc, form, &inputs, &submits), inputs)
}

// ============================================================================
// Input classification
// ============================================================================

#[test]
fn classifies_credential_inputs() {
    let doc = parse(
        r#"<form>
            <input type="email" name="login_email">
            <input name="username">
            <input type="password" name="whatever">
            <input type="text" name="q">
        </form>"#,
    );
    let m = Matchers::new().unwrap();

    assert_eq!(m.classify_input(&doc, find(&doc, "input", "login_email")), InputType::Username);
    assert_eq!(m.classify_input(&doc, find(&doc, "input", "username")), InputType::Username);
    assert_eq!(m.classify_input(&doc, find(&doc, "input", "whatever")), InputType::Password);
    assert_eq!(m.classify_input(&doc, find(&doc, "input", "q")), InputType::Unknown);
}

#[test]
fn classifies_card_inputs() {
    let doc = parse(
        r#"<form>
            <input type="tel" name="cardnumber">
            <input type="text" name="expiry">
            <input type="text" name="cvc">
        </form>"#,
    );
    let m = Matchers::new().unwrap();

    assert_eq!(m.classify_input(&doc, find(&doc, "input", "cardnumber")), InputType::CardNo);
    assert_eq!(m.classify_input(&doc, find(&doc, "input", "expiry")), InputType::Expires);
    assert_eq!(m.classify_input(&doc, find(&doc, "input", "cvc")), InputType::Cvc);
}

#[test]
fn hidden_inputs_win_over_every_rule() {
    let doc = parse(
        r#"<form>
            <input type="hidden" name="username">
            <input type="password" name="pass" hidden>
        </form>"#,
    );
    let m = Matchers::new().unwrap();
    let user = find(&doc, "input", "username");
    let pass = find(&doc, "input", "pass");

    assert!(is_hidden(&doc, user));
    assert!(is_hidden(&doc, pass));
    assert_eq!(m.classify_input(&doc, user), InputType::Hidden);
    assert_eq!(m.classify_input(&doc, pass), InputType::Hidden);
}

#[test]
fn id_is_matched_when_name_is_missing() {
    let doc = parse(r#"<form><input type="email" id="usermail"></form>"#);
    let m = Matchers::new().unwrap();
    let input = first(&doc, "input");
    assert_eq!(m.classify_input(&doc, input), InputType::Username);
}

// ============================================================================
// Form classification
// ============================================================================

#[test]
fn username_and_one_password_is_login() {
    let (form_type, inputs) = classify_all(
        r#"<form id="auth">
            <input name="user"><input type="password" name="pass">
            <button type="submit">Go</button>
        </form>"#,
    );
    assert_eq!(form_type, FormType::Login);
    assert_eq!(inputs.len(), 2);
}

#[test]
fn two_passwords_is_register() {
    let (form_type, _) = classify_all(
        r#"<form id="account">
            <input name="user">
            <input type="password" name="pass1">
            <input type="password" name="pass2">
            <button type="submit">Go</button>
        </form>"#,
    );
    assert_eq!(form_type, FormType::Register);
}

#[test]
fn three_passwords_match_no_rule() {
    let (form_type, _) = classify_all(
        r#"<form id="account">
            <input name="user">
            <input type="password" name="old">
            <input type="password" name="pass1">
            <input type="password" name="pass2">
            <button type="submit">Go</button>
        </form>"#,
    );
    assert_eq!(form_type, FormType::Unknown);
}

#[test]
fn retype_password_is_register() {
    let (form_type, _) = classify_all(
        r#"<form id="account">
            <input name="user">
            <input type="password" name="pass">
            <input type="password" name="confirm_pass">
            <button type="submit">Go</button>
        </form>"#,
    );
    assert_eq!(form_type, FormType::Register);
}

#[test]
fn search_role_is_search() {
    let (form_type, _) = classify_all(
        r#"<form role="search"><input name="user"><button type="submit">Go</button></form>"#,
    );
    assert_eq!(form_type, FormType::Search);
}

#[test]
fn card_fields_make_card_form() {
    let (form_type, _) = classify_all(
        r#"<form id="pay">
            <input type="tel" name="cardnumber">
            <input type="text" name="cvc">
            <button type="submit">Pay</button>
        </form>"#,
    );
    assert_eq!(form_type, FormType::Card);
}

#[test]
fn no_submit_means_unknown() {
    let (form_type, _) = classify_all(
        r#"<form id="auth"><input name="user"><input type="password" name="pass"></form>"#,
    );
    assert_eq!(form_type, FormType::Unknown);
}

#[test]
fn only_hidden_inputs_means_hidden() {
    let (form_type, _) = classify_all(
        r#"<form id="auth"><input type="hidden" name="csrf"><button type="submit">Go</button></form>"#,
    );
    assert_eq!(form_type, FormType::Hidden);
}

#[test]
fn form_name_rules_read_the_opening_tag() {
    let (newsletter, _) = classify_all(
        r#"<form class="newsletter"><input type="email" name="address"><button type="submit">Join</button></form>"#,
    );
    let (signin, _) = classify_all(
        r#"<form action="/signin"><input type="text" name="q"><button type="submit">Go</button></form>"#,
    );
    assert_eq!(newsletter, FormType::NewsLetter);
    assert_eq!(signin, FormType::Login);
}

#[test]
fn name_rules_outrank_earlier_field_rules() {
    let fields = r#"<input name="user"><input type="password" name="pass">
        <button type="submit">Go</button></form>"#;

    let (newsletter, _) = classify_all(&format!(r#"<form id="newsletter-box">{fields}"#));
    let (menu, _) = classify_all(&format!(r#"<form id="navmenu">{fields}"#));
    let (plain, _) = classify_all(&format!(r#"<form id="box">{fields}"#));

    assert_eq!(newsletter, FormType::NewsLetter);
    assert_eq!(menu, FormType::Menu);
    assert_eq!(plain, FormType::Login);
}

#[test]
fn classification_is_stable() {
    let html = r#"<form id="auth">
        <input name="user"><input type="password" name="pass">
        <button type="submit">Go</button>
    </form>"#;
    let (a, inputs_a) = classify_all(html);
    let (b, inputs_b) = classify_all(html);
    assert_eq!(a, b);
    assert_eq!(inputs_a, inputs_b);
}
