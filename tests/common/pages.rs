use vault_autofill::dom::dom_model::{Document, NodeId};
use vault_autofill::dom::parser::parse_html;

pub const LOGIN_URL: &str = "https://www.example.com/login?next=1";

pub const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Example login</title></head>
<body>
  <form id="auth" method="post">
    <input name="user">
    <input type="password" name="pass">
    <button type="submit">Log in</button>
  </form>
  <a href="/help">Help</a>
</body>
</html>"#;

/// Loose inputs sharing one ancestor, no `<form>`.
pub const PSEUDO_LOGIN_PAGE: &str = r#"<html>
<head><title>Widget login</title></head>
<body>
  <div id="box">
    <div><input name="user"></div>
    <div><input type="password" name="pass"></div>
    <div><button type="submit">Sign in</button></div>
  </div>
</body>
</html>"#;

pub const SEARCH_PAGE: &str = r#"<html>
<head><title>Search</title></head>
<body>
  <form role="search" action="/find">
    <input type="search" name="q">
    <button type="submit">Go</button>
  </form>
</body>
</html>"#;

pub fn parse(html: &str) -> Document {
    parse_html(html, LOGIN_URL).unwrap()
}

pub fn login_page() -> Document {
    parse(LOGIN_PAGE)
}

/// First element with `tag` whose `name` or `id` attribute equals `key`.
pub fn find(doc: &Document, tag: &str, key: &str) -> NodeId {
    doc.query_tags(NodeId::ROOT, &[tag])
        .into_iter()
        .find(|&n| doc.attr(n, "name") == Some(key) || doc.attr(n, "id") == Some(key))
        .unwrap_or_else(|| panic!("no <{}> named {}", tag, key))
}

pub fn first(doc: &Document, tag: &str) -> NodeId {
    doc.query_tags(NodeId::ROOT, &[tag])[0]
}

/// Build `<form id=..>` with a username, a password and a submit button,
/// detached from the document.
pub fn build_login_form(doc: &mut Document, id: &str) -> NodeId {
    let form = doc.create_element("form", &[("id", id)]);
    let user = doc.create_element("input", &[("type", "email"), ("name", "email")]);
    let pass = doc.create_element("input", &[("type", "password"), ("name", "password")]);
    let button = doc.create_element("button", &[("type", "submit")]);
    let label = doc.create_text("Sign in");
    doc.append_child(button, label);
    doc.append_child(form, user);
    doc.append_child(form, pass);
    doc.append_child(form, button);
    form
}
