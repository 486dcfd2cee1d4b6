use crate::forms::form_model::ContainerKind;
use crate::report::report_model::ScanReport;

// ============================================================================
// Console reporter: scan results for the terminal
// ============================================================================

/// Format a scan report for terminal output.
///
/// Produces output like:
/// ```text
/// === Scan: https://example.com/login ===
///
/// [login]  <form id="signin"> (form, 2 inputs, 1 submit)
///     username  user
///     password  pass
///
/// === 1 form, 1 fillable ===
/// ```
pub fn format_console_report(report: &ScanReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== Scan: {} ===\n", report.url));
    if !report.title.is_empty() {
        out.push_str(&format!("Title: {}\n", report.title));
    }
    out.push('\n');

    for form in &report.forms {
        let kind = match form.kind {
            ContainerKind::Form => "form",
            ContainerKind::Pseudo => "pseudo-form",
        };
        out.push_str(&format!(
            "[{}]  {} ({}, {} inputs, {} submit{})\n",
            form.form_type.as_str(),
            form.tag,
            kind,
            form.inputs.len(),
            form.submits.len(),
            if form.submits.len() == 1 { "" } else { "s" }
        ));
        for input in &form.inputs {
            out.push_str(&format!(
                "    {:<9} {}\n",
                input.input_type.as_str(),
                input.name.as_deref().unwrap_or("-")
            ));
        }
    }

    out.push_str(&format!(
        "\n=== {} form{}, {} fillable ===\n",
        report.forms.len(),
        if report.forms.len() == 1 { "" } else { "s" },
        report.fillable()
    ));

    out
}
