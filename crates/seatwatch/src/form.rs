//! HTML form model: the controls a browser would submit, plus the unchecked
//! checkboxes that can still be ticked.
//!
//! Used for the enrollment form (course checkboxes) and by the portal client
//! for the login form.

use crate::markup::MarkupNode;
use crate::types::{TrackerError, TrackerResult};

/// The live enrollment form on the enrollment page.
pub const ENROLLMENT_FORM: &str = "form#frmEnrolment";

/// Form field name for a course selection key.
pub fn course_field_name(selection_key: &str) -> String {
    format!("form[courses][{selection_key}]")
}

/// A form read out of a document, ready to be filled in and submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlForm {
    action: Option<String>,
    method: String,
    fields: Vec<(String, String)>,
    unchecked: Vec<(String, String)>,
}

impl HtmlForm {
    /// Locate the form matching `selector` and read its controls.
    pub fn locate<N: MarkupNode>(document: &N, selector: &str) -> TrackerResult<Self> {
        document
            .find_first(selector)
            .map(|form| Self::from_element(&form))
            .ok_or_else(|| TrackerError::Structure(format!("missing form '{selector}'")))
    }

    /// The enrollment form.
    pub fn enrollment<N: MarkupNode>(document: &N) -> TrackerResult<Self> {
        Self::locate(document, ENROLLMENT_FORM)
    }

    /// Read a `<form>` element.
    pub fn from_element<N: MarkupNode>(form: &N) -> Self {
        let action = form
            .attr("action")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from);
        let method = form.attr("method").unwrap_or("POST").trim().to_uppercase();

        let mut fields = Vec::new();
        let mut unchecked = Vec::new();
        let mut submit_taken = false;

        for control in form.find_all("input, select, textarea, button") {
            let Some(name) = control.attr("name").filter(|n| !n.is_empty()) else {
                continue;
            };
            if control.has_attr("disabled") {
                continue;
            }
            let name = name.to_string();

            match control.tag_name() {
                "select" => {
                    let option = control
                        .find_first("option[selected]")
                        .or_else(|| control.find_first("option"));
                    if let Some(option) = option {
                        let value = option
                            .attr("value")
                            .map(String::from)
                            .unwrap_or_else(|| option.text().trim().to_string());
                        fields.push((name, value));
                    }
                }
                "textarea" => fields.push((name, control.text())),
                "button" => {
                    let kind = control.attr("type").unwrap_or("submit").to_ascii_lowercase();
                    if kind == "submit" && !submit_taken {
                        submit_taken = true;
                        fields.push((name, control.attr("value").unwrap_or("").to_string()));
                    }
                }
                _ => {
                    let kind = control.attr("type").unwrap_or("text").to_ascii_lowercase();
                    let value = control.attr("value");
                    match kind.as_str() {
                        "checkbox" | "radio" => {
                            let value = value.unwrap_or("on").to_string();
                            if control.has_attr("checked") {
                                fields.push((name, value));
                            } else if kind == "checkbox" {
                                unchecked.push((name, value));
                            }
                        }
                        "submit" => {
                            if !submit_taken {
                                submit_taken = true;
                                fields.push((name, value.unwrap_or("").to_string()));
                            }
                        }
                        "button" | "reset" | "image" | "file" => {}
                        _ => fields.push((name, value.unwrap_or("").to_string())),
                    }
                }
            }
        }

        Self {
            action,
            method,
            fields,
            unchecked,
        }
    }

    /// The raw `action` attribute, if any.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Upper-case HTTP method, `POST` when unspecified.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Name/value pairs to submit, in document order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// First value submitted under `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a text-like field, replacing any existing value.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    /// Tick a checkbox. Fails when the form has no checkbox with that name.
    pub fn check(&mut self, name: &str) -> TrackerResult<()> {
        if self.value(name).is_some() {
            return Ok(());
        }
        let pos = self
            .unchecked
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| TrackerError::Structure(format!("no checkbox named '{name}' on form")))?;
        let field = self.unchecked.remove(pos);
        self.fields.push(field);
        Ok(())
    }

    /// Mark a course selection (`<code>-SEM<n>`) as chosen.
    pub fn mark(&mut self, selection_key: &str) -> TrackerResult<()> {
        self.check(&course_field_name(selection_key))
    }

    /// Whether a course selection is currently marked.
    pub fn is_marked(&self, selection_key: &str) -> bool {
        self.value(&course_field_name(selection_key)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::HtmlDocument;

    const ENROLMENT: &str = r#"
        <html><body>
        <form id="frmEnrolment" action="/enrolment/submit" method="post">
            <input type="hidden" name="form[_token]" value="csrf123" />
            <input type="checkbox" name="form[courses][COSC2657-SEM2]" value="1" />
            <input type="checkbox" name="form[courses][MATH2081-SEM1]" value="1" checked="checked" />
            <input type="checkbox" name="form[courses][ISYS2077-SEM3]" value="1" disabled />
            <select name="form[campus]"><option value="SGS">Saigon</option><option value="HN" selected>Hanoi</option></select>
            <textarea name="form[note]">hello</textarea>
            <button type="submit" name="form[save]" value="go">Save</button>
            <input type="submit" name="other" value="ignored" />
        </form>
        </body></html>
    "#;

    #[test]
    fn test_reads_successful_controls() {
        let doc = HtmlDocument::parse(ENROLMENT);
        let form = HtmlForm::enrollment(&doc.root()).unwrap();

        assert_eq!(form.action(), Some("/enrolment/submit"));
        assert_eq!(form.method(), "POST");
        assert_eq!(form.value("form[_token]"), Some("csrf123"));
        assert_eq!(form.value("form[campus]"), Some("HN"));
        assert_eq!(form.value("form[note]"), Some("hello"));
        assert_eq!(form.value("form[save]"), Some("go"));
        assert_eq!(form.value("other"), None);
        assert!(form.is_marked("MATH2081-SEM1"));
        assert!(!form.is_marked("COSC2657-SEM2"));
    }

    #[test]
    fn test_mark_course() {
        let doc = HtmlDocument::parse(ENROLMENT);
        let mut form = HtmlForm::enrollment(&doc.root()).unwrap();

        form.mark("COSC2657-SEM2").unwrap();
        assert_eq!(form.value("form[courses][COSC2657-SEM2]"), Some("1"));

        // Marking twice is harmless.
        form.mark("COSC2657-SEM2").unwrap();
        let count = form
            .fields()
            .iter()
            .filter(|(n, _)| n == "form[courses][COSC2657-SEM2]")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_mark_unknown_or_disabled_fails() {
        let doc = HtmlDocument::parse(ENROLMENT);
        let mut form = HtmlForm::enrollment(&doc.root()).unwrap();
        assert!(matches!(form.mark("EEET2574-SEM1"), Err(TrackerError::Structure(_))));
        assert!(form.mark("ISYS2077-SEM3").is_err());
    }

    #[test]
    fn test_set_replaces_value() {
        let html = r#"<form class="form-horizontal" action="/login_check">
            <input name="_username" /><input type="password" name="_password" />
            <input type="hidden" name="_csrf_token" value="t" /></form>"#;
        let doc = HtmlDocument::parse(html);
        let mut form = HtmlForm::locate(&doc.root(), "form.form-horizontal").unwrap();
        form.set("_username", "s1234567");
        form.set("_password", "hunter2");
        assert_eq!(form.value("_username"), Some("s1234567"));
        assert_eq!(form.fields().len(), 3);
    }

    #[test]
    fn test_missing_form_is_structural() {
        let doc = HtmlDocument::parse("<html><body></body></html>");
        assert!(matches!(
            HtmlForm::enrollment(&doc.root()),
            Err(TrackerError::Structure(_))
        ));
    }
}
