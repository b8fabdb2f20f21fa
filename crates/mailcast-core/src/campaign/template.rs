//! Template Renderer - Handles personalization of email content

use mailcast_storage::models::{Contact, TemplateSnapshot};
use regex::Regex;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("valid placeholder pattern"))
}

/// Placeholder names found in `texts`, de-duplicated in first-appearance order
pub fn detect_variables<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut variables: Vec<String> = Vec::new();
    for text in texts {
        for caps in placeholder_regex().captures_iter(text) {
            let name = caps[1].trim();
            if !name.is_empty() && !variables.iter().any(|v| v == name) {
                variables.push(name.to_string());
            }
        }
    }
    variables
}

/// Rendered subject and bodies for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Template renderer for personalizing email content
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Substitute every `{{field}}` with the contact's value.
    ///
    /// Names are case-sensitive; unknown fields become empty strings.
    pub fn render(&self, template: &str, contact: &Contact) -> String {
        placeholder_regex()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                contact.attribute(caps[1].trim()).unwrap_or_default()
            })
            .into_owned()
    }

    /// Render subject, HTML and text bodies of a template
    pub fn render_message(&self, template: &TemplateSnapshot, contact: &Contact) -> RenderedMessage {
        RenderedMessage {
            subject: self.render(&template.subject, contact),
            html_body: self.render(&template.html_body, contact),
            text_body: self.render(&template.text_body, contact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn create_test_contact() -> Contact {
        Contact::new("test@example.com")
            .with_attribute("name", "John Doe")
            .with_attribute("company", "Acme Corp")
    }

    #[test]
    fn test_render_basic_template() {
        let renderer = TemplateRenderer::new();
        let contact = create_test_contact();

        let result = renderer.render("Hello {{name}}, your email is {{ email }}", &contact);
        assert_eq!(result, "Hello John Doe, your email is test@example.com");
    }

    #[test]
    fn test_render_replaces_all_occurrences() {
        let renderer = TemplateRenderer::new();
        let contact = create_test_contact();

        let result = renderer.render("{{company}} / {{company}}", &contact);
        assert_eq!(result, "Acme Corp / Acme Corp");
    }

    #[test]
    fn test_render_removes_unused() {
        let renderer = TemplateRenderer::new();
        let contact = create_test_contact();

        let result = renderer.render("Hello {{name}}, {{unknown_var}} test {{Name}}", &contact);
        assert_eq!(result, "Hello John Doe,  test ");
        assert!(!result.contains("{{"));
    }

    #[test]
    fn test_render_message() {
        let renderer = TemplateRenderer::new();
        let template = TemplateSnapshot {
            name: "welcome".into(),
            subject: "Hi {{name}}".into(),
            html_body: "<p>{{company}}</p>".into(),
            text_body: "{{company}}".into(),
            variables: vec![],
        };

        let rendered = renderer.render_message(&template, &create_test_contact());
        assert_eq!(rendered.subject, "Hi John Doe");
        assert_eq!(rendered.html_body, "<p>Acme Corp</p>");
        assert_eq!(rendered.text_body, "Acme Corp");
    }

    #[test]
    fn test_detect_variables() {
        let variables = detect_variables([
            "Hi {{name}}",
            "<p>{{ company }} {{name}}</p>",
            "{{first}} {{company}}",
        ]);
        assert_eq!(variables, vec!["name", "company", "first"]);
    }
}
