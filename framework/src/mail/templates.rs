//! Named body templates.

use std::path::Path;

use minijinja::{path_loader, Environment, ErrorKind};
use serde::Serialize;

use super::{EmailBody, MailError};

const HTML_SUFFIX: &str = "html";
const TEXT_SUFFIX: &str = "txt";

/// Registry of named mail templates.
///
/// A template name maps to up to two files: `<name>.html` and `<name>.txt`.
/// HTML templates are auto-escaped.
#[derive(Clone, Default)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// An empty registry. Add templates with [`Templates::add`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Load templates lazily from `dir`, e.g. `dir/confirmation-email.html`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(dir.as_ref().to_path_buf()));
        Self { env }
    }

    /// Register a template source under a file name such as `welcome.html`.
    pub fn add(
        &mut self,
        file_name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), MailError> {
        self.env
            .add_template_owned(file_name.into(), source.into())
            .map_err(MailError::Template)
    }

    /// Render template `name` against `ctx`.
    ///
    /// Fails with [`MailError::TemplateNotFound`] when neither the HTML nor
    /// the text variant exists.
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<EmailBody, MailError> {
        let ctx = minijinja::Value::from_serialize(&ctx);
        let html = self.render_part(&format!("{name}.{HTML_SUFFIX}"), &ctx)?;
        let text = self.render_part(&format!("{name}.{TEXT_SUFFIX}"), &ctx)?;

        match (text, html) {
            (Some(text), Some(html)) => Ok(EmailBody::Multipart { text, html }),
            (Some(text), None) => Ok(EmailBody::Text(text)),
            (None, Some(html)) => Ok(EmailBody::Html(html)),
            (None, None) => Err(MailError::TemplateNotFound(name.to_string())),
        }
    }

    fn render_part(
        &self,
        file_name: &str,
        ctx: &minijinja::Value,
    ) -> Result<Option<String>, MailError> {
        let template = match self.env.get_template(file_name) {
            Ok(template) => template,
            Err(e) if e.kind() == ErrorKind::TemplateNotFound => return Ok(None),
            Err(e) => return Err(MailError::Template(e)),
        };

        template.render(ctx).map(Some).map_err(MailError::Template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn renders_multipart_when_both_variants_exist() {
        let mut templates = Templates::new();
        templates.add("welcome.html", "<p>Hi {{ name }}</p>").unwrap();
        templates.add("welcome.txt", "Hi {{ name }}").unwrap();

        let body = templates.render("welcome", context! { name => "Ada" }).unwrap();

        assert_eq!(
            body,
            EmailBody::Multipart {
                text: "Hi Ada".into(),
                html: "<p>Hi Ada</p>".into(),
            }
        );
    }

    #[test]
    fn renders_single_variant() {
        let mut templates = Templates::new();
        templates.add("reset.txt", "Code: {{ code }}").unwrap();

        let body = templates.render("reset", context! { code => 1234 }).unwrap();
        assert_eq!(body, EmailBody::Text("Code: 1234".into()));
    }

    #[test]
    fn html_variant_is_escaped() {
        let mut templates = Templates::new();
        templates.add("note.html", "<p>{{ message }}</p>").unwrap();

        let body = templates
            .render("note", context! { message => "<script>" })
            .unwrap();
        assert_eq!(body, EmailBody::Html("<p>&lt;script&gt;</p>".into()));
    }

    #[test]
    fn missing_template_is_reported_by_name() {
        let templates = Templates::new();
        let err = templates.render("nope", context! {}).unwrap_err();
        assert!(matches!(err, MailError::TemplateNotFound(name) if name == "nope"));
    }

    #[test]
    fn render_errors_are_not_reported_as_missing() {
        let mut templates = Templates::new();
        templates.add("broken.txt", "{{ no_such_function() }}").unwrap();

        let err = templates.render("broken", context! {}).unwrap_err();
        assert!(matches!(err, MailError::Template(_)));
    }

    #[test]
    fn loads_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("invoice.txt"), "Total: {{ total }}").unwrap();

        let templates = Templates::from_dir(dir.path());
        let body = templates.render("invoice", context! { total => 42 }).unwrap();

        assert_eq!(body, EmailBody::Text("Total: 42".into()));
    }
}
