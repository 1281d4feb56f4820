use chrono::{Datelike, Utc};
use minijinja::{Environment, context, default_auto_escape_callback};

use crate::models::CvStatus;

pub const APPROVED_SUBJECT: &str = "🎉 O teu currículo foi aprovado!";
pub const REJECTED_SUBJECT: &str = "Resultado da validação do teu currículo";

/// A rendered review email.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: &'static str,
    pub html: String,
    pub text: String,
}

const APPROVED_TEMPLATE: (&str, &str) = (
    "email/cv_aprovado.html",
    include_str!("../../templates/email/cv_aprovado.html"),
);
const REJECTED_TEMPLATE: (&str, &str) = (
    "email/cv_rejeitado.html",
    include_str!("../../templates/email/cv_rejeitado.html"),
);

/// EmailTemplates
///
/// minijinja environment over the templates compiled into the binary. `.html`
/// templates are auto-escaped, so names and feedback are safe to interpolate.
pub struct EmailTemplates {
    env: Environment<'static>,
}

impl Default for EmailTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailTemplates {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(default_auto_escape_callback);
        Self { env }
    }

    /// Subject for a review outcome; `None` for statuses that are never notified.
    pub fn subject(status: CvStatus) -> Option<&'static str> {
        match status {
            CvStatus::Approved => Some(APPROVED_SUBJECT),
            CvStatus::Rejected => Some(REJECTED_SUBJECT),
            CvStatus::Pending => None,
        }
    }

    pub fn render(
        &self,
        status: CvStatus,
        student_name: &str,
        feedback: &str,
        site_url: &str,
    ) -> Result<RenderedEmail, minijinja::Error> {
        let ((name, source), subject) = match status {
            CvStatus::Approved => (APPROVED_TEMPLATE, APPROVED_SUBJECT),
            CvStatus::Rejected => (REJECTED_TEMPLATE, REJECTED_SUBJECT),
            CvStatus::Pending => {
                return Err(minijinja::Error::new(
                    minijinja::ErrorKind::TemplateNotFound,
                    "no email template for pending CVs",
                ));
            }
        };

        let html = self.env.template_from_named_str(name, source)?.render(context! {
            nome_estudante => student_name,
            feedback => feedback,
            site_url => site_url,
            ano_atual => Utc::now().year(),
        })?;
        let text = strip_tags(&html);

        Ok(RenderedEmail {
            subject,
            html,
            text,
        })
    }
}

/// Plain-text alternative: markup removed, blank lines collapsed.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut in_head = false;

    for (i, c) in html.char_indices() {
        match c {
            '<' => {
                in_tag = true;
                let rest = &html[i..];
                if starts_with_ignore_case(rest, "<head") {
                    in_head = true;
                } else if starts_with_ignore_case(rest, "</head") {
                    in_head = false;
                }
            }
            '>' if in_tag => in_tag = false,
            _ if in_tag || in_head => {}
            _ => text.push(c),
        }
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_email_escapes_feedback() {
        let templates = EmailTemplates::new();
        let email = templates
            .render(
                CvStatus::Rejected,
                "Ana",
                "<script>x</script> falta experiência",
                "http://localhost:3000",
            )
            .unwrap();

        assert_eq!(email.subject, REJECTED_SUBJECT);
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(email.text.contains("falta experiência"));
        assert!(email.text.contains("Olá, Ana"));
    }

    #[test]
    fn approval_email_mentions_student_and_year() {
        let templates = EmailTemplates::new();
        let email = templates
            .render(CvStatus::Approved, "Rui", "", "https://hub.example")
            .unwrap();

        assert_eq!(email.subject, APPROVED_SUBJECT);
        assert!(email.html.contains("Parabéns, Rui!"));
        assert!(email.html.contains("https://hub.example"));
        assert!(email.text.contains(&Utc::now().year().to_string()));
        assert!(!email.text.contains('<'));
    }

    #[test]
    fn pending_has_no_template() {
        assert!(EmailTemplates::subject(CvStatus::Pending).is_none());
        assert!(
            EmailTemplates::new()
                .render(CvStatus::Pending, "x", "", "")
                .is_err()
        );
    }
}
