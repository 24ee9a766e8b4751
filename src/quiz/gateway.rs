use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Datelike, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::answer::{AnswerMap, AnswerValue, ContactFormData};
use super::catalog::{Catalog, Question, QuestionKind};
use super::mailer::{MailError, Mailer, OutboundEmail};
use super::rate_limit::SlidingWindowLimiter;

/// Client-correctable problems with a submitted answer map. Display text is
/// the user-facing copy returned by the endpoint.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Les informations de contact sont incomplètes.")]
    IncompleteContact,
    #[error("L'adresse email est invalide.")]
    InvalidEmail,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Trop de requêtes. Veuillez réessayer dans une minute.")]
    RateLimited,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Une erreur est survenue lors de l'envoi de votre demande.")]
    Dispatch(#[source] MailError),
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        let status = match self {
            SubmissionError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            SubmissionError::Validation(_) => StatusCode::BAD_REQUEST,
            SubmissionError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// The I/O boundary for finished quiz runs: enforces the per-client rate
/// limit, validates the mandatory contact fields, and dispatches the agency
/// summary plus the submitter confirmation. Stateless per request apart from
/// the rate-limit ledger.
pub struct SubmissionGateway<M> {
    catalog: Arc<Catalog>,
    mailer: Arc<M>,
    limiter: SlidingWindowLimiter,
    agency_email: String,
    brand_name: String,
}

impl<M: Mailer> SubmissionGateway<M> {
    pub fn new(
        catalog: Arc<Catalog>,
        mailer: Arc<M>,
        limiter: SlidingWindowLimiter,
        agency_email: impl Into<String>,
        brand_name: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            mailer,
            limiter,
            agency_email: agency_email.into(),
            brand_name: brand_name.into(),
        }
    }

    pub fn check_rate_limit(&self, client_key: &str) -> bool {
        self.limiter.check(client_key)
    }

    /// Check the mandatory contact fields of an answer map. Returns the
    /// contact data on success so callers need not look it up again.
    pub fn validate_submission<'a>(
        &self,
        answers: &'a AnswerMap,
    ) -> Result<&'a ContactFormData, ValidationError> {
        let contact = self
            .catalog
            .questions()
            .iter()
            .find(|question| question.kind == QuestionKind::Contact)
            .and_then(|question| answers.get(&question.id))
            .and_then(AnswerValue::as_contact)
            .ok_or(ValidationError::IncompleteContact)?;

        for id in ["firstName", "lastName", "email"] {
            if !contact.field_is_filled(id) {
                return Err(ValidationError::IncompleteContact);
            }
        }

        let email = contact.email.as_deref().unwrap_or_default();
        if !is_valid_email(email) {
            return Err(ValidationError::InvalidEmail);
        }

        Ok(contact)
    }

    /// Full submission pipeline: rate limit, validation, then dispatch.
    pub async fn submit(
        &self,
        client_key: &str,
        answers: &AnswerMap,
    ) -> Result<(), SubmissionError> {
        if !self.check_rate_limit(client_key) {
            warn!(client = client_key, "lead submission rate-limited");
            return Err(SubmissionError::RateLimited);
        }

        let contact = self.validate_submission(answers)?;
        self.dispatch(answers, contact)
            .await
            .map_err(SubmissionError::Dispatch)
    }

    /// Send both notifications. Atomic from the caller's perspective: either
    /// failure fails the whole operation and the caller cannot tell which of
    /// the two messages failed.
    pub async fn dispatch(
        &self,
        answers: &AnswerMap,
        contact: &ContactFormData,
    ) -> Result<(), MailError> {
        let first_name = contact.field("firstName").unwrap_or_default();
        let last_name = contact.field("lastName").unwrap_or_default();
        let submitter = contact.field("email").unwrap_or_default();

        self.mailer
            .send(OutboundEmail {
                to: self.agency_email.clone(),
                subject: format!("🚀 Nouvelle demande de {first_name} {last_name}"),
                html_body: self.agency_summary(answers),
            })
            .await?;

        self.mailer
            .send(OutboundEmail {
                to: submitter.to_string(),
                subject: format!("Votre demande a bien été reçue - {}", self.brand_name),
                html_body: self.confirmation_body(contact),
            })
            .await?;

        info!(submitter, "lead notifications dispatched");
        Ok(())
    }

    /// One block per answered visible question, in catalog order, with option
    /// values resolved to their labels. Answers stranded by an abandoned
    /// branch are excluded even if a client sends them anyway.
    fn agency_summary(&self, answers: &AnswerMap) -> String {
        let mut body = String::from("<h1>Nouvelle demande de devis</h1>\n");

        for question in self.catalog.visible_questions(answers) {
            let Some(answer) = answers.get(&question.id) else {
                continue;
            };
            body.push_str(&format!("<h3>{}</h3>\n", question.title));
            body.push_str(&self.render_answer(question, answer));
        }

        body.push_str("<p>Email envoyé automatiquement depuis le formulaire de qualification.</p>\n");
        body
    }

    fn render_answer(&self, question: &Question, answer: &AnswerValue) -> String {
        match answer {
            AnswerValue::Contact(contact) => {
                let mut block = String::from("<table>\n");
                for field in &question.fields {
                    let value = contact.field(&field.id).unwrap_or("-");
                    block.push_str(&format!(
                        "<tr><td>{}:</td><td>{}</td></tr>\n",
                        field.label, value
                    ));
                }
                block.push_str("</table>\n");
                block
            }
            AnswerValue::Selections(values) => {
                let labels: Vec<&str> = values
                    .iter()
                    .map(|value| self.catalog.option_label(&question.id, value))
                    .collect();
                format!("<p>{}</p>\n", labels.join(", "))
            }
            AnswerValue::Text(value) => {
                format!("<p>{}</p>\n", self.catalog.option_label(&question.id, value))
            }
            AnswerValue::Number(value) => format!("<p>{}</p>\n", format_number(*value)),
        }
    }

    fn confirmation_body(&self, contact: &ContactFormData) -> String {
        let first_name = contact.field("firstName").unwrap_or_default();
        format!(
            "<h1>Merci {first_name} !</h1>\n\
             <p>Nous avons bien reçu votre demande de devis et nous vous en remercions !</p>\n\
             <p>Notre équipe analyse votre projet et vous recontacte sous 24 heures.</p>\n\
             <p>À très bientôt,<br><strong>L'équipe {brand}</strong></p>\n\
             <p>© {year} {brand} - Tous droits réservés</p>\n",
            brand = self.brand_name,
            year = Utc::now().year(),
        )
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Structural `local@domain.tld` check, equivalent to the classic
/// `^[^\s@]+@[^\s@]+\.[^\s@]+$` shape: no whitespace, exactly one `@`, and a
/// dot with something on both sides in the domain.
fn is_valid_email(raw: &str) -> bool {
    if raw.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::mailer::MemoryMailer;
    use std::time::Duration;

    fn limiter() -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(Duration::from_secs(60), 3, 100)
    }

    fn gateway(mailer: Arc<MemoryMailer>) -> SubmissionGateway<MemoryMailer> {
        SubmissionGateway::new(
            Arc::new(Catalog::branching()),
            mailer,
            limiter(),
            "contact@agency.test",
            "CF Evolution",
        )
    }

    fn contact(first: &str, last: &str, email: &str) -> ContactFormData {
        ContactFormData {
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            email: Some(email.to_string()),
            ..ContactFormData::default()
        }
    }

    fn answers_with_contact(contact_data: ContactFormData) -> AnswerMap {
        let mut answers = AnswerMap::new();
        answers.insert("service".to_string(), AnswerValue::from("website"));
        answers.insert("budget".to_string(), AnswerValue::from("small"));
        answers.insert(
            "contact".to_string(),
            AnswerValue::Contact(contact_data),
        );
        answers
    }

    #[test]
    fn email_shape_check_matches_the_classic_pattern() {
        assert!(is_valid_email("jo@x.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));

        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("jo@x"));
        assert!(!is_valid_email("jo@.com"));
        assert!(!is_valid_email("jo@x."));
        assert!(!is_valid_email("jo o@x.com"));
        assert!(!is_valid_email("jo@@x.com"));
    }

    #[test]
    fn missing_mandatory_contact_fields_fail_validation() {
        let gateway = gateway(Arc::new(MemoryMailer::new()));

        let answers = answers_with_contact(contact("", "Durand", "jo@x.com"));
        assert_eq!(
            gateway.validate_submission(&answers),
            Err(ValidationError::IncompleteContact)
        );

        let mut no_contact = AnswerMap::new();
        no_contact.insert("service".to_string(), AnswerValue::from("website"));
        assert_eq!(
            gateway.validate_submission(&no_contact),
            Err(ValidationError::IncompleteContact)
        );
    }

    #[test]
    fn malformed_email_fails_even_with_complete_fields() {
        let gateway = gateway(Arc::new(MemoryMailer::new()));
        let answers = answers_with_contact(contact("Jo", "Durand", "not-an-email"));
        assert_eq!(
            gateway.validate_submission(&answers),
            Err(ValidationError::InvalidEmail)
        );
    }

    #[tokio::test]
    async fn successful_submission_sends_agency_then_confirmation() {
        let mailer = Arc::new(MemoryMailer::new());
        let gateway = gateway(mailer.clone());
        let answers = answers_with_contact(contact("Jo", "Durand", "jo@x.com"));

        gateway.submit("10.0.0.1", &answers).await.expect("submits");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "contact@agency.test");
        assert!(sent[0].subject.contains("Jo Durand"));
        assert_eq!(sent[1].to, "jo@x.com");
        assert!(sent[1].subject.contains("CF Evolution"));
        assert!(sent[1].html_body.contains("Merci Jo"));
    }

    #[tokio::test]
    async fn agency_summary_resolves_labels_and_skips_hidden_answers() {
        let mailer = Arc::new(MemoryMailer::new());
        let gateway = gateway(mailer.clone());

        let mut answers = answers_with_contact(contact("Jo", "Durand", "jo@x.com"));
        // service=design hides site-pages; a stale answer for it must not
        // appear in the agency summary.
        answers.insert("service".to_string(), AnswerValue::from("design"));
        answers.insert("site-pages".to_string(), AnswerValue::Number(12.0));

        gateway.submit("10.0.0.2", &answers).await.expect("submits");

        let summary = &mailer.sent()[0].html_body;
        assert!(summary.contains("Design & Identité"));
        assert!(summary.contains("Moins de 1 500€"), "budget label resolved");
        assert!(!summary.contains("Combien de pages"), "hidden question skipped");
        assert!(summary.contains("Prénom:</td><td>Jo"));
    }

    #[tokio::test]
    async fn dispatch_failure_surfaces_as_a_single_opaque_error() {
        let mailer = Arc::new(MemoryMailer::failing());
        let gateway = gateway(mailer.clone());
        let answers = answers_with_contact(contact("Jo", "Durand", "jo@x.com"));

        let err = gateway
            .submit("10.0.0.3", &answers)
            .await
            .expect_err("dispatch must fail");
        assert!(matches!(err, SubmissionError::Dispatch(_)));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn fourth_submission_from_one_client_is_rate_limited() {
        let mailer = Arc::new(MemoryMailer::new());
        let gateway = gateway(mailer.clone());
        let answers = answers_with_contact(contact("Jo", "Durand", "jo@x.com"));

        for _ in 0..3 {
            gateway.submit("10.9.9.9", &answers).await.expect("allowed");
        }
        let err = gateway
            .submit("10.9.9.9", &answers)
            .await
            .expect_err("fourth call rejected");
        assert!(matches!(err, SubmissionError::RateLimited));
        assert_eq!(mailer.sent().len(), 6);
    }

    #[test]
    fn numbers_render_without_a_trailing_fraction() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(2.5), "2.5");
    }
}
