use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::answer::{AnswerMap, AnswerValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    Range,
    Contact,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Email,
    Tel,
    Textarea,
}

/// One selectable option of a choice question. `value` is what gets stored
/// in the answer map; `label` is what humans (and the agency email) see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
    pub value: String,
}

/// One sub-field of the contact step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactField {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// Numeric bounds for a `range` question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeConfig {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// "Show this question if question `question_id`'s answer is among `values`."
/// A question with several clauses is visible when at least one is satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyClause {
    pub question_id: String,
    pub values: Vec<String>,
}

impl DependencyClause {
    fn is_satisfied(&self, answers: &AnswerMap) -> bool {
        match answers.get(&self.question_id) {
            Some(AnswerValue::Text(value)) => self.values.iter().any(|v| v == value),
            Some(AnswerValue::Selections(selected)) => {
                selected.iter().any(|item| self.values.contains(item))
            }
            Some(AnswerValue::Number(value)) => self
                .values
                .iter()
                .any(|v| v.parse::<f64>().is_ok_and(|parsed| parsed == *value)),
            Some(AnswerValue::Contact(_)) | None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub kind: QuestionKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ContactField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependencyClause>,
}

impl Question {
    /// Visible when no clause exists, or when at least one clause matches.
    pub fn is_visible(&self, answers: &AnswerMap) -> bool {
        self.depends_on.is_empty()
            || self
                .depends_on
                .iter()
                .any(|clause| clause.is_satisfied(answers))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate question id '{0}'")]
    DuplicateQuestionId(String),
    #[error("question '{question}' depends on '{references}', which does not appear earlier in the catalog")]
    InvalidDependency { question: String, references: String },
    #[error("choice question '{0}' has no options")]
    MissingOptions(String),
    #[error("contact question '{0}' has no fields")]
    MissingFields(String),
    #[error("range question '{0}' has no range bounds")]
    MissingRange(String),
    #[error("range question '{0}' has malformed bounds (need min < max and step > 0)")]
    InvalidRange(String),
}

/// The ordered, read-only question definitions. Insertion order is the
/// canonical traversal order; invariants are checked once at construction so
/// visibility stays decidable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<Question>", into = "Vec<Question>")]
pub struct Catalog {
    questions: Vec<Question>,
}

impl TryFrom<Vec<Question>> for Catalog {
    type Error = CatalogError;

    fn try_from(questions: Vec<Question>) -> Result<Self, Self::Error> {
        Self::new(questions)
    }
}

impl From<Catalog> for Vec<Question> {
    fn from(catalog: Catalog) -> Self {
        catalog.questions
    }
}

impl Catalog {
    pub fn new(questions: Vec<Question>) -> Result<Self, CatalogError> {
        let mut seen: HashSet<&str> = HashSet::new();

        for question in &questions {
            for clause in &question.depends_on {
                // Forward-only references keep visibility acyclic.
                if !seen.contains(clause.question_id.as_str()) {
                    return Err(CatalogError::InvalidDependency {
                        question: question.id.clone(),
                        references: clause.question_id.clone(),
                    });
                }
            }

            if !seen.insert(&question.id) {
                return Err(CatalogError::DuplicateQuestionId(question.id.clone()));
            }

            match question.kind {
                QuestionKind::SingleChoice | QuestionKind::MultipleChoice
                    if question.options.is_empty() =>
                {
                    return Err(CatalogError::MissingOptions(question.id.clone()));
                }
                QuestionKind::Contact if question.fields.is_empty() => {
                    return Err(CatalogError::MissingFields(question.id.clone()));
                }
                QuestionKind::Range => match question.range {
                    None => return Err(CatalogError::MissingRange(question.id.clone())),
                    Some(range) if range.min >= range.max || range.step <= 0.0 => {
                        return Err(CatalogError::InvalidRange(question.id.clone()));
                    }
                    Some(_) => {}
                },
                _ => {}
            }
        }

        Ok(Self { questions })
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }

    /// The subsequence of the catalog whose dependency clauses are satisfied
    /// by `answers`, in catalog order. Recomputed on every call; it is a pure
    /// function of `(catalog, answers)` and must never be cached against a
    /// stale answer map.
    pub fn visible_questions<'a>(&'a self, answers: &AnswerMap) -> Vec<&'a Question> {
        self.questions
            .iter()
            .filter(|question| question.is_visible(answers))
            .collect()
    }

    /// Resolve a stored option value to its display label, falling back to
    /// the raw value for free-text answers.
    pub fn option_label<'a>(&'a self, question_id: &str, value: &'a str) -> &'a str {
        self.question(question_id)
            .and_then(|question| {
                question
                    .options
                    .iter()
                    .find(|option| option.value == value)
                    .map(|option| option.label.as_str())
            })
            .unwrap_or(value)
    }

    /// The flat five-step production catalog: no branching, every visitor
    /// sees every question.
    pub fn standard() -> Self {
        Self::new(standard_questions()).expect("built-in catalog satisfies catalog invariants")
    }

    /// The branching catalog: the general case, with follow-up questions
    /// revealed by earlier answers and a numeric range step.
    pub fn branching() -> Self {
        Self::new(branching_questions()).expect("built-in catalog satisfies catalog invariants")
    }
}

fn choice(id: &str, label: &str, value: &str) -> QuestionOption {
    QuestionOption {
        id: id.to_string(),
        label: label.to_string(),
        value: value.to_string(),
    }
}

fn contact_field(id: &str, label: &str, kind: FieldKind, required: bool) -> ContactField {
    ContactField {
        id: id.to_string(),
        label: label.to_string(),
        kind,
        required,
    }
}

fn shows_when(question_id: &str, values: &[&str]) -> DependencyClause {
    DependencyClause {
        question_id: question_id.to_string(),
        values: values.iter().map(|value| value.to_string()).collect(),
    }
}

fn service_question() -> Question {
    Question {
        id: "service".to_string(),
        title: "Quel type de projet avez-vous en tête ?".to_string(),
        subtitle: Some("Sélectionnez le service qui correspond le mieux à votre besoin".to_string()),
        kind: QuestionKind::SingleChoice,
        required: true,
        options: vec![
            choice("website", "Site Web", "website"),
            choice("ecommerce", "E-Commerce", "ecommerce"),
            choice("mobile-app", "Application Mobile", "mobile-app"),
            choice("design", "Design & Identité", "design"),
            choice("marketing", "Marketing Digital", "marketing"),
            choice("print", "Impressions", "print"),
            choice("automation", "Automatisation", "automation"),
            choice("hosting", "Hébergement", "hosting"),
        ],
        fields: Vec::new(),
        range: None,
        depends_on: Vec::new(),
    }
}

fn business_type_question() -> Question {
    Question {
        id: "business-type".to_string(),
        title: "Quelle est la nature de votre activité ?".to_string(),
        subtitle: Some("Cela nous aide à mieux comprendre votre contexte".to_string()),
        kind: QuestionKind::SingleChoice,
        required: true,
        options: vec![
            choice("individual", "Auto-entrepreneur", "individual"),
            choice("tpe", "TPE / Startup", "tpe"),
            choice("pme", "PME", "pme"),
            choice("large", "Grande entreprise", "large"),
        ],
        fields: Vec::new(),
        range: None,
        depends_on: Vec::new(),
    }
}

fn budget_question() -> Question {
    Question {
        id: "budget".to_string(),
        title: "Quel est votre budget approximatif ?".to_string(),
        subtitle: Some("Donnez-nous une idée de votre enveloppe budgétaire".to_string()),
        kind: QuestionKind::SingleChoice,
        required: true,
        options: vec![
            choice("budget-small", "Moins de 1 500€", "small"),
            choice("budget-medium", "1 500€ - 3 000€", "medium"),
            choice("budget-large", "3 000€ - 10 000€", "large"),
            choice("budget-enterprise", "Plus de 10 000€", "enterprise"),
        ],
        fields: Vec::new(),
        range: None,
        depends_on: Vec::new(),
    }
}

fn timeline_question() -> Question {
    Question {
        id: "timeline".to_string(),
        title: "Quel est votre délai idéal ?".to_string(),
        subtitle: Some("Quand souhaitez-vous lancer votre projet ?".to_string()),
        kind: QuestionKind::SingleChoice,
        required: true,
        options: vec![
            choice("urgent", "Urgent", "urgent"),
            choice("short", "Court terme", "short"),
            choice("medium-term", "Moyen terme", "medium"),
            choice("flexible", "Flexible", "flexible"),
        ],
        fields: Vec::new(),
        range: None,
        depends_on: Vec::new(),
    }
}

fn contact_question() -> Question {
    Question {
        id: "contact".to_string(),
        title: "Parfait ! Comment pouvons-nous vous contacter ?".to_string(),
        subtitle: Some("Nous reviendrons vers vous sous 24h".to_string()),
        kind: QuestionKind::Contact,
        required: true,
        fields: vec![
            contact_field("firstName", "Prénom", FieldKind::Text, true),
            contact_field("lastName", "Nom", FieldKind::Text, true),
            contact_field("email", "Email", FieldKind::Email, true),
            contact_field("phone", "Téléphone", FieldKind::Tel, false),
            contact_field("company", "Entreprise", FieldKind::Text, false),
            contact_field("message", "Message (optionnel)", FieldKind::Textarea, false),
        ],
        options: Vec::new(),
        range: None,
        depends_on: Vec::new(),
    }
}

fn standard_questions() -> Vec<Question> {
    vec![
        service_question(),
        business_type_question(),
        budget_question(),
        timeline_question(),
        contact_question(),
    ]
}

fn branching_questions() -> Vec<Question> {
    vec![
        service_question(),
        Question {
            id: "site-pages".to_string(),
            title: "Combien de pages imaginez-vous ?".to_string(),
            subtitle: Some("Une estimation suffit".to_string()),
            kind: QuestionKind::Range,
            required: true,
            range: Some(RangeConfig {
                min: 1.0,
                max: 50.0,
                step: 1.0,
            }),
            options: Vec::new(),
            fields: Vec::new(),
            depends_on: vec![shows_when("service", &["website", "ecommerce"])],
        },
        Question {
            id: "shop-features".to_string(),
            title: "Quelles fonctionnalités boutique vous intéressent ?".to_string(),
            subtitle: Some("Plusieurs choix possibles".to_string()),
            kind: QuestionKind::MultipleChoice,
            required: true,
            options: vec![
                choice("payments", "Paiement en ligne", "payments"),
                choice("inventory", "Gestion de stock", "inventory"),
                choice("shipping", "Livraison & suivi", "shipping"),
                choice("loyalty", "Programme de fidélité", "loyalty"),
            ],
            fields: Vec::new(),
            range: None,
            depends_on: vec![shows_when("service", &["ecommerce"])],
        },
        Question {
            id: "platforms".to_string(),
            title: "Sur quelles plateformes ?".to_string(),
            subtitle: None,
            kind: QuestionKind::MultipleChoice,
            required: true,
            options: vec![
                choice("ios", "iOS", "ios"),
                choice("android", "Android", "android"),
                choice("both", "Les deux", "both"),
            ],
            fields: Vec::new(),
            range: None,
            depends_on: vec![shows_when("service", &["mobile-app"])],
        },
        business_type_question(),
        budget_question(),
        timeline_question(),
        contact_question(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::answer::AnswerValue;

    fn bare_question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            title: format!("question {id}"),
            subtitle: None,
            kind: QuestionKind::Text,
            required: false,
            options: Vec::new(),
            fields: Vec::new(),
            range: None,
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn built_in_catalogs_pass_validation() {
        assert_eq!(Catalog::standard().len(), 5);
        assert_eq!(Catalog::branching().len(), 8);
    }

    #[test]
    fn without_dependencies_every_question_is_visible() {
        let catalog = Catalog::standard();
        let visible = catalog.visible_questions(&AnswerMap::new());
        let ids: Vec<&str> = visible.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(
            ids,
            ["service", "business-type", "budget", "timeline", "contact"]
        );
    }

    #[test]
    fn dependent_question_follows_the_referenced_answer() {
        let catalog = Catalog::branching();
        let mut answers = AnswerMap::new();

        answers.insert("service".to_string(), AnswerValue::from("design"));
        assert!(!catalog
            .visible_questions(&answers)
            .iter()
            .any(|q| q.id == "site-pages"));

        answers.insert("service".to_string(), AnswerValue::from("website"));
        let ids: Vec<&str> = catalog
            .visible_questions(&answers)
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert!(ids.contains(&"site-pages"));
        assert!(!ids.contains(&"shop-features"), "ecommerce-only follow-up");
    }

    #[test]
    fn collection_answers_satisfy_clauses_by_containment() {
        let clause = shows_when("channels", &["email"]);
        let mut answers = AnswerMap::new();
        answers.insert(
            "channels".to_string(),
            AnswerValue::Selections(vec!["sms".to_string(), "email".to_string()]),
        );
        assert!(clause.is_satisfied(&answers));

        answers.insert(
            "channels".to_string(),
            AnswerValue::Selections(vec!["sms".to_string()]),
        );
        assert!(!clause.is_satisfied(&answers));
    }

    #[test]
    fn numeric_answers_match_clause_values() {
        let clause = shows_when("site-pages", &["10"]);
        let mut answers = AnswerMap::new();
        answers.insert("site-pages".to_string(), AnswerValue::Number(10.0));
        assert!(clause.is_satisfied(&answers));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = Catalog::new(vec![bare_question("a"), bare_question("a")])
            .expect_err("duplicate must fail");
        assert!(matches!(err, CatalogError::DuplicateQuestionId(id) if id == "a"));
    }

    #[test]
    fn dependencies_must_point_backwards() {
        let mut early = bare_question("early");
        early.depends_on = vec![shows_when("late", &["x"])];
        let err =
            Catalog::new(vec![early, bare_question("late")]).expect_err("forward ref must fail");
        assert!(matches!(
            err,
            CatalogError::InvalidDependency { question, references }
                if question == "early" && references == "late"
        ));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut question = bare_question("loop");
        question.depends_on = vec![shows_when("loop", &["x"])];
        let err = Catalog::new(vec![question]).expect_err("self ref must fail");
        assert!(matches!(err, CatalogError::InvalidDependency { .. }));
    }

    #[test]
    fn kind_specific_payloads_are_required() {
        let mut no_options = bare_question("pick");
        no_options.kind = QuestionKind::SingleChoice;
        assert!(matches!(
            Catalog::new(vec![no_options]),
            Err(CatalogError::MissingOptions(_))
        ));

        let mut bad_range = bare_question("scale");
        bad_range.kind = QuestionKind::Range;
        bad_range.range = Some(RangeConfig {
            min: 5.0,
            max: 5.0,
            step: 1.0,
        });
        assert!(matches!(
            Catalog::new(vec![bad_range]),
            Err(CatalogError::InvalidRange(_))
        ));
    }

    #[test]
    fn option_labels_resolve_with_fallback() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.option_label("budget", "small"), "Moins de 1 500€");
        assert_eq!(catalog.option_label("budget", "unlisted"), "unlisted");
        assert_eq!(catalog.option_label("no-such-question", "raw"), "raw");
    }
}
