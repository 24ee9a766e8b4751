//! Branching lead-qualification quiz.
//!
//! `catalog` holds the static question definitions and their dependency
//! rules, `engine` drives a visitor's run through the visible questions, and
//! `gateway` turns a finished run into the pair of outbound notifications
//! (agency summary plus submitter confirmation) behind a rate limit.

pub mod answer;
pub mod catalog;
pub mod engine;
pub mod gateway;
pub mod mailer;
pub mod rate_limit;
pub mod router;

pub use answer::{AnswerMap, AnswerValue, ContactFormData};
pub use catalog::{Catalog, CatalogError, Question, QuestionKind};
pub use engine::{QuizPhase, QuizSession, SubmitStateError};
pub use gateway::{SubmissionError, SubmissionGateway, ValidationError};
pub use mailer::{MailError, Mailer, MemoryMailer, OutboundEmail, SmtpMailer};
pub use rate_limit::SlidingWindowLimiter;
pub use router::lead_router;
