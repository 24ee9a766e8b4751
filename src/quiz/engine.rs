use std::sync::Arc;

use super::answer::{AnswerMap, AnswerValue};
use super::catalog::{Catalog, Question, QuestionKind};

/// Lifecycle of one quiz run. `Submitting` is always resolved back to
/// `Active` (failure) or forward to `Complete` (success); nothing else can
/// leave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    Active,
    Submitting,
    Complete,
}

#[derive(Debug, Clone)]
pub struct QuizRunState {
    pub current_step: usize,
    pub answers: AnswerMap,
    pub phase: QuizPhase,
}

impl QuizRunState {
    fn initial() -> Self {
        Self {
            current_step: 0,
            answers: AnswerMap::new(),
            phase: QuizPhase::Active,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitStateError {
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("the quiz is already complete")]
    AlreadyComplete,
    #[error("submission is only allowed from the last visible step")]
    NotOnFinalStep,
}

/// One visitor's run through a catalog: answer storage, step position, and
/// the submission state machine. Performs no I/O and never suspends; the
/// gateway round trip happens between `begin_submit` and `finish_submit`.
#[derive(Debug)]
pub struct QuizSession {
    catalog: Arc<Catalog>,
    state: QuizRunState,
}

impl QuizSession {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            state: QuizRunState::initial(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn answers(&self) -> &AnswerMap {
        &self.state.answers
    }

    pub fn current_step(&self) -> usize {
        self.state.current_step
    }

    pub fn phase(&self) -> QuizPhase {
        self.state.phase
    }

    pub fn is_submitting(&self) -> bool {
        self.state.phase == QuizPhase::Submitting
    }

    pub fn is_complete(&self) -> bool {
        self.state.phase == QuizPhase::Complete
    }

    /// Questions reachable under the current answers, in catalog order.
    pub fn visible_questions(&self) -> Vec<&Question> {
        self.catalog.visible_questions(&self.state.answers)
    }

    fn total_visible(&self) -> usize {
        self.visible_questions().len()
    }

    fn last_step(&self) -> usize {
        self.total_visible().saturating_sub(1)
    }

    /// The question at the current step. `None` only for an empty catalog;
    /// every transition clamps the step so it cannot run past the end.
    pub fn current_question(&self) -> Option<&Question> {
        let visible = self.visible_questions();
        visible.get(self.state.current_step).copied()
    }

    /// Store `value` for the current question, overwriting any earlier
    /// answer. No validation happens here; `can_proceed` is the advisory
    /// gate. Answers for questions a branch change later hides are kept.
    pub fn set_answer(&mut self, value: AnswerValue) {
        if self.state.phase != QuizPhase::Active {
            return;
        }
        let Some(id) = self.current_question().map(|question| question.id.clone()) else {
            return;
        };
        self.state.answers.insert(id, value);
        // An answer change can shrink the visible set; keep the step in range.
        self.state.current_step = self.state.current_step.min(self.last_step());
    }

    /// Whether the current answer satisfies the current question. Never
    /// mutates state; callers gate `next_step`/submission on this.
    pub fn can_proceed(&self) -> bool {
        let Some(question) = self.current_question() else {
            return false;
        };
        if !question.required {
            return true;
        }

        let answer = self.state.answers.get(&question.id);
        match question.kind {
            QuestionKind::Contact => match answer {
                Some(AnswerValue::Contact(contact)) => question
                    .fields
                    .iter()
                    .filter(|field| field.required)
                    .all(|field| contact.field_is_filled(&field.id)),
                _ => false,
            },
            QuestionKind::Range => matches!(answer, Some(AnswerValue::Number(_))),
            QuestionKind::MultipleChoice => {
                matches!(answer, Some(AnswerValue::Selections(values)) if !values.is_empty())
            }
            QuestionKind::SingleChoice | QuestionKind::Text => {
                matches!(answer, Some(AnswerValue::Text(value)) if !value.is_empty())
            }
        }
    }

    pub fn next_step(&mut self) {
        self.go_to_step(self.state.current_step.saturating_add(1));
    }

    pub fn previous_step(&mut self) {
        self.go_to_step(self.state.current_step.saturating_sub(1));
    }

    /// Jump to step `step`, clamped to the visible range. Also used for
    /// direct "edit a previous answer" navigation.
    pub fn go_to_step(&mut self, step: usize) {
        if self.state.phase != QuizPhase::Active {
            return;
        }
        self.state.current_step = step.min(self.last_step());
    }

    /// Completion percentage in `[0, 100]`.
    pub fn progress(&self) -> f64 {
        let total = self.total_visible().max(1);
        (self.state.current_step + 1) as f64 / total as f64 * 100.0
    }

    pub fn is_first_step(&self) -> bool {
        self.state.current_step == 0
    }

    pub fn is_last_step(&self) -> bool {
        self.state.current_step == self.last_step()
    }

    /// Move `Active -> Submitting` and hand back the payload to send: the
    /// answer map filtered to currently-visible question ids, so answers
    /// stranded by an abandoned branch never leak into the notification.
    pub fn begin_submit(&mut self) -> Result<AnswerMap, SubmitStateError> {
        match self.state.phase {
            QuizPhase::Submitting => return Err(SubmitStateError::SubmissionInFlight),
            QuizPhase::Complete => return Err(SubmitStateError::AlreadyComplete),
            QuizPhase::Active => {}
        }
        if !self.is_last_step() {
            return Err(SubmitStateError::NotOnFinalStep);
        }

        let visible: Vec<String> = self
            .visible_questions()
            .iter()
            .map(|question| question.id.clone())
            .collect();
        let payload: AnswerMap = self
            .state
            .answers
            .iter()
            .filter(|(id, _)| visible.iter().any(|visible_id| visible_id == *id))
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect();

        self.state.phase = QuizPhase::Submitting;
        Ok(payload)
    }

    /// Resolve the in-flight submission: `Submitting -> Complete` on success,
    /// back to `Active` (same step, answers intact) on failure.
    pub fn finish_submit(&mut self, success: bool) {
        if self.state.phase != QuizPhase::Submitting {
            return;
        }
        self.state.phase = if success {
            QuizPhase::Complete
        } else {
            QuizPhase::Active
        };
    }

    /// Discard all answers and return to the initial state.
    pub fn reset(&mut self) {
        self.state = QuizRunState::initial();
    }
}
