use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::model::quiz::{Question, Quiz};
use crate::model::result::{QuizResult, percentage};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Rejected session transitions.
///
/// All variants are recoverable: the session is left exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// No quiz was supplied, or it has no questions.
    #[error("quiz data is missing or has no questions")]
    InvalidQuizData,

    #[error("select an answer before continuing")]
    AnswerRequired,

    #[error("option {index} is out of range for {len} options")]
    OptionOutOfRange { index: usize, len: usize },

    #[error("already at the first question")]
    AtFirstQuestion,

    #[error("session already completed")]
    Completed,

    #[error("session is not completed yet")]
    NotCompleted,
}

//
// ─── PHASE / STEP / PROGRESS ───────────────────────────────────────────────────
//

/// Lifecycle phase of a started session.
///
/// A session that has not been started does not exist yet; owners hold an
/// `Option<QuizSession>` for that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    InProgress,
    Completed,
}

/// Outcome of a successful `advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Moved to the question at this index.
    Moved(usize),
    /// The last question was submitted; the session is now terminal.
    Finished(Box<QuizResult>),
}

/// Snapshot of where a session stands, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    /// 1-based position of the current question.
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    /// `round(100 * position / total)`.
    pub percent_through: u32,
    pub is_complete: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One attempt at a quiz: a pointer walk over the questions with one answer
/// slot per question.
///
/// Moving forward requires the current slot to be set; moving back is free
/// and keeps every recorded answer. Submitting the last question completes
/// the session, after which nothing can change.
#[derive(Clone)]
pub struct QuizSession {
    attempt_id: Uuid,
    quiz: Quiz,
    current: usize,
    answers: Vec<Option<usize>>,
    phase: SessionPhase,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl QuizSession {
    /// Start a session at the first question with every answer unset.
    ///
    /// `started_at` should come from the caller's clock.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidQuizData` if `quiz` is missing or empty.
    pub fn start(quiz: Option<Quiz>, started_at: DateTime<Utc>) -> Result<Self, SessionError> {
        let quiz = quiz.ok_or(SessionError::InvalidQuizData)?;
        if quiz.is_empty() {
            return Err(SessionError::InvalidQuizData);
        }

        Ok(Self {
            attempt_id: Uuid::new_v4(),
            answers: vec![None; quiz.len()],
            quiz,
            current: 0,
            phase: SessionPhase::InProgress,
            started_at,
            completed_at: None,
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    #[must_use]
    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == SessionPhase::Completed
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        // `current` is kept in range by every transition.
        &self.quiz.questions()[self.current]
    }

    /// Answer recorded for the current question, if any.
    #[must_use]
    pub fn selected_answer(&self) -> Option<usize> {
        self.answers[self.current]
    }

    #[must_use]
    pub fn answers(&self) -> &[Option<usize>] {
        &self.answers
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.current == 0
    }

    /// True when `advance` would submit the quiz rather than move on.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.current + 1 == self.answers.len()
    }

    #[must_use]
    pub fn can_advance(&self) -> bool {
        !self.is_complete() && self.selected_answer().is_some()
    }

    #[must_use]
    pub fn can_retreat(&self) -> bool {
        !self.is_complete() && self.current > 0
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.total_questions();
        let position = self.current + 1;
        SessionProgress {
            position,
            total,
            answered: self.answered_count(),
            percent_through: percentage(
                u32::try_from(position).unwrap_or(u32::MAX),
                u32::try_from(total).unwrap_or(u32::MAX),
            ),
            is_complete: self.is_complete(),
        }
    }

    /// Record `index` as the answer to the current question.
    ///
    /// Overwrites any earlier choice and never moves the pointer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` after completion, or
    /// `SessionError::OptionOutOfRange` if `index` is not one of the options.
    pub fn select_answer(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let len = self.current_question().option_count();
        if index >= len {
            return Err(SessionError::OptionOutOfRange { index, len });
        }
        self.answers[self.current] = Some(index);
        Ok(())
    }

    /// Move to the next question, or submit on the last one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AnswerRequired` if the current question has no
    /// answer, or `SessionError::Completed` after completion.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<Step, SessionError> {
        self.ensure_in_progress()?;
        if self.selected_answer().is_none() {
            return Err(SessionError::AnswerRequired);
        }

        if self.is_last() {
            self.phase = SessionPhase::Completed;
            self.completed_at = Some(now.max(self.started_at));
            return self.score().map(|result| Step::Finished(Box::new(result)));
        }

        self.current += 1;
        Ok(Step::Moved(self.current))
    }

    /// Move back one question, keeping all recorded answers.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AtFirstQuestion` at index 0, or
    /// `SessionError::Completed` after completion.
    pub fn retreat(&mut self) -> Result<usize, SessionError> {
        self.ensure_in_progress()?;
        if self.current == 0 {
            return Err(SessionError::AtFirstQuestion);
        }
        self.current -= 1;
        Ok(self.current)
    }

    /// Score the completed session.
    ///
    /// Deterministic in the quiz, the answers and the two timestamps.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` while the session is in progress.
    pub fn score(&self) -> Result<QuizResult, SessionError> {
        let completed_at = match (self.phase, self.completed_at) {
            (SessionPhase::Completed, Some(at)) => at,
            _ => return Err(SessionError::NotCompleted),
        };

        Ok(QuizResult::score(
            &self.quiz,
            &self.answers,
            self.attempt_id,
            self.started_at,
            completed_at,
        ))
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::InProgress => Ok(()),
            SessionPhase::Completed => Err(SessionError::Completed),
        }
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("attempt_id", &self.attempt_id)
            .field("quiz_id", &self.quiz.id())
            .field("questions_len", &self.answers.len())
            .field("current", &self.current)
            .field("answered", &self.answered_count())
            .field("phase", &self.phase)
            .field("started_at", &self.started_at)
            .field("completed_at", &self.completed_at)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuizId, QuizKind};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn quiz_with_answers(correct: &[usize]) -> Quiz {
        let questions = correct
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Question::new(
                    format!("Question {i}"),
                    vec!["w".into(), "x".into(), "y".into(), "z".into()],
                    c,
                    String::new(),
                )
                .unwrap()
            })
            .collect();
        Quiz::new(QuizId::new(9), "Sample", QuizKind::Practice, questions).unwrap()
    }

    fn started(correct: &[usize]) -> QuizSession {
        QuizSession::start(Some(quiz_with_answers(correct)), fixed_now()).unwrap()
    }

    #[test]
    fn start_requires_a_quiz() {
        let err = QuizSession::start(None, fixed_now()).unwrap_err();
        assert_eq!(err, SessionError::InvalidQuizData);
    }

    #[test]
    fn start_initialises_unset_answers() {
        let session = started(&[0, 1, 2]);
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.answers(), &[None, None, None]);
        assert!(session.is_first());
        assert!(!session.can_advance());
    }

    #[test]
    fn advance_requires_an_answer() {
        let mut session = started(&[0, 1]);
        let err = session.advance(fixed_now()).unwrap_err();
        assert_eq!(err, SessionError::AnswerRequired);
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn select_answer_validates_range_and_keeps_pointer() {
        let mut session = started(&[0, 1]);
        let err = session.select_answer(4).unwrap_err();
        assert_eq!(err, SessionError::OptionOutOfRange { index: 4, len: 4 });

        session.select_answer(2).unwrap();
        session.select_answer(3).unwrap();
        assert_eq!(session.selected_answer(), Some(3));
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn retreat_at_first_question_is_rejected() {
        let mut session = started(&[0, 1]);
        let err = session.retreat().unwrap_err();
        assert_eq!(err, SessionError::AtFirstQuestion);
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn retreat_keeps_later_answers() {
        let mut session = started(&[0, 1, 2]);
        session.select_answer(0).unwrap();
        session.advance(fixed_now()).unwrap();
        session.select_answer(1).unwrap();
        session.advance(fixed_now()).unwrap();

        assert_eq!(session.retreat().unwrap(), 1);
        assert_eq!(session.selected_answer(), Some(1));
        assert_eq!(session.retreat().unwrap(), 0);
        session.select_answer(3).unwrap();

        assert_eq!(session.answers(), &[Some(3), Some(1), None]);
    }

    #[test]
    fn completing_scores_and_freezes_the_session() {
        let mut session = started(&[0, 1, 2, 3]);
        let picks = [0, 1, 0, 3];
        let done_at = fixed_now() + Duration::seconds(90);

        let mut finished = None;
        for (i, pick) in picks.iter().enumerate() {
            session.select_answer(*pick).unwrap();
            match session.advance(done_at).unwrap() {
                Step::Moved(next) => assert_eq!(next, i + 1),
                Step::Finished(result) => finished = Some(result),
            }
        }

        let result = finished.expect("last advance finishes");
        assert_eq!(result.correct_answers(), 3);
        assert_eq!(result.percentage(), 75);
        assert_eq!(result.elapsed_secs(), 90);
        assert_eq!(result.attempt_id(), session.attempt_id());
        assert!(session.is_complete());
        assert_eq!(session.completed_at(), Some(done_at));

        assert_eq!(session.select_answer(0), Err(SessionError::Completed));
        assert_eq!(session.advance(done_at), Err(SessionError::Completed));
        assert_eq!(session.retreat(), Err(SessionError::Completed));
        assert_eq!(session.score().unwrap(), *result);
    }

    #[test]
    fn score_before_completion_is_rejected() {
        let session = started(&[0]);
        assert_eq!(session.score().unwrap_err(), SessionError::NotCompleted);
    }

    #[test]
    fn single_question_quiz_submits_immediately() {
        let mut session = started(&[2]);
        assert!(session.is_last());
        session.select_answer(2).unwrap();
        let Step::Finished(result) = session.advance(fixed_now()).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(result.percentage(), 100);
    }

    #[test]
    fn progress_reports_position() {
        let mut session = started(&[0, 0, 0]);
        session.select_answer(0).unwrap();
        session.advance(fixed_now()).unwrap();

        let progress = session.progress();
        assert_eq!(progress.position, 2);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.percent_through, 67);
        assert!(!progress.is_complete);
    }
}
