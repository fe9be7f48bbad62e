use quiz_core::model::{Level, QuizSession, SessionError, SessionProgress, Step};

use chrono::{DateTime, Utc};

/// A started quiz session together with what has been persisted for it.
///
/// Answer selection and backward navigation go straight to the session.
/// Advancing goes through `QuizLoopService` so a finished attempt is stored.
#[derive(Debug, Clone)]
pub struct QuizRun {
    session: QuizSession,
    result_id: Option<i64>,
    level_achieved: Option<Level>,
    level_recorded: bool,
}

impl QuizRun {
    pub(crate) fn new(session: QuizSession) -> Self {
        Self {
            session,
            result_id: None,
            level_achieved: None,
            level_recorded: false,
        }
    }

    #[must_use]
    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.session.progress()
    }

    /// Row id of the stored result, once persisted.
    #[must_use]
    pub fn result_id(&self) -> Option<i64> {
        self.result_id
    }

    /// Level placed by a finished level test.
    #[must_use]
    pub fn level_achieved(&self) -> Option<Level> {
        self.level_achieved
    }

    /// Record an answer for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the option is out of range or the session is
    /// already completed.
    pub fn select_answer(&mut self, index: usize) -> Result<(), SessionError> {
        self.session.select_answer(index)
    }

    /// Move back one question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AtFirstQuestion` at the first question, or
    /// `SessionError::Completed` after completion.
    pub fn retreat(&mut self) -> Result<usize, SessionError> {
        self.session.retreat()
    }

    pub(crate) fn advance(&mut self, now: DateTime<Utc>) -> Result<Step, SessionError> {
        self.session.advance(now)
    }

    pub(crate) fn set_result_id(&mut self, id: i64) {
        self.result_id = Some(id);
    }

    pub(crate) fn set_level_achieved(&mut self, level: Level) {
        self.level_achieved = Some(level);
    }

    pub(crate) fn level_recorded(&self) -> bool {
        self.level_recorded
    }

    pub(crate) fn mark_level_recorded(&mut self) {
        self.level_recorded = true;
    }
}
