use std::sync::Arc;

use quiz_core::model::{Level, Quiz, QuizId, QuizResult, QuizSession, SessionError, Step, UserId};
use rand::rng;
use rand::seq::SliceRandom;
use storage::repository::{QuizRepository, ResultRepository};

use super::run::QuizRun;
use crate::Clock;
use crate::error::QuizLoopError;
use crate::progress::LevelProgressService;
use crate::remote::{MirrorPayload, MirrorTasks, ResultMirror, spawn_mirror};

/// Outcome of advancing a run by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceResult {
    pub step: Step,
    /// Set once the finished result has been stored.
    pub result_id: Option<i64>,
}

impl AdvanceResult {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.step, Step::Finished(_))
    }
}

/// Orchestrates quiz start, step-by-step answering and result persistence.
#[derive(Clone)]
pub struct QuizLoopService {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    results: Arc<dyn ResultRepository>,
    progress: Arc<LevelProgressService>,
    mirror: Option<Arc<dyn ResultMirror>>,
    mirror_tasks: MirrorTasks,
    shuffle_questions: bool,
}

impl QuizLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        results: Arc<dyn ResultRepository>,
        progress: Arc<LevelProgressService>,
    ) -> Self {
        Self {
            clock,
            quizzes,
            results,
            progress,
            mirror: None,
            mirror_tasks: MirrorTasks::new(),
            shuffle_questions: false,
        }
    }

    /// Copy every stored result to `mirror` in the background.
    #[must_use]
    pub fn with_mirror(mut self, mirror: Arc<dyn ResultMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    #[must_use]
    pub fn with_shuffle_questions(mut self, shuffle_questions: bool) -> Self {
        self.shuffle_questions = shuffle_questions;
        self
    }

    /// Mirror submissions started by this service.
    #[must_use]
    pub fn mirror_tasks(&self) -> &MirrorTasks {
        &self.mirror_tasks
    }

    /// Quizzes available to start, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `QuizLoopError::Storage` on storage failures.
    pub async fn list_quizzes(&self, limit: u32) -> Result<Vec<Quiz>, QuizLoopError> {
        Ok(self.quizzes.list_quizzes(limit).await?)
    }

    /// Load a quiz from storage and start a run on it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidQuizData` (wrapped) if the quiz does not
    /// exist or has no questions, or `QuizLoopError::Storage` on storage failures.
    pub async fn start_quiz(&self, quiz_id: QuizId) -> Result<QuizRun, QuizLoopError> {
        let quiz = self.quizzes.get_quiz(quiz_id).await?;
        if quiz.is_none() {
            tracing::warn!(%quiz_id, "quiz not found");
        }
        self.start_with(quiz)
    }

    /// Start a run on a quiz handed over by the caller.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidQuizData` (wrapped) if `quiz` is missing
    /// or empty.
    pub fn start_with(&self, quiz: Option<Quiz>) -> Result<QuizRun, QuizLoopError> {
        let quiz = quiz.map(|mut quiz| {
            if self.shuffle_questions {
                quiz.reorder_questions(|questions| questions.shuffle(&mut rng()));
            }
            quiz
        });
        let session = QuizSession::start(quiz, self.clock.now())?;
        tracing::info!(
            quiz_id = %session.quiz().id(),
            attempt_id = %session.attempt_id(),
            questions = session.total_questions(),
            "quiz started"
        );
        Ok(QuizRun::new(session))
    }

    /// Advance to the next question, or submit and store the result on the last one.
    ///
    /// A storage failure on submit is returned, but the run stays completed;
    /// call `finalize_result` to retry.
    ///
    /// # Errors
    ///
    /// Returns `QuizLoopError::Session` for rejected transitions (for example
    /// `AnswerRequired`), or `QuizLoopError::Storage` if storing fails.
    pub async fn advance(
        &self,
        run: &mut QuizRun,
        user_id: UserId,
    ) -> Result<AdvanceResult, QuizLoopError> {
        let step = run.advance(self.clock.now())?;
        let result_id = match &step {
            Step::Moved(_) => None,
            Step::Finished(result) => Some(self.persist(run, user_id, result).await?),
        };
        Ok(AdvanceResult { step, result_id })
    }

    /// Like `advance`, for level tests: on submit, `placement` maps the result
    /// to the level achieved, which is stored with the result and ratcheted
    /// into the user's highest level.
    ///
    /// # Errors
    ///
    /// Same as `advance`, plus `QuizLoopError::Progress` if the level cannot
    /// be recorded.
    pub async fn advance_level_test<F>(
        &self,
        run: &mut QuizRun,
        user_id: UserId,
        placement: F,
    ) -> Result<AdvanceResult, QuizLoopError>
    where
        F: FnOnce(&QuizResult) -> Level,
    {
        let step = run.advance(self.clock.now())?;
        let result_id = match &step {
            Step::Moved(_) => None,
            Step::Finished(result) => {
                run.set_level_achieved(placement(&**result));
                Some(self.persist(run, user_id, result).await?)
            }
        };
        Ok(AdvanceResult { step, result_id })
    }

    /// Store the result of a completed run if that has not happened yet.
    ///
    /// Safe to call repeatedly; returns the existing id once stored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` (wrapped) for a run still in
    /// progress, or storage errors.
    pub async fn finalize_result(
        &self,
        run: &mut QuizRun,
        user_id: UserId,
    ) -> Result<i64, QuizLoopError> {
        if !run.is_complete() {
            return Err(SessionError::NotCompleted.into());
        }
        let result = run.session().score()?;
        self.persist(run, user_id, &result).await
    }

    async fn persist(
        &self,
        run: &mut QuizRun,
        user_id: UserId,
        result: &QuizResult,
    ) -> Result<i64, QuizLoopError> {
        let level = run.level_achieved();

        let result_id = match run.result_id() {
            Some(id) => id,
            None => {
                let id = self.results.append_result(user_id, result, level).await?;
                run.set_result_id(id);
                tracing::info!(
                    result_id = id,
                    %user_id,
                    correct = result.correct_answers(),
                    total = result.total_questions(),
                    percentage = result.percentage(),
                    "quiz result stored"
                );
                if let Some(mirror) = &self.mirror {
                    let payload = MirrorPayload::from_result(user_id, result, level);
                    match spawn_mirror(Arc::clone(mirror), payload) {
                        Some(handle) => self.mirror_tasks.track(handle),
                        None => {
                            tracing::warn!(result_id = id, "no async runtime, result not mirrored");
                        }
                    }
                }
                id
            }
        };

        if let Some(level) = level {
            if !run.level_recorded() {
                self.progress.record(user_id, level).await?;
                run.mark_level_recorded();
            }
        }

        Ok(result_id)
    }
}
