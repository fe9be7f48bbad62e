use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::ids::QuizId;
use crate::model::quiz::{Question, Quiz, QuizKind};
use crate::time::elapsed_secs;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("a result must cover at least one question")]
    ZeroQuestions,

    #[error("{field} ({stored}) does not match the question breakdown ({derived})")]
    CountMismatch {
        field: &'static str,
        stored: u32,
        derived: u32,
    },

    #[error("too many questions for a single result: {len}")]
    TooManyQuestions { len: usize },
}

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// `round(100 * correct / total)` with halves rounded up.
///
/// Returns 0 when `total` is 0.
#[must_use]
pub fn percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let correct = u64::from(correct.min(total));
    let total = u64::from(total);
    // Always <= 100, so the narrowing cannot truncate.
    ((200 * correct + total) / (2 * total)) as u32
}

//
// ─── QUESTION OUTCOME ──────────────────────────────────────────────────────────
//

/// Per-question line of a result breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question: String,
    pub options: Vec<String>,
    pub given: Option<usize>,
    pub given_text: Option<String>,
    pub correct: usize,
    pub correct_text: String,
    pub is_correct: bool,
    pub explanation: String,
}

impl QuestionOutcome {
    /// Grade a single recorded answer. Unset answers are incorrect.
    #[must_use]
    pub fn grade(question: &Question, given: Option<usize>) -> Self {
        Self {
            question: question.text().to_string(),
            options: question.options().to_vec(),
            given,
            given_text: given.and_then(|idx| question.option(idx)).map(str::to_string),
            correct: question.correct(),
            correct_text: question.correct_text().to_string(),
            is_correct: given == Some(question.correct()),
            explanation: question.explanation().to_string(),
        }
    }
}

//
// ─── QUIZ RESULT ───────────────────────────────────────────────────────────────
//

/// Scored, immutable outcome of a completed quiz session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuizResult")]
pub struct QuizResult {
    attempt_id: Uuid,
    quiz_id: QuizId,
    quiz_kind: QuizKind,
    total_questions: u32,
    correct_answers: u32,
    percentage: u32,
    questions: Vec<QuestionOutcome>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl QuizResult {
    /// Score `answers` against `quiz`.
    ///
    /// Slot `i` of `answers` belongs to question `i`; missing slots count as
    /// unset and extra slots are ignored. A `completed_at` earlier than
    /// `started_at` is clamped so the elapsed time is zero.
    #[must_use]
    pub fn score(
        quiz: &Quiz,
        answers: &[Option<usize>],
        attempt_id: Uuid,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let questions: Vec<QuestionOutcome> = quiz
            .questions()
            .iter()
            .enumerate()
            .map(|(idx, question)| {
                QuestionOutcome::grade(question, answers.get(idx).copied().flatten())
            })
            .collect();

        let total_questions = u32::try_from(questions.len()).unwrap_or(u32::MAX);
        let correct_answers = count_correct(&questions);

        Self {
            attempt_id,
            quiz_id: quiz.id(),
            quiz_kind: quiz.kind().clone(),
            total_questions,
            correct_answers,
            percentage: percentage(correct_answers, total_questions),
            questions,
            started_at,
            completed_at: completed_at.max(started_at),
        }
    }

    /// Rehydrate a result from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if the stored totals disagree with the breakdown,
    /// the breakdown is empty, or the time range is inverted.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        attempt_id: Uuid,
        quiz_id: QuizId,
        quiz_kind: QuizKind,
        total_questions: u32,
        correct_answers: u32,
        percentage_stored: u32,
        questions: Vec<QuestionOutcome>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, ResultError> {
        if completed_at < started_at {
            return Err(ResultError::InvalidTimeRange);
        }
        if questions.is_empty() {
            return Err(ResultError::ZeroQuestions);
        }
        let derived_total = u32::try_from(questions.len())
            .map_err(|_| ResultError::TooManyQuestions {
                len: questions.len(),
            })?;
        if derived_total != total_questions {
            return Err(ResultError::CountMismatch {
                field: "total_questions",
                stored: total_questions,
                derived: derived_total,
            });
        }
        let derived_correct = count_correct(&questions);
        if derived_correct != correct_answers {
            return Err(ResultError::CountMismatch {
                field: "correct_answers",
                stored: correct_answers,
                derived: derived_correct,
            });
        }
        let derived_percentage = percentage(derived_correct, derived_total);
        if derived_percentage != percentage_stored {
            return Err(ResultError::CountMismatch {
                field: "percentage",
                stored: percentage_stored,
                derived: derived_percentage,
            });
        }

        Ok(Self {
            attempt_id,
            quiz_id,
            quiz_kind,
            total_questions,
            correct_answers,
            percentage: derived_percentage,
            questions,
            started_at,
            completed_at,
        })
    }

    /// Unique id of the session attempt that produced this result.
    #[must_use]
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn quiz_kind(&self) -> &QuizKind {
        &self.quiz_kind
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn percentage(&self) -> u32 {
        self.percentage
    }

    #[must_use]
    pub fn questions(&self) -> &[QuestionOutcome] {
        &self.questions
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Time spent, rounded to the nearest second.
    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        elapsed_secs(self.started_at, self.completed_at)
    }
}

#[derive(Deserialize)]
struct RawQuizResult {
    attempt_id: Uuid,
    quiz_id: QuizId,
    quiz_kind: QuizKind,
    total_questions: u32,
    correct_answers: u32,
    percentage: u32,
    questions: Vec<QuestionOutcome>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl TryFrom<RawQuizResult> for QuizResult {
    type Error = ResultError;

    fn try_from(raw: RawQuizResult) -> Result<Self, Self::Error> {
        QuizResult::from_persisted(
            raw.attempt_id,
            raw.quiz_id,
            raw.quiz_kind,
            raw.total_questions,
            raw.correct_answers,
            raw.percentage,
            raw.questions,
            raw.started_at,
            raw.completed_at,
        )
    }
}

fn count_correct(questions: &[QuestionOutcome]) -> u32 {
    let n = questions.iter().filter(|q| q.is_correct).count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
