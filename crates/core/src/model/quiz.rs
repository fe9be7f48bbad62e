use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::QuizId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question must offer at least one option")]
    NoOptions,

    #[error("correct option {correct} is out of range for {len} options")]
    CorrectOutOfRange { correct: usize, len: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    /// The quiz is missing or has no questions.
    #[error("quiz data is missing or has no questions")]
    InvalidQuizData,

    #[error("invalid question at position {position}: {source}")]
    Question {
        position: usize,
        #[source]
        source: QuestionError,
    },
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuestion")]
pub struct Question {
    text: String,
    options: Vec<String>,
    correct: usize,
    explanation: String,
}

impl Question {
    /// Build a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the text is blank, there are no options, or
    /// `correct` does not address one of the options.
    pub fn new(
        text: impl Into<String>,
        options: Vec<String>,
        correct: usize,
        explanation: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if options.is_empty() {
            return Err(QuestionError::NoOptions);
        }
        if correct >= options.len() {
            return Err(QuestionError::CorrectOutOfRange {
                correct,
                len: options.len(),
            });
        }

        Ok(Self {
            text,
            options,
            correct,
            explanation: explanation.into(),
        })
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    /// Text of the option at `index`, if it exists.
    #[must_use]
    pub fn option(&self, index: usize) -> Option<&str> {
        self.options.get(index).map(String::as_str)
    }

    /// Index of the correct option.
    #[must_use]
    pub fn correct(&self) -> usize {
        self.correct
    }

    #[must_use]
    pub fn correct_text(&self) -> &str {
        self.option(self.correct).unwrap_or_default()
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

/// Wire shape of a question; deserialized data goes through `Question::new`.
#[derive(Deserialize)]
struct RawQuestion {
    text: String,
    options: Vec<String>,
    correct: usize,
    #[serde(default)]
    explanation: String,
}

impl TryFrom<RawQuestion> for Question {
    type Error = QuestionError;

    fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
        Question::new(raw.text, raw.options, raw.correct, raw.explanation)
    }
}

//
// ─── QUIZ KIND ─────────────────────────────────────────────────────────────────
//

/// Quiz-type tag carried through to results and the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum QuizKind {
    #[default]
    Practice,
    LevelTest,
    Other(String),
}

impl QuizKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            QuizKind::Practice => "practice",
            QuizKind::LevelTest => "level-test",
            QuizKind::Other(tag) => tag.as_str(),
        }
    }

    /// Parse a stored tag. Unrecognised tags are preserved verbatim.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "" | "practice" => QuizKind::Practice,
            "level-test" => QuizKind::LevelTest,
            other => QuizKind::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_level_test(&self) -> bool {
        matches!(self, QuizKind::LevelTest)
    }
}

impl fmt::Display for QuizKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for QuizKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QuizKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(QuizKind::parse(&raw))
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// An ordered, non-empty list of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuiz")]
pub struct Quiz {
    id: QuizId,
    title: String,
    kind: QuizKind,
    questions: Vec<Question>,
}

impl Quiz {
    /// Build a quiz.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidQuizData` if `questions` is empty.
    pub fn new(
        id: QuizId,
        title: impl Into<String>,
        kind: QuizKind,
        questions: Vec<Question>,
    ) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::InvalidQuizData);
        }
        Ok(Self {
            id,
            title: title.into(),
            kind,
            questions,
        })
    }

    /// Rehydrate a quiz from raw question parts, validating each question.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Question` for the first invalid question, or
    /// `QuizError::InvalidQuizData` if there are none.
    pub fn from_parts(
        id: QuizId,
        title: impl Into<String>,
        kind: QuizKind,
        parts: Vec<(String, Vec<String>, usize, String)>,
    ) -> Result<Self, QuizError> {
        let questions = parts
            .into_iter()
            .enumerate()
            .map(|(position, (text, options, correct, explanation))| {
                Question::new(text, options, correct, explanation)
                    .map_err(|source| QuizError::Question { position, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(id, title, kind, questions)
    }

    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn kind(&self) -> &QuizKind {
        &self.kind
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always false: every constructor, serde included, rejects empty quizzes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Reorder questions in place, e.g. to shuffle before starting a session.
    pub fn reorder_questions(&mut self, reorder: impl FnOnce(&mut [Question])) {
        reorder(self.questions.as_mut_slice());
    }
}

#[derive(Deserialize)]
struct RawQuiz {
    id: QuizId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    kind: QuizKind,
    questions: Vec<Question>,
}

impl TryFrom<RawQuiz> for Quiz {
    type Error = QuizError;

    fn try_from(raw: RawQuiz) -> Result<Self, Self::Error> {
        Quiz::new(raw.id, raw.title, raw.kind, raw.questions)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn question_rejects_out_of_range_answer() {
        let err = Question::new("Pick", opts(&["a", "b"]), 2, "").unwrap_err();
        assert_eq!(err, QuestionError::CorrectOutOfRange { correct: 2, len: 2 });
    }

    #[test]
    fn question_rejects_missing_options() {
        let err = Question::new("Pick", Vec::new(), 0, "").unwrap_err();
        assert_eq!(err, QuestionError::NoOptions);
    }

    #[test]
    fn question_exposes_correct_text() {
        let q = Question::new("Past of go?", opts(&["goed", "went"]), 1, "irregular").unwrap();
        assert_eq!(q.correct_text(), "went");
        assert_eq!(q.option(0), Some("goed"));
        assert_eq!(q.option(5), None);
    }

    #[test]
    fn empty_quiz_is_invalid() {
        let err = Quiz::new(QuizId::new(1), "Empty", QuizKind::Practice, Vec::new()).unwrap_err();
        assert_eq!(err, QuizError::InvalidQuizData);
    }

    #[test]
    fn from_parts_reports_failing_position() {
        let err = Quiz::from_parts(
            QuizId::new(1),
            "Bad",
            QuizKind::Practice,
            vec![
                ("ok".into(), opts(&["x"]), 0, String::new()),
                ("bad".into(), opts(&["x"]), 3, String::new()),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, QuizError::Question { position: 1, .. }));
    }

    #[test]
    fn deserialize_rejects_out_of_range_answer() {
        let raw = r#"{
            "id": 1,
            "title": "Bad",
            "kind": "practice",
            "questions": [{"text": "Pick", "options": ["a", "b"], "correct": 5}]
        }"#;
        let err = serde_json::from_str::<Quiz>(raw).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn deserialize_rejects_empty_quiz() {
        let raw = r#"{"id": 1, "title": "Empty", "kind": "practice", "questions": []}"#;
        let err = serde_json::from_str::<Quiz>(raw).unwrap_err();
        assert!(err.to_string().contains("no questions"), "{err}");
    }

    #[test]
    fn deserialize_accepts_valid_quiz() {
        let quiz = Quiz::from_parts(
            QuizId::new(3),
            "Greetings",
            QuizKind::LevelTest,
            vec![("Hallo?".into(), opts(&["Hello", "Bye"]), 0, "greeting".into())],
        )
        .unwrap();
        let json = serde_json::to_string(&quiz).unwrap();
        let back: Quiz = serde_json::from_str(&json).unwrap();
        assert_eq!(back, quiz);
        assert_eq!(back.question(0).unwrap().correct_text(), "Hello");
    }

    #[test]
    fn quiz_kind_tags_round_trip() {
        assert_eq!(QuizKind::parse("level-test"), QuizKind::LevelTest);
        assert_eq!(QuizKind::parse("practice"), QuizKind::Practice);
        assert_eq!(QuizKind::parse("grammar").as_str(), "grammar");
        assert!(QuizKind::LevelTest.is_level_test());
    }
}
