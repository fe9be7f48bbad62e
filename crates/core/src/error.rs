use thiserror::Error;

use crate::model::{
    AppSettingsError, LevelError, QuestionError, QuizError, ResultError, SessionError,
};

/// Any domain rule violation raised by this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error(transparent)]
    Settings(#[from] AppSettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Level, QuizSession};
    use crate::time::fixed_now;

    fn start_empty() -> Result<QuizSession, Error> {
        Ok(QuizSession::start(None, fixed_now())?)
    }

    #[test]
    fn domain_errors_convert_into_error() {
        assert!(matches!(
            start_empty(),
            Err(Error::Session(SessionError::InvalidQuizData))
        ));

        let err: Error = Level::parse("Expert").unwrap_err().into();
        assert_eq!(err.to_string(), "unknown level label: \"Expert\"");
    }
}
