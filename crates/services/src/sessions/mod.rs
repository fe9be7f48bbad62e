mod run;
mod workflow;

// Public API of the quiz session subsystem.
pub use crate::error::QuizLoopError;
pub use quiz_core::model::{SessionProgress, Step};
pub use run::QuizRun;
pub use workflow::{AdvanceResult, QuizLoopService};
