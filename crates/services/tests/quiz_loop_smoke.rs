use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{
    AppSettings, Level, Quiz, QuizId, QuizKind, QuizResult, SessionError, Step, UserId,
};
use quiz_core::time::fixed_now;
use services::{
    AppServices, Clock, LevelProgressService, MirrorError, MirrorPayload, QuizLoopError,
    QuizLoopService, ResultMirror,
};
use storage::repository::{
    InMemoryRepository, LevelProgressRepository, QuizRepository, ResultRepository, ResultRow,
    StorageError,
};
use tokio::sync::mpsc;

const USER: UserId = UserId::new(1);

fn four_question_quiz(id: u64, kind: QuizKind) -> Quiz {
    let parts = (0..4)
        .map(|i| {
            (
                format!("Q{i}"),
                vec!["a".into(), "b".into(), "c".into(), "d".into()],
                i,
                format!("answer is option {i}"),
            )
        })
        .collect();
    Quiz::from_parts(QuizId::new(id), "Smoke", kind, parts).unwrap()
}

fn loop_service(repo: &InMemoryRepository) -> QuizLoopService {
    QuizLoopService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(LevelProgressService::new(Arc::new(repo.clone()))),
    )
}

struct RecordingMirror {
    tx: mpsc::UnboundedSender<MirrorPayload>,
    fail: bool,
}

#[async_trait]
impl ResultMirror for RecordingMirror {
    async fn submit(&self, payload: &MirrorPayload) -> Result<(), MirrorError> {
        let _ = self.tx.send(payload.clone());
        if self.fail {
            return Err(MirrorError::HttpStatus(reqwest::StatusCode::BAD_GATEWAY));
        }
        Ok(())
    }
}

/// Fails the first append, then delegates.
struct FlakyResults {
    inner: InMemoryRepository,
    failed_once: AtomicBool,
}

#[async_trait]
impl ResultRepository for FlakyResults {
    async fn append_result(
        &self,
        user_id: UserId,
        result: &QuizResult,
        level_achieved: Option<Level>,
    ) -> Result<i64, StorageError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Connection("database is locked".into()));
        }
        self.inner.append_result(user_id, result, level_achieved).await
    }

    async fn get_result(&self, id: i64) -> Result<ResultRow, StorageError> {
        self.inner.get_result(id).await
    }

    async fn list_results(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        self.inner.list_results(user_id, limit).await
    }
}

#[tokio::test]
async fn quiz_loop_scores_and_persists_result() {
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(&four_question_quiz(1, QuizKind::Practice))
        .await
        .unwrap();
    let svc = loop_service(&repo);

    let mut run = svc.start_quiz(QuizId::new(1)).await.unwrap();
    let mut finished = None;
    for answer in [0, 1, 0, 3] {
        run.select_answer(answer).unwrap();
        let advanced = svc.advance(&mut run, USER).await.unwrap();
        if advanced.is_finished() {
            finished = Some(advanced);
        }
    }

    let advanced = finished.expect("last question submits");
    let Step::Finished(result) = advanced.step else {
        panic!("expected a finished step");
    };
    assert_eq!(result.correct_answers(), 3);
    assert_eq!(result.percentage(), 75);
    assert!(run.is_complete());

    let id = advanced.result_id.expect("stored");
    assert_eq!(run.result_id(), Some(id));
    let stored = repo.get_result(id).await.unwrap();
    assert_eq!(stored.result, *result);
    assert_eq!(stored.level_achieved, None);

    let err = svc.advance(&mut run, USER).await.unwrap_err();
    assert!(matches!(err, QuizLoopError::Session(SessionError::Completed)));
}

#[tokio::test]
async fn rejected_steps_leave_the_run_in_place() {
    let repo = InMemoryRepository::new();
    let svc = loop_service(&repo);
    let mut run = svc
        .start_with(Some(four_question_quiz(1, QuizKind::Practice)))
        .unwrap();

    let err = svc.advance(&mut run, USER).await.unwrap_err();
    assert!(matches!(
        err,
        QuizLoopError::Session(SessionError::AnswerRequired)
    ));
    assert_eq!(run.retreat().unwrap_err(), SessionError::AtFirstQuestion);
    assert_eq!(run.progress().position, 1);

    run.select_answer(2).unwrap();
    svc.advance(&mut run, USER).await.unwrap();
    assert_eq!(run.retreat().unwrap(), 0);
    assert_eq!(run.session().selected_answer(), Some(2));
}

#[tokio::test]
async fn missing_quiz_cannot_start() {
    let repo = InMemoryRepository::new();
    let svc = loop_service(&repo);

    let err = svc.start_quiz(QuizId::new(404)).await.unwrap_err();
    assert!(matches!(
        err,
        QuizLoopError::Session(SessionError::InvalidQuizData)
    ));
    assert!(matches!(
        svc.start_with(None),
        Err(QuizLoopError::Session(SessionError::InvalidQuizData))
    ));
}

#[tokio::test]
async fn finished_results_are_mirrored_in_the_background() {
    let repo = InMemoryRepository::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let svc = loop_service(&repo).with_mirror(Arc::new(RecordingMirror { tx, fail: true }));

    let mut run = svc
        .start_with(Some(four_question_quiz(3, QuizKind::Practice)))
        .unwrap();
    for _ in 0..4 {
        run.select_answer(0).unwrap();
        svc.advance(&mut run, USER).await.unwrap();
    }

    let payload = rx.recv().await.expect("mirror called");
    assert_eq!(payload.user_id, 1);
    assert_eq!(payload.quiz_type, "practice");
    assert_eq!(payload.score, 1);
    assert_eq!(payload.total, 4);
    assert_eq!(payload.percentage, 25);
    assert_eq!(payload.level, None);
    assert_eq!(payload.attempt_id, run.session().attempt_id());

    // The failed mirror left the local copy alone.
    assert_eq!(repo.list_results(USER, 10).await.unwrap().len(), 1);
}

/// Takes a moment before recording delivery.
struct SlowMirror {
    delivered: Arc<AtomicBool>,
}

#[async_trait]
impl ResultMirror for SlowMirror {
    async fn submit(&self, _payload: &MirrorPayload) -> Result<(), MirrorError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.delivered.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn draining_delivers_mirrors_before_the_runtime_drops() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let delivered = Arc::new(AtomicBool::new(false));
    let repo = InMemoryRepository::new();
    let svc = loop_service(&repo).with_mirror(Arc::new(SlowMirror {
        delivered: Arc::clone(&delivered),
    }));

    runtime.block_on(async {
        let quiz = Quiz::from_parts(
            QuizId::new(4),
            "One",
            QuizKind::Practice,
            vec![("Only".into(), vec!["a".into(), "b".into()], 0, String::new())],
        )
        .unwrap();
        let mut run = svc.start_with(Some(quiz)).unwrap();
        run.select_answer(0).unwrap();
        assert!(svc.advance(&mut run, USER).await.unwrap().is_finished());
        assert_eq!(svc.mirror_tasks().pending(), 1);

        assert!(svc.mirror_tasks().drain(Duration::from_secs(5)).await);
    });
    drop(runtime);

    assert!(delivered.load(Ordering::SeqCst));
}

#[tokio::test]
async fn shutdown_without_mirror_returns_immediately() {
    let services = AppServices::in_memory(Clock::fixed(fixed_now()), AppSettings::default())
        .unwrap();
    assert!(services.shutdown().await);
}

#[tokio::test]
async fn level_test_ratchets_the_highest_level() {
    let repo = InMemoryRepository::new();
    let svc = loop_service(&repo);
    let progress = LevelProgressService::new(Arc::new(repo.clone()));

    let mut strong = svc
        .start_with(Some(four_question_quiz(2, QuizKind::LevelTest)))
        .unwrap();
    for answer in 0..4 {
        strong.select_answer(answer).unwrap();
        svc.advance_level_test(&mut strong, USER, |r| Level::for_score(r.percentage()))
            .await
            .unwrap();
    }
    assert_eq!(strong.level_achieved(), Some(Level::Advanced));
    let stored = repo.get_result(strong.result_id().unwrap()).await.unwrap();
    assert_eq!(stored.level_achieved, Some(Level::Advanced));

    let mut weak = svc
        .start_with(Some(four_question_quiz(2, QuizKind::LevelTest)))
        .unwrap();
    for _ in 0..4 {
        weak.select_answer(3).unwrap();
        svc.advance_level_test(&mut weak, USER, |r| Level::for_score(r.percentage()))
            .await
            .unwrap();
    }
    assert_eq!(weak.level_achieved(), Some(Level::Elementary));

    let standing = progress.highest_level(USER).await.unwrap();
    assert_eq!(standing.level, Some(Level::Advanced));
    assert_eq!(standing.progress_percent, 100);
}

#[tokio::test]
async fn finalize_result_retries_after_storage_failure() {
    let repo = InMemoryRepository::new();
    let results = Arc::new(FlakyResults {
        inner: repo.clone(),
        failed_once: AtomicBool::new(false),
    });
    let svc = QuizLoopService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        results,
        Arc::new(LevelProgressService::new(Arc::new(repo.clone()))),
    );

    let quiz = Quiz::from_parts(
        QuizId::new(1),
        "One",
        QuizKind::Practice,
        vec![("Only".into(), vec!["x".into(), "y".into()], 1, String::new())],
    )
    .unwrap();
    let mut run = svc.start_with(Some(quiz)).unwrap();
    run.select_answer(1).unwrap();

    let err = svc.advance(&mut run, USER).await.unwrap_err();
    assert!(matches!(
        err,
        QuizLoopError::Storage(StorageError::Connection(_))
    ));
    assert!(run.is_complete());
    assert_eq!(run.result_id(), None);

    let id = svc.finalize_result(&mut run, USER).await.unwrap();
    assert_eq!(svc.finalize_result(&mut run, USER).await.unwrap(), id);
    assert_eq!(repo.list_results(USER, 10).await.unwrap().len(), 1);
    assert_eq!(repo.get_result(id).await.unwrap().result.percentage(), 100);
}

#[tokio::test]
async fn finalize_requires_a_completed_run() {
    let repo = InMemoryRepository::new();
    let svc = loop_service(&repo);
    let mut run = svc
        .start_with(Some(four_question_quiz(1, QuizKind::Practice)))
        .unwrap();

    let err = svc.finalize_result(&mut run, USER).await.unwrap_err();
    assert!(matches!(
        err,
        QuizLoopError::Session(SessionError::NotCompleted)
    ));
    assert!(repo.load_highest_level(USER).await.unwrap().is_none());
}

#[tokio::test]
async fn shuffled_runs_keep_every_question() {
    let repo = InMemoryRepository::new();
    let svc = loop_service(&repo).with_shuffle_questions(true);
    let run = svc
        .start_with(Some(four_question_quiz(1, QuizKind::Practice)))
        .unwrap();

    let mut texts: Vec<&str> = run
        .session()
        .quiz()
        .questions()
        .iter()
        .map(|q| q.text())
        .collect();
    texts.sort_unstable();
    assert_eq!(texts, vec!["Q0", "Q1", "Q2", "Q3"]);
}
