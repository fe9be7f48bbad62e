//! Copies stored results to the remote result API.
//!
//! Mirroring runs on a detached task after the local write. Its outcome is
//! only logged and never changes the local result or blocks the caller.
//! Spawned submissions are tracked in `MirrorTasks` so a process can wait
//! for them, within a bound, before its runtime goes away.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{Level, QuizResult, UserId};
use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::MirrorConfig;
use crate::error::MirrorError;

/// Body of `POST {base}/api/results`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorPayload {
    pub user_id: u64,
    pub quiz_type: String,
    pub score: u32,
    pub total: u32,
    pub percentage: u32,
    pub level: Option<String>,
    pub attempt_id: Uuid,
}

impl MirrorPayload {
    #[must_use]
    pub fn from_result(user_id: UserId, result: &QuizResult, level: Option<Level>) -> Self {
        Self {
            user_id: user_id.value(),
            quiz_type: result.quiz_kind().as_str().to_string(),
            score: result.correct_answers(),
            total: result.total_questions(),
            percentage: result.percentage(),
            level: level.map(|level| level.label().to_string()),
            attempt_id: result.attempt_id(),
        }
    }
}

/// Destination for copies of stored results.
#[async_trait]
pub trait ResultMirror: Send + Sync {
    /// Submit one result.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError` if the remote side rejects or cannot be reached.
    async fn submit(&self, payload: &MirrorPayload) -> Result<(), MirrorError>;
}

/// `ResultMirror` over HTTP.
#[derive(Clone)]
pub struct HttpResultMirror {
    client: Client,
    endpoint: String,
}

impl HttpResultMirror {
    /// # Errors
    ///
    /// Returns `MirrorError::Http` if the HTTP client cannot be built.
    pub fn new(config: &MirrorConfig) -> Result<Self, MirrorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(u64::from(config.timeout_secs)))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/results", config.base_url.trim_end_matches('/')),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ResultMirror for HttpResultMirror {
    async fn submit(&self, payload: &MirrorPayload) -> Result<(), MirrorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MirrorError::HttpStatus(response.status()));
        }
        Ok(())
    }
}

/// Submit `payload` on a detached task.
///
/// Returns `None` without submitting when called outside a tokio runtime.
pub fn spawn_mirror(
    mirror: Arc<dyn ResultMirror>,
    payload: MirrorPayload,
) -> Option<JoinHandle<()>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    Some(handle.spawn(async move {
        match mirror.submit(&payload).await {
            Ok(()) => tracing::debug!(attempt_id = %payload.attempt_id, "result mirrored"),
            Err(err) => tracing::warn!(
                attempt_id = %payload.attempt_id,
                error = %err,
                "result mirror failed"
            ),
        }
    }))
}

/// In-flight mirror submissions.
#[derive(Clone, Default)]
pub struct MirrorTasks {
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MirrorTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `handle` until the next drain. Finished tasks are pruned here.
    pub fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|task| !task.is_finished());
        pending.push(handle);
    }

    /// Number of tracked submissions that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Wait up to `limit` for every tracked submission.
    ///
    /// Returns `false` if some were still running when the limit passed; those
    /// are left detached.
    pub async fn drain(&self, limit: Duration) -> bool {
        let tasks = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *pending)
        };
        if tasks.is_empty() {
            return true;
        }

        let count = tasks.len();
        let wait_all = async move {
            for task in tasks {
                if let Err(err) = task.await {
                    tracing::warn!(error = %err, "result mirror task aborted");
                }
            }
        };

        if tokio::time::timeout(limit, wait_all).await.is_ok() {
            tracing::debug!(count, "result mirror tasks drained");
            true
        } else {
            tracing::warn!(
                count,
                limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                "result mirror tasks still running at shutdown"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use quiz_core::model::{Quiz, QuizId, QuizKind};
    use quiz_core::time::fixed_now;

    fn result() -> QuizResult {
        let quiz = Quiz::from_parts(
            QuizId::new(2),
            "Placement",
            QuizKind::LevelTest,
            vec![("q".into(), vec!["a".into(), "b".into()], 1, String::new())],
        )
        .unwrap();
        QuizResult::score(
            &quiz,
            &[Some(1)],
            Uuid::nil(),
            fixed_now(),
            fixed_now() + ChronoDuration::seconds(3),
        )
    }

    #[test]
    fn payload_uses_api_field_names() {
        let payload =
            MirrorPayload::from_result(UserId::new(7), &result(), Some(Level::Advanced));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "userId": 7,
                "quizType": "level-test",
                "score": 1,
                "total": 1,
                "percentage": 100,
                "level": "Advanced",
                "attemptId": "00000000-0000-0000-0000-000000000000",
            })
        );
    }

    #[test]
    fn endpoint_joins_base_url() {
        let mirror = HttpResultMirror::new(&MirrorConfig {
            base_url: "http://localhost:3000/".into(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(mirror.endpoint(), "http://localhost:3000/api/results");
    }

    struct Slow(Duration);

    #[async_trait]
    impl ResultMirror for Slow {
        async fn submit(&self, _payload: &MirrorPayload) -> Result<(), MirrorError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn drain_waits_for_tracked_submissions() {
        let tasks = MirrorTasks::new();
        let payload = MirrorPayload::from_result(UserId::new(1), &result(), None);
        let handle =
            spawn_mirror(Arc::new(Slow(Duration::from_millis(20))), payload).unwrap();
        tasks.track(handle);
        assert_eq!(tasks.pending(), 1);

        assert!(tasks.drain(Duration::from_secs(5)).await);
        assert_eq!(tasks.pending(), 0);
        assert!(tasks.drain(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn drain_gives_up_after_the_limit() {
        let tasks = MirrorTasks::new();
        let payload = MirrorPayload::from_result(UserId::new(1), &result(), None);
        tasks.track(spawn_mirror(Arc::new(Slow(Duration::from_secs(30))), payload).unwrap());

        assert!(!tasks.drain(Duration::from_millis(10)).await);
        assert_eq!(tasks.pending(), 0);
    }

    #[test]
    fn spawn_outside_runtime_is_skipped() {
        struct Never;
        #[async_trait]
        impl ResultMirror for Never {
            async fn submit(&self, _payload: &MirrorPayload) -> Result<(), MirrorError> {
                unreachable!("no runtime to run on")
            }
        }
        let payload = MirrorPayload::from_result(UserId::new(1), &result(), None);
        assert!(spawn_mirror(Arc::new(Never), payload).is_none());
    }
}
