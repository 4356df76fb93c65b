//! Serialized session creation.
//!
//! One consumer task owns the queue, so exactly one `create` is in flight
//! system-wide. Requests are handled FIFO and each gets a bounded number of
//! attempts with a fixed pause between them.

use super::error::SessionError;
use super::manager::SessionSpawner;
use crate::config::CreationConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub id: String,
    pub cols: u16,
    pub rows: u16,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&CreationConfig::default())
    }
}

impl From<&CreationConfig> for RetryPolicy {
    fn from(config: &CreationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: SessionError,
    },

    #[error("create rejected: {0}")]
    Rejected(#[source] SessionError),

    #[error("creation queue is closed")]
    QueueClosed,
}

struct Job {
    request: CreateRequest,
    reply: oneshot::Sender<Result<(), CreateError>>,
}

/// Cheap to clone; every clone feeds the same consumer.
#[derive(Clone)]
pub struct CreationQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl CreationQueue {
    /// Start the consumer task. It runs until every queue handle is dropped.
    pub fn spawn(spawner: Arc<dyn SessionSpawner>, policy: RetryPolicy) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_queue(rx, spawner, policy));
        (Self { tx }, task)
    }

    /// Queue a request and wait for its outcome.
    pub async fn enqueue(&self, request: CreateRequest) -> Result<(), CreateError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Job { request, reply })
            .map_err(|_| CreateError::QueueClosed)?;
        outcome.await.map_err(|_| CreateError::QueueClosed)?
    }
}

async fn run_queue(
    mut rx: mpsc::UnboundedReceiver<Job>,
    spawner: Arc<dyn SessionSpawner>,
    policy: RetryPolicy,
) {
    while let Some(Job { request, reply }) = rx.recv().await {
        let result = create_with_retry(&spawner, &request, policy).await;
        match &result {
            Ok(()) => tracing::debug!(session = %request.id, "session created"),
            Err(e) => tracing::warn!(session = %request.id, error = %e, "session creation failed"),
        }
        // The caller may have gone away; the outcome is already logged.
        let _ = reply.send(result);
    }
    tracing::debug!("creation queue drained");
}

async fn create_with_retry(
    spawner: &Arc<dyn SessionSpawner>,
    request: &CreateRequest,
    policy: RetryPolicy,
) -> Result<(), CreateError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let spawner = spawner.clone();
        let req = request.clone();
        // Spawning blocks on fork/exec and PTY allocation.
        let result =
            tokio::task::spawn_blocking(move || spawner.create(&req.id, req.cols, req.rows, &req.cwd))
                .await
                .unwrap_or_else(|join_err| {
                    Err(SessionError::spawn(&request.id, format!("spawn task failed: {join_err}")))
                });

        match result {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_retryable() => return Err(CreateError::Rejected(e)),
            Err(e) if attempt >= policy.max_attempts => {
                return Err(CreateError::Exhausted {
                    attempts: attempt,
                    last: e,
                })
            }
            Err(e) => {
                tracing::debug!(session = %request.id, attempt, error = %e, "retrying session creation");
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSpawner {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl SessionSpawner for RecordingSpawner {
        fn create(&self, id: &str, _cols: u16, _rows: u16, _cwd: &Path) -> Result<(), SessionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.calls.lock().unwrap().push(id.to_string());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails the first `failures` calls with a spawn error.
    struct FlakySpawner {
        failures: u32,
        calls: AtomicU32,
    }

    impl SessionSpawner for FlakySpawner {
        fn create(&self, id: &str, _cols: u16, _rows: u16, _cwd: &Path) -> Result<(), SessionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(SessionError::spawn(id, "openpty failed"));
            }
            Ok(())
        }
    }

    struct DuplicateSpawner {
        calls: AtomicU32,
    }

    impl SessionSpawner for DuplicateSpawner {
        fn create(&self, id: &str, _cols: u16, _rows: u16, _cwd: &Path) -> Result<(), SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SessionError::AlreadyExists(id.to_string()))
        }
    }

    fn request(id: &str) -> CreateRequest {
        CreateRequest {
            id: id.to_string(),
            cols: 80,
            rows: 24,
            cwd: PathBuf::from("/tmp"),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_are_spawned_one_at_a_time() {
        let spawner = Arc::new(RecordingSpawner::default());
        let (queue, _task) = CreationQueue::spawn(spawner.clone(), fast_policy());

        let handles = (0..10).map(|i| {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(request(&format!("s{i}"))).await })
        });
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        assert_eq!(spawner.calls.lock().unwrap().len(), 10);
        assert_eq!(spawner.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requests_are_served_in_fifo_order() {
        let spawner = Arc::new(RecordingSpawner::default());
        let (queue, _task) = CreationQueue::spawn(spawner.clone(), fast_policy());

        let (a, b, c) = tokio::join!(
            queue.enqueue(request("a")),
            queue.enqueue(request("b")),
            queue.enqueue(request("c")),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(*spawner.calls.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn transient_spawn_failures_are_retried() {
        let spawner = Arc::new(FlakySpawner {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let (queue, _task) = CreationQueue::spawn(spawner.clone(), fast_policy());

        queue.enqueue(request("flaky")).await.unwrap();
        assert_eq!(spawner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let spawner = Arc::new(FlakySpawner {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let (queue, _task) = CreationQueue::spawn(spawner.clone(), fast_policy());

        let err = queue.enqueue(request("broken")).await.unwrap_err();
        assert!(matches!(err, CreateError::Exhausted { attempts: 3, .. }));
        assert_eq!(spawner.calls.load(Ordering::SeqCst), 3);

        // The queue keeps serving after a failure.
        let spawner_calls_before = spawner.calls.load(Ordering::SeqCst);
        let _ = queue.enqueue(request("next")).await;
        assert_eq!(spawner.calls.load(Ordering::SeqCst), spawner_calls_before + 3);
    }

    #[tokio::test]
    async fn duplicate_ids_are_not_retried() {
        let spawner = Arc::new(DuplicateSpawner {
            calls: AtomicU32::new(0),
        });
        let (queue, _task) = CreationQueue::spawn(spawner.clone(), fast_policy());

        let err = queue.enqueue(request("dup")).await.unwrap_err();
        assert!(matches!(err, CreateError::Rejected(SessionError::AlreadyExists(_))));
        assert_eq!(spawner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stopped_consumer_reports_queue_closed() {
        let spawner = Arc::new(RecordingSpawner::default());
        let (queue, task) = CreationQueue::spawn(spawner, fast_policy());
        task.abort();
        let _ = task.await;

        let err = queue.enqueue(request("late")).await.unwrap_err();
        assert!(matches!(err, CreateError::QueueClosed));
    }

    #[test]
    fn policy_follows_config() {
        let policy = RetryPolicy::from(&CreationConfig {
            max_attempts: 0,
            retry_backoff_ms: 250,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff, Duration::from_millis(250));
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }
}
