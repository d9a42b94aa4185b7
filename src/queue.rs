//! Bounded background embedding queue.
//!
//! Saves hand their [`EmbeddingJob`] to [`EmbeddingQueue::submit`], which
//! never waits: jobs go into a bounded channel and a single dispatcher task
//! runs them through [`DocumentEmbedder`] with at most `workers` in flight.
//! When the channel is full the job is dropped with a warning and the
//! document stays pending.
//!
//! A [`Sweeper`] picks pending documents back up: on start and then on a
//! fixed interval it feeds [`Store::pending_embeddings`] through
//! [`EmbeddingQueue::sweep`], which skips jobs already queued or running.
//! `lsv embed pending` does the same work from the CLI.
//!
//! Each submit returns a [`JobHandle`]. Callers that don't care drop it;
//! tests await it.
//!
//! Shutdown: stop the sweeper, then once every [`EmbeddingQueue`] clone is
//! dropped the channel closes, the dispatcher finishes the jobs already
//! queued, and [`QueueDrain::wait`] returns.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use lucentsave_core::embedder::{DocumentEmbedder, EmbedError, EmbedOutcome};
use lucentsave_core::models::{DocumentId, EmbeddingJob};
use lucentsave_core::store::Store;

type Reply = oneshot::Sender<Result<EmbedOutcome, EmbedError>>;

struct Queued {
    job: EmbeddingJob,
    reply: Reply,
}

/// `(document, revision)` pairs queued or in flight.
#[derive(Clone, Default)]
struct Tracked(Arc<Mutex<HashSet<(DocumentId, i64)>>>);

impl Tracked {
    fn lock(&self) -> MutexGuard<'_, HashSet<(DocumentId, i64)>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, job: &EmbeddingJob) {
        self.lock().insert((job.document_id, job.revision));
    }

    fn remove(&self, job: &EmbeddingJob) {
        self.lock().remove(&(job.document_id, job.revision));
    }

    fn contains(&self, job: &EmbeddingJob) -> bool {
        self.lock().contains(&(job.document_id, job.revision))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The queue was full or shutting down; the job never ran.
    #[error("embedding queue rejected the job")]
    Rejected,
    /// The worker went away without reporting.
    #[error("embedding job was cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] EmbedError),
}

/// Awaitable result of one submitted job.
#[derive(Debug)]
pub struct JobHandle {
    rx: Option<oneshot::Receiver<Result<EmbedOutcome, EmbedError>>>,
}

impl JobHandle {
    fn rejected() -> Self {
        Self { rx: None }
    }

    /// Whether the job made it into the queue.
    pub fn is_accepted(&self) -> bool {
        self.rx.is_some()
    }

    pub async fn wait(self) -> Result<EmbedOutcome, JobError> {
        let rx = self.rx.ok_or(JobError::Rejected)?;
        match rx.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(JobError::Cancelled),
        }
    }
}

/// Sending side of the queue. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingQueue {
    tx: mpsc::Sender<Queued>,
    tracked: Tracked,
}

/// Completion handle for the dispatcher task.
pub struct QueueDrain {
    dispatcher: JoinHandle<()>,
}

impl QueueDrain {
    /// Wait for queued and in-flight jobs to finish. Returns once every
    /// [`EmbeddingQueue`] clone has been dropped.
    pub async fn wait(self) {
        if let Err(e) = self.dispatcher.await {
            warn!(error = %e, "embedding dispatcher ended abnormally");
        }
    }
}

impl EmbeddingQueue {
    /// Spawn the dispatcher on the current runtime.
    pub fn start(
        embedder: DocumentEmbedder,
        workers: usize,
        capacity: usize,
    ) -> (Self, QueueDrain) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let tracked = Tracked::default();
        let dispatcher = tokio::spawn(dispatch(rx, embedder, workers.max(1), tracked.clone()));
        (Self { tx, tracked }, QueueDrain { dispatcher })
    }

    /// Enqueue `job` without waiting.
    pub fn submit(&self, job: EmbeddingJob) -> JobHandle {
        let document_id = job.document_id;
        self.tracked.insert(&job);
        let (reply, rx) = oneshot::channel();
        match self.tx.try_send(Queued { job, reply }) {
            Ok(()) => {
                debug!(document_id, "queued document for embedding");
                JobHandle { rx: Some(rx) }
            }
            Err(mpsc::error::TrySendError::Full(queued)) => {
                self.tracked.remove(&queued.job);
                warn!(document_id, "embedding queue full; document left pending");
                JobHandle::rejected()
            }
            Err(mpsc::error::TrySendError::Closed(queued)) => {
                self.tracked.remove(&queued.job);
                warn!(document_id, "embedding queue closed; document left pending");
                JobHandle::rejected()
            }
        }
    }

    /// Queue up to `limit` documents whose embedding is missing or stale.
    ///
    /// Jobs already queued or running are skipped. Stops at the first
    /// rejection, since a full queue will reject the rest too. Returns the
    /// number of jobs accepted.
    pub async fn sweep(&self, store: &dyn Store, limit: usize) -> anyhow::Result<usize> {
        let mut accepted = 0;
        for job in store.pending_embeddings(limit).await? {
            if self.tracked.contains(&job) {
                continue;
            }
            if !self.submit(job).is_accepted() {
                break;
            }
            accepted += 1;
        }
        Ok(accepted)
    }
}

/// Periodic [`EmbeddingQueue::sweep`] task.
pub struct Sweeper {
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Sweep once immediately, then every `every`, up to `batch` jobs each.
    pub fn start(
        queue: EmbeddingQueue,
        store: Arc<dyn Store>,
        every: Duration,
        batch: usize,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match queue.sweep(store.as_ref(), batch).await {
                    Ok(0) => {}
                    Ok(queued) => info!(queued, "re-queued documents awaiting embeddings"),
                    Err(e) => {
                        let detail = format!("{:#}", e);
                        warn!(error = %detail, "embedding sweep failed");
                    }
                }
            }
        });
        Self { task }
    }

    /// Stop sweeping and release the sweeper's queue handle.
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<Queued>,
    embedder: DocumentEmbedder,
    workers: usize,
    tracked: Tracked,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();

    while let Some(Queued { job, reply }) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let embedder = embedder.clone();
        let tracked = tracked.clone();
        running.spawn(async move {
            let result = embedder.embed_document(&job).await;
            tracked.remove(&job);
            drop(permit);
            // receiver may have been dropped; outcome is already logged
            let _ = reply.send(result);
        });
        while running.try_join_next().is_some() {}
    }

    while running.join_next().await.is_some() {}
    debug!("embedding dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lucentsave_core::embedding::{EmbeddingClient, EmbeddingProvider};
    use lucentsave_core::models::NewDocument;
    use lucentsave_core::store::memory::InMemoryStore;
    use lucentsave_core::store::Store;
    use lucentsave_core::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps a little per call and records peak concurrency.
    struct SlowProvider {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    async fn setup(
        workers: usize,
        capacity: usize,
    ) -> (Arc<InMemoryStore>, Arc<SlowProvider>, EmbeddingQueue, QueueDrain) {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(SlowProvider {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let client = EmbeddingClient::new(provider.clone(), 1000);
        let embedder = DocumentEmbedder::new(client, store.clone());
        let (queue, drain) = EmbeddingQueue::start(embedder, workers, capacity);
        (store, provider, queue, drain)
    }

    async fn job(store: &InMemoryStore, n: usize) -> EmbeddingJob {
        store
            .save_document(&NewDocument {
                owner_id: 1,
                url: format!("https://example.com/{}", n),
                title: format!("t{}", n),
                body: "body".to_string(),
                created_at: n as i64,
            })
            .await
            .unwrap()
            .embedding_job()
    }

    #[tokio::test]
    async fn test_handle_reports_outcome() {
        let (store, _provider, queue, drain) = setup(2, 8).await;
        let handle = queue.submit(job(&store, 1).await);
        assert!(handle.is_accepted());
        assert_eq!(handle.wait().await.unwrap(), EmbedOutcome::Stored);
        drop(queue);
        drain.wait().await;
        assert_eq!(store.embedding_writes(), 1);
    }

    #[tokio::test]
    async fn test_worker_limit_respected() {
        // one document fans out into three field calls
        let (store, provider, queue, drain) = setup(2, 16).await;
        let mut handles = Vec::new();
        for n in 0..6 {
            handles.push(queue.submit(job(&store, n).await));
        }
        for h in handles {
            h.wait().await.unwrap();
        }
        drop(queue);
        drain.wait().await;
        assert!(provider.peak.load(Ordering::SeqCst) <= 2 * 3);
        assert_eq!(store.embedding_writes(), 6);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let (store, _provider, queue, drain) = setup(1, 1).await;
        let mut handles = Vec::new();
        for n in 0..10 {
            handles.push(queue.submit(job(&store, n).await));
        }
        assert!(handles.iter().any(|h| !h.is_accepted()));

        let mut rejected = 0;
        for h in handles {
            if let Err(JobError::Rejected) = h.wait().await {
                rejected += 1;
            }
        }
        assert!(rejected > 0);
        drop(queue);
        drain.wait().await;
        assert_eq!(store.pending_embeddings(100).await.unwrap().len(), rejected);
    }

    #[tokio::test]
    async fn test_drain_finishes_queued_jobs() {
        let (store, _provider, queue, drain) = setup(1, 8).await;
        for n in 0..4 {
            queue.submit(job(&store, n).await);
        }
        drop(queue);
        drain.wait().await;
        assert_eq!(store.embedding_writes(), 4);
    }

    #[tokio::test]
    async fn test_sweep_skips_jobs_in_flight() {
        let (store, _provider, queue, drain) = setup(1, 8).await;
        let handle = queue.submit(job(&store, 1).await);
        assert_eq!(queue.sweep(store.as_ref(), 10).await.unwrap(), 0);

        handle.wait().await.unwrap();
        assert_eq!(queue.sweep(store.as_ref(), 10).await.unwrap(), 0);
        drop(queue);
        drain.wait().await;
        assert_eq!(store.embedding_writes(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_recovers_rejected_jobs() {
        let (store, _provider, queue, drain) = setup(1, 1).await;
        let mut rejected = 0;
        for n in 0..10 {
            if !queue.submit(job(&store, n).await).is_accepted() {
                rejected += 1;
            }
        }
        assert!(rejected > 0);

        let sweeper = Sweeper::start(queue.clone(), store.clone(), Duration::from_millis(10), 1);
        for _ in 0..500 {
            if store.pending_embeddings(100).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweeper.stop().await;
        drop(queue);
        drain.wait().await;

        assert!(store.pending_embeddings(100).await.unwrap().is_empty());
        assert_eq!(store.embedding_writes(), 10);
    }
}
