//! Train → Reindex jobs.
//!
//! Uploads are persisted to the corpus directory and queued; a single worker
//! task runs one job at a time in submission order, so training runs never
//! overlap and a reindex always reads the dump of the run before it.
//!
//! ```text
//!            submit ──► pending ──► training ──► reindexing ──► done
//!                          │            │             │
//!                          └────────────┴─────────────┴──────► failed
//! ```

use axum::body::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use observability::PhraseMetrics;
use std::collections::HashMap;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PhraseError, PhraseResult};
use crate::models::{JobState, JobStatus, ReindexReport, TrainAccepted};
use crate::process::cancelled;
use crate::reindex::Reindexer;
use crate::trainer::Trainer;

pub const ACCEPTED_MESSAGE: &str = "Body saved successfully";

struct QueuedJob {
    id: Uuid,
    corpus: PathBuf,
}

struct PipelineState {
    trainer: Arc<dyn Trainer>,
    reindexer: Arc<Reindexer>,
    config: PipelineConfig,
    jobs: RwLock<HashMap<Uuid, JobStatus>>,
    /// Queued plus running jobs
    pending: AtomicUsize,
    shutdown: watch::Sender<bool>,
}

/// Accepts training uploads and runs them through the pipeline.
#[derive(Clone)]
pub struct PipelineController {
    state: Arc<PipelineState>,
    queue: mpsc::UnboundedSender<QueuedJob>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PipelineController {
    /// Create the controller and start its worker on the current runtime.
    pub fn new(
        trainer: Arc<dyn Trainer>,
        reindexer: Arc<Reindexer>,
        config: PipelineConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let state = Arc::new(PipelineState {
            trainer,
            reindexer,
            config,
            jobs: RwLock::new(HashMap::new()),
            pending: AtomicUsize::new(0),
            shutdown,
        });

        let (queue, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(Arc::clone(&state), receiver));

        Self {
            state,
            queue,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Persist `body` as a corpus and queue a job for it.
    ///
    /// Fails with `Busy` when `max_pending_jobs` jobs are already queued or
    /// running, and with `PayloadTooLarge` once the body passes
    /// `max_corpus_bytes`; in both cases nothing is left on disk.
    pub async fn submit<S, E>(&self, body: S) -> PhraseResult<TrainAccepted>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: Display + Send,
    {
        if *self.state.shutdown.borrow() {
            return Err(PhraseError::Cancelled("training request".to_string()));
        }
        self.state.reserve_slot()?;

        let id = Uuid::now_v7();
        let corpus = match self.state.persist_corpus(id, body).await {
            Ok(corpus) => corpus,
            Err(e) => {
                self.state.release_slot();
                return Err(e);
            }
        };

        let status = JobStatus::pending(id, corpus.display().to_string());
        self.state.jobs.write().await.insert(id, status);
        PhraseMetrics::record_job_transition(JobState::Pending.as_str());
        info!(job_id = %id, corpus = %corpus.display(), "Training job queued");

        let queued = QueuedJob {
            id,
            corpus: corpus.clone(),
        };
        if self.queue.send(queued).is_err() {
            let err = PhraseError::Cancelled("training request".to_string());
            let message = err.to_string();
            self.state
                .finish(id, &corpus, Err(PhraseError::Cancelled("training job".to_string())))
                .await;
            return Err(PhraseError::Cancelled(message));
        }

        Ok(TrainAccepted {
            message: ACCEPTED_MESSAGE.to_string(),
            file: corpus.display().to_string(),
            job_id: id,
        })
    }

    pub async fn job(&self, id: Uuid) -> PhraseResult<JobStatus> {
        self.state
            .jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(PhraseError::JobNotFound(id))
    }

    /// Known jobs, newest first.
    pub async fn jobs(&self) -> Vec<JobStatus> {
        let mut jobs: Vec<JobStatus> = self.state.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        jobs
    }

    pub fn pending_jobs(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Cancel the running job, fail the queued ones and wait for the worker.
    pub async fn shutdown(&self) {
        self.state.shutdown.send_replace(true);

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Pipeline worker panicked");
            }
        }
        info!("Pipeline stopped");
    }
}

async fn run_worker(state: Arc<PipelineState>, mut queue: mpsc::UnboundedReceiver<QueuedJob>) {
    let mut cancel = state.shutdown.subscribe();

    loop {
        let job = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let outcome = state.execute(job.id, &job.corpus, cancel.clone()).await;
        state.finish(job.id, &job.corpus, outcome).await;
    }

    queue.close();
    while let Ok(job) = queue.try_recv() {
        state
            .finish(
                job.id,
                &job.corpus,
                Err(PhraseError::Cancelled("training job".to_string())),
            )
            .await;
    }
}

impl PipelineState {
    fn reserve_slot(&self) -> PhraseResult<()> {
        let limit = self.config.max_pending_jobs;
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .map(|n| PhraseMetrics::set_pending_jobs(n + 1))
            .map_err(PhraseError::Busy)
    }

    fn release_slot(&self) {
        let previous = self.pending.fetch_sub(1, Ordering::SeqCst);
        PhraseMetrics::set_pending_jobs(previous.saturating_sub(1));
    }

    async fn persist_corpus<S, E>(&self, id: Uuid, body: S) -> PhraseResult<PathBuf>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: Display + Send,
    {
        tokio::fs::create_dir_all(&self.config.corpus_dir).await?;
        let path = self.config.corpus_dir.join(format!("corpus-{}.txt", id));

        match write_capped(&path, body, self.config.max_corpus_bytes).await {
            Ok(bytes) => {
                info!(job_id = %id, bytes, "Corpus saved");
                Ok(path)
            }
            Err(e) => {
                remove_corpus(&path).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        id: Uuid,
        corpus: &Path,
        mut cancel: watch::Receiver<bool>,
    ) -> PhraseResult<ReindexReport> {
        self.transition(id, JobState::Training).await;
        self.trainer.train(corpus, cancel.clone()).await?;

        if *cancel.borrow() {
            return Err(PhraseError::Cancelled("training job".to_string()));
        }

        self.transition(id, JobState::Reindexing).await;
        tokio::select! {
            report = self.reindexer.reindex() => report,
            _ = cancelled(&mut cancel) => Err(PhraseError::Cancelled("reindex".to_string())),
        }
    }

    async fn transition(&self, id: Uuid, state: JobState) {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            job.state = state;
            if job.started_at.is_none() {
                job.started_at = Some(Utc::now());
            }
        }
        PhraseMetrics::record_job_transition(state.as_str());
        info!(job_id = %id, state = %state, "Training job state changed");
    }

    async fn finish(&self, id: Uuid, corpus: &Path, outcome: PhraseResult<ReindexReport>) {
        remove_corpus(corpus).await;

        let state = {
            let mut jobs = self.jobs.write().await;
            let state = match jobs.get_mut(&id) {
                Some(job) => {
                    job.finished_at = Some(Utc::now());
                    match outcome {
                        Ok(report) => {
                            job.state = JobState::Done;
                            job.report = Some(report);
                        }
                        Err(e) => {
                            error!(job_id = %id, error = %e, "Training job failed");
                            job.state = JobState::Failed;
                            job.error = Some(e.to_string());
                        }
                    }
                    Some(job.state)
                }
                None => None,
            };
            prune_history(&mut jobs, self.config.job_history_limit);
            state
        };

        if let Some(state) = state {
            PhraseMetrics::record_job_transition(state.as_str());
            info!(job_id = %id, state = %state, "Training job finished");
        }
        self.release_slot();
    }
}

/// Stream `body` into a new file at `path`, failing once it passes `limit` bytes.
async fn write_capped<S, E>(path: &Path, mut body: S, limit: u64) -> PhraseResult<u64>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
    E: Display + Send,
{
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            PhraseError::Validation(format!("Failed to read request body: {}", e))
        })?;
        written += chunk.len() as u64;
        if written > limit {
            return Err(PhraseError::PayloadTooLarge { limit });
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

async fn remove_corpus(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(corpus = %path.display(), error = %e, "Failed to remove corpus"),
    }
}

/// Drop the oldest finished jobs beyond `limit`; unfinished jobs always stay.
fn prune_history(jobs: &mut HashMap<Uuid, JobStatus>, limit: usize) {
    if jobs.len() <= limit {
        return;
    }

    let mut finished: Vec<Uuid> = jobs
        .values()
        .filter(|job| job.state.is_terminal())
        .map(|job| job.id)
        .collect();
    finished.sort();

    let excess = jobs.len() - limit;
    for id in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
}
