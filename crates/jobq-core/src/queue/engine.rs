//! Queue engine: enqueue, claim, run handlers, apply the retry policy.
//!
//! Flow of one poll cycle:
//! 1. one store transaction scans for eligible jobs and marks up to
//!    `batch_size` of them `InProgress` (claim)
//! 2. after commit, the handler runs once per claimed job, sequentially,
//!    outside any transaction
//! 3. each outcome is written back in its own transaction
//!
//! Cross-instance safety rests entirely on step 1 being transactional.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::TimeDelta;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::builder::QueueBuilder;
use super::codec;
use super::config::QueueConfig;
use super::handler::{JobContext, JobHandler};
use crate::domain::{Decision, Job, JobId, JobState};
use crate::error::QueueError;
use crate::observability::QueueCounts;
use crate::ports::{Clock, IdGenerator, Store, StoreTx, for_each_entry};

/// Entries fetched per scan round trip.
const SCAN_PAGE: usize = 128;

/// `last_error` of a job killed because its lease ran out on the last attempt.
pub const LEASE_EXPIRED: &str = "lease expired";

/// Bounds for job payloads: stored as JSON, moved between threads.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Persistent retryable job queue over a [`Store`].
///
/// Cheap to clone; clones share the store and the enqueue notifier, so one
/// clone can `add` while another `run`s. Several independent instances may
/// share one durable store.
pub struct Queue<P, S> {
    store: Arc<S>,
    config: Arc<QueueConfig>,
    lease: Option<TimeDelta>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    notify: Arc<Notify>,
    _payload: PhantomData<fn() -> P>,
}

impl<P, S> Clone for Queue<P, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            lease: self.lease,
            clock: Arc::clone(&self.clock),
            ids: Arc::clone(&self.ids),
            notify: Arc::clone(&self.notify),
            _payload: PhantomData,
        }
    }
}

impl<P: Payload, S: Store> Queue<P, S> {
    /// Queue with the given config, system clock and ULID ids.
    pub fn new(store: Arc<S>, config: QueueConfig) -> Result<Self, QueueError> {
        QueueBuilder::new(store).config(config).build()
    }

    pub fn builder(store: Arc<S>) -> QueueBuilder<P, S> {
        QueueBuilder::new(store)
    }

    pub(crate) fn from_parts(
        store: Arc<S>,
        config: QueueConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let lease = config.lease()?;
        Ok(Self {
            store,
            config: Arc::new(config),
            lease,
            clock,
            ids,
            notify: Arc::new(Notify::new()),
            _payload: PhantomData,
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Run `f` in one store transaction on the blocking pool.
    async fn transact<R, F>(&self, f: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn StoreTx) -> Result<R, QueueError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.transaction(f)).await?
    }

    /// Like `transact`, for closures that never write.
    async fn read<R, F>(&self, f: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn StoreTx) -> Result<R, QueueError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.read(f)).await?
    }

    /// Durably enqueue a new `Available` job.
    pub async fn add(&self, payload: P) -> Result<JobId, QueueError> {
        let id = self.ids.next_id()?;
        let bytes = codec::encode(&Job::new(id, payload))?;
        let key = id.key();
        self.transact(move |tx| {
            tx.put(&key, &bytes)?;
            Ok(())
        })
        .await?;

        self.notify.notify_one();
        debug!(job_id = %id, "job enqueued");
        Ok(id)
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job<P>>, QueueError> {
        let key = id.key();
        self.read(move |tx| match tx.get(&key)? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        })
        .await
    }

    /// Number of stored records in any state, `Dead` included. Full scan;
    /// meant for diagnostics.
    pub async fn length(&self) -> Result<usize, QueueError> {
        self.read(|tx| {
            let mut len = 0;
            for_each_entry::<QueueError, _>(tx, SCAN_PAGE, |_, _| {
                len += 1;
                Ok(())
            })?;
            Ok(len)
        })
        .await
    }

    /// Stored records per state. Full scan.
    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        self.read(|tx| {
            let mut counts = QueueCounts::default();
            for_each_entry::<QueueError, _>(tx, SCAN_PAGE, |_, bytes| {
                counts.record(codec::decode_meta(bytes)?.state);
                Ok(())
            })?;
            Ok(counts)
        })
        .await
    }

    /// All `Dead` jobs, oldest first.
    pub async fn dead_jobs(&self) -> Result<Vec<Job<P>>, QueueError> {
        self.read(|tx| {
            let mut dead = Vec::new();
            for_each_entry::<QueueError, _>(tx, SCAN_PAGE, |_, bytes| {
                if codec::decode_meta(bytes)?.state == JobState::Dead {
                    dead.push(codec::decode(bytes)?);
                }
                Ok(())
            })?;
            Ok(dead)
        })
        .await
    }

    /// Remove a terminal (`Dead` or `Done`) job.
    pub async fn purge(&self, id: JobId) -> Result<(), QueueError> {
        let key = id.key();
        self.transact(move |tx| {
            let bytes = tx.get(&key)?.ok_or(QueueError::NotFound(id))?;
            let state = codec::decode_meta(&bytes)?.state;
            if !state.is_terminal() {
                return Err(QueueError::NotTerminal(id, state));
            }
            tx.delete(&key)?;
            Ok(())
        })
        .await?;

        info!(job_id = %id, "job purged");
        Ok(())
    }

    /// Remove every `Dead` job; returns how many were removed.
    pub async fn purge_dead(&self) -> Result<usize, QueueError> {
        let purged = self
            .transact(|tx| {
                let mut keys = Vec::new();
                for_each_entry::<QueueError, _>(tx, SCAN_PAGE, |key, bytes| {
                    if codec::decode_meta(bytes)?.state == JobState::Dead {
                        keys.push(key.to_owned());
                    }
                    Ok(())
                })?;
                for key in &keys {
                    tx.delete(key)?;
                }
                Ok(keys.len())
            })
            .await?;

        info!(purged, "dead jobs purged");
        Ok(purged)
    }

    /// Claim up to `batch_size` eligible jobs in one transaction.
    ///
    /// A job whose lease expired has already used an attempt; if that was its
    /// last one (or its lifetime is spent) it is marked `Dead` here instead of
    /// being claimed again.
    async fn claim(&self) -> Result<Vec<Job<P>>, QueueError> {
        let now = self.clock.now();
        let lease = self.lease;
        let limit = self.config.batch_size;
        let config = Arc::clone(&self.config);

        let (claimed, expired) = self
            .transact(move |tx| {
                let mut claimed = Vec::new();
                let mut expired = Vec::new();
                let mut cursor: Option<String> = None;
                'scan: loop {
                    let page = tx.scan(cursor.as_deref(), SCAN_PAGE)?;
                    let exhausted = page.len() < SCAN_PAGE;
                    for (key, bytes) in page {
                        // payload is only decoded for jobs we are about to touch
                        let meta = codec::decode_meta(&bytes)?;
                        if meta.is_eligible(now) {
                            let mut job: Job<P> = codec::decode(&bytes)?;
                            let spent = match job.state {
                                JobState::InProgress => {
                                    config.retry.exhausted(job.attempts, job.started_at, now)
                                }
                                _ => None,
                            };
                            match spent {
                                Some(reason) => {
                                    job.fail(LEASE_EXPIRED.to_string(), Decision::Dead(reason));
                                    tx.put(&key, &codec::encode(&job)?)?;
                                    expired.push((job.id, job.attempts, reason));
                                }
                                None => {
                                    job.claim(now, lease);
                                    tx.put(&key, &codec::encode(&job)?)?;
                                    claimed.push(job);
                                    if claimed.len() >= limit {
                                        break 'scan;
                                    }
                                }
                            }
                        }
                        cursor = Some(key);
                    }
                    if exhausted {
                        break;
                    }
                }
                Ok((claimed, expired))
            })
            .await?;

        for (id, attempt, reason) in expired {
            warn!(job_id = %id, attempt, %reason, "lease expired with no retry budget left; job is dead");
        }
        Ok(claimed)
    }

    /// Run the handler for one claimed job and persist the outcome.
    async fn process<H>(
        &self,
        handler: &H,
        ctx: &JobContext,
        mut job: Job<P>,
    ) -> Result<(), QueueError>
    where
        H: JobHandler<P> + ?Sized,
    {
        let span = info_span!("job", job_id = %job.id, attempt = job.attempts);
        let outcome = handler.handle(ctx, &job).instrument(span).await;

        let id = job.id;
        let key = id.key();
        let attempt = job.attempts;
        let succeeded = outcome.is_ok();

        let update = match outcome {
            Ok(()) => {
                if self.config.keep_completed {
                    job.complete();
                    Some(codec::encode(&job)?)
                } else {
                    None
                }
            }
            Err(err) => {
                let now = self.clock.now();
                let decision =
                    self.config
                        .retry
                        .decide(job.attempts, job.started_at, now, &mut rand::thread_rng());
                job.fail(err.to_string(), decision);
                match decision {
                    Decision::Scheduled(at) => {
                        debug!(job_id = %id, attempt, error = %err, retry_at = %at, "job failed, retry scheduled");
                    }
                    Decision::Dead(reason) => {
                        warn!(job_id = %id, attempt, error = %err, %reason, "job failed permanently");
                    }
                }
                Some(codec::encode(&job)?)
            }
        };

        let applied = self
            .transact(move |tx| {
                if !still_claimed(tx, &key, attempt)? {
                    return Ok(false);
                }
                match update {
                    Some(bytes) => tx.put(&key, &bytes)?,
                    None => {
                        tx.delete(&key)?;
                    }
                }
                Ok(true)
            })
            .await?;

        if !applied {
            warn!(job_id = %id, attempt, "job was reclaimed while running; outcome discarded");
        } else if succeeded {
            info!(job_id = %id, attempt, "job completed");
        }
        Ok(())
    }

    /// One poll cycle: claim a batch and process it. Returns the batch size.
    pub async fn run_once<H>(&self, handler: &H, ctx: &JobContext) -> Result<usize, QueueError>
    where
        H: JobHandler<P> + ?Sized,
    {
        let batch = self.claim().await?;
        let claimed = batch.len();
        if claimed > 0 {
            debug!(claimed, "claimed batch");
        }
        for job in batch {
            self.process(handler, ctx, job).await?;
        }
        Ok(claimed)
    }

    /// Poll until `cancel` fires or the store fails.
    ///
    /// Cancellation is observed between batches, never inside one: every
    /// claimed job is processed before `run` returns `Ok`.
    pub async fn run<H>(&self, handler: &H, cancel: CancellationToken) -> Result<(), QueueError>
    where
        H: JobHandler<P> + ?Sized,
    {
        info!(
            store = self.store.name(),
            batch_size = self.config.batch_size,
            "queue worker started"
        );
        let ctx = JobContext::new(cancel.clone());

        while !cancel.is_cancelled() {
            let claimed = match self.run_once(handler, &ctx).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(error = %e, "queue worker stopped on store failure");
                    return Err(e);
                }
            };
            if claimed == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = self.notify.notified() => {}
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!("queue worker stopped");
        Ok(())
    }
}

/// Is the stored record still the claim we hold?
fn still_claimed(tx: &mut dyn StoreTx, key: &str, attempt: u32) -> Result<bool, QueueError> {
    let Some(bytes) = tx.get(key)? else {
        return Ok(false);
    };
    let current = codec::decode_meta(&bytes)?;
    Ok(current.state == JobState::InProgress && current.attempts == attempt)
}
