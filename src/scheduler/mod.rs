//! Scheduler and worker protocol core.
//!
//! Grounded in `examples/original_source/internal/worker/scheduler.go`: the
//! original wires a bounded channel of `JobRequest`s fanned out by
//! `ScheduleSnapshot` and drained by `schedule()`, but leaves job ids,
//! tokens, persistence, and the abandonment sweep as `// TODO`s. This module
//! fills those in: a full job state machine, an at-most-once re-delivery /
//! abandonment policy, and capability-token scoping (`token` submodule).

mod token;

pub use token::CapabilityToken;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::archiver::ArchiverSpec;
use crate::error::{Error, ErrorKind, Result};
use crate::index::Index;
use crate::library::MountedLibrary;
use crate::snapshot::ArtifactManifest;

/// Bounded job-request queue capacity; `ScheduleSnapshot` blocks once it fills,
/// giving the scheduler natural backpressure.
const JOB_QUEUE_CAPACITY: usize = 32;

/// Job time-to-live: `deadline = now + 30 min`.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Requested,
    Accepted,
    Started,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Scheduler-internal entity describing one archiver invocation against
/// one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub library: String,
    pub url: String,
    pub origin: String,
    pub snapshot_id: String,
    pub archiver_spec: ArchiverSpec,
    pub status: JobStatus,
    pub deadline: DateTime<Utc>,
    pub requested: DateTime<Utc>,
    pub accepted: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// What a worker receives from `GET /api/v1/jobs`: the job plus the
/// archiver it should run and the capability token scoping its writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub token: String,
    pub archiver: ArchiverSpec,
    pub job: Job,
}

/// A named bundle of `(library, [archiver-spec...])` a source can archive under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub library: String,
    pub archivers: Vec<ArchiverSpec>,
}

/// Policy for jobs pulled but never reported past `accepted` by their
/// deadline. The original is ambivalent about the right default; this
/// crate exposes both behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbandonedJobPolicy {
    /// Re-create the job with a fresh id and token (matches the state
    /// machine's "at-most-once re-delivery" language and the original's
    /// scheduler loop behavior).
    #[default]
    ReEnqueue,
    /// Mark the job `failed` with an explicit abandonment error instead of
    /// re-scheduling it.
    Fail,
}

/// Accepts `ScheduleSnapshot` requests, fans out per-archiver job requests,
/// tracks their lifecycle, and reconciles completions into the in-memory
/// [`Index`]. One process may hold one `Scheduler` shared across the
/// worker HTTP API and the public read API.
pub struct Scheduler {
    requests_tx: mpsc::Sender<JobRequest>,
    requests_rx: Mutex<mpsc::Receiver<JobRequest>>,
    /// Fired whenever a request lands in the queue, so long-polling workers
    /// waiting in [`Self::get_job_request`] don't hold `requests_rx` locked
    /// for the whole poll window -- each waiter wakes, re-locks briefly to
    /// `try_recv`, and releases again if another waiter won the race.
    dispatched: Notify,
    inflight: Mutex<HashMap<Uuid, Job>>,
    secret: [u8; 32],
    libraries: HashMap<String, MountedLibrary>,
    index: Arc<Index>,
    abandoned_policy: AbandonedJobPolicy,
}

impl Scheduler {
    pub fn new(
        libraries: HashMap<String, MountedLibrary>,
        index: Arc<Index>,
        abandoned_policy: AbandonedJobPolicy,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let mut secret = [0u8; 32];
        {
            use rand::RngCore;
            rand::thread_rng().fill_bytes(&mut secret);
        }
        Self {
            requests_tx,
            requests_rx: Mutex::new(requests_rx),
            dispatched: Notify::new(),
            inflight: Mutex::new(HashMap::new()),
            secret,
            libraries,
            index,
            abandoned_policy,
        }
    }

    pub fn library(&self, id: &str) -> Option<&MountedLibrary> {
        self.libraries.get(id)
    }

    /// `ScheduleSnapshot(url, strategy)`: parses the URL,
    /// writes the snapshot shell with its header manifest, and enqueues one
    /// job request per archiver in the strategy.
    pub async fn schedule_snapshot(&self, url: &str, strategy: &Strategy) -> Result<(String, String)> {
        let parsed = url::Url::parse(url).map_err(|err| Error::invalid_argument(format!("bad url '{}': {}", url, err)))?;
        let origin = parsed
            .host_str()
            .ok_or_else(|| Error::invalid_argument(format!("url '{}' has no host", url)))?
            .to_string();

        let library = self
            .libraries
            .get(&strategy.library)
            .ok_or_else(|| Error::invalid_argument(format!("unknown library '{}'", strategy.library)))?;

        let snapshot_id = Utc::now().timestamp_millis().to_string();
        let now = Utc::now();

        let writer_handle = library
            .writer
            .as_ref()
            .ok_or_else(|| Error::invalid_argument(format!("library '{}' is read-only", strategy.library)))?;
        let mut writer = writer_handle.write_snapshot(&origin, &snapshot_id).await?;
        let header = ArtifactManifest::snapshot_header(url, &now.to_rfc3339());
        if let Err(err) = writer.write_artifact_manifest(header).await {
            writer.close().await.ok();
            return Err(err);
        }
        writer.close().await?;

        for archiver in &strategy.archivers {
            let job_id = Uuid::new_v4();
            let deadline = now + chrono::Duration::from_std(DEFAULT_JOB_TTL).unwrap();
            let token = CapabilityToken::mint(&self.secret, &origin, &snapshot_id, &job_id.to_string(), &strategy.library, deadline);

            let job = Job {
                id: job_id,
                library: strategy.library.clone(),
                url: url.to_string(),
                origin: origin.clone(),
                snapshot_id: snapshot_id.clone(),
                archiver_spec: archiver.clone(),
                status: JobStatus::Requested,
                deadline,
                requested: now,
                accepted: None,
                started: None,
                ended: None,
                error: None,
            };

            self.inflight.lock().await.insert(job_id, job.clone());

            let request = JobRequest { token, archiver: archiver.clone(), job };
            // §5: backpressure -- blocks the caller when the queue is full.
            self.requests_tx
                .send(request)
                .await
                .map_err(|_| Error::new(ErrorKind::InternalError, "job queue closed"))?;
            self.dispatched.notify_waiters();
        }

        Ok((origin, snapshot_id))
    }

    /// `GetJobRequest(ctx, filters)`: pops the next request, blocking until
    /// one is available or `cancel` fires. Filters are not yet used by any
    /// caller (no worker-capability matching implemented); the parameter
    /// exists so filtering can be added later without a breaking change.
    ///
    /// Many workers call this concurrently (spec.md §5's MPMC model), so the
    /// `requests_rx` lock is only ever held for a single non-blocking
    /// `try_recv`, never across the wait itself -- holding it across an
    /// `.await` would let one long-poller starve every other waiter for the
    /// whole poll window.
    pub async fn get_job_request(&self, cancel: &CancellationToken) -> Result<JobRequest> {
        loop {
            let notified = self.dispatched.notified();
            tokio::pin!(notified);
            // Register for notification before the try_recv so a request
            // that lands between the check and the wait still wakes us.
            notified.as_mut().enable();

            match self.requests_rx.lock().await.try_recv() {
                Ok(request) => return Ok(request),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return Err(Error::new(ErrorKind::InternalError, "job queue closed"));
                }
                Err(mpsc::error::TryRecvError::Empty) => {}
            }

            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return Err(Error::cancelled()),
            }
        }
    }

    /// `UpdateJob(job)`: overwrites the in-flight record; on a terminal
    /// transition, asynchronously re-indexes the snapshot, logging (not
    /// surfacing) indexing failures.
    pub async fn update_job(&self, job: Job) -> Result<()> {
        let terminal = job.status.is_terminal();
        let (library_id, origin, snapshot_id) = (job.library.clone(), job.origin.clone(), job.snapshot_id.clone());
        self.inflight.lock().await.insert(job.id, job);

        if terminal {
            if let Some(mounted) = self.libraries.get(&library_id) {
                let reader = mounted.reader.clone();
                let index = self.index.clone();
                tokio::spawn(async move {
                    if let Err(err) = index.index_snapshot(&library_id, &origin, &snapshot_id, reader.as_ref()).await {
                        tracing::warn!(%origin, %snapshot_id, error = %err, "failed to re-index snapshot after job completion");
                    }
                });
            }
        }
        Ok(())
    }

    /// Verifies a worker-presented token scopes `(origin, snapshot_id)` and
    /// returns the library id it authorizes writes against.
    pub fn authorize(&self, token: &str, origin: &str, snapshot_id: &str) -> Result<String> {
        CapabilityToken::verify(&self.secret, token, origin, snapshot_id)
    }

    /// Snapshot of all currently tracked jobs, for status/debug endpoints.
    pub async fn jobs(&self) -> Vec<Job> {
        self.inflight.lock().await.values().cloned().collect()
    }

    /// Scans `inflight` for jobs whose deadline has passed without
    /// reaching a terminal state, applying `abandoned_policy` to each
    /// Intended to be driven by a periodic background task (see `larch` binary).
    pub async fn sweep_deadlines(&self) {
        let now = Utc::now();
        let mut inflight = self.inflight.lock().await;
        let abandoned: Vec<Job> = inflight
            .values()
            .filter(|job| !job.status.is_terminal() && job.deadline < now)
            .cloned()
            .collect();

        for job in abandoned {
            tracing::warn!(job_id = %job.id, origin = %job.origin, snapshot_id = %job.snapshot_id, "job abandoned past deadline");
            match self.abandoned_policy {
                AbandonedJobPolicy::Fail => {
                    if let Some(tracked) = inflight.get_mut(&job.id) {
                        tracked.status = JobStatus::Failed;
                        tracked.ended = Some(now);
                        tracked.error = Some("abandoned: deadline exceeded".to_string());
                    }
                }
                AbandonedJobPolicy::ReEnqueue => {
                    inflight.remove(&job.id);
                    let new_id = Uuid::new_v4();
                    let archiver = job.archiver_spec.clone();
                    let deadline = now + chrono::Duration::from_std(DEFAULT_JOB_TTL).unwrap();
                    let token = CapabilityToken::mint(&self.secret, &job.origin, &job.snapshot_id, &new_id.to_string(), &job.library, deadline);
                    let mut fresh = Job {
                        id: new_id,
                        status: JobStatus::Requested,
                        deadline,
                        requested: now,
                        accepted: None,
                        started: None,
                        ended: None,
                        error: None,
                        ..job
                    };
                    let request = JobRequest { token, archiver, job: fresh.clone() };
                    match self.requests_tx.try_send(request) {
                        Ok(()) => self.dispatched.notify_waiters(),
                        Err(_) => {
                            // Queue is full: leave the deadline in the past
                            // (rather than `now + TTL`) so the very next
                            // sweep retries the send instead of waiting out
                            // a fresh TTL with no job in flight.
                            fresh.deadline = job.deadline;
                        }
                    }
                    inflight.insert(new_id, fresh);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::mock::MockArchiver;
    use crate::archiver::Archiver;
    use crate::library::DiskLibrary;

    fn libraries(dir: &std::path::Path) -> HashMap<String, MountedLibrary> {
        let mut map = HashMap::new();
        map.insert("disk".to_string(), MountedLibrary::read_write(Arc::new(DiskLibrary::new(dir))));
        map
    }

    #[tokio::test]
    async fn schedule_snapshot_fans_out_one_job_per_archiver() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(Index::new());
        let scheduler = Scheduler::new(libraries(dir.path()), index, AbandonedJobPolicy::default());

        let strategy = Strategy {
            library: "disk".to_string(),
            archivers: vec![ArchiverSpec::OpenGraph, ArchiverSpec::ArchiveOrg],
        };
        let (origin, snapshot_id) = scheduler.schedule_snapshot("https://example.org/", &strategy).await.unwrap();
        assert_eq!(origin, "example.org");

        let cancel = CancellationToken::new();
        let first = scheduler.get_job_request(&cancel).await.unwrap();
        let second = scheduler.get_job_request(&cancel).await.unwrap();

        assert_eq!(first.job.origin, "example.org");
        assert_eq!(first.job.snapshot_id, snapshot_id);
        assert_eq!(second.job.snapshot_id, snapshot_id);
        assert_ne!(first.job.id, second.job.id);
        assert_ne!(first.token, second.token);
    }

    #[tokio::test]
    async fn worker_lifecycle_drives_job_to_succeeded_and_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(Index::new());
        let scheduler = Scheduler::new(libraries(dir.path()), index.clone(), AbandonedJobPolicy::default());

        let strategy = Strategy { library: "disk".to_string(), archivers: vec![ArchiverSpec::OpenGraph] };
        let (origin, snapshot_id) = scheduler.schedule_snapshot("https://example.org/", &strategy).await.unwrap();

        let cancel = CancellationToken::new();
        let request = scheduler.get_job_request(&cancel).await.unwrap();

        let mut job = request.job.clone();
        job.status = JobStatus::Accepted;
        job.accepted = Some(Utc::now());
        scheduler.update_job(job.clone()).await.unwrap();

        job.status = JobStatus::Started;
        job.started = Some(Utc::now());
        scheduler.update_job(job.clone()).await.unwrap();

        let library = scheduler.library("disk").unwrap().clone();
        let mut writer = library.writer.as_ref().unwrap().write_snapshot(&origin, &snapshot_id).await.unwrap();
        MockArchiver { content_type: "text/html", body: b"hello" }
            .archive(&mut *writer, "https://example.org/")
            .await
            .unwrap();
        writer.close().await.unwrap();

        job.status = JobStatus::Succeeded;
        job.ended = Some(Utc::now());
        scheduler.update_job(job).await.unwrap();

        // Re-indexing is spawned asynchronously; yield until it lands.
        for _ in 0..50 {
            if index.get_snapshot(&origin, &snapshot_id).is_ok() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let snapshot = index.get_snapshot(&origin, &snapshot_id).unwrap();
        // 1 header manifest + 1 archiver-written artifact.
        assert_eq!(snapshot.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn authorize_rejects_mismatched_scope() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(Index::new());
        let scheduler = Scheduler::new(libraries(dir.path()), index, AbandonedJobPolicy::default());

        let strategy = Strategy { library: "disk".to_string(), archivers: vec![ArchiverSpec::OpenGraph] };
        scheduler.schedule_snapshot("https://example.org/", &strategy).await.unwrap();

        let cancel = CancellationToken::new();
        let request = scheduler.get_job_request(&cancel).await.unwrap();

        let err = scheduler.authorize(&request.token, "other.org", &request.job.snapshot_id).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn sweep_deadlines_reenqueues_same_archiver() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(Index::new());
        let scheduler = Scheduler::new(libraries(dir.path()), index, AbandonedJobPolicy::ReEnqueue);

        let strategy = Strategy { library: "disk".to_string(), archivers: vec![ArchiverSpec::ArchiveOrg] };
        scheduler.schedule_snapshot("https://example.org/", &strategy).await.unwrap();

        let cancel = CancellationToken::new();
        let original = scheduler.get_job_request(&cancel).await.unwrap();
        assert_eq!(original.archiver, ArchiverSpec::ArchiveOrg);
        assert_eq!(original.job.archiver_spec, ArchiverSpec::ArchiveOrg);

        // Force the deadline into the past without waiting out the real TTL.
        {
            let mut inflight = scheduler.inflight.lock().await;
            let tracked = inflight.get_mut(&original.job.id).unwrap();
            tracked.deadline = Utc::now() - chrono::Duration::seconds(1);
        }

        scheduler.sweep_deadlines().await;

        let reenqueued = scheduler.get_job_request(&cancel).await.unwrap();
        assert_ne!(reenqueued.job.id, original.job.id);
        assert_eq!(reenqueued.archiver, ArchiverSpec::ArchiveOrg);
        assert_eq!(reenqueued.job.archiver_spec, ArchiverSpec::ArchiveOrg);
    }

    #[tokio::test]
    async fn sweep_deadlines_leaves_deadline_past_when_queue_is_full() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(Index::new());
        let scheduler = Scheduler::new(libraries(dir.path()), index, AbandonedJobPolicy::ReEnqueue);

        // Fill the bounded queue so the re-enqueue's `try_send` fails.
        for _ in 0..JOB_QUEUE_CAPACITY {
            scheduler
                .requests_tx
                .try_send(JobRequest {
                    token: "filler".to_string(),
                    archiver: ArchiverSpec::OpenGraph,
                    job: Job {
                        id: Uuid::new_v4(),
                        library: "disk".to_string(),
                        url: "https://filler.example/".to_string(),
                        origin: "filler.example".to_string(),
                        snapshot_id: "0".to_string(),
                        archiver_spec: ArchiverSpec::OpenGraph,
                        status: JobStatus::Requested,
                        deadline: Utc::now(),
                        requested: Utc::now(),
                        accepted: None,
                        started: None,
                        ended: None,
                        error: None,
                    },
                })
                .unwrap();
        }

        // The queue is now full. Insert a synthetic abandoned job directly
        // into `inflight` (bypassing `schedule_snapshot`, whose own send
        // would simply block until space freed up) and sweep it.
        let past = Utc::now() - chrono::Duration::seconds(1);
        let job_id = Uuid::new_v4();
        let abandoned = Job {
            id: job_id,
            library: "disk".to_string(),
            url: "https://example.org/".to_string(),
            origin: "example.org".to_string(),
            snapshot_id: "1".to_string(),
            archiver_spec: ArchiverSpec::ArchiveOrg,
            status: JobStatus::Requested,
            deadline: past,
            requested: past,
            accepted: None,
            started: None,
            ended: None,
            error: None,
        };
        scheduler.inflight.lock().await.insert(job_id, abandoned);

        scheduler.sweep_deadlines().await;

        let inflight = scheduler.inflight.lock().await;
        let reenqueued = inflight.values().find(|j| j.origin == "example.org" && j.snapshot_id == "1").unwrap();
        assert!(reenqueued.deadline <= past, "a dropped re-enqueue must keep a past deadline so the next sweep retries it");
    }
}
