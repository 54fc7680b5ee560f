//! Background download tracking
//!
//! Jobs started through `POST /jobs` record their progress here so clients
//! can poll `GET /jobs/:id` instead of waiting on one long request.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use crate::fetch::ProgressObserver;
use crate::models::{DownloadProgress, JobState, JobStatus};

/// Finished jobs kept for polling unless configured otherwise
pub const DEFAULT_JOB_HISTORY: usize = 200;

/// Shared table of job snapshots, keyed by id
///
/// Queued and running jobs stay until they finish. Only the most recent
/// `history` finished jobs are kept; older ones are evicted.
#[derive(Debug, Clone)]
pub struct JobTable {
    jobs: Arc<DashMap<Uuid, JobStatus>>,
    finished: Arc<Mutex<VecDeque<Uuid>>>,
    history: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::with_history(DEFAULT_JOB_HISTORY)
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `history` finished jobs
    pub fn with_history(history: usize) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            finished: Arc::new(Mutex::new(VecDeque::new())),
            history,
        }
    }

    /// Register a queued job and return its id
    pub fn insert(&self, status: JobStatus) -> Uuid {
        let id = status.id;
        self.jobs.insert(id, status);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<JobStatus> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// All jobs, in no particular order
    pub fn list(&self) -> Vec<JobStatus> {
        self.jobs.iter().map(|entry| entry.value().clone()).collect()
    }

    fn update(&self, id: &Uuid, f: impl FnOnce(&mut JobStatus)) {
        if let Some(mut entry) = self.jobs.get_mut(id) {
            f(entry.value_mut());
        }
    }

    pub fn mark_running(&self, id: &Uuid) {
        self.update(id, |s| s.state = JobState::Running);
    }

    pub fn mark_completed(&self, id: &Uuid, elapsed_seconds: f64) {
        self.update(id, |s| {
            s.state = JobState::Completed;
            s.percent = Some(100.0);
            s.elapsed_seconds = Some(elapsed_seconds);
        });
        self.retire(*id);
    }

    pub fn mark_failed(&self, id: &Uuid, error: impl Into<String>, elapsed_seconds: f64) {
        let error = error.into();
        self.update(id, |s| {
            s.state = JobState::Failed;
            s.error = Some(error);
            s.elapsed_seconds = Some(elapsed_seconds);
        });
        self.retire(*id);
    }

    /// Record a finished job, evicting the oldest finished ones past `history`
    fn retire(&self, id: Uuid) {
        let mut finished = match self.finished.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        finished.push_back(id);
        while finished.len() > self.history {
            if let Some(old) = finished.pop_front() {
                self.jobs.remove(&old);
                tracing::debug!(id = %old, "evicted finished job");
            }
        }
    }

    /// Observer that writes a job's live percentage into the table
    pub fn observer(&self, id: Uuid) -> JobObserver {
        JobObserver {
            table: self.clone(),
            id,
        }
    }
}

/// Progress observer bound to one job
#[derive(Debug, Clone)]
pub struct JobObserver {
    table: JobTable,
    id: Uuid,
}

impl ProgressObserver for JobObserver {
    fn on_progress(&mut self, progress: &DownloadProgress) {
        let percent = progress.percentage();
        self.table.update(&self.id, |s| {
            s.state = JobState::Running;
            // Reported progress never goes back
            if let Some(p) = percent {
                s.percent = Some(s.percent.map_or(p, |old| old.max(p)));
            }
        });
    }
}

/// Destination paths currently being written
///
/// A path can be claimed by one download at a time; the claim is released
/// when the returned guard drops.
#[derive(Debug, Clone, Default)]
pub struct ActivePaths {
    paths: Arc<DashSet<PathBuf>>,
}

impl ActivePaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`, or `None` if another download holds it
    pub fn claim(&self, path: &Path) -> Option<PathClaim> {
        if self.paths.insert(path.to_path_buf()) {
            Some(PathClaim {
                paths: self.paths.clone(),
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }

    pub fn is_active(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }
}

/// Releases its path on drop
#[derive(Debug)]
pub struct PathClaim {
    paths: Arc<DashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        self.paths.remove(&self.path);
    }
}
