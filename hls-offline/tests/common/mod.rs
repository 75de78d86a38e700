//! Shared fixtures: a scriptable transfer engine, a store whose writes can
//! be made to fail, and a harness wiring both to a manager in a temp dir.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use hls_offline::downloader::{EngineEventSender, event_channel};
use hls_offline::{
    Catalog, CatalogStore, DownloadManager, DownloadRecord, EngineError, Error, JobId,
    JsonCatalogStore, ManagerConfig, Result, TimeRange, TransferEngine,
};

pub const URL_A: &str = "https://cdn.example.com/a/master.m3u8";
pub const URL_B: &str = "https://cdn.example.com/b/master.m3u8";
pub const URL_C: &str = "https://cdn.example.com/c/master.m3u8";

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct EngineState {
    next_id: JobId,
    live: Vec<JobId>,
    created: Vec<(String, JobId)>,
    resumed: Vec<JobId>,
    suspended: Vec<JobId>,
    cancelled: Vec<JobId>,
    reject_new_jobs: bool,
}

/// In-memory engine that records every call.
#[derive(Debug, Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_new_jobs(&self, reject: bool) {
        self.state.lock().reject_new_jobs = reject;
    }

    /// Stop tracking a job, as the engine does once it completes.
    pub fn forget(&self, job_id: JobId) {
        self.state.lock().live.retain(|id| *id != job_id);
    }

    /// Titles in the order their jobs were created.
    pub fn created_titles(&self) -> Vec<String> {
        self.state.lock().created.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().created.len()
    }

    pub fn resumed(&self) -> Vec<JobId> {
        self.state.lock().resumed.clone()
    }

    pub fn suspended(&self) -> Vec<JobId> {
        self.state.lock().suspended.clone()
    }

    pub fn cancelled(&self) -> Vec<JobId> {
        self.state.lock().cancelled.clone()
    }
}

#[async_trait]
impl TransferEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_job(&self, _url: &str, title: &str) -> Result<JobId> {
        let mut state = self.state.lock();
        if state.reject_new_jobs {
            return Err(Error::engine_rejected(title, "engine unavailable"));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.live.push(id);
        state.created.push((title.to_string(), id));
        Ok(id)
    }

    async fn live_jobs(&self) -> Result<Vec<JobId>> {
        Ok(self.state.lock().live.clone())
    }

    async fn resume_job(&self, job_id: JobId) -> Result<()> {
        self.state.lock().resumed.push(job_id);
        Ok(())
    }

    async fn suspend_job(&self, job_id: JobId) -> Result<()> {
        self.state.lock().suspended.push(job_id);
        Ok(())
    }

    async fn cancel_job(&self, job_id: JobId) -> Result<()> {
        let mut state = self.state.lock();
        state.live.retain(|id| *id != job_id);
        state.cancelled.push(job_id);
        Ok(())
    }
}

/// JSON store whose saves can be switched to fail.
#[derive(Debug)]
pub struct FlakyStore {
    inner: JsonCatalogStore,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new(config: &ManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: JsonCatalogStore::from_config(config),
            fail_saves: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        })
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn load(&self) -> Result<Catalog> {
        self.inner.load().await
    }

    async fn save(&self, catalog: &Catalog) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::io_path(
                "writing catalog",
                self.inner.path(),
                std::io::Error::other("disk full"),
            ));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(catalog).await
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub config: ManagerConfig,
    pub store: Arc<FlakyStore>,
    pub engine: Arc<FakeEngine>,
    pub events: EngineEventSender,
    pub manager: DownloadManager,
}

impl Harness {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::start_in(dir, FakeEngine::new()).await
    }

    pub async fn start_in(dir: TempDir, engine: Arc<FakeEngine>) -> Self {
        let config = ManagerConfig::rooted_at(dir.path());
        let store = FlakyStore::new(&config);
        let (events, receiver) = event_channel(config.engine_event_capacity);
        let manager = DownloadManager::start(config.clone(), store.clone(), engine.clone(), receiver)
            .await
            .unwrap();
        Self {
            dir,
            config,
            store,
            engine,
            events,
            manager,
        }
    }

    /// Stop this manager and start a fresh one over the same directory and
    /// engine, as after a process relaunch.
    pub async fn restart(self) -> Self {
        self.manager.shutdown();
        Self::start_in(self.dir, self.engine).await
    }

    /// Wait until the actor has handled everything sent so far.
    pub async fn settle(&self) {
        tokio::time::timeout(WAIT_TIMEOUT, self.manager.state())
            .await
            .expect("manager did not settle")
            .unwrap();
    }

    pub fn record(&self, title: &str) -> DownloadRecord {
        self.manager
            .lookup(title)
            .unwrap_or_else(|| panic!("no record for {title}"))
    }

    pub async fn progress(&self, job_id: JobId, loaded_secs: f64, total_secs: f64) {
        self.events
            .progress(
                job_id,
                vec![TimeRange::new(0.0, loaded_secs)],
                TimeRange::new(0.0, total_secs),
            )
            .await
            .unwrap();
        self.settle().await;
    }

    /// Finish a job the way the engine does: drop it, then report.
    pub async fn complete(&self, job_id: JobId, error: Option<EngineError>) {
        self.engine.forget(job_id);
        self.events.completed(job_id, error).await.unwrap();
        self.settle().await;
    }

    /// Report a completion while the engine keeps the job around.
    pub async fn interrupt(&self, job_id: JobId, error: EngineError) {
        self.events.completed(job_id, Some(error)).await.unwrap();
        self.settle().await;
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.config.artifact_dir.clone()
    }
}

/// Poll until `check` holds, failing after the shared timeout.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
