//! Download Manager implementation.
//!
//! The manager owns the catalog and the single transfer slot. All mutation
//! happens inside one actor task; the cloneable [`DownloadManager`] handle
//! forwards requests through a bounded mailbox and serves reads from the last
//! published snapshots.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::cleanup;
use super::engine::{EngineEvent, EngineEventReceiver, TransferEngine};
use super::messages::{CompletionHandler, ManagerMessage, ManagerState};
use super::registry::{CatalogPublisher, ProgressRegistry, ProgressSnapshot};
use super::transition::{self, FollowUp, Transition};
use crate::catalog::{Catalog, CatalogStore};
use crate::config::ManagerConfig;
use crate::domain::{DownloadRecord, DownloadStatus, JobId, ProgressEntry};
use crate::{Error, Result};

/// How an accepted enqueue request affects the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EnqueuePlan {
    /// No record matches; append a new waiting record.
    Create,
    /// Put the existing record back in the queue.
    Requeue,
    /// The title already owns the transfer slot.
    AlreadyActive,
}

/// Validate an enqueue request against the current catalog.
pub(crate) fn plan_enqueue(
    catalog: &Catalog,
    active: Option<&str>,
    title: &str,
    url: &str,
) -> Result<EnqueuePlan> {
    if title.is_empty() {
        return Err(Error::EmptyTitle);
    }
    url::Url::parse(url).map_err(|e| Error::invalid_url(url, e))?;

    if let Some(existing) = catalog.find_by_url(url)
        && existing.title != title
    {
        return Err(Error::UrlBoundToOtherTitle {
            url: url.to_string(),
            existing_title: existing.title.clone(),
        });
    }

    let Some(existing) = catalog.find_by_title(title) else {
        return Ok(EnqueuePlan::Create);
    };
    if existing.url != url {
        return Err(Error::TitleBoundToOtherUrl {
            title: title.to_string(),
            existing_url: existing.url.clone(),
        });
    }
    if existing.status.is_terminal() {
        return Err(Error::AlreadyDone {
            title: title.to_string(),
        });
    }
    if active == Some(title) {
        return Ok(EnqueuePlan::AlreadyActive);
    }
    Ok(EnqueuePlan::Requeue)
}

/// Handle to the download manager actor.
#[derive(Clone)]
pub struct DownloadManager {
    sender: mpsc::Sender<ManagerMessage>,
    catalog_rx: watch::Receiver<Vec<DownloadRecord>>,
    progress_rx: watch::Receiver<ProgressSnapshot>,
    cancellation_token: CancellationToken,
    sandbox_root: PathBuf,
}

impl DownloadManager {
    /// Load the catalog, reconcile it and spawn the manager actor.
    ///
    /// A missing or corrupt catalog never blocks startup: the manager starts
    /// empty and writes an empty catalog back. Nothing is scheduled until
    /// the first mutating request.
    pub async fn start(
        config: ManagerConfig,
        store: Arc<dyn CatalogStore>,
        engine: Arc<dyn TransferEngine>,
        events: EngineEventReceiver,
    ) -> Result<Self> {
        config.validate()?;

        let mut catalog = match store.load().await {
            Ok(catalog) => catalog,
            Err(e @ (Error::CatalogNotFound { .. } | Error::Decode(_))) => {
                warn!(error = %e, "Catalog unavailable, starting with an empty catalog");
                let empty = Catalog::new();
                if let Err(e) = store.save(&empty).await {
                    error!(error = %e, "Failed to write empty catalog");
                }
                empty
            }
            Err(e) => {
                // Leave the file alone; it may still be readable next launch.
                error!(error = %e, "Failed to read catalog, starting with an empty catalog");
                Catalog::new()
            }
        };

        let demoted = catalog.reconcile_after_restart();
        if !demoted.is_empty() {
            info!(count = demoted.len(), titles = ?demoted, "Suspended in-flight downloads after restart");
            if let Err(e) = store.save(&catalog).await {
                error!(error = %e, "Failed to persist reconciled catalog");
            }
        }

        info!(
            records = catalog.len(),
            engine = engine.name(),
            "Download manager starting"
        );

        let registry = ProgressRegistry::new();
        let publisher = CatalogPublisher::new(catalog.records().to_vec());
        let catalog_rx = publisher.subscribe();
        let progress_rx = registry.subscribe();
        let (sender, receiver) = mpsc::channel(config.mailbox_capacity);
        let cancellation_token = CancellationToken::new();
        let sandbox_root = config.sandbox_root.clone();

        let actor = ManagerActor {
            config,
            store,
            engine,
            catalog,
            active: None,
            registry,
            publisher,
            completion: Mutex::new(None),
        };
        tokio::spawn(actor.run(receiver, events, cancellation_token.clone()));

        Ok(Self {
            sender,
            catalog_rx,
            progress_rx,
            cancellation_token,
            sandbox_root,
        })
    }

    async fn send(&self, message: ManagerMessage) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(Error::ManagerStopped);
        }
        self.sender
            .send(message)
            .await
            .map_err(|_| Error::ManagerStopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ManagerMessage,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| Error::ManagerStopped)
    }

    /// Add a title to the queue, or requeue an existing one.
    pub async fn enqueue(&self, title: &str, url: &str) -> Result<()> {
        let (title, url) = (title.to_string(), url.to_string());
        self.request(|reply| ManagerMessage::Enqueue { title, url, reply })
            .await?
    }

    /// Pause a title. Unknown titles and disallowed transitions are ignored.
    pub async fn suspend(&self, title: &str) -> Result<()> {
        let title = title.to_string();
        self.request(|reply| ManagerMessage::Suspend { title, reply })
            .await
    }

    /// Put a suspended or failed title back in the queue.
    pub async fn restore(&self, title: &str) -> Result<()> {
        let title = title.to_string();
        self.request(|reply| ManagerMessage::Restore { title, reply })
            .await
    }

    /// Delete a title from the catalog along with its artifacts.
    pub async fn remove(&self, title: &str) -> Result<()> {
        let title = title.to_string();
        self.request(|reply| ManagerMessage::Remove { title, reply })
            .await
    }

    /// Re-emit the catalog and progress snapshots to every observer.
    pub async fn notify_became_active(&self) -> Result<()> {
        self.send(ManagerMessage::BecameActive).await
    }

    /// Register the handler run when the engine drains its background events.
    ///
    /// Replaces any handler still pending.
    pub async fn set_background_completion(
        &self,
        handler: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        self.send(ManagerMessage::SetCompletionHandler(CompletionHandler::new(
            handler,
        )))
        .await
    }

    /// Snapshot of the actor's view: active title, records and waiting queue.
    pub async fn state(&self) -> Result<ManagerState> {
        self.request(ManagerMessage::GetState).await
    }

    /// Latest published record for `title`.
    pub fn lookup(&self, title: &str) -> Option<DownloadRecord> {
        self.catalog_rx
            .borrow()
            .iter()
            .find(|r| r.title == title)
            .cloned()
    }

    /// Whether any record uses `title`.
    pub fn exists_title(&self, title: &str) -> bool {
        self.catalog_rx.borrow().iter().any(|r| r.title == title)
    }

    /// Whether any record points at `url`.
    pub fn exists_url(&self, url: &str) -> bool {
        self.catalog_rx.borrow().iter().any(|r| r.url == url)
    }

    /// Absolute location of a finished download.
    pub fn local_artifact_path(&self, title: &str) -> Option<PathBuf> {
        let record = self.lookup(title)?;
        if !record.is_done() {
            return None;
        }
        record.local_path.map(|p| self.sandbox_root.join(p))
    }

    /// All records as of the last committed change.
    pub fn records(&self) -> Vec<DownloadRecord> {
        self.catalog_rx.borrow().clone()
    }

    /// Progress entries published since startup, keyed by title.
    pub fn progress_snapshot(&self) -> ProgressSnapshot {
        self.progress_rx.borrow().clone()
    }

    /// Published progress for `title`, or one derived from its record.
    pub fn progress_for(&self, title: &str) -> Option<ProgressEntry> {
        if let Some(entry) = self.progress_rx.borrow().get(title) {
            return Some(entry.clone());
        }
        self.lookup(title).map(|r| ProgressEntry::from_record(&r))
    }

    /// Receiver that observes every committed catalog change.
    pub fn subscribe_catalog(&self) -> watch::Receiver<Vec<DownloadRecord>> {
        self.catalog_rx.clone()
    }

    /// Receiver that observes every progress publication.
    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress_rx.clone()
    }

    /// Stop the actor. Further requests fail with `ManagerStopped`.
    pub fn shutdown(&self) {
        info!("Shutting down download manager");
        self.cancellation_token.cancel();
    }

    /// Whether the actor is gone or shutting down.
    pub fn is_stopped(&self) -> bool {
        self.cancellation_token.is_cancelled() || self.sender.is_closed()
    }
}

struct ManagerActor {
    config: ManagerConfig,
    store: Arc<dyn CatalogStore>,
    engine: Arc<dyn TransferEngine>,
    catalog: Catalog,
    /// Title owning the transfer slot.
    active: Option<String>,
    registry: ProgressRegistry,
    publisher: CatalogPublisher,
    /// Behind a mutex so the actor stays `Sync` with `Send`-only handlers.
    completion: Mutex<Option<CompletionHandler>>,
}

impl ManagerActor {
    async fn run(
        mut self,
        mut receiver: mpsc::Receiver<ManagerMessage>,
        mut events: EngineEventReceiver,
        cancellation_token: CancellationToken,
    ) {
        let mut events_open = true;
        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => {
                    debug!("Download manager cancelled");
                    break;
                }

                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        trace!(job_id = ?event.job_id(), "Engine event");
                        self.handle_event(event).await
                    }
                    None => {
                        debug!("Engine event channel closed");
                        events_open = false;
                    }
                },

                message = receiver.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        debug!("All manager handles dropped");
                        break;
                    }
                },
            }
        }
        info!(active = ?self.active, "Download manager stopped");
    }

    async fn handle_message(&mut self, message: ManagerMessage) {
        match message {
            ManagerMessage::Enqueue { title, url, reply } => {
                let result = self.enqueue(&title, &url).await;
                let accepted = result.is_ok();
                let _ = reply.send(result);
                if accepted {
                    self.schedule_next().await;
                }
            }
            ManagerMessage::Suspend { title, reply } => self.suspend(&title, reply).await,
            ManagerMessage::Restore { title, reply } => self.restore(&title, reply).await,
            ManagerMessage::Remove { title, reply } => self.remove(&title, reply).await,
            ManagerMessage::BecameActive => {
                debug!("Re-publishing snapshots");
                self.publisher.republish();
                self.registry.republish();
            }
            ManagerMessage::SetCompletionHandler(handler) => {
                if self.completion.get_mut().replace(handler).is_some() {
                    debug!("Replaced pending background completion handler");
                }
            }
            ManagerMessage::GetState(reply) => {
                let _ = reply.send(ManagerState {
                    active: self.active.clone(),
                    records: self.catalog.len(),
                    waiting: self.catalog.count_with_status(DownloadStatus::Waiting),
                    has_completion_handler: self.completion.get_mut().is_some(),
                });
            }
        }
    }

    /// Persist then publish the catalog. Save failures are logged and the
    /// in-memory state stays authoritative.
    async fn commit(&mut self) {
        if let Err(e) = self.store.save(&self.catalog).await {
            error!(error = %e, "Failed to persist catalog");
        }
        self.publisher.publish(self.catalog.records().to_vec());
    }

    fn is_active(&self, title: &str) -> bool {
        self.active.as_deref() == Some(title)
    }

    async fn is_live(&self, job_id: JobId) -> bool {
        match self.engine.live_jobs().await {
            Ok(jobs) => jobs.contains(&job_id),
            Err(e) => {
                warn!(job_id, error = %e, "Failed to list engine jobs");
                false
            }
        }
    }

    async fn enqueue(&mut self, title: &str, url: &str) -> Result<()> {
        let plan = plan_enqueue(&self.catalog, self.active.as_deref(), title, url)?;
        match plan {
            EnqueuePlan::Create => {
                self.catalog.insert(DownloadRecord::new(title, url));
                info!(title = %title, "Queued new download");
            }
            EnqueuePlan::Requeue => {
                if let Some(record) = self.catalog.get_mut(title) {
                    record.set_status(DownloadStatus::Waiting);
                }
                debug!(title = %title, "Requeued download");
            }
            EnqueuePlan::AlreadyActive => {
                debug!(title = %title, "Already downloading");
                return Ok(());
            }
        }
        self.commit().await;
        Ok(())
    }

    async fn suspend(&mut self, title: &str, reply: oneshot::Sender<()>) {
        let Some(record) = self.catalog.get_mut(title) else {
            debug!(title = %title, "Suspend ignored for unknown title");
            let _ = reply.send(());
            return;
        };
        let next = match record.status.transition_to(DownloadStatus::Suspended) {
            Ok(next) => next,
            Err(e) => {
                debug!(title = %title, error = %e, "Suspend ignored");
                let _ = reply.send(());
                return;
            }
        };
        record.set_status(next);
        let job_id = record.engine_job_id;
        self.commit().await;
        let _ = reply.send(());
        info!(title = %title, "Suspended download");

        if let Some(job_id) = job_id
            && self.is_live(job_id).await
            && let Err(e) = self.engine.suspend_job(job_id).await
        {
            warn!(title = %title, job_id, error = %e, "Failed to suspend engine job");
        }
        if self.is_active(title) {
            self.active = None;
            self.schedule_next().await;
        }
    }

    async fn restore(&mut self, title: &str, reply: oneshot::Sender<()>) {
        let active = self.is_active(title);
        let Some(record) = self.catalog.get_mut(title) else {
            debug!(title = %title, "Restore ignored for unknown title");
            let _ = reply.send(());
            return;
        };
        if active {
            debug!(title = %title, "Restore ignored for the active download");
            let _ = reply.send(());
            return;
        }
        let next = match record.status.transition_to(DownloadStatus::Waiting) {
            Ok(next) => next,
            Err(e) => {
                debug!(title = %title, error = %e, "Restore ignored");
                let _ = reply.send(());
                return;
            }
        };
        record.set_status(next);
        self.commit().await;
        let _ = reply.send(());
        info!(title = %title, "Restored download");
        self.schedule_next().await;
    }

    async fn remove(&mut self, title: &str, reply: oneshot::Sender<()>) {
        let Some(record) = self.catalog.remove(title) else {
            debug!(title = %title, "Remove ignored for unknown title");
            let _ = reply.send(());
            return;
        };
        self.commit().await;
        self.registry.remove(title);
        let _ = reply.send(());
        info!(title = %title, "Removed download");

        let root = self.config.artifact_dir.clone();
        let extension = self.config.artifact_extension.clone();
        let owned_title = title.to_string();
        tokio::spawn(async move {
            cleanup::remove_artifacts(&root, &owned_title, &extension).await;
        });

        if let Some(job_id) = record.engine_job_id
            && self.is_live(job_id).await
            && let Err(e) = self.engine.cancel_job(job_id).await
        {
            warn!(title = %title, job_id, error = %e, "Failed to cancel engine job");
        }
        if self.is_active(title) {
            self.active = None;
            self.schedule_next().await;
        }
    }

    /// Start the oldest waiting record when the slot is free.
    async fn schedule_next(&mut self) {
        if let Some(active) = &self.active {
            trace!(active = %active, "Transfer slot busy");
            return;
        }
        let Some(next) = self.catalog.next_waiting().map(|r| r.title.clone()) else {
            debug!("No waiting downloads");
            return;
        };
        self.issue_job(&next).await;
    }

    /// Give `title` the transfer slot, resuming its engine job when the
    /// engine still tracks it.
    async fn issue_job(&mut self, title: &str) {
        let Some(record) = self.catalog.find_by_title(title).cloned() else {
            return;
        };
        self.active = Some(title.to_string());

        if let Some(job_id) = record.engine_job_id {
            if self.is_live(job_id).await {
                match self.engine.resume_job(job_id).await {
                    Ok(()) => {
                        info!(title = %title, job_id, "Resumed download");
                        self.mark_downloading(title, job_id).await;
                        return;
                    }
                    Err(e) => {
                        warn!(title = %title, job_id, error = %e, "Failed to resume job, issuing a new one");
                    }
                }
            } else {
                debug!(title = %title, job_id, "Engine no longer tracks job");
            }
            if let Some(record) = self.catalog.get_mut(title) {
                record.engine_job_id = None;
                record.touch();
            }
        }

        match self.engine.create_job(&record.url, &record.title).await {
            Ok(job_id) => {
                info!(title = %title, job_id, "Started download");
                self.registry.publish(title, ProgressEntry::downloading(0.0));
                self.mark_downloading(title, job_id).await;
            }
            Err(e) => {
                warn!(title = %title, error = %e, "Engine refused job, leaving record waiting");
                self.active = None;
                if record.engine_job_id.is_some() {
                    self.commit().await;
                }
            }
        }
    }

    async fn mark_downloading(&mut self, title: &str, job_id: JobId) {
        if let Some(record) = self.catalog.get_mut(title) {
            record.set_status(DownloadStatus::Downloading);
            record.engine_job_id = Some(job_id);
        }
        self.commit().await;
    }

    /// Record owning the transfer slot, when `job_id` is its current job.
    fn active_record_for(&self, job_id: JobId) -> Option<DownloadRecord> {
        let title = self.active.as_deref()?;
        self.catalog
            .find_by_title(title)
            .filter(|r| r.engine_job_id == Some(job_id))
            .cloned()
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Progress {
                job_id,
                loaded,
                expected,
            } => {
                let Some(record) = self.active_record_for(job_id) else {
                    trace!(job_id, "Ignoring progress for inactive job");
                    return;
                };
                self.apply(transition::on_progress(&record, &loaded, expected))
                    .await;
            }
            EngineEvent::ArtifactReady { job_id, location } => {
                let Some(record) = self.catalog.find_by_job_id(job_id).cloned() else {
                    debug!(job_id, location = %location.display(), "Artifact for unknown job");
                    return;
                };
                debug!(title = %record.title, location = %location.display(), "Artifact ready");
                let t = transition::on_artifact_ready(&record, &location, &self.config.sandbox_root);
                self.apply(t).await;
            }
            EngineEvent::Completed { job_id, error } => {
                let Some(record) = self.active_record_for(job_id) else {
                    debug!(job_id, "Ignoring completion for inactive job");
                    return;
                };
                match &error {
                    None => info!(title = %record.title, "Download finished"),
                    Some(e) if e.is_transient(&self.config.transient_error_codes) => {
                        warn!(title = %record.title, error = %e, "Download interrupted")
                    }
                    Some(e) => {
                        let failure = Error::from(e.clone());
                        warn!(title = %record.title, error = %failure, "Download failed")
                    }
                }
                let t = transition::on_completed(
                    &record,
                    error.as_ref(),
                    &self.config.transient_error_codes,
                );
                self.apply(t).await;
            }
            EngineEvent::AllEventsDrained => match self.completion.get_mut().take() {
                Some(handler) => {
                    debug!("Running background completion handler");
                    handler.run();
                }
                None => trace!("No background completion handler registered"),
            },
        }
    }

    async fn apply(&mut self, transition: Transition) {
        let Transition {
            record,
            changed,
            progress,
            follow_up,
        } = transition;
        let title = record.title.clone();

        if changed {
            self.catalog.replace(record);
            self.commit().await;
        }
        if let Some(entry) = progress {
            self.registry.publish(&title, entry);
        }

        match follow_up {
            FollowUp::None => {}
            FollowUp::Reissue => {
                self.active = None;
                self.issue_job(&title).await;
            }
            FollowUp::Advance => {
                self.active = None;
                self.schedule_next().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL_A: &str = "https://example.com/a.m3u8";
    const URL_B: &str = "https://example.com/b.m3u8";

    fn catalog_with(records: Vec<DownloadRecord>) -> Catalog {
        Catalog::from_records(records)
    }

    #[test]
    fn test_plan_rejects_empty_title() {
        let err = plan_enqueue(&Catalog::new(), None, "", URL_A).unwrap_err();
        assert!(matches!(err, Error::EmptyTitle));
    }

    #[test]
    fn test_plan_rejects_invalid_url() {
        for bad in ["", "not a url", "/relative/path.m3u8"] {
            let err = plan_enqueue(&Catalog::new(), None, "A", bad).unwrap_err();
            assert!(matches!(err, Error::InvalidUrl { .. }), "{bad}");
        }
    }

    #[test]
    fn test_plan_create_for_new_entity() {
        let catalog = catalog_with(vec![DownloadRecord::new("A", URL_A)]);
        assert_eq!(
            plan_enqueue(&catalog, None, "B", URL_B).unwrap(),
            EnqueuePlan::Create
        );
    }

    #[test]
    fn test_plan_identity_conflicts() {
        let catalog = catalog_with(vec![DownloadRecord::new("A", URL_A)]);

        let err = plan_enqueue(&catalog, None, "B", URL_A).unwrap_err();
        assert!(matches!(
            err,
            Error::UrlBoundToOtherTitle { ref existing_title, .. } if existing_title == "A"
        ));

        let err = plan_enqueue(&catalog, None, "A", URL_B).unwrap_err();
        assert!(matches!(
            err,
            Error::TitleBoundToOtherUrl { ref existing_url, .. } if existing_url == URL_A
        ));
    }

    #[test]
    fn test_plan_done_is_rejected() {
        let mut record = DownloadRecord::new("A", URL_A);
        record.status = DownloadStatus::Done;
        let catalog = catalog_with(vec![record]);
        let err = plan_enqueue(&catalog, None, "A", URL_A).unwrap_err();
        assert!(matches!(err, Error::AlreadyDone { .. }));
    }

    #[test]
    fn test_plan_requeue_and_active() {
        let mut record = DownloadRecord::new("A", URL_A);
        record.status = DownloadStatus::Error;
        let catalog = catalog_with(vec![record]);
        assert_eq!(
            plan_enqueue(&catalog, None, "A", URL_A).unwrap(),
            EnqueuePlan::Requeue
        );
        assert_eq!(
            plan_enqueue(&catalog, Some("A"), "A", URL_A).unwrap(),
            EnqueuePlan::AlreadyActive
        );
    }
}
