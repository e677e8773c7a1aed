//! Sync orchestration for one editor session.
//!
//! [`Session::sync`] runs, in order:
//!
//! 1. result cache garbage collection against the live graph,
//! 2. serialization of the graph into the project,
//! 3. best-effort thumbnail capture,
//! 4. under the session's sync lock: timestamp, cancel-and-await of the
//!    previous task, submission,
//! 5. streaming of the new task (after the lock is released),
//! 6. write-back of the patched project into the graph, under the lock
//!    again and only if no newer sync has started meanwhile.
//!
//! A sync superseded by a later one ends quietly with `Ok(())`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{FileCache, ResultCache};
use crate::classify::{classify_error, Operation};
use crate::client::{Backend, FileService, ResultDataService};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::graph::{from_wire, to_wire, EditableGraph};
use crate::shared::ChannelConnector;
use crate::task::{SharedProject, TaskManager, TaskState, TimerBus};
use crate::thumbnail::{NoThumbnail, ThumbnailProducer};
use crate::types::{Project, SubmitResponse};

/// Sync status visible to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// A sync is in flight.
    pub syncing: bool,
    /// Last recorded sync problem, cleared when a new sync starts.
    pub syncing_err_msg: Option<String>,
    /// When the last sync wrote its results back.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// One open project: its live state, caches and task slot.
///
/// # Examples
///
/// ```rust,no_run
/// use flowsync::sync::Session;
/// use flowsync::shared::MemoryConnector;
/// use flowsync::types::Project;
/// # use flowsync::client::{Backend, FileService, ResultDataService};
/// use std::sync::Arc;
///
/// # async fn example(backend: Arc<dyn Backend>, files: Arc<dyn FileService>, results: Arc<dyn ResultDataService>) -> flowsync::Result<()> {
/// let session = Session::builder(Project::new(1, "demo", 1))
///     .backend(backend)
///     .file_service(files)
///     .result_service(results)
///     .connector(Arc::new(MemoryConnector::new()))
///     .build()?;
///
/// session.sync().await?;
/// println!("{:?}", session.status());
/// # Ok(())
/// # }
/// ```
pub struct Session {
    project: SharedProject,
    graph: Arc<RwLock<EditableGraph>>,
    status: RwLock<SyncStatus>,
    sync_lock: Mutex<()>,
    // Bumped by every sync that takes the lock.
    generation: AtomicU64,
    tasks: TaskManager,
    files: FileCache,
    results: ResultCache,
    backend: Arc<dyn Backend>,
    thumbnail: Arc<dyn ThumbnailProducer>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("project_id", &self.project.read().id)
            .field("status", &*self.status.read())
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Starts building a session for `project`.
    pub fn builder(project: Project) -> SessionBuilder {
        SessionBuilder::new(project)
    }

    /// Session over the REST backend and WebSocket channels configured in
    /// `config`.
    #[cfg(all(feature = "http-client", feature = "websocket"))]
    pub fn connect(
        config: SyncConfig,
        project: Project,
        auth: Option<Arc<dyn crate::client::AuthProvider>>,
    ) -> Result<Self> {
        use crate::client::HttpBackend;
        use crate::shared::WebSocketConnector;

        let mut backend = HttpBackend::new(&config)?;
        let mut connector = WebSocketConnector::new(&config.ws_url)?;
        if let Some(auth) = auth {
            backend = backend.with_auth_provider(auth.clone());
            connector = connector.with_auth_provider(auth);
        }
        let backend = Arc::new(backend);

        SessionBuilder::new(project)
            .config(config)
            .backend(backend.clone())
            .file_service(backend.clone())
            .result_service(backend)
            .connector(Arc::new(connector))
            .build()
    }

    /// The live project.
    pub fn project(&self) -> SharedProject {
        self.project.clone()
    }

    /// The live editor graph.
    pub fn graph(&self) -> Arc<RwLock<EditableGraph>> {
        self.graph.clone()
    }

    /// Snapshot of the sync status.
    pub fn status(&self) -> SyncStatus {
        self.status.read().clone()
    }

    /// The task slot.
    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Timer events of the session's tasks.
    pub fn timers(&self) -> &Arc<TimerBus> {
        self.tasks.timers()
    }

    /// Cached file access.
    pub fn files(&self) -> &FileCache {
        &self.files
    }

    /// Cached result access.
    pub fn results(&self) -> &ResultCache {
        &self.results
    }

    /// Submits the current graph and streams its results back.
    ///
    /// Concurrent calls queue on the session's sync lock; each one cancels
    /// whatever task the previous one left running. Transport and API
    /// errors are returned and recorded in [`SyncStatus::syncing_err_msg`].
    /// A sync whose task is cancelled by a later one returns `Ok(())`
    /// without writing anything back.
    pub async fn sync(&self) -> Result<()> {
        let dropped = {
            let graph = self.graph.read();
            self.results.retain_referenced(&graph.data_refs())
        };
        let workflow = to_wire(&self.graph.read());
        debug!(
            nodes = workflow.nodes.len(),
            edges = workflow.edges.len(),
            dropped_results = dropped,
            "graph serialized"
        );

        let thumbnail = match self.thumbnail.capture().await {
            Ok(thumbnail) => {
                self.status.write().syncing_err_msg = None;
                thumbnail
            },
            Err(err) => {
                warn!(error = %err, "thumbnail capture failed");
                self.status.write().syncing_err_msg = classify_error(Operation::Sync, &err);
                None
            },
        };

        let lock = self.sync_lock.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.project.write().updated_at = Utc::now();
        self.status.write().syncing = true;

        // The previous task must stop patching before the project is replaced.
        self.tasks.cancel().await;
        if let Err(err) = self.tasks.begin_submission() {
            return Err(self.record_failure(err));
        }

        let snapshot = {
            let mut project = self.project.write();
            project.workflow = workflow;
            if thumbnail.is_some() {
                project.thumb = thumbnail;
            }
            project.clone()
        };

        info!(project_id = snapshot.id, "submitting project");
        let response = match self.backend.submit(&snapshot).await {
            Ok(response) => response,
            Err(err) => {
                if let Err(state_err) = self.tasks.finish_submission(TaskState::Errored) {
                    debug!(error = %state_err, "task slot already moved on");
                }
                return Err(self.record_failure(err));
            },
        };

        let monitor = match response {
            SubmitResponse::Task { task_id } => {
                Some(self.tasks.monitor(self.project.clone(), task_id))
            },
            SubmitResponse::Final(project) => {
                debug!("backend answered with a final project");
                *self.project.write() = *project;
                if let Err(err) = self.tasks.finish_submission(TaskState::Completed) {
                    debug!(error = %err, "task slot already moved on");
                }
                None
            },
        };
        drop(lock);

        let outcome = match monitor {
            Some(monitor) => Some(monitor.await),
            None => None,
        };

        // Status and graph belong to whichever sync took the lock last.
        let _lock = self.sync_lock.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "sync superseded, leaving status to the newer sync");
            return match outcome {
                Some(Err(err)) if !err.is_cancelled() => Err(err),
                _ => Ok(()),
            };
        }

        match outcome {
            Some(Ok(report)) if report.state == TaskState::TimedOut => {
                warn!(task_id = %report.task_id, "writing back partial results of timed out task");
                self.status.write().syncing_err_msg =
                    Some(format!("Task {} timed out", report.task_id));
            },
            Some(Ok(report)) => {
                debug!(
                    task_id = %report.task_id,
                    messages = report.messages.len(),
                    rejected = report.rejected_patches,
                    "task stream finished"
                );
            },
            Some(Err(err)) if err.is_cancelled() => {
                debug!(error = %err, "sync cancelled");
                return Ok(());
            },
            Some(Err(err)) => return Err(self.record_failure(err)),
            None => {},
        }

        {
            let project = self.project.read();
            let mut graph = self.graph.write();
            from_wire(&project.workflow, &mut graph);
        }

        let mut status = self.status.write();
        status.syncing = false;
        status.last_synced_at = Some(Utc::now());
        Ok(())
    }

    /// Cancels the running task, if any, and waits for it to wind down.
    pub async fn cancel(&self) {
        self.tasks.cancel().await;
        self.status.write().syncing = false;
    }

    fn record_failure(&self, err: Error) -> Error {
        let mut status = self.status.write();
        status.syncing = false;
        status.syncing_err_msg = classify_error(Operation::Sync, &err);
        err
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    project: Project,
    config: SyncConfig,
    backend: Option<Arc<dyn Backend>>,
    connector: Option<Arc<dyn ChannelConnector>>,
    files: Option<Arc<dyn FileService>>,
    results: Option<Arc<dyn ResultDataService>>,
    thumbnail: Arc<dyn ThumbnailProducer>,
    timers: Option<Arc<TimerBus>>,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("project_id", &self.project.id)
            .field("config", &self.config)
            .field("backend", &self.backend.is_some())
            .field("connector", &self.connector.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionBuilder {
    /// Creates a builder with the default configuration and no thumbnail.
    pub fn new(project: Project) -> Self {
        Self {
            project,
            config: SyncConfig::default(),
            backend: None,
            connector: None,
            files: None,
            results: None,
            thumbnail: Arc::new(NoThumbnail),
            timers: None,
        }
    }

    /// Sets cache sizes and the task timeout.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the submission backend.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the task channel connector.
    pub fn connector(mut self, connector: Arc<dyn ChannelConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the file service behind the file cache.
    pub fn file_service(mut self, files: Arc<dyn FileService>) -> Self {
        self.files = Some(files);
        self
    }

    /// Sets the result-data service behind the result cache.
    pub fn result_service(mut self, results: Arc<dyn ResultDataService>) -> Self {
        self.results = Some(results);
        self
    }

    /// Sets the thumbnail producer.
    pub fn thumbnail(mut self, thumbnail: Arc<dyn ThumbnailProducer>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    /// Shares an existing timer bus.
    pub fn timer_bus(mut self, timers: Arc<TimerBus>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Builds the session.
    ///
    /// Fails with [`Error::Config`] if the configuration is invalid or a
    /// collaborator is missing.
    pub fn build(self) -> Result<Session> {
        self.config.validate()?;
        let missing = |what: &str| Error::Config(format!("session requires a {what}"));

        let backend = self.backend.ok_or_else(|| missing("backend"))?;
        let connector = self.connector.ok_or_else(|| missing("channel connector"))?;
        let files = self.files.ok_or_else(|| missing("file service"))?;
        let results = self.results.ok_or_else(|| missing("result-data service"))?;

        let mut tasks = TaskManager::new(connector, self.config.task_timeout());
        if let Some(timers) = self.timers {
            tasks = tasks.with_timer_bus(timers);
        }

        let mut graph = EditableGraph::new();
        from_wire(&self.project.workflow, &mut graph);

        Ok(Session {
            project: Arc::new(RwLock::new(self.project)),
            graph: Arc::new(RwLock::new(graph)),
            status: RwLock::new(SyncStatus::default()),
            sync_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            tasks,
            files: FileCache::new(files, self.config.file_cache_size),
            results: ResultCache::new(
                results,
                self.config.result_cache_size,
                self.config.result_basic_duration(),
            ),
            backend,
            thumbnail: self.thumbnail,
        })
    }
}
