//! Single-slot task monitor.
//!
//! [`TaskManager`] owns at most one streaming task at a time. Monitoring
//! opens the task's channel, applies each incoming message to the shared
//! project, and republishes timer directives on the [`TimerBus`]. The
//! stream ends when the backend closes the channel, when the task is
//! cancelled, when the wall-clock ceiling elapses, or when the transport
//! fails. In every case the slot is released exactly once and every node
//! still marked running receives an `Error` timer event before the monitor
//! resolves.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::patch;
use super::state::TaskState;
use super::timer::{RunningNodes, TimerBus, TimerEvent};
use crate::error::{Error, Result};
use crate::shared::{ChannelConnector, TaskChannel, CANCEL_SIGNAL};
use crate::types::{DecodedFrame, Project, TaskMessage};

/// How long a cancelled channel may keep sending before it is closed locally.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Project shared between the orchestrator and the running monitor.
pub type SharedProject = Arc<RwLock<Project>>;

/// Outcome of a monitored task that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    /// Monitored task.
    pub task_id: String,
    /// Terminal state: [`TaskState::Completed`] or [`TaskState::TimedOut`].
    pub state: TaskState,
    /// Every decoded message, in arrival order, without the operations that
    /// failed to decode.
    pub messages: Vec<TaskMessage>,
    /// Patch operations that were rejected and skipped, whether they failed
    /// to decode or to apply.
    pub rejected_patches: usize,
}

struct ActiveTask {
    task_id: String,
    cancel: CancellationToken,
    closed: watch::Receiver<bool>,
}

#[derive(Default)]
struct Slot {
    state: TaskState,
    active: Option<ActiveTask>,
}

impl Slot {
    fn transition(&mut self, next: TaskState) -> Result<()> {
        // A finished task's state stays observable until the next one starts.
        let from = if self.state.is_terminal() && next != TaskState::Idle {
            TaskState::Idle
        } else {
            self.state
        };
        from.validate_transition(&next)?;
        self.state = next;
        Ok(())
    }

    fn ensure_free(&self) -> Result<()> {
        match &self.active {
            Some(active) => Err(Error::TaskActive {
                task_id: active.task_id.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Releases the slot exactly once, whichever way the monitor ends.
struct TaskGuard {
    task_id: String,
    slot: Arc<Mutex<Slot>>,
    timers: Arc<TimerBus>,
    running: RunningNodes,
    closed: watch::Sender<bool>,
    finished: bool,
}

impl TaskGuard {
    fn finish(&mut self, state: TaskState) {
        if self.finished {
            return;
        }
        self.finished = true;

        let dangling = self.running.force_close(&self.timers);
        if dangling > 0 {
            warn!(task_id = %self.task_id, dangling, "task ended with nodes still running");
        }

        {
            let mut slot = self.slot.lock();
            if let Err(err) = slot.transition(state) {
                warn!(task_id = %self.task_id, error = %err, "unexpected task state");
                slot.state = state;
            }
            if slot
                .active
                .as_ref()
                .is_some_and(|a| a.task_id == self.task_id)
            {
                slot.active = None;
            }
        }
        self.closed.send_replace(true);
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if !self.finished {
            debug!(task_id = %self.task_id, "monitor dropped before completion");
            self.finish(TaskState::Cancelled);
        }
    }
}

enum StreamEnd {
    Closed,
    Cancelled,
    TimedOut,
    Failed(Error),
}

/// Monitors at most one backend task at a time.
///
/// Cloning yields another handle to the same slot.
///
/// # Examples
///
/// ```
/// use flowsync::shared::MemoryConnector;
/// use flowsync::task::{TaskManager, TaskState};
/// use flowsync::types::{PatchOp, Project, TaskMessage};
/// use parking_lot::RwLock;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> flowsync::Result<()> {
/// let connector = Arc::new(MemoryConnector::new());
/// let manager = TaskManager::new(connector.clone(), Duration::from_secs(60));
/// let project = Arc::new(RwLock::new(Project::new(1, "demo", 1)));
///
/// let monitor = manager.monitor(project.clone(), "t-1");
/// assert!(manager.has_active_task());
///
/// let backend = async {
///     let server = connector.accept().await.unwrap();
///     server.send(&TaskMessage {
///         patch: vec![PatchOp::new(["workflow", "error"], "cycle".into())],
///         ..Default::default()
///     });
///     server.close();
/// };
/// let (report, ()) = tokio::join!(monitor, backend);
///
/// assert_eq!(report?.state, TaskState::Completed);
/// assert_eq!(project.read().workflow.error.as_deref(), Some("cycle"));
/// assert!(!manager.has_active_task());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskManager {
    slot: Arc<Mutex<Slot>>,
    connector: Arc<dyn ChannelConnector>,
    timers: Arc<TimerBus>,
    timeout: Duration,
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("TaskManager")
            .field("state", &slot.state)
            .field("active", &slot.active.as_ref().map(|a| &a.task_id))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TaskManager {
    /// Creates a manager with its own timer bus.
    pub fn new(connector: Arc<dyn ChannelConnector>, timeout: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            connector,
            timers: Arc::new(TimerBus::new()),
            timeout,
        }
    }

    /// Publishes timer events on `timers` instead of a private bus.
    pub fn with_timer_bus(mut self, timers: Arc<TimerBus>) -> Self {
        self.timers = timers;
        self
    }

    /// Bus carrying per-node timer events.
    pub fn timers(&self) -> &Arc<TimerBus> {
        &self.timers
    }

    /// Wall-clock ceiling applied to each task.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current state of the slot.
    pub fn state(&self) -> TaskState {
        self.slot.lock().state
    }

    /// Whether a task is being monitored.
    pub fn has_active_task(&self) -> bool {
        self.slot.lock().active.is_some()
    }

    /// Id of the monitored task, if any.
    pub fn current_task_id(&self) -> Option<String> {
        self.slot.lock().active.as_ref().map(|a| a.task_id.clone())
    }

    /// Marks a submission as in flight.
    ///
    /// Fails with [`Error::TaskActive`] while a task is still monitored.
    pub fn begin_submission(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        slot.ensure_free()?;
        if slot.state == TaskState::Submitting {
            debug!("previous submission was abandoned");
            slot.state = TaskState::Idle;
        }
        slot.transition(TaskState::Submitting)
    }

    /// Ends a submission that will not be monitored, either because the
    /// backend answered with the final project ([`TaskState::Completed`])
    /// or because submitting failed ([`TaskState::Errored`]).
    pub fn finish_submission(&self, outcome: TaskState) -> Result<()> {
        self.slot.lock().transition(outcome)
    }

    /// Starts monitoring `task_id`.
    ///
    /// The slot is claimed before this returns, so a caller holding a lock
    /// can register the task and await the returned future after releasing
    /// it. Dropping the future without polling it releases the slot as
    /// cancelled.
    ///
    /// Resolves to a [`TaskReport`] when the channel closes or the timeout
    /// elapses, to [`Error::TaskCancelled`] when [`cancel`](Self::cancel)
    /// interrupts it, and to the transport error when the channel fails.
    pub fn monitor(
        &self,
        project: SharedProject,
        task_id: impl Into<String>,
    ) -> impl Future<Output = Result<TaskReport>> + Send + 'static {
        let registration = self.register(task_id.into());
        let connector = self.connector.clone();
        let timeout = self.timeout;

        async move {
            let (guard, cancel) = registration?;
            stream_task(connector, project, guard, cancel, timeout).await
        }
    }

    /// Cancels the monitored task and waits until its channel is closed
    /// and the slot released. Returns immediately when nothing is active.
    pub async fn cancel(&self) {
        let mut closed = {
            let slot = self.slot.lock();
            let Some(active) = slot.active.as_ref() else {
                return;
            };
            info!(task_id = %active.task_id, "cancelling task");
            active.cancel.cancel();
            active.closed.clone()
        };

        // An Err means the guard is gone, which also means the slot is free.
        let _ = closed.wait_for(|done| *done).await;
    }

    fn register(&self, task_id: String) -> Result<(TaskGuard, CancellationToken)> {
        let mut slot = self.slot.lock();
        slot.ensure_free()?;
        slot.transition(TaskState::Streaming)?;

        let cancel = CancellationToken::new();
        let (closed_tx, closed_rx) = watch::channel(false);
        slot.active = Some(ActiveTask {
            task_id: task_id.clone(),
            cancel: cancel.clone(),
            closed: closed_rx,
        });
        drop(slot);

        let guard = TaskGuard {
            task_id,
            slot: self.slot.clone(),
            timers: self.timers.clone(),
            running: RunningNodes::default(),
            closed: closed_tx,
            finished: false,
        };
        Ok((guard, cancel))
    }
}

async fn stream_task(
    connector: Arc<dyn ChannelConnector>,
    project: SharedProject,
    mut guard: TaskGuard,
    cancel: CancellationToken,
    timeout: Duration,
) -> Result<TaskReport> {
    let task_id = guard.task_id.clone();
    let deadline = Instant::now() + timeout;
    info!(task_id = %task_id, "monitoring task");

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StreamEnd::Cancelled),
        _ = sleep_until(deadline) => Err(StreamEnd::TimedOut),
        opened = connector.open(&task_id) => opened.map_err(StreamEnd::Failed),
    };
    let mut channel = match opened {
        Ok(channel) => channel,
        Err(end) => {
            let state = match &end {
                StreamEnd::Cancelled => TaskState::Cancelled,
                StreamEnd::TimedOut => TaskState::TimedOut,
                _ => TaskState::Errored,
            };
            guard.finish(state);
            return match end {
                StreamEnd::Failed(err) => {
                    error!(task_id = %task_id, error = %err, "failed to open task channel");
                    Err(err)
                },
                StreamEnd::Cancelled => Err(Error::TaskCancelled { task_id }),
                _ => {
                    warn!(task_id = %task_id, "task timed out before its channel opened");
                    Ok(TaskReport {
                        task_id,
                        state,
                        messages: Vec::new(),
                        rejected_patches: 0,
                    })
                },
            };
        },
    };
    debug!(task_id = %task_id, transport = channel.transport_type(), "task channel open");

    let mut messages = Vec::new();
    let mut rejected_patches = 0;
    let end = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            _ = sleep_until(deadline) => break StreamEnd::TimedOut,
            frame = channel.receive() => match frame {
                Ok(Some(text)) => {
                    let Some(frame) = decode_message(&task_id, &text) else {
                        continue;
                    };
                    rejected_patches += frame.rejected.len()
                        + apply_message(&project, &mut guard.running, &guard.timers, &frame.message);
                    messages.push(frame.message);
                },
                Ok(None) => break StreamEnd::Closed,
                Err(err) => break StreamEnd::Failed(err),
            },
        }
    };

    let report = |state| TaskReport {
        task_id: task_id.clone(),
        state,
        messages,
        rejected_patches,
    };

    match end {
        StreamEnd::Closed => {
            info!(task_id = %task_id, "task completed");
            guard.finish(TaskState::Completed);
            Ok(report(TaskState::Completed))
        },
        StreamEnd::TimedOut => {
            warn!(task_id = %task_id, ?timeout, "task timed out");
            close_channel(channel.as_mut(), &task_id).await;
            guard.finish(TaskState::TimedOut);
            Ok(report(TaskState::TimedOut))
        },
        StreamEnd::Cancelled => {
            acknowledge_cancel(channel.as_mut(), &task_id).await;
            guard.finish(TaskState::Cancelled);
            Err(Error::TaskCancelled {
                task_id: task_id.clone(),
            })
        },
        StreamEnd::Failed(err) => {
            error!(task_id = %task_id, error = %err, "task channel failed");
            close_channel(channel.as_mut(), &task_id).await;
            guard.finish(TaskState::Errored);
            Err(err)
        },
    }
}

/// Decodes a frame op by op. Only a frame that is not a message object at
/// all is skipped; malformed operations and timer values are logged and
/// left out.
fn decode_message(task_id: &str, text: &str) -> Option<DecodedFrame> {
    let frame = match TaskMessage::decode_frame(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(task_id = %task_id, error = %err, "skipping undecodable task message");
            return None;
        },
    };
    for err in &frame.rejected {
        warn!(task_id = %task_id, error = %err, "rejected patch operation");
    }
    if let Some(timer) = &frame.invalid_timer {
        warn!(task_id = %task_id, %timer, "ignoring unknown timer directive");
    }
    Some(frame)
}

/// Applies one message's patches and timer directive. Returns the number of
/// rejected patch operations.
fn apply_message(
    project: &RwLock<Project>,
    running: &mut RunningNodes,
    timers: &TimerBus,
    message: &TaskMessage,
) -> usize {
    let rejected = if message.patch.is_empty() {
        0
    } else {
        let mut project = project.write();
        patch::apply_all(&mut project, &message.patch).len()
    };

    match (message.timer, message.node_id.as_deref()) {
        (Some(directive), Some(node_id)) => {
            running.record(node_id, directive);
            timers.publish(&TimerEvent::new(node_id, directive.into()));
        },
        (Some(_), None) => warn!("timer directive without a node id"),
        (None, _) => {},
    }
    rejected
}

/// Sends the cancel signal and discards frames until the backend closes the
/// channel or the grace period runs out.
async fn acknowledge_cancel(channel: &mut dyn TaskChannel, task_id: &str) {
    if let Err(err) = channel.send(CANCEL_SIGNAL.to_string()).await {
        debug!(task_id = %task_id, error = %err, "cancel signal not delivered");
    }

    let drained = tokio::time::timeout(CANCEL_GRACE, async {
        let mut discarded = 0usize;
        while let Ok(Some(_)) = channel.receive().await {
            discarded += 1;
        }
        discarded
    })
    .await;

    match drained {
        Ok(discarded) => {
            info!(task_id = %task_id, discarded, "task cancelled");
        },
        Err(_) => {
            warn!(task_id = %task_id, "channel still open after cancel; closing locally");
        },
    }
    close_channel(channel, task_id).await;
}

async fn close_channel(channel: &mut dyn TaskChannel, task_id: &str) {
    if let Err(err) = channel.close().await {
        debug!(task_id = %task_id, error = %err, "error closing task channel");
    }
}
