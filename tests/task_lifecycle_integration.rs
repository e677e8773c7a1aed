//! Integration tests for task monitoring over the in-process channel.
//!
//! The test plays the backend through [`ServerEnd`] and checks what reaches
//! the shared project, the timer bus and the task slot.

use flowsync::shared::{MemoryConnector, CANCEL_SIGNAL};
use flowsync::task::{TaskManager, TaskState, TimerBus, TimerEvent, TimerEventKind};
use flowsync::types::{
    Node, NodeType, PatchOp, PathSegment, Position, ProjNodeError, Project, TaskMessage,
    TimerDirective,
};
use flowsync::Error;
use parking_lot::{Mutex, RwLock};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

struct Harness {
    connector: Arc<MemoryConnector>,
    manager: TaskManager,
    project: Arc<RwLock<Project>>,
    events: Arc<Mutex<Vec<TimerEvent>>>,
}

fn harness(timeout: Duration) -> Harness {
    let connector = Arc::new(MemoryConnector::new());
    let timers = Arc::new(TimerBus::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    timers.subscribe(Arc::new(move |event: &TimerEvent| sink.lock().push(event.clone())));

    let manager = TaskManager::new(connector.clone(), timeout).with_timer_bus(timers);

    let mut project = Project::new(42, "three nodes", 7);
    project.workflow.nodes = vec![
        Node::new("n1", NodeType::ConstInt, Position { x: 0.0, y: 0.0 }),
        Node::new("n2", NodeType::TableFilter, Position { x: 200.0, y: 0.0 }),
        Node::new("n3", NodeType::PlotLine, Position { x: 400.0, y: 0.0 }),
    ];

    Harness {
        connector,
        manager,
        project: Arc::new(RwLock::new(project)),
        events,
    }
}

fn timer(node_id: &str, directive: TimerDirective) -> TaskMessage {
    TaskMessage {
        timer: Some(directive),
        node_id: Some(node_id.to_string()),
        ..Default::default()
    }
}

fn patch(path: Vec<PathSegment>, value: serde_json::Value) -> TaskMessage {
    TaskMessage {
        patch: vec![PatchOp::new(path, value)],
        ..Default::default()
    }
}

fn event(node_id: &str, kind: TimerEventKind) -> TimerEvent {
    TimerEvent::new(node_id, kind)
}

#[tokio::test]
async fn two_patches_then_clean_close() {
    let h = harness(Duration::from_secs(60));
    let monitor = h.manager.monitor(h.project.clone(), "task-1");
    assert_eq!(h.manager.current_task_id().as_deref(), Some("task-1"));
    assert_eq!(h.manager.state(), TaskState::Streaming);

    let backend = async {
        let server = h.connector.accept().await.unwrap();
        assert_eq!(server.task_id(), "task-1");
        server.send(&patch(
            vec!["workflow".into(), "nodes".into(), 1usize.into(), "schema_out".into()],
            json!({"table": {"columns": ["a", "b"]}}),
        ));
        server.send(&patch(
            vec!["workflow".into(), "nodes".into(), "n3".into(), "error".into()],
            json!({"type": "validation", "ports": ["y"], "messages": ["y: not numeric"]}),
        ));
        server.close();
    };

    let (report, ()) = tokio::join!(monitor, backend);
    let report = report.unwrap();

    assert_eq!(report.state, TaskState::Completed);
    assert_eq!(report.messages.len(), 2);
    assert_eq!(report.rejected_patches, 0);

    let project = h.project.read();
    assert_eq!(
        project.node("n2").unwrap().schema_out.as_ref().unwrap()["table"],
        json!({"columns": ["a", "b"]})
    );
    assert_eq!(
        project.node("n3").unwrap().error,
        Some(ProjNodeError::Validation {
            ports: ["y".to_string()].into(),
            messages: vec!["y: not numeric".to_string()],
        })
    );
    assert_eq!(project.node("n1").unwrap().schema_out, None);

    assert!(!h.manager.has_active_task());
    assert_eq!(h.manager.current_task_id(), None);
    assert_eq!(h.manager.state(), TaskState::Completed);
}

#[tokio::test]
async fn rejected_patch_does_not_stop_the_stream() {
    let h = harness(Duration::from_secs(60));
    let monitor = h.manager.monitor(h.project.clone(), "t");

    let backend = async {
        let server = h.connector.accept().await.unwrap();
        server.send(&TaskMessage {
            patch: vec![
                PatchOp::new(["workflow", "nodes", "n1", "colour"], json!("red")),
                PatchOp::new(["workflow", "nodes", "n1", "runtime"], json!(0.5)),
            ],
            ..Default::default()
        });
        server.close();
    };

    let (report, ()) = tokio::join!(monitor, backend);
    let report = report.unwrap();
    assert_eq!(report.rejected_patches, 1);
    assert_eq!(h.project.read().node("n1").unwrap().runtime, Some(0.5));
}

#[tokio::test]
async fn malformed_op_keeps_the_rest_of_its_frame() {
    let h = harness(Duration::from_secs(60));
    let monitor = h.manager.monitor(h.project.clone(), "t");

    let backend = async {
        let server = h.connector.accept().await.unwrap();
        server.send_raw(
            json!({
                "patch": [
                    {"key": ["workflow", "nodes", "n1", "runtime"], "value": 2.5},
                    {"key": ["workflow", "nodes", true, "runtime"], "value": 1.0},
                ],
                "timer": "start",
                "node_id": "n1",
            })
            .to_string(),
        );
        server.send_raw(
            json!({
                "patch": [{"key": ["workflow", "nodes", 1, "runtime"], "value": 0.75}],
                "timer": "paused",
                "node_id": "n2",
            })
            .to_string(),
        );
        server.send(&timer("n1", TimerDirective::Stop));
        server.close();
    };

    let (report, ()) = tokio::join!(monitor, backend);
    let report = report.unwrap();

    assert_eq!(report.state, TaskState::Completed);
    assert_eq!(report.messages.len(), 3);
    assert_eq!(report.rejected_patches, 1);

    let project = h.project.read();
    assert_eq!(project.node("n1").unwrap().runtime, Some(2.5));
    assert_eq!(project.node("n2").unwrap().runtime, Some(0.75));
    assert_eq!(
        *h.events.lock(),
        vec![
            event("n1", TimerEventKind::Start),
            event("n1", TimerEventKind::Stop),
        ]
    );
}

#[tokio::test]
async fn dangling_timers_are_closed_with_error_events() {
    let h = harness(Duration::from_secs(60));
    let monitor = h.manager.monitor(h.project.clone(), "t");

    let backend = async {
        let server = h.connector.accept().await.unwrap();
        server.send(&timer("n1", TimerDirective::Start));
        server.send(&timer("n2", TimerDirective::Start));
        server.send(&timer("n1", TimerDirective::Stop));
        server.close();
    };

    let (report, ()) = tokio::join!(monitor, backend);
    assert_eq!(report.unwrap().state, TaskState::Completed);
    assert_eq!(
        *h.events.lock(),
        vec![
            event("n1", TimerEventKind::Start),
            event("n2", TimerEventKind::Start),
            event("n1", TimerEventKind::Stop),
            event("n2", TimerEventKind::Error),
        ]
    );
}

#[tokio::test]
async fn cancel_signals_drains_and_rejects() {
    let h = harness(Duration::from_secs(60));
    let started = Arc::new(Notify::new());
    let notify = started.clone();
    h.manager.timers().subscribe(Arc::new(move |e: &TimerEvent| {
        if e.kind == TimerEventKind::Start {
            notify.notify_one();
        }
    }));

    let monitor = h.manager.monitor(h.project.clone(), "t-cancel");

    let backend = async {
        let server = h.connector.accept().await.unwrap();
        server.send(&timer("n2", TimerDirective::Start));
        assert_eq!(server.recv().await.as_deref(), Some(CANCEL_SIGNAL));
        // Late patch sent before acknowledging; it must be discarded.
        server.send(&patch(
            vec!["workflow".into(), "nodes".into(), "n2".into(), "runtime".into()],
            json!(9.0),
        ));
        server.close();
    };

    let canceller = async {
        started.notified().await;
        h.manager.cancel().await;
        assert!(!h.manager.has_active_task());
    };

    let (result, (), ()) = tokio::join!(monitor, backend, canceller);

    match result {
        Err(Error::TaskCancelled { task_id }) => assert_eq!(task_id, "t-cancel"),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(h.manager.state(), TaskState::Cancelled);
    assert_eq!(h.project.read().node("n2").unwrap().runtime, None);
    assert_eq!(
        *h.events.lock(),
        vec![
            event("n2", TimerEventKind::Start),
            event("n2", TimerEventKind::Error),
        ]
    );
}

#[tokio::test]
async fn transport_failure_rejects_and_closes_timers() {
    let h = harness(Duration::from_secs(60));
    let monitor = h.manager.monitor(h.project.clone(), "t");

    let backend = async {
        let server = h.connector.accept().await.unwrap();
        server.send(&timer("n3", TimerDirective::Start));
        server.fail("connection reset");
    };

    let (result, ()) = tokio::join!(monitor, backend);
    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(h.manager.state(), TaskState::Errored);
    assert_eq!(
        h.events.lock().last(),
        Some(&event("n3", TimerEventKind::Error))
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_resolves_with_messages_so_far() {
    let h = harness(Duration::from_secs(10));
    let monitor = h.manager.monitor(h.project.clone(), "slow");

    let backend = async {
        let server = h.connector.accept().await.unwrap();
        server.send(&timer("n1", TimerDirective::Start));
        server
    };

    let (report, server) = tokio::join!(monitor, backend);
    let report = report.unwrap();

    assert_eq!(report.state, TaskState::TimedOut);
    assert_eq!(report.messages.len(), 1);
    assert_eq!(h.manager.state(), TaskState::TimedOut);
    assert_eq!(
        h.events.lock().last(),
        Some(&event("n1", TimerEventKind::Error))
    );
    // The client side closed its half.
    assert_eq!(server.recv().await, None);
}

#[tokio::test]
async fn next_task_can_start_after_the_previous_one_ends() {
    let h = harness(Duration::from_secs(60));

    for task_id in ["first", "second"] {
        let monitor = h.manager.monitor(h.project.clone(), task_id);
        let backend = async {
            let server = h.connector.accept().await.unwrap();
            server.close();
            server.task_id().to_string()
        };
        let (report, seen) = tokio::join!(monitor, backend);
        assert_eq!(report.unwrap().task_id, task_id);
        assert_eq!(seen, task_id);
    }
}
