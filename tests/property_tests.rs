//! Property tests for the graph serializer, the frequency cache and typed
//! patch paths.
//!
//! Serializer properties use integer-valued coordinates and runtimes so the
//! JSON leg cannot introduce float rounding.

use flowsync::cache::FrequencyCache;
use flowsync::graph::{from_wire, to_wire, EditableGraph, EditorEdge, EditorNode, NodeData};
use flowsync::task::PatchTarget;
use flowsync::types::{DataRef, NodeType, PathSegment, Position, ProjNodeError, Workflow};
use indexmap::IndexMap;
use proptest::prelude::*;
use serde_json::{json, Map};

// ─── Strategies ─────────────────────────────────────────────────────────────

fn arb_kind() -> impl Strategy<Value = NodeType> {
    prop::sample::select(NodeType::ALL.to_vec())
}

fn arb_position() -> impl Strategy<Value = Position> {
    (-2_000i32..2_000, -2_000i32..2_000).prop_map(|(x, y)| Position {
        x: f64::from(x),
        y: f64::from(y),
    })
}

fn arb_error() -> impl Strategy<Value = ProjNodeError> {
    let messages = prop::collection::vec("[a-z ]{1,16}", 0..3);
    prop_oneof![
        (prop::collection::btree_set("[a-z]{1,6}", 0..3), messages.clone())
            .prop_map(|(ports, messages)| ProjNodeError::Validation { ports, messages }),
        messages
            .clone()
            .prop_map(|messages| ProjNodeError::Param { messages }),
        messages.prop_map(|messages| ProjNodeError::Execution { messages }),
    ]
}

fn arb_data() -> impl Strategy<Value = NodeData> {
    (
        prop::collection::btree_map("[a-z]{1,6}", -100i64..100, 0..3),
        prop::option::of(0u32..10_000),
        prop::option::of(prop::collection::vec("[a-z]{1,6}", 1..3)),
        prop::option::of(prop::collection::vec(("[a-z]{1,6}", "[a-f0-9]{8}"), 1..3)),
        prop::option::of(arb_error()),
    )
        .prop_map(|(param, runtime, schema_ports, data_ports, error)| NodeData {
            param: param
                .into_iter()
                .map(|(k, v)| (k, json!(v)))
                .collect::<Map<_, _>>(),
            runtime: runtime.map(f64::from),
            schema_out: schema_ports.map(|ports| {
                ports
                    .into_iter()
                    .map(|p| (p, json!({"type": "table"})))
                    .collect()
            }),
            data_out: data_ports.map(|ports| {
                ports
                    .into_iter()
                    .map(|(p, d)| (p, DataRef::new(d)))
                    .collect::<IndexMap<_, _>>()
            }),
            error,
        })
}

fn arb_graph() -> impl Strategy<Value = EditableGraph> {
    prop::collection::vec((arb_kind(), arb_position(), arb_data()), 0..8)
        .prop_flat_map(|nodes| {
            let count = nodes.len().max(1);
            let edges = prop::collection::vec((0..count, 0..count, "[a-z]{1,4}", "[a-z]{1,4}"), 0..6);
            (Just(nodes), edges, prop::option::of("[a-z ]{1,20}"))
        })
        .prop_map(|(nodes, edges, error)| {
            let nodes: Vec<EditorNode> = nodes
                .into_iter()
                .enumerate()
                .map(|(i, (kind, position, data))| EditorNode {
                    id: format!("n{i}"),
                    kind,
                    position,
                    data,
                })
                .collect();
            let edges = edges
                .into_iter()
                .enumerate()
                .map(|(i, (src, tar, out, inp))| EditorEdge {
                    id: format!("e{i}"),
                    source: format!("n{src}"),
                    source_handle: out,
                    target: format!("n{tar}"),
                    target_handle: inp,
                })
                .collect();
            EditableGraph {
                nodes,
                edges,
                error,
            }
        })
}

// ─── Serializer ─────────────────────────────────────────────────────────────

proptest! {
    /// Editor graph -> wire -> JSON -> wire -> fresh editor graph is lossless.
    #[test]
    fn wire_round_trip_into_empty_graph(graph in arb_graph()) {
        let wire = to_wire(&graph);
        let text = serde_json::to_string(&wire).unwrap();
        let decoded: Workflow = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(&decoded, &wire);

        let mut target = EditableGraph::new();
        from_wire(&decoded, &mut target);
        prop_assert_eq!(target, graph);
    }

    /// Writing back into the live graph restores results that were cleared
    /// locally and keeps node order.
    #[test]
    fn wire_round_trip_into_live_graph(graph in arb_graph()) {
        let wire = to_wire(&graph);

        let mut live = graph.clone();
        for node in &mut live.nodes {
            node.data = NodeData::default();
        }
        live.edges.clear();
        from_wire(&wire, &mut live);

        prop_assert_eq!(live, graph);
    }

    /// Serialization never depends on anything but the graph.
    #[test]
    fn to_wire_is_deterministic(graph in arb_graph()) {
        prop_assert_eq!(to_wire(&graph), to_wire(&graph.clone()));
    }
}

// ─── Cache ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum CacheOp {
    Put(u8),
    Hit(u8),
    Remove(u8),
}

fn arb_cache_op() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        3 => (0u8..16).prop_map(CacheOp::Put),
        2 => (0u8..16).prop_map(CacheOp::Hit),
        1 => (0u8..16).prop_map(CacheOp::Remove),
    ]
}

proptest! {
    /// The cache never holds more than its capacity, and the newest insert
    /// always survives its own eviction.
    #[test]
    fn cache_stays_within_capacity(
        max_size in 1usize..6,
        ops in prop::collection::vec(arb_cache_op(), 0..64),
    ) {
        let cache = FrequencyCache::new(max_size);
        for op in ops {
            match op {
                CacheOp::Put(key) => {
                    cache.put(key, u32::from(key) * 10);
                    prop_assert!(cache.contains_key(&key));
                    prop_assert_eq!(cache.get(&key), Some(u32::from(key) * 10));
                },
                CacheOp::Hit(key) => {
                    let cached = cache.contains_key(&key);
                    prop_assert_eq!(cache.hit(&key), cached);
                },
                CacheOp::Remove(key) => {
                    cache.remove(&key);
                    prop_assert!(!cache.contains_key(&key));
                },
            }
            prop_assert!(cache.len() <= max_size);
        }
    }

    /// Hit counts only ever grow while an entry stays cached.
    #[test]
    fn hit_counts_are_monotonic(hits in 0u64..20) {
        let cache = FrequencyCache::new(2);
        cache.put("k", ());
        for expected in 2..hits + 2 {
            cache.hit(&"k");
            prop_assert_eq!(cache.hit_count(&"k"), Some(expected));
        }
    }
}

// ─── Patch paths ────────────────────────────────────────────────────────────

fn arb_segment() -> impl Strategy<Value = PathSegment> {
    prop_oneof![
        prop::sample::select(vec![
            "workflow", "nodes", "error", "param", "runtime", "schema_out", "data_out",
            "position", "id", "type",
        ])
        .prop_map(PathSegment::from),
        "[a-z0-9_]{1,8}".prop_map(PathSegment::Key),
        (0usize..8).prop_map(PathSegment::from),
    ]
}

proptest! {
    /// Parsing arbitrary paths never panics, and anything accepted starts
    /// under `workflow`.
    #[test]
    fn patch_paths_fail_closed(path in prop::collection::vec(arb_segment(), 0..6)) {
        if PatchTarget::parse(&path).is_ok() {
            prop_assert_eq!(path.first(), Some(&PathSegment::from("workflow")));
        }
    }
}

fn arb_raw_segment() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<bool>().prop_map(serde_json::Value::from),
        (-50i64..50).prop_map(serde_json::Value::from),
        (-5.0f64..5.0).prop_map(serde_json::Value::from),
        "[a-z_]{1,8}".prop_map(serde_json::Value::from),
        Just(serde_json::Value::Null),
    ]
}

proptest! {
    /// Whatever a neighbouring op carries as its key, a well-formed op and
    /// the timer directive of the same frame survive decoding.
    #[test]
    fn malformed_keys_never_drop_the_frame(
        raw_key in prop::collection::vec(arb_raw_segment(), 0..5),
        before in any::<bool>(),
    ) {
        let good = json!({"key": ["workflow", "error"], "value": "x"});
        let other = json!({"key": raw_key, "value": 1});
        let ops = if before { vec![other, good] } else { vec![good, other] };
        let text = json!({"patch": ops, "timer": "start", "node_id": "n0"}).to_string();

        let frame = flowsync::types::TaskMessage::decode_frame(&text).unwrap();
        prop_assert_eq!(frame.message.patch.len() + frame.rejected.len(), 2);
        prop_assert!(frame
            .message
            .patch
            .iter()
            .any(|op| op.key.as_slice() == [PathSegment::from("workflow"), PathSegment::from("error")]));
        prop_assert_eq!(frame.message.timer, Some(flowsync::types::TimerDirective::Start));
    }
}
