use calltree_common::{CodeAddress, OpcodeTr, Trace};
use alloy_primitives::address;
use tracing::info;

/// A caller at depth 1 that CALLs into depth 2 and returns.
const NESTED: &str = r#"[
    {"index":0,"depth":1,"gas":50000,"opcode":96,"pc":0},
    {"index":1,"depth":1,"gas":49997,"opcode":241,"pc":2},
    {"index":2,"depth":2,"gas":30000,"opcode":96,"pc":0},
    {"index":3,"depth":2,"gas":29997,"opcode":0,"pc":2},
    {"index":4,"depth":1,"gas":45000,"opcode":91,"pc":3},
    {"index":5,"depth":1,"gas":44999,"gasCost":7,"opcode":0,"pc":4}
]"#;

#[test]
fn test_nested_trace_gas() {
    calltree_common::logging::ensure_test_logging(None);
    info!("Running test");
    let trace = Trace::from_json(NESTED).unwrap();

    assert_eq!(trace.len(), 6);
    let costs: Vec<u64> = (0..trace.len()).map(|i| trace.gas_cost_at(i)).collect();
    assert_eq!(costs, [3, 0, 3, 0, 1, 7]);
    assert_eq!(trace.total_gas_cost(), 14);
    assert_eq!(trace.gas_cost_at(6), 0);
}

#[test]
fn test_frame_transitions_follow_depth() {
    calltree_common::logging::ensure_test_logging(None);
    info!("Running test");
    let trace = Trace::from_json(NESTED).unwrap();

    let opened: Vec<usize> = trace
        .iter()
        .zip(trace.iter().skip(1))
        .filter(|(step, next)| step.opcode.opens_frame() && next.depth > step.depth)
        .map(|(step, _)| step.index)
        .collect();
    assert_eq!(opened, [1]);
    assert!(!trace[4].opcode.opens_frame());
}

#[test]
fn test_truncated_prefix() {
    calltree_common::logging::ensure_test_logging(None);
    info!("Running test");
    let trace = Trace::from_json(NESTED).unwrap();
    let prefix = trace.truncated(3);

    assert_eq!(prefix.len(), 3);
    assert_eq!(prefix[..], trace[..3]);
    // the last step of a prefix has no successor to derive a cost from
    assert_eq!(prefix.gas_cost_at(2), 0);
    assert_eq!(trace.truncated(100), trace);
}

#[test]
fn test_trace_json_shape() {
    calltree_common::logging::ensure_test_logging(None);
    info!("Running test");
    let trace = Trace::from_json(NESTED).unwrap();
    let json = serde_json::to_value(&trace).unwrap();

    assert!(json.is_array());
    assert_eq!(json[5]["gasCost"], 7);
    assert!(json[0].get("gasCost").is_none());

    let code = CodeAddress::creation(address!("00000000000000000000000000000000000000aa"));
    let json = serde_json::to_value(code).unwrap();
    assert_eq!(json["isCreation"], true);
}
