//! A small contract `A` shared by the builder tests.
//!
//! Every instruction is a single byte, so program counters equal instruction
//! counters. The source text is twenty lines of 21 bytes each; offset `o`
//! lies on line `o / 21`.
//!
//! | pc | source range   | note                         |
//! |----|----------------|------------------------------|
//! | 0  | `0:420:0`      | dispatcher                   |
//! | 2  | `0:420:0:i`    | jump into `f`                |
//! | 3  | `21:189:0`     | entry of `f` (id 10)         |
//! | 4  | `63:17:0`      | `uint256 y = ...;`           |
//! | 5  | `75:5:0`       | initializer of `y`           |
//! | 6  | `0:0:-1`       | generated code               |
//! | 7  | `100:10:0`     | `return ...`                 |
//! | 8  | `21:189:0:o`   | return from `f`              |
//! | 9  | `0:0:-1`       | utility function, no AST id  |
//! | 10 | `231:100:0`    | entry of `g` (id 30)         |
//! | 11 | `240:10:0:i`   | `g` calls `f`                |
//! | 12 | `231:100:0:o`  | return from `g`              |
//! | 13 | `250:20:0`     | body of `g`                  |
//! | 16 | `22:30:1`      | compiler utility source      |
//!
//! The utility source (file 1) has lines of 10 bytes.

#![allow(dead_code)]

use alloy_primitives::{address, Address};
use calltree_common::{CodeAddress, Trace, TraceStep};
use calltree_engine::{BytecodeArtifact, CompiledArtifact, RecordedTrace, SourceFile};
use foundry_compilers::artifacts::GeneratedSource;
use serde_json::{json, Value};

pub const A: Address = address!("00000000000000000000000000000000000000aa");
pub const B: Address = address!("00000000000000000000000000000000000000bb");

pub const JUMPDEST: u8 = 0x5b;
pub const CALL: u8 = 0xf1;
pub const STOP: u8 = 0x00;

pub const F_ID: usize = 10;
pub const G_ID: usize = 30;
pub const CONSTRUCTOR_ID: usize = 40;

/// Gas charged by every step whose successor runs in the same frame.
pub const STEP_GAS: u64 = 3;

const DEPLOYED_MAP: &[&str] = &[
    "0:420:0:-",
    "0:420:0:-",
    "0:420:0:i",
    "21:189:0:-",
    "63:17:0:-",
    "75:5:0:-",
    "0:0:-1:-",
    "100:10:0:-",
    "21:189:0:o",
    "0:0:-1:-",
    "231:100:0:-",
    "240:10:0:i",
    "231:100:0:o",
    "250:20:0:-",
    "0:420:0:-",
    "0:420:0:-",
    "22:30:1:-",
];

const CREATION_MAP: &[&str] =
    &["0:420:0:-", "0:420:0:-", "357:60:0:-", "369:13:0:-", "380:10:0:-", "0:420:0:-"];

pub fn source_text() -> String {
    (0..20).map(|i| format!("{:<20}\n", format!("// line {i}"))).collect()
}

/// Yul helpers emitted by the compiler as file 1.
pub fn utility_source() -> GeneratedSource {
    GeneratedSource {
        ast: json!({ "nodeType": "YulBlock", "src": "0:60:1", "statements": [] }),
        contents: (0..6).map(|i| format!("{:<9}\n", format!("// u {i}"))).collect(),
        id: 1,
        language: "Yul".to_string(),
        name: "#utility.yul".to_string(),
    }
}

fn var(id: usize, name: &str, src: &str, ty: &str) -> Value {
    json!({
        "id": id, "nodeType": "VariableDeclaration", "name": name, "src": src,
        "stateVariable": false, "storageLocation": "default",
        "typeDescriptions": { "typeString": ty }
    })
}

fn params(list: Vec<Value>) -> Value {
    json!({ "nodeType": "ParameterList", "parameters": list })
}

pub fn ast() -> Value {
    json!({
        "id": 100, "nodeType": "SourceUnit", "src": "0:420:0",
        "nodes": [{
            "id": 99, "nodeType": "ContractDefinition", "name": "A", "src": "0:420:0",
            "nodes": [
                {
                    "id": F_ID, "nodeType": "FunctionDefinition", "kind": "function",
                    "name": "f", "src": "21:189:0",
                    "parameters": params(vec![var(11, "x", "32:9:0", "uint256")]),
                    "returnParameters": params(vec![var(12, "", "45:7:0", "uint256")]),
                    "body": { "nodeType": "Block", "src": "60:150:0", "statements": [{
                        "id": 20, "nodeType": "VariableDeclarationStatement", "src": "63:17:0",
                        "declarations": [var(21, "y", "63:9:0", "uint256")],
                        "initialValue": { "nodeType": "BinaryOperation", "src": "75:5:0" }
                    }]}
                },
                {
                    "id": G_ID, "nodeType": "FunctionDefinition", "kind": "function",
                    "name": "g", "src": "231:100:0",
                    "parameters": params(vec![]),
                    "returnParameters": params(vec![]),
                    "body": { "nodeType": "Block", "src": "240:90:0", "statements": [] }
                },
                {
                    "id": CONSTRUCTOR_ID, "nodeType": "FunctionDefinition", "kind": "constructor",
                    "name": "", "src": "357:60:0",
                    "parameters": params(vec![var(41, "owner", "369:13:0", "address")]),
                    "returnParameters": params(vec![]),
                    "body": { "nodeType": "Block", "src": "384:33:0", "statements": [] }
                }
            ]
        }]
    })
}

pub fn artifact() -> CompiledArtifact {
    let deployed = BytecodeArtifact::new(vec![JUMPDEST; DEPLOYED_MAP.len()], DEPLOYED_MAP.join(";"))
        .with_function("@f_10", 3, Some(F_ID as u32))
        .with_function("@cleanup_u256", 9, None)
        .with_function("@g_30", 10, Some(G_ID as u32))
        .with_function("@abi_decode", 14, None)
        .with_generated_source(utility_source());
    let creation =
        BytecodeArtifact::new(vec![JUMPDEST; CREATION_MAP.len()], CREATION_MAP.join(";"));
    CompiledArtifact::new("A", creation, deployed)
        .with_source(SourceFile::new(0, "src/A.sol", source_text(), ast()))
}

/// A step with gas derived from its position.
pub fn step(pc: usize, depth: usize, opcode: u8) -> TraceStep {
    TraceStep { index: 0, depth, gas: 0, gas_cost: None, opcode, pc }
}

/// Trace whose remaining gas drops by [`STEP_GAS`] per step within a frame.
pub fn trace(steps: impl IntoIterator<Item = TraceStep>) -> Trace {
    steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| TraceStep { gas: 1_000_000 - STEP_GAS * i as u64, ..step })
        .collect()
}

/// Trace over `pcs`, all at depth 1.
pub fn flat_trace(pcs: &[usize]) -> Trace {
    trace(pcs.iter().map(|pc| step(*pc, 1, JUMPDEST)))
}

/// `f` called from the dispatcher and returning:
/// steps 0-2 dispatcher, 3-8 `f`, 9-10 dispatcher.
pub fn call_f() -> RecordedTrace {
    RecordedTrace::new(flat_trace(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 0, 1]), CodeAddress::runtime(A))
        .with_stack_len([3], 4)
        .with_stack_len([5], 6)
}

/// `g` calling `f`: steps 1-6 `g`, 3-5 `f`.
pub fn call_g() -> RecordedTrace {
    RecordedTrace::new(flat_trace(&[0, 10, 11, 3, 4, 8, 12, 0]), CodeAddress::runtime(A))
}

/// `A` calls `B` at step 1; `B` enters `f` at step 3 and returns to `A`
/// after step 4.
pub fn call_external() -> RecordedTrace {
    let steps = [
        step(0, 1, JUMPDEST),
        step(1, 1, CALL),
        step(0, 2, JUMPDEST),
        step(3, 2, JUMPDEST),
        step(4, 2, STOP),
        step(1, 1, JUMPDEST),
    ];
    RecordedTrace::new(trace(steps), CodeAddress::runtime(A))
        .with_code_from(2, CodeAddress::runtime(B))
        .with_code_from(5, CodeAddress::runtime(A))
}

/// Deployment of `A` whose constructor body starts at step 3.
pub fn deploy() -> RecordedTrace {
    RecordedTrace::new(flat_trace(&[0, 1, 2, 3, 4, 5]), CodeAddress::creation(A))
        .with_stack_len([3], 1)
}
