// crates/keploy-drivers/tests/kv_driver.rs
// ============================================================================
// Module: Key-Value Driver Tests
// Description: Get/Set/Del interception and per-request isolation.
// Purpose: Validate the Nil sentinel and concurrent recording.
// Dependencies: keploy-drivers, keploy-core, tokio
// ============================================================================

//! Key-value driver record/replay tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use keploy_core::spawn_in_context;
use keploy_drivers::KeployKv;
use keploy_drivers::KvError;

use crate::common::MemoryKv;
use crate::common::record;
use crate::common::replay;

/// Outcomes of the miss, hit, and delete steps.
type FlowOutcome = (Result<String, KvError>, Result<String, KvError>, Result<u64, KvError>);

async fn cache_flow(kv: &KeployKv) -> FlowOutcome {
    let miss = kv.get("user:42").await;
    kv.set("user:42", "Ash", Some(Duration::from_secs(30))).await.unwrap();
    let hit = kv.get("user:42").await;
    let deleted = kv.del(&["user:42", "user:43"]).await;
    (miss, hit, deleted)
}

// ============================================================================
// SECTION: Record and Replay
// ============================================================================

#[tokio::test]
async fn cache_flow_replays_without_the_store() {
    let kv = KeployKv::new(Arc::new(MemoryKv::default()));
    let recording = record(cache_flow(&kv)).await;
    assert_eq!(recording.output, (Err(KvError::Nil), Ok("Ash".to_string()), Ok(1)));
    assert_eq!(recording.operations(), vec!["Get", "Set", "Get", "Del"]);
    assert_eq!(recording.deps[0].meta.name(), "redis");
    assert_eq!(recording.deps[3].meta.get("keys"), Some("user:42,user:43"));

    let offline = Arc::new(MemoryKv::default());
    let replay_kv = KeployKv::new(Arc::clone(&offline) as _);
    let (replayed, left) = replay(recording.deps, Vec::new(), cache_flow(&replay_kv)).await;
    assert_eq!(replayed, recording.output);
    assert_eq!(left, (0, 0));
    assert_eq!(offline.calls(), 0);
}

#[tokio::test]
async fn unmatched_get_is_nil() {
    let kv = KeployKv::new(Arc::new(MemoryKv::default()));
    let recording = record(kv.set("k", "v", None)).await;

    let (result, left) = replay(recording.deps, Vec::new(), kv.get("k")).await;
    assert_eq!(result, Err(KvError::Nil));
    assert_eq!(left, (1, 0));
}

#[tokio::test]
async fn calls_outside_a_context_reach_the_store() {
    let store = Arc::new(MemoryKv::default());
    let kv = KeployKv::new(Arc::clone(&store) as _);
    kv.set("k", "v", None).await.unwrap();
    assert_eq!(kv.get("k").await, Ok("v".to_string()));
    assert_eq!(store.calls(), 2);
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn spawned_tasks_record_into_the_parent_context() {
    const TASKS: usize = 4;
    const CALLS: usize = 5;

    let kv = KeployKv::new(Arc::new(MemoryKv::default()));
    let recording = record(async {
        let mut handles = Vec::new();
        for task in 0 .. TASKS {
            let kv = kv.clone();
            handles.push(spawn_in_context(async move {
                for call in 0 .. CALLS {
                    kv.set(&format!("task:{task}:{call}"), "x", None).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await;

    assert_eq!(recording.deps.len(), TASKS * CALLS);
    assert!(recording.operations().iter().all(|op| op == "Set"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_separate_recordings() {
    let kv = KeployKv::new(Arc::new(MemoryKv::default()));
    let mut handles = Vec::new();
    for request in 0 .. 8_usize {
        let kv = kv.clone();
        handles.push(tokio::spawn(async move {
            let recording = record(async {
                for call in 0 ..= request {
                    kv.get(&format!("req:{request}:{call}")).await.unwrap_err();
                }
            })
            .await;
            (request, recording.deps.len())
        }));
    }
    for handle in handles {
        let (request, deps) = handle.await.unwrap();
        assert_eq!(deps, request + 1);
    }
}
