// crates/keploy-drivers/tests/proptest_sentinels.rs
// ============================================================================
// Module: Driver Sentinel Property-Based Tests
// Description: Property tests for recorded error restoration.
// Purpose: Check canonical sentinels survive a record/replay cycle.
// Dependencies: keploy-drivers, keploy-core, proptest
// ============================================================================

//! Property-based tests for driver error sentinels.

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
    reason = "Test-only assertions and helpers are permitted."
)]

use keploy_core::Dependency;
use keploy_core::DependencyKind;
use keploy_core::DependencyMeta;
use keploy_core::DriverError;
use keploy_drivers::DocumentError;
use keploy_drivers::KvError;
use keploy_drivers::SqlError;
use proptest::prelude::*;

fn sql_sentinel() -> impl Strategy<Value = SqlError> {
    prop_oneof![
        Just(SqlError::BadConn),
        Just(SqlError::Skip),
        Just(SqlError::NoRows),
        Just(SqlError::Eof),
        Just(SqlError::RowsClosed),
        Just(SqlError::TxDone),
    ]
}

fn document_sentinel() -> impl Strategy<Value = DocumentError> {
    prop_oneof![Just(DocumentError::NoDocuments), Just(DocumentError::CursorClosed)]
}

/// Records `error` as a failed call and decodes it back.
fn cycle<E: DriverError>(kind: DependencyKind, error: E) -> E {
    let meta = DependencyMeta::new("driver", kind, "Op");
    let dep = Dependency::from_outcome::<String, E>(meta, &Err(error)).unwrap();
    match dep.into_outcome::<String, E>().unwrap() {
        Ok(value) => panic!("expected an error, replayed {value}"),
        Err(err) => err,
    }
}

fn opaque_message() -> impl Strategy<Value = String> {
    "[a-z ]{1,24}".prop_filter("must not collide with a sentinel", |message| {
        message != "EOF" && message != "redis: nil" && message != "cursor is closed"
    })
}

proptest! {
    #[test]
    fn sql_sentinels_are_restored(error in sql_sentinel()) {
        prop_assert_eq!(cycle(DependencyKind::SqlDb, error.clone()), error);
    }

    #[test]
    fn document_sentinels_are_restored(error in document_sentinel()) {
        prop_assert_eq!(cycle(DependencyKind::NoSqlDb, error.clone()), error);
    }

    #[test]
    fn unknown_messages_stay_opaque(message in opaque_message()) {
        prop_assert_eq!(
            cycle(DependencyKind::SqlDb, SqlError::Backend(message.clone())),
            SqlError::Backend(message.clone())
        );
        prop_assert_eq!(
            cycle(DependencyKind::NoSqlDb, KvError::Backend(message.clone())),
            KvError::Backend(message.clone())
        );
        prop_assert_eq!(
            cycle(DependencyKind::NoSqlDb, DocumentError::Backend(message.clone())),
            DocumentError::Backend(message)
        );
    }
}

#[test]
fn kv_nil_is_restored() {
    assert_eq!(cycle(DependencyKind::NoSqlDb, KvError::Nil), KvError::Nil);
}

#[test]
fn unmatched_replays_map_to_driver_sentinels() {
    assert_eq!(SqlError::mock_not_found(), SqlError::BadConn);
    assert_eq!(KvError::mock_not_found(), KvError::Nil);
    assert_eq!(DocumentError::mock_not_found(), DocumentError::NoDocuments);
}
