// Ingestion Tests
// Tests for the per-ledger fan-out of range queries

use ledgerwatch::client::MockLedgerClient;
use ledgerwatch::ledger::{Address, LedgerFloorTracker, ServerInfo, Transaction, TxId};
use ledgerwatch::watch::{AddressOutcome, AddressRegistry, IngestionLoop, PendingTxIndex};
use std::sync::Arc;

struct Harness {
    client: Arc<MockLedgerClient>,
    registry: Arc<AddressRegistry>,
    floor: Arc<LedgerFloorTracker>,
    pending: Arc<PendingTxIndex>,
    ingestion: IngestionLoop,
}

fn harness() -> Harness {
    let client = Arc::new(MockLedgerClient::new());
    let registry = Arc::new(AddressRegistry::new());
    let floor = Arc::new(LedgerFloorTracker::new());
    let pending = Arc::new(PendingTxIndex::new());
    let ingestion = IngestionLoop::new(client.clone(), registry.clone(), floor.clone(), pending.clone());

    Harness {
        client,
        registry,
        floor,
        pending,
        ingestion,
    }
}

// ============================================================================
// QUERY BOUNDS
// ============================================================================

#[tokio::test]
async fn test_new_address_starts_at_floor() {
    let h = harness();
    let alice = Address::from("rAlice");
    h.registry.register(alice.clone());
    h.floor
        .update_from_server_info(&ServerInfo::with_complete_ledgers("100-200"))
        .unwrap();

    h.ingestion.process_ledger(201).await;

    let queries = h.client.queries_for(&alice);
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].query.min_ledger_version, 150);
    assert_eq!(queries[0].query.max_ledger_version, 201);
    assert_eq!(h.registry.cursor_for(&alice), Ok(201));
}

#[tokio::test]
async fn test_cursor_above_floor_is_used() {
    let h = harness();
    let alice = Address::from("rAlice");
    h.registry.register(alice.clone());
    h.registry.advance_cursor(&alice, 180).unwrap();
    h.floor
        .update_from_server_info(&ServerInfo::with_complete_ledgers("100-200"))
        .unwrap();

    h.ingestion.process_ledger(201).await;

    assert_eq!(h.client.queries_for(&alice)[0].query.min_ledger_version, 180);
}

#[tokio::test]
async fn test_no_query_below_floor() {
    let h = harness();
    for name in ["rAlice", "rBob", "rCarol"] {
        h.registry.register(name);
    }
    h.registry.advance_cursor(&Address::from("rBob"), 20).unwrap();
    h.floor
        .update_from_server_info(&ServerInfo::with_complete_ledgers("40-60"))
        .unwrap();

    for ledger in 61..=65 {
        h.ingestion.process_ledger(ledger).await;
    }

    let queries = h.client.queries();
    assert_eq!(queries.len(), 15);
    for recorded in queries {
        assert!(
            recorded.query.min_ledger_version >= h.floor.current_floor(),
            "{} queried from {}",
            recorded.address,
            recorded.query.min_ledger_version
        );
    }
}

#[tokio::test]
async fn test_skip_when_cursor_ahead_of_ledger() {
    let h = harness();
    let alice = Address::from("rAlice");
    h.registry.register(alice.clone());
    h.registry.advance_cursor(&alice, 90).unwrap();

    let report = h.ingestion.process_ledger(80).await;

    assert!(h.client.queries().is_empty());
    assert!(matches!(
        report.outcome_for(&alice),
        Some(AddressOutcome::Skipped { lower_bound: 90, .. })
    ));
    assert_eq!(h.registry.cursor_for(&alice), Ok(90));
}

// ============================================================================
// BUFFERING
// ============================================================================

#[tokio::test]
async fn test_transactions_buffered_under_their_own_ledger() {
    let h = harness();
    let alice = Address::from("rAlice");
    h.registry.register(alice.clone());
    h.registry.advance_cursor(&alice, 10).unwrap();
    h.client.add_transaction("rAlice", Transaction::new("T12", 12, "rAlice"));
    h.client.add_transaction("rAlice", Transaction::new("T17", 17, "rBob"));

    let report = h.ingestion.process_ledger(50).await;

    assert_eq!(report.buffered(), 2);
    assert_eq!(h.pending.len(), 2);
    assert!(h.pending.contains(12, &TxId::from("T12")));
    assert!(h.pending.contains(17, &TxId::from("T17")));
    assert_eq!(h.registry.cursor_for(&alice), Ok(50));
}

#[tokio::test]
async fn test_overlapping_ranges_buffer_once() {
    let h = harness();
    let alice = Address::from("rAlice");
    h.registry.register(alice.clone());
    h.client.add_transaction("rAlice", Transaction::new("T5", 5, "rAlice"));

    let first = h.ingestion.process_ledger(5).await;
    let second = h.ingestion.process_ledger(6).await;

    assert_eq!(first.buffered(), 1);
    assert_eq!(second.buffered(), 0);
    assert_eq!(h.pending.len(), 1);
    assert_eq!(h.client.queries_for(&alice)[1].query.min_ledger_version, 5);
}

#[tokio::test]
async fn test_shared_transaction_gets_both_observers() {
    let h = harness();
    h.registry.register("rAlice");
    h.registry.register("rBob");
    let shared = Transaction::new("PAY", 30, "rAlice");
    h.client.add_transaction("rAlice", shared.clone());
    h.client.add_transaction("rBob", shared);

    h.ingestion.process_ledger(30).await;

    let entry = h.pending.get(30, &TxId::from("PAY")).unwrap();
    assert_eq!(entry.observers().len(), 2);
    assert_eq!(h.pending.len(), 1);
}

// ============================================================================
// FAILURE AND RETRY
// ============================================================================

#[tokio::test]
async fn test_failed_query_retried_from_same_cursor() {
    let h = harness();
    let alice = Address::from("rAlice");
    h.registry.register(alice.clone());
    h.registry.advance_cursor(&alice, 10).unwrap();
    h.client.add_transaction("rAlice", Transaction::new("T30", 30, "rAlice"));
    h.client.fail_next_queries("rAlice", 1);

    let report = h.ingestion.process_ledger(50).await;

    assert_eq!(report.failure_count(), 1);
    assert!(matches!(report.outcome_for(&alice), Some(AddressOutcome::Failed { .. })));
    assert_eq!(h.registry.cursor_for(&alice), Ok(10));
    assert!(h.pending.is_empty());

    let report = h.ingestion.process_ledger(51).await;

    assert_eq!(report.failure_count(), 0);
    let queries = h.client.queries_for(&alice);
    assert_eq!(queries.len(), 2);
    assert!(queries[0].failed);
    assert_eq!(queries[1].query.min_ledger_version, 10);
    assert_eq!(queries[1].query.max_ledger_version, 51);
    assert!(h.pending.contains(30, &TxId::from("T30")));
    assert_eq!(h.registry.cursor_for(&alice), Ok(51));
}

#[tokio::test]
async fn test_one_failure_does_not_block_others() {
    let h = harness();
    let alice = Address::from("rAlice");
    let bob = Address::from("rBob");
    h.registry.register(alice.clone());
    h.registry.register(bob.clone());
    h.client.add_transaction("rBob", Transaction::new("B1", 3, "rBob"));
    h.client.fail_next_queries("rAlice", 1);

    let report = h.ingestion.process_ledger(5).await;

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(h.registry.cursor_for(&alice), Ok(1));
    assert_eq!(h.registry.cursor_for(&bob), Ok(5));
    assert!(h.pending.contains(3, &TxId::from("B1")));
}

#[tokio::test]
async fn test_join_waits_for_slow_address() {
    let h = harness();
    h.registry.register("rFast");
    h.registry.register("rSlow");
    h.client.delay_queries("rSlow", 50);
    h.client.add_transaction("rSlow", Transaction::new("S1", 9, "rSlow"));

    let report = h.ingestion.process_ledger(10).await;

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.aborted_tasks, 0);
    assert!(h.pending.contains(9, &TxId::from("S1")));
}

#[tokio::test]
async fn test_address_removed_mid_query_keeps_results() {
    let h = harness();
    let alice = Address::from("rAlice");
    h.registry.register(alice.clone());
    h.client.delay_queries("rAlice", 50);
    h.client.add_transaction("rAlice", Transaction::new("A1", 7, "rAlice"));

    let ingestion = h.ingestion.clone();
    let running = tokio::spawn(async move { ingestion.process_ledger(10).await });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert!(h.registry.remove(&alice));

    let report = running.await.unwrap();

    assert!(matches!(
        report.outcome_for(&alice),
        Some(AddressOutcome::Queried { buffered: 1, .. })
    ));
    assert!(!h.registry.contains(&alice));
    assert!(h.registry.cursor_for(&alice).is_err());
    assert!(h.pending.contains(7, &TxId::from("A1")));
}
