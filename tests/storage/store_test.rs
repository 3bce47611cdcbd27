// Store Tests
// Tests for the sled-backed delivery store

use ledgerwatch::ledger::{Address, Transaction, TxId};
use ledgerwatch::storage::{DeliveryRecord, DurabilityGate, MemoryGate, SledGate};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn observers(names: &[&str]) -> BTreeSet<Address> {
    names.iter().map(|name| Address::from(*name)).collect()
}

// ============================================================================
// SHARED GATE BEHAVIOUR
// ============================================================================

fn check_gate_contract(gate: &dyn DurabilityGate) {
    let tx = Transaction::new("CONTRACT", 42, "rAlice").with_index(3);

    assert!(!gate.already_delivered(&tx.id).unwrap());
    gate.record_delivered(&tx, &observers(&["rAlice"])).unwrap();
    assert!(gate.already_delivered(&tx.id).unwrap());

    // Recording again is harmless
    gate.record_delivered(&tx, &observers(&["rAlice"])).unwrap();
    assert!(gate.already_delivered(&tx.id).unwrap());
    assert!(!gate.already_delivered(&TxId::from("OTHER")).unwrap());

    // A later observer joins the same record
    gate.record_delivered(&tx, &observers(&["rBob"])).unwrap();
    assert_eq!(gate.delivered_to(&tx.id).unwrap(), observers(&["rAlice", "rBob"]));
    assert!(gate.delivered_to(&TxId::from("OTHER")).unwrap().is_empty());
}

#[test]
fn test_sled_gate_contract() {
    let temp_dir = TempDir::new().unwrap();
    let gate = SledGate::open(temp_dir.path()).unwrap();
    check_gate_contract(&gate);
}

#[test]
fn test_memory_gate_contract() {
    check_gate_contract(&MemoryGate::new());
}

// ============================================================================
// SLED GATE
// ============================================================================

#[test]
fn test_open_new_store_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let gate = SledGate::open(temp_dir.path()).unwrap();

    assert!(gate.is_empty());
    assert_eq!(gate.stats().delivered_count, 0);
}

#[test]
fn test_records_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let gate = SledGate::open(temp_dir.path()).unwrap();
        gate.record_delivered(&Transaction::new("T1", 10, "rAlice"), &observers(&["rAlice"])).unwrap();
        gate.record_delivered(&Transaction::new("T2", 11, "rBob"), &observers(&["rAlice"])).unwrap();
    }

    {
        let gate = SledGate::open(temp_dir.path()).unwrap();
        assert!(gate.already_delivered(&TxId::from("T1")).unwrap());
        assert!(gate.already_delivered(&TxId::from("T2")).unwrap());
        assert_eq!(gate.stats().delivered_count, 2);
    }
}

#[test]
fn test_record_keeps_position() {
    let temp_dir = TempDir::new().unwrap();
    let gate = SledGate::open(temp_dir.path()).unwrap();
    let tx = Transaction::new("POS", 900, "rAlice").with_index(7);

    gate.record_delivered(&tx, &observers(&["rAlice"])).unwrap();

    let record: DeliveryRecord = gate.load_record(&tx.id).unwrap().unwrap();
    assert_eq!(record.id, tx.id);
    assert_eq!(record.ledger_version, 900);
    assert_eq!(record.index_in_ledger, 7);
    assert_eq!(record.addresses, observers(&["rAlice"]));
    assert!(record.recorded_at > 0);
}

#[test]
fn test_addresses_accumulate_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let tx = Transaction::new("SHARED", 40, "rA");

    {
        let gate = SledGate::open(temp_dir.path()).unwrap();
        gate.record_delivered(&tx, &observers(&["rA"])).unwrap();
    }

    let gate = SledGate::open(temp_dir.path()).unwrap();
    gate.record_delivered(&tx, &observers(&["rB"])).unwrap();

    assert_eq!(gate.delivered_to(&tx.id).unwrap(), observers(&["rA", "rB"]));
    assert_eq!(gate.stats().delivered_count, 1);
}

#[test]
fn test_load_missing_record() {
    let temp_dir = TempDir::new().unwrap();
    let gate = SledGate::open(temp_dir.path()).unwrap();

    assert_eq!(gate.load_record(&TxId::from("NOPE")).unwrap(), None);
}

#[test]
fn test_forget_allows_redelivery() {
    let temp_dir = TempDir::new().unwrap();
    let gate = SledGate::open(temp_dir.path()).unwrap();
    let tx = Transaction::new("T1", 10, "rAlice");
    gate.record_delivered(&tx, &observers(&["rAlice"])).unwrap();

    assert!(gate.forget(&tx.id).unwrap());
    assert!(!gate.forget(&tx.id).unwrap());
    assert!(!gate.already_delivered(&tx.id).unwrap());
}

#[test]
fn test_delivered_ids() {
    let temp_dir = TempDir::new().unwrap();
    let gate = SledGate::open(temp_dir.path()).unwrap();
    for id in ["B", "A", "C"] {
        gate.record_delivered(&Transaction::new(id, 1, "rAlice"), &observers(&["rAlice"])).unwrap();
    }

    let ids: Vec<String> = gate
        .delivered_ids()
        .unwrap()
        .iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
}

#[test]
fn test_flush_and_stats() {
    let temp_dir = TempDir::new().unwrap();
    let gate = SledGate::open(temp_dir.path()).unwrap();
    gate.record_delivered(&Transaction::new("T1", 1, "rAlice"), &observers(&["rAlice"])).unwrap();

    gate.flush().unwrap();

    let stats = gate.stats();
    assert_eq!(stats.delivered_count, 1);
    assert!(stats.disk_size_bytes > 0);
}

// ============================================================================
// MEMORY GATE FAILURE INJECTION
// ============================================================================

#[test]
fn test_memory_gate_rejects_then_accepts_writes() {
    let gate = MemoryGate::new();
    let tx = Transaction::new("T1", 1, "rAlice");
    gate.fail_next_writes(2);

    assert!(gate.record_delivered(&tx, &observers(&["rAlice"])).is_err());
    assert!(gate.record_delivered(&tx, &observers(&["rAlice"])).is_err());
    assert!(gate.record_delivered(&tx, &observers(&["rAlice"])).is_ok());
    assert_eq!(gate.record_calls(), 1);
}

#[test]
fn test_memory_gate_read_failures() {
    let gate = MemoryGate::new().with_delivered(Transaction::new("T1", 1, "rAlice"), ["rAlice"]);
    gate.set_fail_reads(true);

    assert!(gate.already_delivered(&TxId::from("T1")).is_err());

    gate.set_fail_reads(false);
    assert!(gate.already_delivered(&TxId::from("T1")).unwrap());
}
