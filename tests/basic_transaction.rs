mod common;

use common::{key, run_to_commit, setup_list};
use selene::SeleneError;

#[test]
fn test_version_clock_advances_per_commit() {
    let list = setup_list();
    assert_eq!(list.current_version(), 0);
    assert_eq!(list.begin_transaction().read_version(), 0);

    let mut txn = list.begin_transaction();
    assert!(txn.insert(key(1), 100).unwrap());
    txn.commit().unwrap();

    assert_eq!(list.current_version(), 1);
    assert_eq!(list.begin_transaction().read_version(), 1);
}

#[test]
fn test_insert_get_roundtrip() {
    let list = setup_list();

    let mut txn = list.begin_transaction();
    assert!(txn.insert(key(1), 100).unwrap());
    // Staged writes are visible to the transaction that staged them.
    assert_eq!(txn.get(&key(1)).unwrap(), Some(100));
    assert!(txn.contains(&key(1)).unwrap());
    txn.commit().unwrap();

    let mut txn = list.begin_transaction();
    assert_eq!(txn.get(&key(1)).unwrap(), Some(100));
    assert!(txn.contains(&key(1)).unwrap());
    assert_eq!(txn.get(&key(2)).unwrap(), None);
    assert!(!txn.contains(&key(2)).unwrap());
}

#[test]
fn test_insert_existing_key_fails_without_side_effects() {
    let list = setup_list();
    run_to_commit(&list, |txn| txn.insert(key(1), 100));

    let mut txn = list.begin_transaction();
    assert!(!txn.insert(key(1), 999).unwrap());
    txn.commit().unwrap();

    let mut txn = list.begin_transaction();
    assert_eq!(txn.get(&key(1)).unwrap(), Some(100));
}

#[test]
fn test_remove_present_and_absent() {
    let list = setup_list();
    run_to_commit(&list, |txn| txn.insert(key(1), 100));

    let mut txn = list.begin_transaction();
    assert!(txn.remove(&key(1)).unwrap());
    // Gone within the removing transaction already.
    assert!(!txn.contains(&key(1)).unwrap());
    assert_eq!(txn.get(&key(1)).unwrap(), None);
    // Removing again in the same transaction finds nothing.
    assert!(!txn.remove(&key(1)).unwrap());
    txn.commit().unwrap();

    let mut txn = list.begin_transaction();
    assert!(!txn.contains(&key(1)).unwrap());
    assert!(!txn.remove(&key(2)).unwrap());
    txn.commit().unwrap();
}

#[test]
fn test_put_chains_previous_values() {
    let list = setup_list();

    assert_eq!(run_to_commit(&list, |txn| txn.put(key(1), 1)), None);
    assert_eq!(run_to_commit(&list, |txn| txn.put(key(1), 2)), Some(1));
    assert_eq!(run_to_commit(&list, |txn| txn.get(&key(1))), Some(2));
}

#[test]
fn test_put_after_remove_in_same_transaction() {
    let list = setup_list();
    run_to_commit(&list, |txn| txn.insert(key(1), 1));

    let mut txn = list.begin_transaction();
    assert!(txn.remove(&key(1)).unwrap());
    // The key is absent in this transaction's view, so nothing is replaced.
    assert_eq!(txn.put(key(1), 2).unwrap(), None);
    assert_eq!(txn.get(&key(1)).unwrap(), Some(2));
    txn.commit().unwrap();

    assert_eq!(run_to_commit(&list, |txn| txn.get(&key(1))), Some(2));
}

#[test]
fn test_insert_then_remove_in_same_transaction() {
    let list = setup_list();
    run_to_commit(&list, |txn| txn.insert(key(0), 0));
    run_to_commit(&list, |txn| txn.insert(key(2), 2));

    let mut txn = list.begin_transaction();
    assert!(txn.insert(key(1), 1).unwrap());
    assert!(txn.remove(&key(1)).unwrap());
    assert!(!txn.contains(&key(1)).unwrap());
    txn.commit().unwrap();

    let mut txn = list.begin_transaction();
    assert!(!txn.contains(&key(1)).unwrap());
    // Neighbours are untouched.
    assert_eq!(txn.get(&key(0)).unwrap(), Some(0));
    assert_eq!(txn.get(&key(2)).unwrap(), Some(2));
}

#[test]
fn test_rollback_and_drop_leave_no_trace() {
    let list = setup_list();

    let mut txn = list.begin_transaction();
    assert!(txn.insert(key(7), 7).unwrap());
    txn.rollback();

    {
        let mut txn = list.begin_transaction();
        assert!(txn.insert(key(8), 8).unwrap());
        // Dropped without commit.
    }

    let mut txn = list.begin_transaction();
    assert!(!txn.contains(&key(7)).unwrap());
    assert!(!txn.contains(&key(8)).unwrap());
}

#[test]
fn test_snapshot_conflict_aborts_stale_reader() {
    let list = setup_list();
    run_to_commit(&list, |txn| txn.insert(key(1), 1));

    let mut reader = list.begin_transaction();
    // A commit lands after the reader's snapshot was taken.
    run_to_commit(&list, |txn| txn.put(key(1), 2));

    // The reader cannot trust anything that commit touched.
    assert_eq!(
        reader.get(&key(1)),
        Err(SeleneError::TransactionConflict)
    );
    // An aborted transaction stays aborted.
    assert_eq!(
        reader.contains(&key(1)),
        Err(SeleneError::TransactionConflict)
    );
    assert!(reader.commit().is_err());
}

#[test]
fn test_read_set_validation_fails_at_commit() {
    let list = setup_list();

    let mut txn = list.begin_transaction();
    // Observe the neighbourhood of a key that is still absent.
    assert_eq!(txn.get(&key(5)).unwrap(), None);

    // Someone else commits into that neighbourhood first.
    run_to_commit(&list, |txn| txn.insert(key(3), 3));

    assert_eq!(txn.commit(), Err(SeleneError::TransactionConflict));
}

#[test]
fn test_write_version_assigned_at_commit() {
    let list = setup_list();

    let mut txn = list.begin_transaction();
    assert!(txn.insert(key(1), 1).unwrap());
    assert_eq!(txn.write_version(), None);
    txn.commit().unwrap();

    assert_eq!(list.current_version(), 1);
}
