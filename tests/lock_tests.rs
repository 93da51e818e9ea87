use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use jadb::common::{JadbError, Result, TransactionID};
use jadb::concurrency::{ConcurrencyManager, LockMode, LockTable};
use jadb::storage::BlockId;

fn block(n: i64) -> BlockId {
    BlockId::new("testfile", n)
}

#[test]
fn test_exclusive_waits_for_all_readers() -> Result<()> {
    let table = Arc::new(LockTable::new(Duration::from_secs(5)));
    let mut reader1 = ConcurrencyManager::new(TransactionID(1), Arc::clone(&table));
    let mut reader2 = ConcurrencyManager::new(TransactionID(2), Arc::clone(&table));
    reader1.s_lock(&block(0))?;
    reader2.s_lock(&block(0))?;

    let readers_done = Arc::new(AtomicBool::new(false));
    let writer = {
        let table = Arc::clone(&table);
        let readers_done = Arc::clone(&readers_done);
        thread::spawn(move || -> Result<bool> {
            let mut writer = ConcurrencyManager::new(TransactionID(3), table);
            writer.x_lock(&block(0))?;
            let saw_release = readers_done.load(Ordering::SeqCst);
            writer.release();
            Ok(saw_release)
        })
    };

    thread::sleep(Duration::from_millis(100));
    reader1.release();
    thread::sleep(Duration::from_millis(100));
    readers_done.store(true, Ordering::SeqCst);
    reader2.release();

    assert!(writer.join().expect("writer panicked")?);
    Ok(())
}

#[test]
fn test_exclusive_lock_excludes_everyone_until_release() -> Result<()> {
    let table = Arc::new(LockTable::new(Duration::from_millis(100)));
    let mut owner = ConcurrencyManager::new(TransactionID(1), Arc::clone(&table));
    let mut other = ConcurrencyManager::new(TransactionID(2), Arc::clone(&table));

    owner.x_lock(&block(0))?;
    assert!(matches!(other.s_lock(&block(0)), Err(JadbError::LockAbort(_))));
    assert!(matches!(other.x_lock(&block(0)), Err(JadbError::LockAbort(_))));
    assert_eq!(other.lock_mode(&block(0)), None);

    owner.release();
    other.x_lock(&block(0))?;
    assert_eq!(other.lock_mode(&block(0)), Some(LockMode::Exclusive));
    other.release();
    Ok(())
}

#[test]
fn test_upgrade_keeps_a_single_lock() -> Result<()> {
    let table = Arc::new(LockTable::new(Duration::from_millis(100)));
    let mut txn = ConcurrencyManager::new(TransactionID(1), Arc::clone(&table));

    txn.s_lock(&block(0))?;
    txn.x_lock(&block(0))?;
    txn.s_lock(&block(0))?; // Already covered by the exclusive lock
    assert_eq!(txn.lock_mode(&block(0)), Some(LockMode::Exclusive));
    assert_eq!(table.held_mode(&block(0), TransactionID(1)), Some(LockMode::Exclusive));

    txn.release();
    assert_eq!(txn.lock_mode(&block(0)), None);
    assert_eq!(table.held_mode(&block(0), TransactionID(1)), None);

    // Nothing left behind for another transaction to trip over
    let mut other = ConcurrencyManager::new(TransactionID(2), table);
    other.x_lock(&block(0))?;
    Ok(())
}

#[test]
fn test_release_frees_every_block() -> Result<()> {
    let table = Arc::new(LockTable::new(Duration::from_millis(100)));
    let mut txn = ConcurrencyManager::new(TransactionID(1), Arc::clone(&table));
    txn.x_lock(&block(0))?;
    txn.s_lock(&block(1))?;
    txn.x_lock(&BlockId::end_of_file("testfile"))?;
    txn.release();

    let mut other = ConcurrencyManager::new(TransactionID(2), table);
    other.x_lock(&block(0))?;
    other.x_lock(&block(1))?;
    other.x_lock(&BlockId::end_of_file("testfile"))?;
    Ok(())
}

#[test]
fn test_deadlock_is_broken_by_timeout() {
    let table = Arc::new(LockTable::new(Duration::from_millis(300)));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [(1, 0, 1), (2, 1, 0)]
        .into_iter()
        .map(|(txn, first, second)| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                let mut cm = ConcurrencyManager::new(TransactionID(txn), table);
                cm.x_lock(&block(first))?;
                barrier.wait();
                let result = cm.x_lock(&block(second));
                cm.release();
                result
            })
        })
        .collect();

    let results: Vec<Result<()>> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(JadbError::LockAbort(_)))));
}
