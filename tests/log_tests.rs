use std::sync::Arc;
use std::time::Duration;

use jadb::common::{JadbError, Result, TransactionID, LSN};
use jadb::log_mod::LogManager;
use jadb::recovery::{LogRecord, LogRecordType};
use jadb::storage::BlockId;

mod common;
use common::create_services;

fn record_bytes(i: usize) -> Vec<u8> {
    format!("record{}", i).into_bytes()
}

#[test]
fn test_lsns_increase_with_each_append() -> Result<()> {
    let services = create_services(2, Duration::from_millis(100))?;
    let lm = &services.lm;

    let first = lm.append(b"a")?;
    let second = lm.append(b"b")?;
    assert_eq!(first, LSN(1));
    assert!(second > first);
    assert_eq!(lm.latest_lsn(), second);
    Ok(())
}

#[test]
fn test_iterates_newest_first_across_blocks() -> Result<()> {
    let services = create_services(2, Duration::from_millis(100))?;
    let lm = &services.lm;

    // Enough records to spill over several 400-byte log blocks
    for i in 0..100 {
        lm.append(&record_bytes(i))?;
    }
    assert!(services.fm.length("test.log")? > 1);

    let records: Vec<Vec<u8>> = lm.iter()?.collect::<Result<_>>()?;
    let expected: Vec<Vec<u8>> = (0..100).rev().map(record_bytes).collect();
    assert_eq!(records, expected);

    // A fresh iterator starts over from the newest record
    let newest = lm.iter()?.next().transpose()?;
    assert_eq!(newest, Some(record_bytes(99)));
    Ok(())
}

#[test]
fn test_flush_advances_last_saved_lsn() -> Result<()> {
    let services = create_services(2, Duration::from_millis(100))?;
    let lm = &services.lm;

    let lsn = lm.append(b"pending")?;
    assert!(lm.last_saved_lsn() < lsn);
    lm.flush(lsn)?;
    assert!(lm.last_saved_lsn() >= lsn);
    Ok(())
}

#[test]
fn test_empty_log_has_no_records() -> Result<()> {
    let services = create_services(2, Duration::from_millis(100))?;
    assert_eq!(services.lm.iter()?.count(), 0);
    Ok(())
}

#[test]
fn test_log_survives_reopen() -> Result<()> {
    let services = create_services(2, Duration::from_millis(100))?;
    for i in 0..30 {
        services.lm.append(&record_bytes(i))?;
    }
    services.lm.flush(services.lm.latest_lsn())?;

    let reopened = LogManager::new(Arc::clone(&services.fm), "test.log")?;
    reopened.append(&record_bytes(30))?;
    let records: Vec<Vec<u8>> = reopened.iter()?.collect::<Result<_>>()?;
    let expected: Vec<Vec<u8>> = (0..31).rev().map(record_bytes).collect();
    assert_eq!(records, expected);
    Ok(())
}

#[test]
fn test_oversized_record_is_rejected() -> Result<()> {
    let services = create_services(2, Duration::from_millis(100))?;
    let result = services.lm.append(&vec![1u8; 400]);
    assert!(matches!(result, Err(JadbError::LogRecordTooLarge(400))));
    Ok(())
}

#[test]
fn test_log_records_read_back_in_reverse() -> Result<()> {
    let services = create_services(2, Duration::from_millis(100))?;
    let txn_id = TransactionID(1);
    let block = BlockId::new("testfile", 0);

    let written = vec![
        LogRecord::Start { txn_id },
        LogRecord::SetInt {
            txn_id,
            block: block.clone(),
            offset: 0,
            old_value: 5,
        },
        LogRecord::SetString {
            txn_id,
            block,
            offset: 20,
            old_bytes: vec![0; 9],
        },
        LogRecord::Commit { txn_id },
    ];
    for record in &written {
        record.write_to_log(&services.lm)?;
    }

    let read: Vec<LogRecord> = services
        .lm
        .iter()?
        .map(|bytes| bytes.and_then(|bytes| LogRecord::from_bytes(&bytes)))
        .collect::<Result<_>>()?;
    let types: Vec<LogRecordType> = read.iter().map(LogRecord::record_type).collect();
    assert_eq!(
        types,
        vec![
            LogRecordType::Commit,
            LogRecordType::SetString,
            LogRecordType::SetInt,
            LogRecordType::Start
        ]
    );
    assert_eq!(read.into_iter().rev().collect::<Vec<_>>(), written);
    Ok(())
}

#[test]
fn test_reopen_formats_unfinished_trailing_block() -> Result<()> {
    let services = create_services(2, Duration::from_millis(100))?;
    services.lm.append(&record_bytes(0))?;
    services.lm.flush(services.lm.latest_lsn())?;

    // A crash right after extending the log leaves a zeroed block at the end
    services.fm.append("test.log")?;

    let reopened = LogManager::new(Arc::clone(&services.fm), "test.log")?;
    reopened.append(&record_bytes(1))?;
    let records: Vec<Vec<u8>> = reopened.iter()?.collect::<Result<_>>()?;
    assert_eq!(records, vec![record_bytes(1), record_bytes(0)]);
    assert_eq!(services.fm.length("test.log")?, 2);
    Ok(())
}

#[test]
fn test_unformatted_block_inside_log_is_corrupt() -> Result<()> {
    let services = create_services(2, Duration::from_millis(100))?;
    services.fm.append("other.log")?;
    services.fm.append("other.log")?;

    // Only the last block gets formatted on open
    let lm = LogManager::new(Arc::clone(&services.fm), "other.log")?;
    let first = lm.iter()?.next();
    assert!(matches!(first, Some(Err(JadbError::CorruptLog(_)))));
    Ok(())
}
