use env_logger::Builder;
use log::{info, LevelFilter};
use uuid::Uuid;

use jadb::{BlockId, Database, DatabaseConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("jadb transactional block store");

    let db_path = std::env::temp_dir().join(format!("jadb-demo-{}", Uuid::new_v4()));
    let config = DatabaseConfig {
        block_size: 400,
        buffer_pool_size: 8,
        ..DatabaseConfig::default()
    };
    let db = Database::open(&db_path, config)?;
    let block = BlockId::new("demo.tbl", 0);

    let mut txn1 = db.new_transaction()?;
    txn1.set_int(&block, 0, 123, true)?;
    txn1.set_string(&block, 20, "committed", true)?;
    txn1.commit()?;

    let mut txn2 = db.new_transaction()?;
    txn2.set_string(&block, 20, "never seen", true)?;
    txn2.rollback()?;

    let mut txn3 = db.new_transaction()?;
    info!(
        "read back int={} string={:?}",
        txn3.get_int(&block, 0)?,
        txn3.get_string(&block, 20)?
    );
    txn3.commit()?;

    drop(db);
    std::fs::remove_dir_all(&db_path)?;
    Ok(())
}
