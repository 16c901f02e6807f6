// Durable per-program publication flags.
//
// One row per program code, upserted on that key, so concurrent writers
// converge instead of corrupting state. The sled backend stores rows as
// JSON values; the in-memory backend backs tests and ephemeral runs.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::sync::Mutex;

use result_board::ProgramFlag;

use crate::board::*;

/// One persisted publication row.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ProgramStatusRow {
    pub program_code: String,
    pub is_published: bool,
    pub updated_at: DateTime<Utc>,
}

impl ProgramStatusRow {
    /// A row stamped with the current time. Stamping happens here, at the
    /// store boundary; the planning code never sees timestamps.
    pub fn now(program_code: &str, is_published: bool) -> ProgramStatusRow {
        ProgramStatusRow {
            program_code: program_code.to_string(),
            is_published,
            updated_at: Utc::now(),
        }
    }

    pub fn flag(&self) -> ProgramFlag {
        ProgramFlag {
            program_code: self.program_code.clone(),
            is_published: self.is_published,
        }
    }
}

/// The flag view of a row set, as consumed by the planning code.
pub fn flags(rows: &[ProgramStatusRow]) -> Vec<ProgramFlag> {
    rows.iter().map(ProgramStatusRow::flag).collect()
}

/// The persisted flag collection, keyed by program code.
///
/// Reads and writes are asynchronous I/O boundaries; a failed write in a
/// batch surfaces as a single aggregate error and the caller retries the
/// whole batch. Upserts are idempotent per key.
#[async_trait]
pub trait PublicationStore {
    async fn select_all(&self) -> BoardResult<Vec<ProgramStatusRow>>;
    async fn upsert_one(&self, row: ProgramStatusRow) -> BoardResult<()>;
    async fn upsert_many(&self, rows: Vec<ProgramStatusRow>) -> BoardResult<()>;
}

/// Durable store on a local sled tree.
///
/// Writes rely on sled's background flushing; on a crash the last few
/// writes may be lost, which the next reconcile cycle repairs.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> BoardResult<SledStore> {
        let shown = path.as_ref().display().to_string();
        let db = sled::open(path.as_ref()).context(StoreOpenSnafu { path: shown })?;
        debug!("SledStore::open: {} rows", db.len());
        Ok(SledStore { db })
    }

    fn encode(row: &ProgramStatusRow) -> BoardResult<Vec<u8>> {
        serde_json::to_vec(row).context(StoreEncodeSnafu {
            program_code: row.program_code.clone(),
        })
    }
}

#[async_trait]
impl PublicationStore for SledStore {
    async fn select_all(&self) -> BoardResult<Vec<ProgramStatusRow>> {
        let mut rows: Vec<ProgramStatusRow> = Vec::new();
        for item in self.db.iter() {
            let (_key, value) = item.context(StoreReadSnafu {})?;
            match serde_json::from_slice::<ProgramStatusRow>(&value) {
                Ok(row) => rows.push(row),
                // A value this store did not write; skip rather than fail
                // the whole read.
                Err(e) => debug!("select_all: skipping undecodable row: {}", e),
            }
        }
        Ok(rows)
    }

    async fn upsert_one(&self, row: ProgramStatusRow) -> BoardResult<()> {
        let value = SledStore::encode(&row)?;
        self.db
            .insert(row.program_code.as_bytes(), value)
            .context(StoreWriteSnafu { count: 1usize })?;
        Ok(())
    }

    async fn upsert_many(&self, rows: Vec<ProgramStatusRow>) -> BoardResult<()> {
        let count = rows.len();
        for row in rows {
            let value = SledStore::encode(&row)?;
            self.db
                .insert(row.program_code.as_bytes(), value)
                .context(StoreWriteSnafu { count })?;
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, ProgramStatusRow>>,
}

#[async_trait]
impl PublicationStore for MemoryStore {
    async fn select_all(&self) -> BoardResult<Vec<ProgramStatusRow>> {
        let rows = self.rows.lock().await;
        Ok(rows.values().cloned().collect())
    }

    async fn upsert_one(&self, row: ProgramStatusRow) -> BoardResult<()> {
        let mut rows = self.rows.lock().await;
        rows.insert(row.program_code.clone(), row);
        Ok(())
    }

    async fn upsert_many(&self, batch: Vec<ProgramStatusRow>) -> BoardResult<()> {
        let mut rows = self.rows.lock().await;
        for row in batch {
            rows.insert(row.program_code.clone(), row);
        }
        Ok(())
    }
}
