//! SQLite store for the chainview index.
//!
//! All writes go through a scoped [`StoreTx`]: one confirmed block's rows
//! (block + transactions + inputs + outputs) commit as a single unit, and
//! dropping an uncommitted `StoreTx` rolls everything back. Reads run
//! against the pool directly.
//!
//! The pool is capped at one connection: the sync loop is a single
//! logical worker and owns the store exclusively.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use chainview_core::types::PENDING_BLOCK_HASH;
use chainview_core::{BlockRow, InputRow, OutputKind, OutputRow, SyncError, TxRow};

/// Schema version written on first creation.
const SCHEMA_VERSION: &str = "1.0";

fn storage(e: sqlx::Error) -> SyncError {
    SyncError::Storage(e.to_string())
}

/// SQLite-backed index store.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the index database at `path`.
    ///
    /// The path may be a plain file path (`"./chainview.db"`) or a full
    /// SQLite URL (`"sqlite:./chainview.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        Self::connect(&url).await
    }

    /// Open an in-memory database. All data is lost on drop; for tests.
    pub async fn in_memory() -> Result<Self, SyncError> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect(url: &str) -> Result<Self, SyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and indices, enable WAL, and stamp the schema version.
    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS version (ver TEXT);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS block (
                hash              TEXT PRIMARY KEY,
                height            INTEGER UNIQUE,
                previousblockhash TEXT UNIQUE,
                strippedsize      INTEGER NOT NULL,
                size              INTEGER NOT NULL,
                weight            INTEGER NOT NULL,
                versionhex        TEXT    NOT NULL,
                merkleroot        TEXT    NOT NULL,
                time              INTEGER NOT NULL,
                mediantime        INTEGER NOT NULL,
                nonce             INTEGER NOT NULL,
                bits              TEXT    NOT NULL,
                difficulty        TEXT    NOT NULL,
                chainwork         TEXT    NOT NULL,
                numtxs            INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tx (
                txid      TEXT PRIMARY KEY,
                blockhash TEXT    NOT NULL,
                n         INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS input (
                txid       TEXT    NOT NULL,
                n          INTEGER NOT NULL,
                spendstxid TEXT    NOT NULL,
                spendsn    INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS output (
                txid    TEXT    NOT NULL,
                n       INTEGER NOT NULL,
                type    TEXT    NOT NULL,
                value   INTEGER NOT NULL,
                address TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        // Indices backing spend resolution and address lookups
        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_input_txid ON input (txid);",
            "CREATE INDEX IF NOT EXISTS idx_input_spendstxid ON input (spendstxid);",
            "CREATE INDEX IF NOT EXISTS idx_output_txid ON output (txid);",
            "CREATE INDEX IF NOT EXISTS idx_output_address ON output (address);",
        ] {
            sqlx::query(ddl).execute(&self.pool).await.map_err(storage)?;
        }

        let stamped: i64 = sqlx::query("SELECT COUNT(*) AS cnt FROM version")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?
            .get("cnt");
        if stamped == 0 {
            sqlx::query("INSERT INTO version (ver) VALUES (?)")
                .bind(SCHEMA_VERSION)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
            debug!(version = SCHEMA_VERSION, "created index schema");
        }

        Ok(())
    }

    /// The stamped schema version.
    pub async fn schema_version(&self) -> Result<String, SyncError> {
        let row = sqlx::query("SELECT ver FROM version")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get("ver"))
    }

    /// Begin a scoped write transaction.
    pub async fn begin(&self) -> Result<StoreTx<'_>, SyncError> {
        let tx = self.pool.begin().await.map_err(storage)?;
        Ok(StoreTx { tx })
    }

    // ─── Chain position ─────────────────────────────────────────────────────

    /// Highest confirmed height, ignoring the pending sentinel. `None` when
    /// no confirmed block is indexed yet.
    pub async fn max_confirmed_height(&self) -> Result<Option<i64>, SyncError> {
        let row = sqlx::query("SELECT MAX(height) AS h FROM block WHERE height >= 0")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get::<Option<i64>, _>("h"))
    }

    /// Hash of the confirmed block at `height`, if indexed.
    pub async fn block_hash_at(&self, height: i64) -> Result<Option<String>, SyncError> {
        let row = sqlx::query("SELECT hash FROM block WHERE height = ?")
            .bind(height)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| r.get("hash")))
    }

    // ─── Point lookups ──────────────────────────────────────────────────────

    pub async fn block_by_hash(&self, hash: &str) -> Result<Option<BlockRow>, SyncError> {
        let row = sqlx::query("SELECT * FROM block WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| block_from_row(&r)))
    }

    pub async fn block_by_height(&self, height: i64) -> Result<Option<BlockRow>, SyncError> {
        let row = sqlx::query("SELECT * FROM block WHERE height = ?")
            .bind(height)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| block_from_row(&r)))
    }

    /// Confirmed blocks with `low <= height <= high`, descending, the
    /// presentation layer's block-list query.
    pub async fn blocks_in_range(&self, low: i64, high: i64) -> Result<Vec<BlockRow>, SyncError> {
        let rows = sqlx::query(
            "SELECT * FROM block WHERE height >= ? AND height <= ? ORDER BY height DESC",
        )
        .bind(low.max(0))
        .bind(high)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.iter().map(block_from_row).collect())
    }

    pub async fn tx_by_id(&self, txid: &str) -> Result<Option<TxRow>, SyncError> {
        let row = sqlx::query("SELECT txid, blockhash, n FROM tx WHERE txid = ?")
            .bind(txid)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| TxRow {
            txid: r.get("txid"),
            blockhash: r.get("blockhash"),
            n: r.get("n"),
        }))
    }

    /// Txids of a block, in block order.
    pub async fn txids_in_block(&self, blockhash: &str) -> Result<Vec<String>, SyncError> {
        let rows = sqlx::query("SELECT txid FROM tx WHERE blockhash = ? ORDER BY n")
            .bind(blockhash)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        Ok(rows.iter().map(|r| r.get("txid")).collect())
    }

    /// Txids currently recorded under the pending sentinel.
    pub async fn pending_txids(&self) -> Result<Vec<String>, SyncError> {
        self.txids_in_block(PENDING_BLOCK_HASH).await
    }

    /// The pending sentinel row, if it has been created yet.
    pub async fn pending_block(&self) -> Result<Option<BlockRow>, SyncError> {
        self.block_by_hash(PENDING_BLOCK_HASH).await
    }

    pub async fn inputs_of(&self, txid: &str) -> Result<Vec<InputRow>, SyncError> {
        let rows = sqlx::query(
            "SELECT txid, n, spendstxid, spendsn FROM input WHERE txid = ? ORDER BY n",
        )
        .bind(txid)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows
            .iter()
            .map(|r| InputRow {
                txid: r.get("txid"),
                n: r.get("n"),
                spendstxid: r.get("spendstxid"),
                spendsn: r.get("spendsn"),
            })
            .collect())
    }

    pub async fn outputs_of(&self, txid: &str) -> Result<Vec<OutputRow>, SyncError> {
        let rows = sqlx::query(
            "SELECT txid, n, type, value, address FROM output WHERE txid = ? ORDER BY n",
        )
        .bind(txid)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.iter().map(output_from_row).collect())
    }

    // ─── Address queries ────────────────────────────────────────────────────

    /// Every output ever paid to `address`, oldest first.
    pub async fn outputs_for_address(&self, address: &str) -> Result<Vec<OutputRow>, SyncError> {
        let rows = sqlx::query(
            "SELECT txid, n, type, value, address FROM output
             WHERE address = ? ORDER BY rowid",
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.iter().map(output_from_row).collect())
    }

    /// Sum of unspent output values for `address`, in satoshis. An output
    /// is unspent when no input's `(spendstxid, spendsn)` resolves to it.
    pub async fn address_balance(&self, address: &str) -> Result<i64, SyncError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(o.value), 0) AS balance FROM output o
             WHERE o.address = ?
               AND NOT EXISTS (SELECT 1 FROM input i
                               WHERE i.spendstxid = o.txid AND i.spendsn = o.n)",
        )
        .bind(address)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.get("balance"))
    }

    /// The input that spends output `(txid, n)`, if one is indexed.
    pub async fn spender_of(&self, txid: &str, n: i64) -> Result<Option<InputRow>, SyncError> {
        let row = sqlx::query(
            "SELECT txid, n, spendstxid, spendsn FROM input
             WHERE spendstxid = ? AND spendsn = ?",
        )
        .bind(txid)
        .bind(n)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.map(|r| InputRow {
            txid: r.get("txid"),
            n: r.get("n"),
            spendstxid: r.get("spendstxid"),
            spendsn: r.get("spendsn"),
        }))
    }

    // ─── Row counts ─────────────────────────────────────────────────────────

    pub async fn block_count(&self) -> Result<i64, SyncError> {
        self.count("block").await
    }

    pub async fn tx_count(&self) -> Result<i64, SyncError> {
        self.count("tx").await
    }

    pub async fn input_count(&self) -> Result<i64, SyncError> {
        self.count("input").await
    }

    pub async fn output_count(&self) -> Result<i64, SyncError> {
        self.count("output").await
    }

    async fn count(&self, table: &str) -> Result<i64, SyncError> {
        // Table names come from the fixed list above, never from input.
        let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get("cnt"))
    }
}

// ─── StoreTx ──────────────────────────────────────────────────────────────────

/// A scoped write transaction. Commit explicitly; dropping without commit
/// rolls back, so error paths can simply `?` out.
pub struct StoreTx<'a> {
    tx: Transaction<'a, Sqlite>,
}

impl StoreTx<'_> {
    pub async fn commit(self) -> Result<(), SyncError> {
        self.tx.commit().await.map_err(storage)
    }

    pub async fn insert_block(&mut self, block: &BlockRow) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO block (hash, height, previousblockhash, strippedsize,
                                size, weight, versionhex, merkleroot, time,
                                mediantime, nonce, bits, difficulty, chainwork,
                                numtxs)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&block.hash)
        .bind(block.height)
        .bind(&block.previousblockhash)
        .bind(block.strippedsize)
        .bind(block.size)
        .bind(block.weight)
        .bind(&block.versionhex)
        .bind(&block.merkleroot)
        .bind(block.time)
        .bind(block.mediantime)
        .bind(block.nonce)
        .bind(&block.bits)
        .bind(&block.difficulty)
        .bind(&block.chainwork)
        .bind(block.numtxs)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;
        Ok(())
    }

    pub async fn insert_tx(&mut self, tx: &TxRow) -> Result<(), SyncError> {
        sqlx::query("INSERT INTO tx (txid, blockhash, n) VALUES (?, ?, ?)")
            .bind(&tx.txid)
            .bind(&tx.blockhash)
            .bind(tx.n)
            .execute(&mut *self.tx)
            .await
            .map_err(storage)?;
        Ok(())
    }

    pub async fn insert_inputs(&mut self, inputs: &[InputRow]) -> Result<(), SyncError> {
        for input in inputs {
            sqlx::query("INSERT INTO input (txid, n, spendstxid, spendsn) VALUES (?, ?, ?, ?)")
                .bind(&input.txid)
                .bind(input.n)
                .bind(&input.spendstxid)
                .bind(input.spendsn)
                .execute(&mut *self.tx)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }

    pub async fn insert_outputs(&mut self, outputs: &[OutputRow]) -> Result<(), SyncError> {
        for output in outputs {
            sqlx::query("INSERT INTO output (txid, n, type, value, address) VALUES (?, ?, ?, ?, ?)")
                .bind(&output.txid)
                .bind(output.n)
                .bind(output.kind.as_str())
                .bind(output.value)
                .bind(&output.address)
                .execute(&mut *self.tx)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }

    /// Delete a transaction and cascade to its inputs and outputs.
    pub async fn delete_tx(&mut self, txid: &str) -> Result<(), SyncError> {
        for sql in [
            "DELETE FROM input WHERE txid = ?",
            "DELETE FROM output WHERE txid = ?",
            "DELETE FROM tx WHERE txid = ?",
        ] {
            sqlx::query(sql)
                .bind(txid)
                .execute(&mut *self.tx)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }

    /// Delete every confirmed block above `height`, cascading to the
    /// blocks' transactions, inputs, and outputs. The pending sentinel
    /// (height -1) is never touched.
    pub async fn delete_blocks_above(&mut self, height: i64) -> Result<(), SyncError> {
        let doomed = "SELECT hash FROM block WHERE height > ?";
        for sql in [
            format!(
                "DELETE FROM input WHERE txid IN
                     (SELECT txid FROM tx WHERE blockhash IN ({doomed}))"
            ),
            format!(
                "DELETE FROM output WHERE txid IN
                     (SELECT txid FROM tx WHERE blockhash IN ({doomed}))"
            ),
            format!("DELETE FROM tx WHERE blockhash IN ({doomed})"),
            "DELETE FROM block WHERE height > ?".to_string(),
        ] {
            sqlx::query(&sql)
                .bind(height)
                .execute(&mut *self.tx)
                .await
                .map_err(storage)?;
        }
        debug!(above = height, "deleted confirmed blocks");
        Ok(())
    }

    /// Refresh the pending sentinel's transaction count and timestamp,
    /// creating the sentinel row on first use.
    pub async fn upsert_pending_block(&mut self, numtxs: i64, time: i64) -> Result<(), SyncError> {
        let updated = sqlx::query("UPDATE block SET time = ?, numtxs = ? WHERE hash = ?")
            .bind(time)
            .bind(numtxs)
            .bind(PENDING_BLOCK_HASH)
            .execute(&mut *self.tx)
            .await
            .map_err(storage)?;
        if updated.rows_affected() == 0 {
            self.insert_block(&BlockRow::pending_sentinel(numtxs, time))
                .await?;
        }
        Ok(())
    }
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

fn block_from_row(r: &sqlx::sqlite::SqliteRow) -> BlockRow {
    BlockRow {
        hash: r.get("hash"),
        height: r.get("height"),
        previousblockhash: r.get("previousblockhash"),
        strippedsize: r.get("strippedsize"),
        size: r.get("size"),
        weight: r.get("weight"),
        versionhex: r.get("versionhex"),
        merkleroot: r.get("merkleroot"),
        time: r.get("time"),
        mediantime: r.get("mediantime"),
        nonce: r.get("nonce"),
        bits: r.get("bits"),
        difficulty: r.get("difficulty"),
        chainwork: r.get("chainwork"),
        numtxs: r.get("numtxs"),
    }
}

fn output_from_row(r: &sqlx::sqlite::SqliteRow) -> OutputRow {
    OutputRow {
        txid: r.get("txid"),
        n: r.get("n"),
        kind: OutputKind::from_flag(r.get::<String, _>("type").as_str()),
        value: r.get("value"),
        address: r.get("address"),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
