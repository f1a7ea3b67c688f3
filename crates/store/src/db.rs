use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use larder_receipt::{Category, InventoryItem, Provenance, ReceiptLineRecord, ZeroStockPolicy};

use crate::error::Result;
use crate::schema::{SCHEMA, SCHEMA_VERSION};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Inventory and purchase history in one SQLite database.
pub struct Larder {
    pub(crate) conn: Connection,
    pub(crate) zero_stock: ZeroStockPolicy,
}

impl Larder {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets previews read while a confirm holds the write lock.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        log::debug!("opened larder database {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(Self {
            conn,
            zero_stock: ZeroStockPolicy::default(),
        })
    }

    /// Set what consuming an item down to zero does.
    pub fn with_zero_stock(mut self, policy: ZeroStockPolicy) -> Self {
        self.zero_stock = policy;
        self
    }

    pub fn zero_stock(&self) -> ZeroStockPolicy {
        self.zero_stock
    }

    pub fn schema_version(&self) -> Result<Option<u32>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Raw connection, for maintenance and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ---------------------------------------------------------------------------
// Column encoding
// ---------------------------------------------------------------------------

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn ts_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_ts_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        DateTime::parse_from_rfc3339(&t)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

pub(crate) fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn category_column(row: &Row, idx: usize) -> rusqlite::Result<Category> {
    let text: String = row.get(idx)?;
    Ok(Category::parse_lenient(&text))
}

fn provenance_column(row: &Row, idx: usize) -> rusqlite::Result<Provenance> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e: String| {
        conversion_error(
            idx,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}

pub(crate) const ITEM_COLUMNS: &str = "id, name, canonical_name, quantity, unit, category, \
     estimated_expiry, source, created_at, last_updated";

pub(crate) fn item_from_row(row: &Row) -> rusqlite::Result<InventoryItem> {
    Ok(InventoryItem {
        id: row.get(0)?,
        name: row.get(1)?,
        canonical_name: row.get(2)?,
        quantity: row.get(3)?,
        unit: row.get(4)?,
        category: category_column(row, 5)?,
        estimated_expiry: opt_ts_column(row, 6)?,
        source: provenance_column(row, 7)?,
        created_at: ts_column(row, 8)?,
        last_updated: ts_column(row, 9)?,
    })
}

pub(crate) const RECORD_COLUMNS: &str = "id, batch_id, raw_name, normalized_name, quantity, \
     unit, unit_price, total_price, category, store, purchase_date, matched_item_id, created_at";

pub(crate) fn record_from_row(row: &Row) -> rusqlite::Result<ReceiptLineRecord> {
    Ok(ReceiptLineRecord {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        raw_name: row.get(2)?,
        normalized_name: row.get(3)?,
        quantity: row.get(4)?,
        unit: row.get(5)?,
        unit_price: row.get(6)?,
        total_price: row.get(7)?,
        category: category_column(row, 8)?,
        store: row.get(9)?,
        purchase_date: date_column(row, 10)?,
        matched_item_id: row.get(11)?,
        created_at: ts_column(row, 12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_creates_schema() {
        let larder = Larder::open_in_memory().unwrap();
        assert_eq!(larder.schema_version().unwrap(), Some(SCHEMA_VERSION));
        let fk: i64 = larder
            .connection()
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn reopen_on_disk_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("larder.db");
        {
            let larder = Larder::open(&path).unwrap();
            larder
                .connection()
                .execute(
                    "INSERT INTO meta (key, value) VALUES ('marker', 'yes')",
                    [],
                )
                .unwrap();
        }
        let larder = Larder::open(&path).unwrap();
        let marker: String = larder
            .connection()
            .query_row("SELECT value FROM meta WHERE key = 'marker'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(marker, "yes");
        assert_eq!(larder.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = ts_to_sql(&"2025-03-01T09:00:00Z".parse().unwrap());
        let b = ts_to_sql(&"2025-03-01T09:00:00.5Z".parse().unwrap());
        assert!(a < b);
        assert_eq!(a, "2025-03-01T09:00:00.000000Z");
    }
}
