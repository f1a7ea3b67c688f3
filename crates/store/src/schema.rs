// Larder database schema. Timestamps are RFC 3339 UTC text with fixed
// microsecond precision so they sort lexically; dates are YYYY-MM-DD.

pub const SCHEMA_VERSION: u32 = 2;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inventory_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,  -- never reused; history holds weak refs
    name TEXT NOT NULL,
    canonical_name TEXT,                   -- NULL until matched or created from a receipt
    quantity REAL NOT NULL CHECK (quantity >= 0),
    unit TEXT NOT NULL,
    category TEXT NOT NULL,
    estimated_expiry TEXT,
    source TEXT NOT NULL,                  -- manual | receipt
    created_at TEXT NOT NULL,
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_inventory_category ON inventory_items(category);

CREATE TABLE IF NOT EXISTS receipt_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id TEXT NOT NULL,
    raw_name TEXT NOT NULL,
    normalized_name TEXT NOT NULL,
    quantity REAL NOT NULL CHECK (quantity > 0),
    unit TEXT NOT NULL,
    unit_price REAL NOT NULL CHECK (unit_price >= 0),
    total_price REAL NOT NULL,
    category TEXT NOT NULL,
    store TEXT NOT NULL,
    purchase_date TEXT NOT NULL,
    matched_item_id INTEGER REFERENCES inventory_items(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_receipt_batch ON receipt_items(batch_id);
CREATE INDEX IF NOT EXISTS idx_receipt_date ON receipt_items(purchase_date);
CREATE INDEX IF NOT EXISTS idx_receipt_matched ON receipt_items(matched_item_id);

-- Every batch id ever committed. Outlives `receipt_items` rows, so a deleted
-- batch cannot be applied to inventory a second time.
CREATE TABLE IF NOT EXISTS confirmed_batches (
    batch_id TEXT PRIMARY KEY,
    confirmed_at TEXT NOT NULL
);

-- Version 1 databases only have history rows to go by.
INSERT OR IGNORE INTO confirmed_batches (batch_id, confirmed_at)
    SELECT batch_id, MIN(created_at) FROM receipt_items GROUP BY batch_id;
"#;
