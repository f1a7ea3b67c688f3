use rusqlite::{params, Transaction, TransactionBehavior};

use larder_receipt::analytics::{spend_report, DateRange, SpendReport};
use larder_receipt::model::round_cents;
use larder_receipt::{
    BatchSummary, ConfirmOutcome, ConfirmPlan, LineAction, PlannedLine, Provenance,
    ReceiptError, ReceiptLineRecord,
};

use crate::db::{
    date_column, date_to_sql, now, record_from_row, ts_to_sql, Larder, RECORD_COLUMNS,
};
use crate::error::{Result, StoreError};

#[derive(Default)]
struct Applied {
    updated: usize,
    created: usize,
}

impl Larder {
    /// Apply a confirmed batch: inventory changes and history rows in one
    /// IMMEDIATE transaction. Either all of it lands or none of it does.
    pub fn commit(&mut self, plan: &ConfirmPlan) -> Result<ConfirmOutcome> {
        if plan.lines.is_empty() {
            return Err(ReceiptError::EmptyBatch {
                batch_id: plan.batch_id.clone(),
            }
            .into());
        }

        let tx_failure = |e: rusqlite::Error| -> StoreError {
            ReceiptError::TransactionFailure {
                batch_id: plan.batch_id.clone(),
                message: e.to_string(),
            }
            .into()
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(tx_failure)?;

        // Dropping `tx` on any error path rolls everything back.
        let applied = match apply_plan(&tx, plan) {
            Ok(applied) => applied,
            Err(StoreError::Sqlite(e)) => return Err(tx_failure(e)),
            Err(other) => return Err(other),
        };
        tx.commit().map_err(tx_failure)?;

        let outcome = ConfirmOutcome {
            batch_id: plan.batch_id.clone(),
            items_created: plan.lines.len(),
            pantry_items_updated: applied.updated,
            pantry_items_created: applied.created,
            total_amount: plan.total_amount,
            message: format!(
                "Receipt saved. {} pantry items updated, {} new items created.",
                applied.updated, applied.created
            ),
        };
        log::info!(
            "confirmed batch {}: {} line(s), {} updated, {} created, total {:.2}",
            outcome.batch_id,
            outcome.items_created,
            outcome.pantry_items_updated,
            outcome.pantry_items_created,
            outcome.total_amount
        );
        Ok(outcome)
    }

    /// Most recent purchases first.
    pub fn recent_batches(&self, limit: usize) -> Result<Vec<BatchSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT batch_id, store, purchase_date, SUM(total_price), COUNT(*)
             FROM receipt_items
             GROUP BY batch_id
             ORDER BY purchase_date DESC, MAX(id) DESC
             LIMIT ?1",
        )?;
        let batches = stmt
            .query_map(params![limit as i64], |row| {
                let total: f64 = row.get(3)?;
                let count: i64 = row.get(4)?;
                Ok(BatchSummary {
                    batch_id: row.get(0)?,
                    store: row.get(1)?,
                    purchase_date: date_column(row, 2)?,
                    total_amount: round_cents(total),
                    item_count: count as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(batches)
    }

    /// Lines of one batch in insertion order.
    pub fn batch_items(&self, batch_id: &str) -> Result<Vec<ReceiptLineRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM receipt_items WHERE batch_id = ?1 ORDER BY id"
        ))?;
        let records = stmt
            .query_map(params![batch_id], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if records.is_empty() {
            return Err(StoreError::BatchNotFound(batch_id.to_string()));
        }
        Ok(records)
    }

    /// Remove a batch's history rows. Inventory is left as it is, and the
    /// batch id stays recorded as confirmed so it cannot be committed again.
    pub fn delete_batch(&self, batch_id: &str) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM receipt_items WHERE batch_id = ?1",
            params![batch_id],
        )?;
        if deleted == 0 {
            return Err(StoreError::BatchNotFound(batch_id.to_string()));
        }
        log::info!("deleted {deleted} history row(s) of batch {batch_id}");
        Ok(deleted)
    }

    /// History rows whose purchase date falls inside `range`.
    pub fn history(&self, range: DateRange) -> Result<Vec<ReceiptLineRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM receipt_items
             WHERE (?1 IS NULL OR purchase_date >= ?1)
               AND (?2 IS NULL OR purchase_date <= ?2)
             ORDER BY purchase_date, id"
        ))?;
        let records = stmt
            .query_map(
                params![range.from.map(date_to_sql), range.to.map(date_to_sql)],
                record_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn spend_report(&self, range: DateRange, top_n: usize) -> Result<SpendReport> {
        Ok(spend_report(&self.history(range)?, range, top_n))
    }
}

fn apply_plan(tx: &Transaction, plan: &ConfirmPlan) -> Result<Applied> {
    let ts = ts_to_sql(&now());

    // The primary key on `confirmed_batches` is the duplicate check.
    let claimed = tx.execute(
        "INSERT OR IGNORE INTO confirmed_batches (batch_id, confirmed_at) VALUES (?1, ?2)",
        params![plan.batch_id, ts],
    )?;
    if claimed == 0 {
        return Err(ReceiptError::DuplicateBatch {
            batch_id: plan.batch_id.clone(),
        }
        .into());
    }

    let purchase_date = date_to_sql(plan.purchase_date);
    let mut applied = Applied::default();

    for line in &plan.lines {
        let item_id = if plan.update_pantry {
            Some(apply_inventory(tx, line, &ts, &mut applied)?)
        } else {
            match line.action {
                LineAction::Increment { item_id } if item_exists(tx, item_id)? => Some(item_id),
                _ => None,
            }
        };

        tx.execute(
            "INSERT INTO receipt_items
                (batch_id, raw_name, normalized_name, quantity, unit, unit_price,
                 total_price, category, store, purchase_date, matched_item_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                plan.batch_id,
                line.raw_name,
                line.normalized_name,
                line.quantity,
                line.unit,
                line.unit_price,
                line.total_price,
                line.category.as_str(),
                plan.store,
                purchase_date,
                item_id,
                ts,
            ],
        )?;
    }

    Ok(applied)
}

/// Increment the matched item, or create one. Returns the item id the
/// history row should reference.
fn apply_inventory(
    tx: &Transaction,
    line: &PlannedLine,
    ts: &str,
    applied: &mut Applied,
) -> Result<i64> {
    if let LineAction::Increment { item_id } = line.action {
        let changed = tx.execute(
            "UPDATE inventory_items
             SET quantity = quantity + ?1,
                 last_updated = ?2,
                 canonical_name = COALESCE(canonical_name, ?3)
             WHERE id = ?4",
            params![line.quantity, ts, line.normalized_name, item_id],
        )?;
        if changed == 1 {
            applied.updated += 1;
            return Ok(item_id);
        }
        log::warn!(
            "matched item {item_id} for '{}' no longer exists; creating a new item",
            line.raw_name
        );
    }

    tx.execute(
        "INSERT INTO inventory_items
            (name, canonical_name, quantity, unit, category, estimated_expiry,
             source, created_at, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?7)",
        params![
            display_name(&line.normalized_name),
            line.normalized_name,
            line.quantity,
            line.unit,
            line.category.as_str(),
            Provenance::Receipt.as_str(),
            ts,
        ],
    )?;
    applied.created += 1;
    Ok(tx.last_insert_rowid())
}

fn item_exists(tx: &Transaction, id: i64) -> rusqlite::Result<bool> {
    tx.query_row(
        "SELECT EXISTS (SELECT 1 FROM inventory_items WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

/// "chicken breast" -> "Chicken Breast"
fn display_name(canonical: &str) -> String {
    canonical
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
