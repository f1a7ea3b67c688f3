use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use larder_receipt::{Category, InventoryItem, Provenance, ZeroStockPolicy};

use crate::db::{item_from_row, now, ts_to_sql, Larder, ITEM_COLUMNS};
use crate::error::{Result, StoreError};

/// Quantities closer to zero than this count as used up.
const EMPTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub category: Category,
    pub estimated_expiry: Option<DateTime<Utc>>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub name: Option<String>,
    /// Canonical name to store alongside a new `name`. A rename without one
    /// clears the canonical name.
    pub canonical_name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub category: Option<Category>,
    pub estimated_expiry: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub category: Option<Category>,
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsumeOutcome {
    Remaining { item: InventoryItem },
    Removed { id: i64 },
}

fn check_quantity(what: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(StoreError::InvalidAmount(format!(
            "{what} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

impl Larder {
    /// Add a manually entered item. Its canonical name stays unset until a
    /// receipt line is matched to it.
    pub fn add_item(&self, item: &NewItem) -> Result<InventoryItem> {
        let name = item.name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidItem("item name is empty".into()));
        }
        check_quantity("quantity", item.quantity)?;

        let ts = ts_to_sql(&now());
        self.conn.execute(
            "INSERT INTO inventory_items
                (name, canonical_name, quantity, unit, category, estimated_expiry,
                 source, created_at, last_updated)
             VALUES (?1, NULL, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                name,
                item.quantity,
                item.unit.trim().to_lowercase(),
                item.category.as_str(),
                item.estimated_expiry.as_ref().map(ts_to_sql),
                Provenance::Manual.as_str(),
                ts,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        log::info!("added item {id} '{name}'");
        self.get_item(id)
    }

    pub fn get_item(&self, id: i64) -> Result<InventoryItem> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = ?1"),
                params![id],
                item_from_row,
            )
            .optional()?
            .ok_or(StoreError::ItemNotFound(id))
    }

    /// Items newest-updated first.
    pub fn list_items(&self, filter: &ItemFilter) -> Result<Vec<InventoryItem>> {
        let mut sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items");
        let mut args: Vec<String> = Vec::new();
        if let Some(category) = filter.category {
            sql.push_str(" WHERE category = ?1");
            args.push(category.as_str().to_string());
        }
        sql.push_str(" ORDER BY last_updated DESC, id DESC");
        // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
        let limit = filter.limit.map_or(-1, |l| l as i64);
        sql.push_str(&format!(" LIMIT {limit} OFFSET {}", filter.offset));

        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(args.iter()), item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Every item, read in one statement so the view is consistent.
    pub fn snapshot(&self) -> Result<Vec<InventoryItem>> {
        self.list_items(&ItemFilter::default())
    }

    pub fn update_item(&self, id: i64, update: &ItemUpdate) -> Result<InventoryItem> {
        let current = self.get_item(id)?;

        let name = match &update.name {
            Some(n) if n.trim().is_empty() => {
                return Err(StoreError::InvalidItem("item name is empty".into()))
            }
            Some(n) => n.trim().to_string(),
            None => current.name.clone(),
        };
        let canonical_name = if update.name.is_some() && name != current.name {
            update.canonical_name.clone()
        } else {
            update.canonical_name.clone().or(current.canonical_name)
        };
        let quantity = update.quantity.unwrap_or(current.quantity);
        check_quantity("quantity", quantity)?;
        let unit = update
            .unit
            .as_deref()
            .map(|u| u.trim().to_lowercase())
            .unwrap_or(current.unit);
        let category = update.category.unwrap_or(current.category);
        let expiry = update.estimated_expiry.unwrap_or(current.estimated_expiry);

        self.conn.execute(
            "UPDATE inventory_items
             SET name = ?1, canonical_name = ?2, quantity = ?3, unit = ?4, category = ?5,
                 estimated_expiry = ?6, last_updated = ?7
             WHERE id = ?8",
            params![
                name,
                canonical_name,
                quantity,
                unit,
                category.as_str(),
                expiry.as_ref().map(ts_to_sql),
                ts_to_sql(&now()),
                id,
            ],
        )?;
        self.get_item(id)
    }

    /// Delete an item. History rows keep their data; their reference to the
    /// item is cleared.
    pub fn delete_item(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM inventory_items WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::ItemNotFound(id));
        }
        log::info!("deleted item {id}");
        Ok(())
    }

    /// Use up `amount` of an item. Asking for more than is on hand is
    /// rejected without changes; reaching zero applies the zero-stock policy.
    pub fn consume(&mut self, id: i64, amount: f64) -> Result<ConsumeOutcome> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(StoreError::InvalidAmount(format!(
                "consume amount must be > 0, got {amount}"
            )));
        }

        let policy = self.zero_stock;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let available: f64 = tx
            .query_row(
                "SELECT quantity FROM inventory_items WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::ItemNotFound(id))?;

        if amount > available + EMPTY_EPSILON {
            return Err(StoreError::InsufficientQuantity {
                id,
                available,
                requested: amount,
            });
        }

        let remaining = available - amount;
        let removed = remaining <= EMPTY_EPSILON && policy == ZeroStockPolicy::Remove;
        if removed {
            tx.execute("DELETE FROM inventory_items WHERE id = ?1", params![id])?;
        } else {
            tx.execute(
                "UPDATE inventory_items SET quantity = ?1, last_updated = ?2 WHERE id = ?3",
                params![remaining.max(0.0), ts_to_sql(&now()), id],
            )?;
        }
        tx.commit()?;

        if removed {
            log::info!("item {id} used up and removed");
            Ok(ConsumeOutcome::Removed { id })
        } else {
            Ok(ConsumeOutcome::Remaining {
                item: self.get_item(id)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milk() -> NewItem {
        NewItem {
            name: "Milk".into(),
            quantity: 2.0,
            unit: "Gallon".into(),
            category: Category::Dairy,
            estimated_expiry: None,
        }
    }

    #[test]
    fn add_and_get() {
        let larder = Larder::open_in_memory().unwrap();
        let item = larder.add_item(&milk()).unwrap();
        assert_eq!(item.name, "Milk");
        assert_eq!(item.unit, "gallon");
        assert_eq!(item.source, Provenance::Manual);
        assert!(item.canonical_name.is_none());
        assert_eq!(larder.get_item(item.id).unwrap(), item);
    }

    #[test]
    fn add_rejects_bad_input() {
        let larder = Larder::open_in_memory().unwrap();
        let mut bad = milk();
        bad.quantity = -1.0;
        assert!(matches!(larder.add_item(&bad), Err(StoreError::InvalidAmount(_))));
        bad = milk();
        bad.name = "  ".into();
        assert!(larder.add_item(&bad).is_err());
    }

    #[test]
    fn missing_item_is_not_found() {
        let larder = Larder::open_in_memory().unwrap();
        assert!(matches!(larder.get_item(42), Err(StoreError::ItemNotFound(42))));
        assert!(matches!(larder.delete_item(42), Err(StoreError::ItemNotFound(42))));
    }

    #[test]
    fn list_filters_and_pages() {
        let larder = Larder::open_in_memory().unwrap();
        let a = larder.add_item(&milk()).unwrap();
        let b = larder
            .add_item(&NewItem {
                name: "Apples".into(),
                category: Category::Produce,
                ..milk()
            })
            .unwrap();
        let c = larder.add_item(&NewItem { name: "Cheddar".into(), ..milk() }).unwrap();

        let all = larder.list_items(&ItemFilter::default()).unwrap();
        assert_eq!(all.len(), 3);

        let dairy = larder
            .list_items(&ItemFilter {
                category: Some(Category::Dairy),
                ..ItemFilter::default()
            })
            .unwrap();
        let ids: Vec<i64> = dairy.iter().map(|i| i.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id) && ids.contains(&c.id));

        // Touching an item moves it to the front.
        larder
            .update_item(b.id, &ItemUpdate { quantity: Some(5.0), ..ItemUpdate::default() })
            .unwrap();
        let first = larder
            .list_items(&ItemFilter { limit: Some(1), ..ItemFilter::default() })
            .unwrap();
        assert_eq!(first[0].id, b.id);

        let rest = larder
            .list_items(&ItemFilter { offset: 1, ..ItemFilter::default() })
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|i| i.id != b.id));
    }

    #[test]
    fn rename_resets_canonical_name() {
        let larder = Larder::open_in_memory().unwrap();
        let item = larder.add_item(&milk()).unwrap();
        larder
            .connection()
            .execute(
                "UPDATE inventory_items SET canonical_name = 'milk' WHERE id = ?1",
                params![item.id],
            )
            .unwrap();

        let same = larder
            .update_item(item.id, &ItemUpdate { unit: Some("L".into()), ..ItemUpdate::default() })
            .unwrap();
        assert_eq!(same.canonical_name.as_deref(), Some("milk"));
        assert_eq!(same.unit, "l");

        let renamed = larder
            .update_item(
                item.id,
                &ItemUpdate { name: Some("Oat Milk".into()), ..ItemUpdate::default() },
            )
            .unwrap();
        assert_eq!(renamed.name, "Oat Milk");
        assert!(renamed.canonical_name.is_none());

        let with_key = larder
            .update_item(
                item.id,
                &ItemUpdate {
                    name: Some("Whole Milk".into()),
                    canonical_name: Some("milk".into()),
                    ..ItemUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(with_key.canonical_name.as_deref(), Some("milk"));
    }

    #[test]
    fn consume_partial_then_to_zero_removes() {
        let mut larder = Larder::open_in_memory().unwrap();
        let item = larder.add_item(&milk()).unwrap();

        match larder.consume(item.id, 0.5).unwrap() {
            ConsumeOutcome::Remaining { item } => assert_eq!(item.quantity, 1.5),
            other => panic!("expected remaining, got {other:?}"),
        }
        assert_eq!(
            larder.consume(item.id, 1.5).unwrap(),
            ConsumeOutcome::Removed { id: item.id }
        );
        assert!(matches!(larder.get_item(item.id), Err(StoreError::ItemNotFound(_))));
    }

    #[test]
    fn consume_to_zero_with_retain_policy_keeps_item() {
        let mut larder = Larder::open_in_memory()
            .unwrap()
            .with_zero_stock(ZeroStockPolicy::Retain);
        let item = larder.add_item(&milk()).unwrap();
        match larder.consume(item.id, 2.0).unwrap() {
            ConsumeOutcome::Remaining { item } => assert_eq!(item.quantity, 0.0),
            other => panic!("expected remaining, got {other:?}"),
        }
        assert_eq!(larder.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn consume_more_than_available_changes_nothing() {
        let mut larder = Larder::open_in_memory().unwrap();
        let item = larder.add_item(&milk()).unwrap();
        let err = larder.consume(item.id, 3.0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientQuantity { available, requested, .. }
                if available == 2.0 && requested == 3.0
        ));
        assert_eq!(larder.get_item(item.id).unwrap().quantity, 2.0);

        assert!(matches!(larder.consume(item.id, 0.0), Err(StoreError::InvalidAmount(_))));
        assert!(matches!(larder.consume(99, 1.0), Err(StoreError::ItemNotFound(99))));
    }
}
