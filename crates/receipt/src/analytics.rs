//! Read-side spend aggregation over purchase history.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{round_cents, Category, ReceiptLineRecord};

/// Inclusive purchase-date bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpendTotals {
    pub total_spent: f64,
    pub total_items: usize,
    pub total_receipts: usize,
    pub first_purchase: Option<NaiveDate>,
    pub last_purchase: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpend {
    pub category: Category,
    pub total_spent: f64,
    pub item_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSpend {
    pub store: String,
    pub total_spent: f64,
    /// Distinct batches at this store.
    pub visit_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSpend {
    /// `YYYY-MM`
    pub month: String,
    pub total_spent: f64,
    pub item_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopItem {
    pub name: String,
    pub total_spent: f64,
    pub total_quantity: f64,
    pub purchase_count: usize,
    /// Mean unit price over the item's purchases.
    pub avg_price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpendReport {
    pub range: DateRange,
    pub totals: SpendTotals,
    pub by_category: Vec<CategorySpend>,
    pub by_store: Vec<StoreSpend>,
    pub by_month: Vec<MonthSpend>,
    pub top_items: Vec<TopItem>,
}

#[derive(Default)]
struct Bucket<'a> {
    spent: f64,
    items: usize,
    quantity: f64,
    unit_price_sum: f64,
    batches: BTreeSet<&'a str>,
}

impl<'a> Bucket<'a> {
    fn add(&mut self, record: &'a ReceiptLineRecord) {
        self.spent += record.total_price;
        self.items += 1;
        self.quantity += record.quantity;
        self.unit_price_sum += record.unit_price;
        self.batches.insert(record.batch_id.as_str());
    }
}

/// Aggregate the records that fall inside `range`. Never fails; an empty
/// selection yields zero totals and empty groups.
pub fn spend_report(records: &[ReceiptLineRecord], range: DateRange, top_n: usize) -> SpendReport {
    let selected: Vec<&ReceiptLineRecord> = records
        .iter()
        .filter(|r| range.contains(r.purchase_date))
        .collect();

    let mut all = Bucket::default();
    let mut by_category: BTreeMap<Category, Bucket> = BTreeMap::new();
    let mut by_store: BTreeMap<&str, Bucket> = BTreeMap::new();
    let mut by_month: BTreeMap<String, Bucket> = BTreeMap::new();
    let mut by_name: BTreeMap<&str, Bucket> = BTreeMap::new();

    for &record in &selected {
        all.add(record);
        by_category.entry(record.category).or_default().add(record);
        by_store.entry(record.store.as_str()).or_default().add(record);
        by_month
            .entry(record.purchase_date.format("%Y-%m").to_string())
            .or_default()
            .add(record);
        by_name
            .entry(record.normalized_name.as_str())
            .or_default()
            .add(record);
    }

    let total = all.spent;
    // A selection of free lines splits by line count instead.
    let percentage = |b: &Bucket| {
        if total > 0.0 {
            b.spent / total * 100.0
        } else if all.items > 0 {
            b.items as f64 / all.items as f64 * 100.0
        } else {
            0.0
        }
    };

    let mut categories: Vec<CategorySpend> = by_category
        .into_iter()
        .map(|(category, b)| CategorySpend {
            category,
            total_spent: round_cents(b.spent),
            item_count: b.items,
            percentage: percentage(&b),
        })
        .collect();
    // Stable sort keeps key order among equal totals.
    categories.sort_by(|a, b| b.total_spent.total_cmp(&a.total_spent));

    let mut stores: Vec<StoreSpend> = by_store
        .into_iter()
        .map(|(store, b)| StoreSpend {
            store: store.to_string(),
            total_spent: round_cents(b.spent),
            visit_count: b.batches.len(),
            percentage: percentage(&b),
        })
        .collect();
    stores.sort_by(|a, b| b.total_spent.total_cmp(&a.total_spent));

    let months = by_month
        .into_iter()
        .map(|(month, b)| MonthSpend {
            month,
            total_spent: round_cents(b.spent),
            item_count: b.items,
        })
        .collect();

    let mut top_items: Vec<TopItem> = by_name
        .into_iter()
        .map(|(name, b)| TopItem {
            name: name.to_string(),
            total_spent: round_cents(b.spent),
            total_quantity: b.quantity,
            purchase_count: b.items,
            avg_price: b.unit_price_sum / b.items as f64,
        })
        .collect();
    top_items.sort_by(|a, b| b.total_spent.total_cmp(&a.total_spent));
    top_items.truncate(top_n);

    SpendReport {
        range,
        totals: SpendTotals {
            total_spent: round_cents(total),
            total_items: all.items,
            total_receipts: all.batches.len(),
            first_purchase: selected.iter().map(|r| r.purchase_date).min(),
            last_purchase: selected.iter().map(|r| r.purchase_date).max(),
        },
        by_category: categories,
        by_store: stores,
        by_month: months,
        top_items,
    }
}
