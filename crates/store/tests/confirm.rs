use std::thread;

use chrono::NaiveDate;
use larder_receipt::analytics::DateRange;
use larder_receipt::{
    Category, ConfirmRequest, LarderConfig, ReceiptEngine, ReceiptError, RuleSet,
};
use larder_store::{ConsumeOutcome, ItemFilter, Larder, NewItem, StoreError};

const E2E: &str = "name,quantity,unit,price\n\
                   2% Milk Whole Foods 1gal,1,gallon,3.99\n\
                   CHKN BRST,2,lb,8.99\n";

fn engine() -> ReceiptEngine {
    ReceiptEngine::new(&RuleSet::builtin().unwrap(), LarderConfig::default())
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 3).unwrap()
}

fn request_for(larder: &Larder, batch_id: &str, payload: &str, update_pantry: bool) -> ConfirmRequest {
    let snapshot = larder.snapshot().unwrap();
    let mut preview = engine()
        .preview(batch_id, payload, "Whole Foods", date(), &snapshot)
        .unwrap();
    preview.confirm(update_pantry).unwrap()
}

fn confirm(larder: &mut Larder, batch_id: &str, payload: &str) -> Result<larder_receipt::ConfirmOutcome, StoreError> {
    let request = request_for(larder, batch_id, payload, true);
    let plan = engine().plan_confirm(&request).unwrap();
    larder.commit(&plan)
}

fn milk_item() -> NewItem {
    NewItem {
        name: "Milk".into(),
        quantity: 1.0,
        unit: "gallon".into(),
        category: Category::Dairy,
        estimated_expiry: None,
    }
}

fn history_rows(larder: &Larder) -> i64 {
    larder
        .connection()
        .query_row("SELECT COUNT(*) FROM receipt_items", [], |r| r.get(0))
        .unwrap()
}

#[test]
fn end_to_end_on_empty_pantry() {
    let mut larder = Larder::open_in_memory().unwrap();
    let outcome = confirm(&mut larder, "batch-e2e", E2E).unwrap();

    assert_eq!(outcome.items_created, 2);
    assert_eq!(outcome.pantry_items_created, 2);
    assert_eq!(outcome.pantry_items_updated, 0);
    assert_eq!(outcome.total_amount, 12.98);

    let items = larder.snapshot().unwrap();
    assert_eq!(items.len(), 2);
    let chicken = items
        .iter()
        .find(|i| i.canonical_name.as_deref() == Some("chicken breast"))
        .unwrap();
    assert_eq!(chicken.name, "Chicken Breast");
    assert_eq!(chicken.quantity, 2.0);
    assert_eq!(chicken.source, larder_receipt::Provenance::Receipt);

    let records = larder.batch_items("batch-e2e").unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.matched_item_id.is_some()));
    for r in &records {
        assert!((r.total_price - r.quantity * r.unit_price).abs() < 0.01);
    }
}

#[test]
fn matched_line_increments_and_sets_canonical_name() {
    let mut larder = Larder::open_in_memory().unwrap();
    let milk = larder.add_item(&milk_item()).unwrap();
    assert!(milk.canonical_name.is_none());

    let outcome = confirm(&mut larder, "batch-inc", E2E).unwrap();
    assert_eq!(outcome.pantry_items_updated, 1);
    assert_eq!(outcome.pantry_items_created, 1);

    let milk_after = larder.get_item(milk.id).unwrap();
    assert_eq!(milk_after.quantity, 2.0);
    assert_eq!(milk_after.canonical_name.as_deref(), Some("milk"));
    assert!(milk_after.last_updated >= milk.last_updated);

    let records = larder.batch_items("batch-inc").unwrap();
    assert_eq!(records[0].matched_item_id, Some(milk.id));
}

#[test]
fn duplicate_confirm_is_rejected_without_changes() {
    let mut larder = Larder::open_in_memory().unwrap();
    confirm(&mut larder, "batch-dup", E2E).unwrap();
    let before = larder.snapshot().unwrap();

    let request = request_for(&larder, "batch-dup", E2E, true);
    let plan = engine().plan_confirm(&request).unwrap();
    let err = larder.commit(&plan).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Receipt(ReceiptError::DuplicateBatch { ref batch_id }) if batch_id == "batch-dup"
    ));

    assert_eq!(larder.snapshot().unwrap(), before);
    assert_eq!(history_rows(&larder), 2);
}

#[test]
fn deleted_batch_cannot_be_confirmed_again() {
    let mut larder = Larder::open_in_memory().unwrap();
    confirm(&mut larder, "batch-x", E2E).unwrap();
    assert_eq!(larder.delete_batch("batch-x").unwrap(), 2);
    let before = larder.snapshot().unwrap();

    let err = confirm(&mut larder, "batch-x", E2E).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Receipt(ReceiptError::DuplicateBatch { ref batch_id }) if batch_id == "batch-x"
    ));
    assert_eq!(larder.snapshot().unwrap(), before);
    assert_eq!(larder.snapshot().unwrap().len(), 2);
    assert_eq!(history_rows(&larder), 0);
}

#[test]
fn reopen_records_batches_from_older_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("larder.db");
    {
        let mut larder = Larder::open(&path).unwrap();
        confirm(&mut larder, "batch-old", E2E).unwrap();
        // A database from before confirmed ids were recorded separately.
        larder
            .connection()
            .execute_batch("DELETE FROM confirmed_batches;")
            .unwrap();
    }
    let mut larder = Larder::open(&path).unwrap();
    let err = confirm(&mut larder, "batch-old", E2E).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Receipt(ReceiptError::DuplicateBatch { .. })
    ));
}

#[test]
fn failure_mid_batch_rolls_everything_back() {
    let mut larder = Larder::open_in_memory().unwrap();
    let milk = larder.add_item(&milk_item()).unwrap();

    // Fail the second history insert, after the milk increment has run.
    larder
        .connection()
        .execute_batch(
            "CREATE TRIGGER fail_on_chicken BEFORE INSERT ON receipt_items
             WHEN NEW.normalized_name = 'chicken breast'
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .unwrap();

    let err = confirm(&mut larder, "batch-fail", E2E).unwrap_err();
    match err {
        StoreError::Receipt(ReceiptError::TransactionFailure { batch_id, message }) => {
            assert_eq!(batch_id, "batch-fail");
            assert!(message.contains("injected failure"));
        }
        other => panic!("expected TransactionFailure, got {other:?}"),
    }

    assert_eq!(larder.get_item(milk.id).unwrap().quantity, 1.0);
    assert_eq!(larder.snapshot().unwrap().len(), 1);
    assert_eq!(history_rows(&larder), 0);

    // The same batch can be confirmed once the fault is gone.
    larder
        .connection()
        .execute_batch("DROP TRIGGER fail_on_chicken;")
        .unwrap();
    let outcome = confirm(&mut larder, "batch-fail", E2E).unwrap();
    assert_eq!(outcome.pantry_items_updated, 1);
}

#[test]
fn history_only_confirm_leaves_inventory_alone() {
    let mut larder = Larder::open_in_memory().unwrap();
    let milk = larder.add_item(&milk_item()).unwrap();

    let request = request_for(&larder, "batch-hist", E2E, false);
    let plan = engine().plan_confirm(&request).unwrap();
    let outcome = larder.commit(&plan).unwrap();
    assert_eq!(outcome.items_created, 2);
    assert_eq!(outcome.pantry_items_created, 0);
    assert_eq!(outcome.pantry_items_updated, 0);

    assert_eq!(larder.snapshot().unwrap().len(), 1);
    assert_eq!(larder.get_item(milk.id).unwrap().quantity, 1.0);

    let records = larder.batch_items("batch-hist").unwrap();
    assert_eq!(records[0].matched_item_id, Some(milk.id));
    assert_eq!(records[1].matched_item_id, None);
}

#[test]
fn stale_match_falls_back_to_new_item() {
    let mut larder = Larder::open_in_memory().unwrap();
    let milk = larder.add_item(&milk_item()).unwrap();
    let request = request_for(&larder, "batch-stale", E2E, true);
    larder.delete_item(milk.id).unwrap();

    let plan = engine().plan_confirm(&request).unwrap();
    let outcome = larder.commit(&plan).unwrap();
    assert_eq!(outcome.pantry_items_created, 2);
    assert_eq!(outcome.pantry_items_updated, 0);

    let records = larder.batch_items("batch-stale").unwrap();
    assert!(records.iter().all(|r| r.matched_item_id.is_some()));
    assert_ne!(records[0].matched_item_id, Some(milk.id));
}

#[test]
fn deleting_an_item_clears_history_references() {
    let mut larder = Larder::open_in_memory().unwrap();
    confirm(&mut larder, "batch-ref", E2E).unwrap();
    let records = larder.batch_items("batch-ref").unwrap();
    let milk_id = records[0].matched_item_id.unwrap();

    larder.delete_item(milk_id).unwrap();
    let records = larder.batch_items("batch-ref").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].matched_item_id, None);
    assert!(records[1].matched_item_id.is_some());
}

#[test]
fn consuming_to_zero_keeps_history() {
    let mut larder = Larder::open_in_memory().unwrap();
    confirm(&mut larder, "batch-eat", E2E).unwrap();
    let chicken = larder
        .list_items(&ItemFilter {
            category: Some(Category::Meat),
            ..ItemFilter::default()
        })
        .unwrap()
        .remove(0);

    assert!(matches!(
        larder.consume(chicken.id, 2.0).unwrap(),
        ConsumeOutcome::Removed { .. }
    ));
    let records = larder.batch_items("batch-eat").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].matched_item_id, None);
}

#[test]
fn batch_listing_and_deletion() {
    let mut larder = Larder::open_in_memory().unwrap();
    confirm(&mut larder, "batch-a", E2E).unwrap();
    confirm(
        &mut larder,
        "batch-b",
        "name,quantity,unit,price\napples,3,lb,4.50\n",
    )
    .unwrap();

    let batches = larder.recent_batches(10).unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].batch_id, "batch-b");
    assert_eq!(batches[1].item_count, 2);
    assert_eq!(batches[1].total_amount, 12.98);
    assert_eq!(larder.recent_batches(1).unwrap().len(), 1);

    let inventory_before = larder.snapshot().unwrap();
    assert_eq!(larder.delete_batch("batch-a").unwrap(), 2);
    assert_eq!(larder.snapshot().unwrap(), inventory_before);
    assert!(matches!(
        larder.batch_items("batch-a"),
        Err(StoreError::BatchNotFound(_))
    ));
    assert!(matches!(
        larder.delete_batch("batch-a"),
        Err(StoreError::BatchNotFound(_))
    ));
}

#[test]
fn spend_report_reads_history() {
    let mut larder = Larder::open_in_memory().unwrap();
    confirm(&mut larder, "batch-s", E2E).unwrap();

    let report = larder.spend_report(DateRange::default(), 10).unwrap();
    assert_eq!(report.totals.total_spent, 12.98);
    assert_eq!(report.totals.total_receipts, 1);
    assert_eq!(report.by_store[0].store, "Whole Foods");
    assert_eq!(report.by_month[0].month, "2025-05");

    let before = DateRange::new(None, NaiveDate::from_ymd_opt(2025, 5, 2));
    let report = larder.spend_report(before, 10).unwrap();
    assert_eq!(report.totals.total_items, 0);
}

#[test]
fn concurrent_confirms_do_not_lose_increments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("larder.db");
    let milk_id = {
        let larder = Larder::open(&path).unwrap();
        larder.add_item(&milk_item()).unwrap().id
    };

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let path = path.clone();
            thread::spawn(move || {
                let mut larder = Larder::open(&path).unwrap();
                for n in 0..5 {
                    let batch_id = format!("batch-{worker}-{n}");
                    confirm(&mut larder, &batch_id, "name,qty,unit,price\nmilk,1,gallon,3.99\n")
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let larder = Larder::open(&path).unwrap();
    assert_eq!(larder.get_item(milk_id).unwrap().quantity, 21.0);
    assert_eq!(larder.snapshot().unwrap().len(), 1);
    assert_eq!(larder.recent_batches(100).unwrap().len(), 20);
}
