use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use larder_receipt::model::{LineAction, ReceiptPreview};
use larder_receipt::{
    BatchState, Category, InventoryItem, LarderConfig, Provenance, ReceiptEngine, RuleSet,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> String {
    let path = fixtures_dir().join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}

fn engine() -> ReceiptEngine {
    ReceiptEngine::new(&RuleSet::builtin().unwrap(), LarderConfig::default())
}

fn purchase_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 12).unwrap()
}

fn pantry_item(id: i64, name: &str, canonical: Option<&str>, category: Category) -> InventoryItem {
    let ts = Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap();
    InventoryItem {
        id,
        name: name.into(),
        canonical_name: canonical.map(String::from),
        quantity: 1.0,
        unit: "unit".into(),
        category,
        estimated_expiry: None,
        source: Provenance::Manual,
        created_at: ts,
        last_updated: ts,
    }
}

fn preview(name: &str, snapshot: &[InventoryItem]) -> ReceiptPreview {
    engine()
        .preview("batch-1", &fixture(name), "Test Store", purchase_date(), snapshot)
        .unwrap()
}

#[test]
fn whole_foods_receipt_on_empty_pantry() {
    let p = preview("whole_foods.csv", &[]);
    assert_eq!(p.total_items, 2);
    assert_eq!(p.new_count, 2);
    assert_eq!(p.matched_count, 0);
    assert_eq!(p.total_amount, 12.98);
    assert!(p.warnings.is_empty());

    assert_eq!(p.items[0].normalized_name, "milk");
    assert_eq!(p.items[1].normalized_name, "chicken breast");
    assert!(p.items.iter().all(|i| i.will_create_new && i.pantry_match_id.is_none()));
}

#[test]
fn tab_separated_receipt_with_unit_prices() {
    let snapshot = vec![
        pantry_item(10, "Milk", Some("milk"), Category::Dairy),
        pantry_item(11, "Bananas", None, Category::Produce),
    ];
    let p = preview("costco.tsv", &snapshot);
    assert!(p.warnings.is_empty());
    assert_eq!(p.total_items, 4);
    assert_eq!(p.total_amount, 34.03);

    let oil = &p.items[0];
    assert_eq!(oil.normalized_name, "olive oil");
    assert_eq!(oil.category, Category::Pantry);
    assert!(oil.will_create_new);

    let spinach = &p.items[1];
    assert_eq!(spinach.normalized_name, "baby spinach");
    assert_eq!(spinach.category, Category::Produce);
    assert_eq!(spinach.total_price, 6.98);

    let milk = &p.items[2];
    assert_eq!(milk.pantry_match_id, Some(10));
    assert_eq!(milk.match_score, Some(1.0));
    assert!(!milk.needs_review);

    // Display name "Bananas" normalizes to the same key.
    let bananas = &p.items[3];
    assert_eq!(bananas.pantry_match_id, Some(11));
    assert_eq!(bananas.total_price, 1.5);

    assert_eq!(p.matched_count, 2);
    assert_eq!(p.new_count, 2);
}

#[test]
fn messy_receipt_keeps_good_rows_and_reports_bad_ones() {
    let p = preview("messy.csv", &[]);
    let names: Vec<&str> = p.items.iter().map(|i| i.normalized_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["everything bagel seasoning", "large eggs", "sparkling water"]
    );

    let bad_lines: Vec<u64> = p.warnings.iter().map(|w| w.line).collect();
    assert_eq!(bad_lines, vec![4, 5, 6, 8]);
    assert_eq!(p.total_amount, 13.98);
}

#[test]
fn preview_is_pure() {
    let snapshot = vec![pantry_item(10, "Milk", Some("milk"), Category::Dairy)];
    let a = preview("whole_foods.csv", &snapshot);
    let b = preview("whole_foods.csv", &snapshot);
    assert_eq!(a, b);
    assert_eq!(snapshot[0].quantity, 1.0);
}

#[test]
fn preview_survives_json_round_trip_and_plans() {
    let snapshot = vec![pantry_item(10, "Milk", Some("milk"), Category::Dairy)];
    let p = preview("whole_foods.csv", &snapshot);

    let json = serde_json::to_string_pretty(&p).unwrap();
    let mut restored: ReceiptPreview = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.state, BatchState::Previewed);

    let request = restored.confirm(true).unwrap();
    let plan = engine().plan_confirm(&request).unwrap();
    assert_eq!(plan.batch_id, "batch-1");
    assert_eq!(plan.lines[0].action, LineAction::Increment { item_id: 10 });
    assert_eq!(plan.lines[1].action, LineAction::Create);
    assert_eq!(plan.total_amount, 12.98);
}

#[test]
fn stricter_thresholds_turn_matches_into_new_items() {
    let mut config = LarderConfig::default();
    config.matching.auto_threshold = 1.0;
    config.matching.review_threshold = 1.0;
    let engine = ReceiptEngine::new(&RuleSet::builtin().unwrap(), config);

    let snapshot = vec![pantry_item(1, "Spinach", Some("spinach"), Category::Produce)];
    let p = engine
        .preview("b", "name,qty,unit,price\nbaby spinach,1,bag,3.00\n", "S", purchase_date(), &snapshot)
        .unwrap();
    assert!(p.items[0].will_create_new);
}
