use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReceiptError, RowParseError};

/// Round a money amount to whole cents.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Produce,
    Dairy,
    Meat,
    Seafood,
    Bakery,
    Frozen,
    Pantry,
    Beverages,
    Snacks,
    Condiments,
    Spices,
    Other,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Self::Produce,
        Self::Dairy,
        Self::Meat,
        Self::Seafood,
        Self::Bakery,
        Self::Frozen,
        Self::Pantry,
        Self::Beverages,
        Self::Snacks,
        Self::Condiments,
        Self::Spices,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Produce => "produce",
            Self::Dairy => "dairy",
            Self::Meat => "meat",
            Self::Seafood => "seafood",
            Self::Bakery => "bakery",
            Self::Frozen => "frozen",
            Self::Pantry => "pantry",
            Self::Beverages => "beverages",
            Self::Snacks => "snacks",
            Self::Condiments => "condiments",
            Self::Spices => "spices",
            Self::Other => "other",
        }
    }

    /// Parse a stored or user-supplied category; anything unknown is `Other`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// Where an inventory item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Manual,
    Receipt,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Receipt => "receipt",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "receipt" => Ok(Self::Receipt),
            other => Err(format!("unknown provenance '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// A mutable stock record. Quantity is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub name: String,
    pub canonical_name: Option<String>,
    pub quantity: f64,
    pub unit: String,
    pub category: Category,
    pub estimated_expiry: Option<DateTime<Utc>>,
    pub source: Provenance,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Parsing + normalization
// ---------------------------------------------------------------------------

/// One data row of a receipt payload, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub line: u64,
    pub raw_name: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    /// Extended line price, in cents precision.
    pub total_price: f64,
    /// Category given explicitly by the payload, if it had a category column.
    pub category: Option<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedName {
    pub canonical_name: String,
    pub category_guess: Category,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    /// Score at or above the auto threshold; used without review.
    Auto,
    /// Suggested match, flagged low-confidence for the user.
    Review,
    /// No usable candidate; the line becomes a new inventory item.
    New,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a> {
    pub candidate: Option<&'a InventoryItem>,
    pub score: f64,
    pub decision: MatchDecision,
}

// ---------------------------------------------------------------------------
// Batch lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Draft,
    Previewed,
    Confirmed,
    Discarded,
}

impl BatchState {
    /// Move to `to`, rejecting anything but draft -> previewed -> {confirmed, discarded}.
    pub fn advance(self, to: BatchState) -> Result<BatchState, ReceiptError> {
        match (self, to) {
            (Self::Draft, Self::Previewed)
            | (Self::Previewed, Self::Confirmed)
            | (Self::Previewed, Self::Discarded) => Ok(to),
            _ => Err(ReceiptError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Discarded)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Previewed => write!(f, "previewed"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewLine {
    pub line: u64,
    pub raw_name: String,
    pub normalized_name: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub total_price: f64,
    pub category: Category,
    pub pantry_match_name: Option<String>,
    pub pantry_match_id: Option<i64>,
    pub match_score: Option<f64>,
    pub will_create_new: bool,
    pub needs_review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptPreview {
    pub batch_id: String,
    pub store: String,
    pub purchase_date: NaiveDate,
    pub state: BatchState,
    pub items: Vec<PreviewLine>,
    pub total_items: usize,
    pub total_amount: f64,
    pub matched_count: usize,
    pub new_count: usize,
    pub review_count: usize,
    #[serde(default)]
    pub warnings: Vec<RowParseError>,
}

impl ReceiptPreview {
    /// Turn an accepted preview into a confirm request, moving it to `Confirmed`.
    pub fn confirm(&mut self, update_pantry: bool) -> Result<ConfirmRequest, ReceiptError> {
        self.state = self.state.advance(BatchState::Confirmed)?;
        Ok(ConfirmRequest {
            batch_id: self.batch_id.clone(),
            store: self.store.clone(),
            purchase_date: self.purchase_date,
            items: self.items.iter().map(ConfirmLine::from).collect(),
            update_pantry,
        })
    }

    /// Drop the preview without side effects.
    pub fn discard(&mut self) -> Result<(), ReceiptError> {
        self.state = self.state.advance(BatchState::Discarded)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Confirm
// ---------------------------------------------------------------------------

/// A (possibly user-edited) line submitted for confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmLine {
    pub raw_name: String,
    #[serde(default)]
    pub normalized_name: Option<String>,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub pantry_match_id: Option<i64>,
}

impl From<&PreviewLine> for ConfirmLine {
    fn from(line: &PreviewLine) -> Self {
        Self {
            raw_name: line.raw_name.clone(),
            normalized_name: Some(line.normalized_name.clone()),
            quantity: line.quantity,
            unit: line.unit.clone(),
            unit_price: line.unit_price,
            category: Some(line.category),
            pantry_match_id: line.pantry_match_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub batch_id: String,
    pub store: String,
    pub purchase_date: NaiveDate,
    pub items: Vec<ConfirmLine>,
    #[serde(default = "default_update_pantry")]
    pub update_pantry: bool,
}

fn default_update_pantry() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineAction {
    Increment { item_id: i64 },
    Create,
}

/// A validated confirm line, ready to be applied by a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedLine {
    pub raw_name: String,
    pub normalized_name: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub total_price: f64,
    pub category: Category,
    pub action: LineAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmPlan {
    pub batch_id: String,
    pub store: String,
    pub purchase_date: NaiveDate,
    pub update_pantry: bool,
    pub lines: Vec<PlannedLine>,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub batch_id: String,
    pub items_created: usize,
    pub pantry_items_updated: usize,
    pub pantry_items_created: usize,
    pub total_amount: f64,
    pub message: String,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Immutable purchase fact. `matched_item_id` is a weak reference and may be
/// null once the inventory item is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLineRecord {
    pub id: i64,
    pub batch_id: String,
    pub raw_name: String,
    pub normalized_name: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub total_price: f64,
    pub category: Category,
    pub store: String,
    pub purchase_date: NaiveDate,
    pub matched_item_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub store: String,
    pub purchase_date: NaiveDate,
    pub total_amount: f64,
    pub item_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!("Dairy".parse::<Category>().unwrap(), Category::Dairy);
        assert_eq!(" SEAFOOD ".parse::<Category>().unwrap(), Category::Seafood);
        assert!("candles".parse::<Category>().is_err());
        assert_eq!(Category::parse_lenient("candles"), Category::Other);
    }

    #[test]
    fn batch_state_transitions() {
        let s = BatchState::Draft.advance(BatchState::Previewed).unwrap();
        assert_eq!(s.advance(BatchState::Confirmed).unwrap(), BatchState::Confirmed);
        assert_eq!(s.advance(BatchState::Discarded).unwrap(), BatchState::Discarded);
        assert!(BatchState::Confirmed.advance(BatchState::Confirmed).is_err());
        assert!(BatchState::Discarded.advance(BatchState::Confirmed).is_err());
        assert!(BatchState::Draft.advance(BatchState::Confirmed).is_err());
        assert!(!s.is_terminal());
        assert!(BatchState::Confirmed.is_terminal());
        assert!(BatchState::Discarded.is_terminal());
    }

    #[test]
    fn round_cents_to_nearest() {
        assert_eq!(round_cents(12.984999), 12.98);
        assert_eq!(round_cents(4.446), 4.45);
        assert_eq!(round_cents(0.0), 0.0);
    }
}
