//! `larder-receipt`: receipt ingestion engine.
//!
//! Pure engine crate: parses receipt payloads, normalizes and matches line
//! items against an inventory snapshot, plans confirmations and aggregates
//! spend. No storage or CLI dependencies.

pub mod analytics;
pub mod config;
pub mod error;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod reconcile;
pub mod rules;

pub use analytics::{spend_report, DateRange, SpendReport};
pub use config::{LarderConfig, ZeroStockPolicy};
pub use error::{ReceiptError, RowParseError};
pub use model::{
    BatchState, BatchSummary, Category, ConfirmLine, ConfirmOutcome, ConfirmPlan,
    ConfirmRequest, InventoryItem, LineAction, PlannedLine, Provenance, ReceiptLineRecord,
    ReceiptPreview,
};
pub use normalize::Normalizer;
pub use reconcile::{new_batch_id, ReceiptEngine};
pub use rules::RuleSet;
