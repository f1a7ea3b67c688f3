//! `larder-store`: SQLite persistence for inventory and receipt history.
//!
//! Applies [`larder_receipt::ConfirmPlan`]s atomically and serves the
//! snapshots and history the engine reads.

mod db;
pub mod error;
pub mod history;
pub mod inventory;
mod schema;

pub use db::Larder;
pub use error::StoreError;
pub use inventory::{ConsumeOutcome, ItemFilter, ItemUpdate, NewItem};
pub use schema::SCHEMA_VERSION;
