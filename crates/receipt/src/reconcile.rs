//! Preview and confirm planning for one receipt batch.
//!
//! Both steps are pure: preview reads an inventory snapshot, and planning
//! turns a confirm request into a [`ConfirmPlan`] that a store applies in a
//! single transaction.

use chrono::NaiveDate;

use crate::config::LarderConfig;
use crate::error::ReceiptError;
use crate::matcher::{CandidateIndex, Matcher};
use crate::model::{
    round_cents, BatchState, ConfirmPlan, ConfirmRequest, InventoryItem, LineAction,
    MatchDecision, PlannedLine, PreviewLine, ReceiptPreview,
};
use crate::normalize::Normalizer;
use crate::parse::parse_receipt;
use crate::rules::RuleSet;

/// Fresh, never-reused batch identifier.
pub fn new_batch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct ReceiptEngine {
    normalizer: Normalizer,
    matcher: Matcher,
}

impl ReceiptEngine {
    pub fn new(rules: &RuleSet, config: LarderConfig) -> Self {
        Self {
            normalizer: Normalizer::new(rules),
            matcher: Matcher::new(config.matching),
        }
    }

    /// Engine with the built-in rules and default configuration.
    pub fn with_defaults() -> Result<Self, ReceiptError> {
        Ok(Self::new(&RuleSet::builtin()?, LarderConfig::default()))
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Parse `payload` and match every line against `snapshot`.
    ///
    /// Row errors do not fail the preview; they are reported in `warnings`.
    pub fn preview(
        &self,
        batch_id: &str,
        payload: &str,
        store: &str,
        purchase_date: NaiveDate,
        snapshot: &[InventoryItem],
    ) -> Result<ReceiptPreview, ReceiptError> {
        let parsed = parse_receipt(payload)?;
        let index = CandidateIndex::build(snapshot, &self.normalizer);

        let mut items = Vec::with_capacity(parsed.lines.len());
        for raw in parsed.lines {
            let normalized = self.normalizer.normalize(&raw.raw_name);
            let result = self.matcher.find(&normalized.canonical_name, &index);

            log::debug!(
                "line {}: '{}' -> '{}' ({:?}, score {:.3})",
                raw.line,
                raw.raw_name,
                normalized.canonical_name,
                result.decision,
                result.score
            );

            let category = raw
                .category
                .or(result.candidate.map(|c| c.category))
                .unwrap_or(normalized.category_guess);

            items.push(PreviewLine {
                line: raw.line,
                raw_name: raw.raw_name,
                normalized_name: normalized.canonical_name,
                quantity: raw.quantity,
                unit: raw.unit,
                unit_price: raw.unit_price,
                total_price: raw.total_price,
                category,
                pantry_match_name: result.candidate.map(|c| c.name.clone()),
                pantry_match_id: result.candidate.map(|c| c.id),
                match_score: result.candidate.map(|_| result.score),
                will_create_new: result.candidate.is_none(),
                needs_review: result.decision == MatchDecision::Review,
            });
        }

        let total_amount = round_cents(items.iter().map(|i| i.total_price).sum());
        let new_count = items.iter().filter(|i| i.will_create_new).count();
        let review_count = items.iter().filter(|i| i.needs_review).count();

        let preview = ReceiptPreview {
            batch_id: batch_id.to_string(),
            store: store.to_string(),
            purchase_date,
            state: BatchState::Draft.advance(BatchState::Previewed)?,
            total_items: items.len(),
            total_amount,
            matched_count: items.len() - new_count,
            new_count,
            review_count,
            items,
            warnings: parsed.errors,
        };

        log::info!(
            "previewed batch {}: {} line(s), {} matched, {} new, {} to review, {} warning(s)",
            preview.batch_id,
            preview.total_items,
            preview.matched_count,
            preview.new_count,
            preview.review_count,
            preview.warnings.len()
        );
        Ok(preview)
    }

    /// Validate a confirm request and decide what happens to each line.
    ///
    /// Missing normalized names and categories are filled in from the rules.
    /// Whether a matched item still exists is for the store to check.
    pub fn plan_confirm(&self, request: &ConfirmRequest) -> Result<ConfirmPlan, ReceiptError> {
        if request.items.is_empty() {
            return Err(ReceiptError::EmptyBatch {
                batch_id: request.batch_id.clone(),
            });
        }
        if request.batch_id.trim().is_empty() {
            return Err(ReceiptError::InvalidLine {
                index: 0,
                reason: "batch id is empty".into(),
            });
        }

        let mut lines = Vec::with_capacity(request.items.len());
        for (index, item) in request.items.iter().enumerate() {
            let invalid = |reason: String| ReceiptError::InvalidLine { index, reason };

            let raw_name = item.raw_name.trim();
            if raw_name.is_empty() {
                return Err(invalid("item name is empty".into()));
            }
            if !item.quantity.is_finite() || item.quantity <= 0.0 {
                return Err(invalid(format!("quantity must be > 0, got {}", item.quantity)));
            }
            if !item.unit_price.is_finite() || item.unit_price < 0.0 {
                return Err(invalid(format!(
                    "unit price must be >= 0, got {}",
                    item.unit_price
                )));
            }

            let normalized_name = match item.normalized_name.as_deref().map(str::trim) {
                Some(n) if !n.is_empty() => n.to_string(),
                _ => self.normalizer.canonical_name(raw_name),
            };
            let category = item
                .category
                .unwrap_or_else(|| self.normalizer.infer_category(&normalized_name));
            let unit = match item.unit.trim() {
                "" => "unit".to_string(),
                u => u.to_lowercase(),
            };
            let action = match item.pantry_match_id {
                Some(item_id) => LineAction::Increment { item_id },
                None => LineAction::Create,
            };

            lines.push(PlannedLine {
                raw_name: raw_name.to_string(),
                normalized_name,
                quantity: item.quantity,
                unit,
                unit_price: item.unit_price,
                total_price: round_cents(item.quantity * item.unit_price),
                category,
                action,
            });
        }

        let total_amount = round_cents(lines.iter().map(|l| l.total_price).sum());
        Ok(ConfirmPlan {
            batch_id: request.batch_id.clone(),
            store: request.store.clone(),
            purchase_date: request.purchase_date,
            update_pantry: request.update_pantry,
            lines,
            total_amount,
        })
    }
}
