//! Tabular receipt payload -> raw line records.
//!
//! The header row is required and matched case-insensitively against a small
//! alias table. Header problems abort the parse; row problems are collected
//! and the offending rows left out.

use crate::error::{ReceiptError, RowParseError};
use crate::model::{round_cents, Category, RawLine};

const NAME_ALIASES: &[&str] = &["name", "item", "description", "product", "desc"];
const QUANTITY_ALIASES: &[&str] = &["quantity", "qty", "count"];
const UNIT_ALIASES: &[&str] = &["unit", "uom", "measure"];
/// Extended price printed on the receipt line.
const LINE_PRICE_ALIASES: &[&str] = &["price", "total", "amount", "line_total"];
/// Per-unit price.
const UNIT_PRICE_ALIASES: &[&str] = &["unit_price", "each", "cost"];
const CATEGORY_ALIASES: &[&str] = &["category", "cat", "dept", "department"];

const DEFAULT_UNIT: &str = "unit";

/// Rows that parsed, plus the rows that did not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub lines: Vec<RawLine>,
    pub errors: Vec<RowParseError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriceColumn {
    Line(usize),
    Unit(usize),
}

struct Columns {
    name: usize,
    quantity: usize,
    unit: usize,
    price: PriceColumn,
    category: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, ReceiptError> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();
        let find = |aliases: &[&str]| normalized.iter().position(|h| aliases.contains(&h.as_str()));
        let require = |aliases: &[&str], label: &str| {
            find(aliases).ok_or_else(|| {
                ReceiptError::MalformedInput(format!(
                    "missing required column '{label}' (accepted headers: {})",
                    aliases.join(", ")
                ))
            })
        };

        let name = require(NAME_ALIASES, "name")?;
        let quantity = require(QUANTITY_ALIASES, "quantity")?;
        let unit = require(UNIT_ALIASES, "unit")?;
        // The printed line price wins when both kinds are present.
        let price = match (find(LINE_PRICE_ALIASES), find(UNIT_PRICE_ALIASES)) {
            (Some(idx), _) => PriceColumn::Line(idx),
            (None, Some(idx)) => PriceColumn::Unit(idx),
            (None, None) => {
                let accepted: Vec<&str> = LINE_PRICE_ALIASES
                    .iter()
                    .chain(UNIT_PRICE_ALIASES)
                    .copied()
                    .collect();
                return Err(ReceiptError::MalformedInput(format!(
                    "missing required column 'price' (accepted headers: {})",
                    accepted.join(", ")
                )));
            }
        };

        Ok(Self {
            name,
            quantity,
            unit,
            price,
            category: find(CATEGORY_ALIASES),
        })
    }
}

/// Parse a receipt payload. An empty payload yields an empty outcome.
pub fn parse_receipt(payload: &str) -> Result<ParseOutcome, ReceiptError> {
    let payload = payload.trim_start_matches('\u{feff}');
    if payload.trim().is_empty() {
        return Ok(ParseOutcome::default());
    }

    let delimiter = sniff_delimiter(payload);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(payload.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ReceiptError::MalformedInput(format!("unreadable header row: {e}")))?
        .clone();
    let columns = Columns::resolve(&headers)?;

    let mut outcome = ParseOutcome::default();
    for (idx, result) in reader.records().enumerate() {
        // Header is line 1; fall back to counting when the reader has no position.
        let fallback_line = idx as u64 + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(fallback_line);
                outcome.errors.push(RowParseError {
                    line,
                    reason: format!("unreadable row: {e}"),
                });
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);

        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        match parse_row(&record, &columns, line) {
            Ok(raw) => outcome.lines.push(raw),
            Err(reason) => outcome.errors.push(RowParseError { line, reason }),
        }
    }

    for err in &outcome.errors {
        log::warn!("skipping receipt row: {err}");
    }
    Ok(outcome)
}

/// Like [`parse_receipt`] but any row error fails the whole parse.
pub fn parse_receipt_strict(payload: &str) -> Result<Vec<RawLine>, ReceiptError> {
    let outcome = parse_receipt(payload)?;
    if outcome.errors.is_empty() {
        Ok(outcome.lines)
    } else {
        Err(ReceiptError::RowParse(outcome.errors))
    }
}

fn parse_row(record: &csv::StringRecord, columns: &Columns, line: u64) -> Result<RawLine, String> {
    let cell = |idx: usize| record.get(idx).unwrap_or("");

    let raw_name = cell(columns.name);
    if raw_name.is_empty() {
        return Err("item name is empty".into());
    }

    let quantity = parse_number(cell(columns.quantity), "quantity")?;
    if quantity <= 0.0 {
        return Err(format!("quantity must be > 0, got {quantity}"));
    }

    let unit = match cell(columns.unit) {
        "" => DEFAULT_UNIT.to_string(),
        u => u.to_lowercase(),
    };

    let (unit_price, total_price) = match columns.price {
        PriceColumn::Line(idx) => {
            let price = parse_money(cell(idx))?;
            (price / quantity, round_cents(price))
        }
        PriceColumn::Unit(idx) => {
            let each = parse_money(cell(idx))?;
            (each, round_cents(quantity * each))
        }
    };

    // An unrecognized category is left for inference.
    let category = columns
        .category
        .map(cell)
        .filter(|c| !c.is_empty())
        .and_then(|c| c.parse::<Category>().ok());

    Ok(RawLine {
        line,
        raw_name: raw_name.to_string(),
        quantity,
        unit,
        unit_price,
        total_price,
        category,
    })
}

fn parse_number(text: &str, what: &str) -> Result<f64, String> {
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ if text.is_empty() => Err(format!("{what} is empty")),
        _ => Err(format!("{what} '{text}' is not a number")),
    }
}

/// Money cell: tolerates a currency sign and thousands separators.
fn parse_money(text: &str) -> Result<f64, String> {
    let cleaned: String = text.chars().filter(|c| *c != '$' && *c != ',').collect();
    let value = parse_number(cleaned.trim(), "price")
        .map_err(|_| format!("price '{text}' is not a number"))?;
    if value < 0.0 {
        return Err(format!("price must be >= 0, got {text}"));
    }
    Ok(value)
}

/// Pick the delimiter that splits the first lines most consistently.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b',', b'\t', b';', b'|'];
    let sample: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(10)
        .collect();

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // The header must split for the delimiter to be viable.
        let target = counts.first().copied().unwrap_or(0);
        if target <= 1 {
            continue;
        }

        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}
