// larder CLI - receipt import and pantry inventory from the shell

mod exit_codes;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};

use larder_receipt::{
    new_batch_id, Category, DateRange, InventoryItem, LarderConfig, ReceiptEngine, ReceiptError,
    ReceiptPreview, RuleSet,
};
use larder_store::{ConsumeOutcome, ItemFilter, ItemUpdate, Larder, NewItem, StoreError};

use exit_codes::{
    EXIT_BATCH_NOT_FOUND, EXIT_BATCH_STATE, EXIT_CONFIG, EXIT_DATABASE, EXIT_DUPLICATE_BATCH,
    EXIT_ERROR, EXIT_INSUFFICIENT, EXIT_INVALID_BATCH, EXIT_INVALID_ITEM, EXIT_ITEM_NOT_FOUND,
    EXIT_MALFORMED_INPUT, EXIT_ROW_PARSE, EXIT_RULES, EXIT_SUCCESS, EXIT_TRANSACTION, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "larder")]
#[command(about = "Import grocery receipts into a pantry inventory and track spending")]
#[command(version)]
struct Cli {
    /// SQLite database [default: <data dir>/larder/larder.db]
    #[arg(long, global = true, env = "LARDER_DB")]
    db: Option<PathBuf>,

    /// Config file [default: <config dir>/larder/config.toml, if present]
    #[arg(long, global = true, env = "LARDER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a receipt and match its lines against the pantry, without saving
    #[command(after_help = "\
Examples:
  larder preview receipt.csv --store 'Whole Foods' --date 2025-04-12
  larder preview receipt.csv --store Costco --date 2025-04-12 -o costco.json
  larder preview receipt.tsv --store Kroger --date 2025-04-12 --json

The file saved with -o can be edited (names, matches, dropped lines)
before it is passed to `larder confirm`.")]
    Preview {
        /// Receipt file (CSV, TSV, semicolon or pipe separated)
        input: PathBuf,

        /// Store the receipt is from
        #[arg(long)]
        store: String,

        /// Purchase date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,

        /// Save the preview for `larder confirm` / `larder discard`
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Print the preview as JSON
        #[arg(long)]
        json: bool,

        /// Fail if any row could not be parsed
        #[arg(long)]
        strict: bool,
    },

    /// Save a previewed receipt: update the pantry and record the purchase
    Confirm {
        /// Preview file written by `larder preview -o`
        preview: PathBuf,

        /// Record purchase history only; leave pantry quantities alone
        #[arg(long)]
        history_only: bool,

        #[arg(long)]
        json: bool,
    },

    /// Throw away a saved preview
    Discard {
        /// Preview file written by `larder preview -o`
        preview: PathBuf,
    },

    /// Saved receipts
    Receipts {
        #[command(subcommand)]
        command: ReceiptsCommand,
    },

    /// Spending summary over purchase history
    #[command(after_help = "\
Examples:
  larder spend
  larder spend --from 2025-01-01 --to 2025-03-31
  larder spend --top 5 --json")]
    Spend {
        /// First purchase date to include (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,

        /// Last purchase date to include (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,

        /// Number of top items [default: analytics.top_items]
        #[arg(long)]
        top: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Pantry inventory
    Pantry {
        #[command(subcommand)]
        command: PantryCommand,
    },

    /// Normalization rule tables
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
}

#[derive(Subcommand)]
enum ReceiptsCommand {
    /// Recent receipts, newest purchase first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Lines of one receipt
    Show {
        batch_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Delete a receipt's history (pantry quantities are not changed)
    Delete { batch_id: String },
}

#[derive(Subcommand)]
enum PantryCommand {
    /// Items, most recently updated first
    List {
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Add an item by hand
    Add {
        name: String,

        #[arg(long)]
        qty: f64,

        #[arg(long, default_value = "unit")]
        unit: String,

        /// Category [default: inferred from the name]
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,

        /// Estimated expiry date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        expires: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Use up some of an item
    Consume {
        id: i64,

        amount: f64,

        #[arg(long)]
        json: bool,
    },

    /// Change fields of an item
    Update {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        /// Canonical (matching) name to store with a rename
        #[arg(long)]
        canonical: Option<String>,

        #[arg(long)]
        qty: Option<f64>,

        #[arg(long)]
        unit: Option<String>,

        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,

        #[arg(long, value_parser = parse_date, conflicts_with = "clear_expiry")]
        expires: Option<NaiveDate>,

        /// Remove the expiry date
        #[arg(long)]
        clear_expiry: bool,

        #[arg(long)]
        json: bool,
    },

    /// Remove an item (its purchase history is kept)
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Load and validate a rule table
    Check {
        /// Rule file [default: rules.path from config, else built-in]
        path: Option<PathBuf>,
    },

    /// Show how names normalize under the active rules
    #[command(after_help = "\
Examples:
  larder rules test 'CHKN BRST' '2% Milk Whole Foods 1gal'")]
    Test {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("'{s}' is not a YYYY-MM-DD date: {e}"))
}

fn parse_category(s: &str) -> Result<Category, String> {
    s.parse::<Category>().map_err(|e| {
        let known: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        format!("{e} (expected one of: {})", known.join(", "))
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = Env::load(cli.config, cli.db).and_then(|env| match cli.command {
        Commands::Preview { input, store, date, out, json, strict } => {
            cmd_preview(&env, &input, &store, date, out.as_deref(), json, strict)
        }
        Commands::Confirm { preview, history_only, json } => {
            cmd_confirm(&env, &preview, history_only, json)
        }
        Commands::Discard { preview } => cmd_discard(&preview),
        Commands::Receipts { command } => match command {
            ReceiptsCommand::List { limit, json } => cmd_receipts_list(&env, limit, json),
            ReceiptsCommand::Show { batch_id, json } => cmd_receipts_show(&env, &batch_id, json),
            ReceiptsCommand::Delete { batch_id } => cmd_receipts_delete(&env, &batch_id),
        },
        Commands::Spend { from, to, top, json } => cmd_spend(&env, from, to, top, json),
        Commands::Pantry { command } => match command {
            PantryCommand::List { category, offset, limit, json } => {
                cmd_pantry_list(&env, ItemFilter { category, offset, limit }, json)
            }
            PantryCommand::Add { name, qty, unit, category, expires, json } => {
                cmd_pantry_add(&env, name, qty, unit, category, expires, json)
            }
            PantryCommand::Consume { id, amount, json } => cmd_pantry_consume(&env, id, amount, json),
            PantryCommand::Update {
                id,
                name,
                canonical,
                qty,
                unit,
                category,
                expires,
                clear_expiry,
                json,
            } => {
                let estimated_expiry = if clear_expiry {
                    Some(None)
                } else {
                    match expires {
                        Some(date) => Some(Some(expiry_timestamp(date)?)),
                        None => None,
                    }
                };
                let update = ItemUpdate {
                    name,
                    canonical_name: canonical,
                    quantity: qty,
                    unit,
                    category,
                    estimated_expiry,
                };
                cmd_pantry_update(&env, id, &update, json)
            }
            PantryCommand::Delete { id } => cmd_pantry_delete(&env, id),
        },
        Commands::Rules { command } => match command {
            RulesCommand::Check { path } => cmd_rules_check(&env, path.as_deref()),
            RulesCommand::Test { names } => cmd_rules_test(&env, &names),
        },
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReceiptError> for CliError {
    fn from(err: ReceiptError) -> Self {
        let (code, hint) = match &err {
            ReceiptError::MalformedInput(_) => (
                EXIT_MALFORMED_INPUT,
                Some("the header row needs name, quantity, unit and price columns".to_string()),
            ),
            ReceiptError::RowParse(_) => (
                EXIT_ROW_PARSE,
                Some("without --strict the good rows are kept and the rest reported".to_string()),
            ),
            ReceiptError::DuplicateBatch { batch_id } => (
                EXIT_DUPLICATE_BATCH,
                Some(format!("see `larder receipts show {batch_id}`")),
            ),
            ReceiptError::TransactionFailure { .. } => (
                EXIT_TRANSACTION,
                Some("nothing was applied; the confirm can be retried".to_string()),
            ),
            ReceiptError::EmptyBatch { .. } | ReceiptError::InvalidLine { .. } => {
                (EXIT_INVALID_BATCH, None)
            }
            ReceiptError::InvalidTransition { .. } => (
                EXIT_BATCH_STATE,
                Some("run `larder preview` again to start a new batch".to_string()),
            ),
            ReceiptError::ConfigParse(_) | ReceiptError::ConfigValidation(_) => (EXIT_CONFIG, None),
            ReceiptError::RulesParse(_) | ReceiptError::RulesValidation(_) => (
                EXIT_RULES,
                Some("validate the table with `larder rules check <path>`".to_string()),
            ),
        };
        Self { code, message: err.to_string(), hint }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        let (code, hint) = match err {
            StoreError::Receipt(inner) => return inner.into(),
            StoreError::Sqlite(_) => (EXIT_DATABASE, None),
            StoreError::ItemNotFound(_) => (
                EXIT_ITEM_NOT_FOUND,
                Some("list item ids with `larder pantry list`".to_string()),
            ),
            StoreError::BatchNotFound(_) => (
                EXIT_BATCH_NOT_FOUND,
                Some("list receipts with `larder receipts list`".to_string()),
            ),
            StoreError::InsufficientQuantity { available, .. } => (
                EXIT_INSUFFICIENT,
                Some(format!("at most {available} can be consumed")),
            ),
            StoreError::InvalidAmount(_) | StoreError::InvalidItem(_) => (EXIT_INVALID_ITEM, None),
        };
        Self { code, message, hint }
    }
}

// ============================================================================
// Environment: config, rules, database
// ============================================================================

struct Env {
    config: LarderConfig,
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
}

impl Env {
    fn load(config: Option<PathBuf>, db: Option<PathBuf>) -> Result<Self, CliError> {
        let (config, config_path) = match config {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::usage(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                (LarderConfig::load(&path)?, Some(path))
            }
            None => match dirs::config_dir().map(|d| d.join("larder").join("config.toml")) {
                Some(path) => (LarderConfig::load(&path)?, Some(path)),
                None => (LarderConfig::default(), None),
            },
        };
        Ok(Self { config, config_path, db_path: db })
    }

    /// `rules.path` is relative to the config file's directory.
    fn rules_path(&self) -> Option<PathBuf> {
        let path = self.config.rules.path.as_ref()?;
        if path.is_absolute() {
            return Some(path.clone());
        }
        let base = self.config_path.as_deref().and_then(Path::parent);
        Some(base.map(|dir| dir.join(path)).unwrap_or_else(|| path.clone()))
    }

    fn rules(&self) -> Result<RuleSet, CliError> {
        Ok(RuleSet::load(self.rules_path().as_deref())?)
    }

    fn engine(&self) -> Result<ReceiptEngine, CliError> {
        Ok(ReceiptEngine::new(&self.rules()?, self.config.clone()))
    }

    fn open_store(&self) -> Result<Larder, CliError> {
        let path = match &self.db_path {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .map(|d| d.join("larder").join("larder.db"))
                .ok_or_else(|| {
                    CliError::usage("cannot determine a data directory for the database")
                        .with_hint("pass --db <path> or set LARDER_DB")
                })?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CliError::usage(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let larder = Larder::open(&path)?;
        Ok(larder.with_zero_stock(self.config.inventory.zero_stock))
    }
}

// ============================================================================
// File helpers
// ============================================================================

/// Read a receipt as UTF-8, falling back to Windows-1252 for spreadsheet exports.
fn read_payload(path: &Path) -> Result<String, CliError> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| CliError::usage(format!("cannot open {}: {}", path.display(), e)))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| CliError::usage(format!("cannot read {}: {}", path.display(), e)))?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            log::debug!("{} is not UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn read_preview(path: &Path) -> Result<ReceiptPreview, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::usage(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&text).map_err(|e| {
        CliError::usage(format!("{} is not a receipt preview: {}", path.display(), e))
            .with_hint("create one with `larder preview <receipt> -o <file>`")
    })
}

fn write_preview(path: &Path, preview: &ReceiptPreview) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(preview).map_err(|e| CliError::io(e.to_string()))?;
    std::fs::write(path, text + "\n")
        .map_err(|e| CliError::io(format!("cannot write {}: {}", path.display(), e)))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).map_err(|e| CliError::io(e.to_string()))
}

fn expiry_timestamp(date: NaiveDate) -> Result<DateTime<Utc>, CliError> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| CliError::usage(format!("invalid expiry date {date}")))
}

// ============================================================================
// preview / confirm / discard
// ============================================================================

fn cmd_preview(
    env: &Env,
    input: &Path,
    store: &str,
    date: NaiveDate,
    out: Option<&Path>,
    json: bool,
    strict: bool,
) -> Result<(), CliError> {
    let store = store.trim();
    if store.is_empty() {
        return Err(CliError::usage("--store must not be empty"));
    }

    let payload = read_payload(input)?;
    let engine = env.engine()?;
    let larder = env.open_store()?;
    let snapshot = larder.snapshot()?;
    let preview = engine.preview(&new_batch_id(), &payload, store, date, &snapshot)?;

    if strict && !preview.warnings.is_empty() {
        return Err(ReceiptError::RowParse(preview.warnings).into());
    }

    if let Some(path) = out {
        write_preview(path, &preview)?;
    }

    if json {
        return print_json(&preview);
    }

    for warning in &preview.warnings {
        eprintln!("warning: skipped {}", warning);
    }
    print_preview(&preview, out).map_err(|e| CliError::io(e.to_string()))
}

fn print_preview(preview: &ReceiptPreview, saved_to: Option<&Path>) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(
        out,
        "Receipt {}  {}  {}",
        preview.batch_id, preview.store, preview.purchase_date
    )?;
    writeln!(out)?;
    for line in &preview.items {
        let status = match (line.pantry_match_id, line.match_score) {
            (Some(id), Some(score)) if line.needs_review => format!("review #{id} ({score:.2})"),
            (Some(id), Some(score)) => format!("match #{id} ({score:.2})"),
            _ => "new".to_string(),
        };
        writeln!(
            out,
            "{:>4}  {:<32} {:<24} {:>7} {:<8} {:>9.2}  {:<10} {}",
            line.line,
            truncate(&line.raw_name, 32),
            truncate(&line.normalized_name, 24),
            line.quantity,
            line.unit,
            line.total_price,
            line.category.as_str(),
            status
        )?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "{} items, total {:.2}: {} matched, {} new, {} to review",
        preview.total_items,
        preview.total_amount,
        preview.matched_count,
        preview.new_count,
        preview.review_count
    )?;
    if let Some(path) = saved_to {
        writeln!(out, "saved to {}; run `larder confirm {}`", path.display(), path.display())?;
    }
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}

/// Reject a preview file that was already confirmed or discarded.
fn ensure_open(preview: &ReceiptPreview) -> Result<(), CliError> {
    if preview.state.is_terminal() {
        return Err(CliError {
            code: EXIT_BATCH_STATE,
            message: format!("receipt {} is already {}", preview.batch_id, preview.state),
            hint: Some("run `larder preview` again to start a new batch".to_string()),
        });
    }
    Ok(())
}

fn cmd_confirm(env: &Env, path: &Path, history_only: bool, json: bool) -> Result<(), CliError> {
    let mut preview = read_preview(path)?;
    ensure_open(&preview)?;
    let request = preview.confirm(!history_only)?;
    let plan = env.engine()?.plan_confirm(&request)?;
    let mut larder = env.open_store()?;
    let outcome = larder.commit(&plan)?;

    if json {
        print_json(&outcome)?;
    } else {
        println!("{}", outcome.message);
        println!(
            "batch {}: {} line(s), total {:.2}",
            outcome.batch_id, outcome.items_created, outcome.total_amount
        );
    }

    if let Some(warning) = mark_confirmed(path, &preview) {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

/// Rewrite the preview file once the commit has landed. The batch is saved
/// either way, and the database rejects a replay as a duplicate, so a failed
/// rewrite is only reported.
fn mark_confirmed(path: &Path, preview: &ReceiptPreview) -> Option<String> {
    write_preview(path, preview).err().map(|e| {
        format!(
            "receipt {} was saved, but the preview file was not updated: {}",
            preview.batch_id, e.message
        )
    })
}

fn cmd_discard(path: &Path) -> Result<(), CliError> {
    let mut preview = read_preview(path)?;
    ensure_open(&preview)?;
    preview.discard()?;
    std::fs::remove_file(path)
        .map_err(|e| CliError::io(format!("cannot remove {}: {}", path.display(), e)))?;
    println!("discarded receipt {}", preview.batch_id);
    Ok(())
}

// ============================================================================
// receipts
// ============================================================================

fn cmd_receipts_list(env: &Env, limit: usize, json: bool) -> Result<(), CliError> {
    let batches = env.open_store()?.recent_batches(limit)?;
    if json {
        return print_json(&batches);
    }
    if batches.is_empty() {
        println!("no receipts");
        return Ok(());
    }
    for b in &batches {
        println!(
            "{}  {}  {:<24} {:>4} items {:>10.2}",
            b.batch_id,
            b.purchase_date,
            truncate(&b.store, 24),
            b.item_count,
            b.total_amount
        );
    }
    Ok(())
}

fn cmd_receipts_show(env: &Env, batch_id: &str, json: bool) -> Result<(), CliError> {
    let records = env.open_store()?.batch_items(batch_id)?;
    if json {
        return print_json(&records);
    }
    if let Some(first) = records.first() {
        println!("Receipt {}  {}  {}", first.batch_id, first.store, first.purchase_date);
    }
    for r in &records {
        let item = r
            .matched_item_id
            .map(|id| format!("#{id}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<32} {:<24} {:>7} {:<8} {:>9.2}  {:<10} {}",
            truncate(&r.raw_name, 32),
            truncate(&r.normalized_name, 24),
            r.quantity,
            r.unit,
            r.total_price,
            r.category.as_str(),
            item
        );
    }
    Ok(())
}

fn cmd_receipts_delete(env: &Env, batch_id: &str) -> Result<(), CliError> {
    let deleted = env.open_store()?.delete_batch(batch_id)?;
    println!("deleted {deleted} line(s) of receipt {batch_id}; pantry quantities unchanged");
    Ok(())
}

// ============================================================================
// spend
// ============================================================================

fn cmd_spend(
    env: &Env,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    top: Option<usize>,
    json: bool,
) -> Result<(), CliError> {
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(CliError::usage(format!("--from {f} is after --to {t}")));
        }
    }
    let top = top.unwrap_or(env.config.analytics.top_items);
    if top == 0 {
        return Err(CliError::usage("--top must be at least 1"));
    }

    let report = env.open_store()?.spend_report(DateRange::new(from, to), top)?;
    if json {
        return print_json(&report);
    }

    let t = &report.totals;
    match (t.first_purchase, t.last_purchase) {
        (Some(first), Some(last)) => println!(
            "Spent {:.2} on {} items across {} receipts ({} to {})",
            t.total_spent, t.total_items, t.total_receipts, first, last
        ),
        _ => {
            println!("no purchases in range");
            return Ok(());
        }
    }

    println!("\nBy category:");
    for c in &report.by_category {
        println!(
            "  {:<12} {:>10.2} {:>5.1}%  {} items",
            c.category.as_str(), c.total_spent, c.percentage, c.item_count
        );
    }
    println!("\nBy store:");
    for s in &report.by_store {
        println!(
            "  {:<24} {:>10.2} {:>5.1}%  {} visits",
            truncate(&s.store, 24),
            s.total_spent,
            s.percentage,
            s.visit_count
        );
    }
    println!("\nBy month:");
    for m in &report.by_month {
        println!("  {}  {:>10.2}  {} items", m.month, m.total_spent, m.item_count);
    }
    println!("\nTop items:");
    for (rank, item) in report.top_items.iter().enumerate() {
        println!(
            "  {:>2}. {:<24} {:>10.2}  x{}  avg {:.2}",
            rank + 1,
            truncate(&item.name, 24),
            item.total_spent,
            item.purchase_count,
            item.avg_price
        );
    }
    Ok(())
}

// ============================================================================
// pantry
// ============================================================================

fn print_item(item: &InventoryItem) {
    let expiry = item
        .estimated_expiry
        .map(|e| format!("  expires {}", e.date_naive()))
        .unwrap_or_default();
    println!(
        "#{:<5} {:<28} {:>8} {:<8} {:<10} {}{}",
        item.id,
        truncate(&item.name, 28),
        item.quantity,
        item.unit,
        item.category.as_str(),
        item.source,
        expiry
    );
}

fn cmd_pantry_list(env: &Env, filter: ItemFilter, json: bool) -> Result<(), CliError> {
    let items = env.open_store()?.list_items(&filter)?;
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("pantry is empty");
    }
    items.iter().for_each(print_item);
    Ok(())
}

fn cmd_pantry_add(
    env: &Env,
    name: String,
    quantity: f64,
    unit: String,
    category: Option<Category>,
    expires: Option<NaiveDate>,
    json: bool,
) -> Result<(), CliError> {
    let category = match category {
        Some(c) => c,
        None => {
            let engine = env.engine()?;
            let normalizer = engine.normalizer();
            normalizer.infer_category(&normalizer.canonical_name(&name))
        }
    };
    let estimated_expiry = expires.map(expiry_timestamp).transpose()?;

    let item = env.open_store()?.add_item(&NewItem {
        name,
        quantity,
        unit,
        category,
        estimated_expiry,
    })?;
    if json {
        return print_json(&item);
    }
    print_item(&item);
    Ok(())
}

fn cmd_pantry_consume(env: &Env, id: i64, amount: f64, json: bool) -> Result<(), CliError> {
    let outcome = env.open_store()?.consume(id, amount)?;
    if json {
        return print_json(&outcome);
    }
    match outcome {
        ConsumeOutcome::Remaining { item } => print_item(&item),
        ConsumeOutcome::Removed { id } => println!("#{id} used up and removed"),
    }
    Ok(())
}

fn cmd_pantry_update(env: &Env, id: i64, update: &ItemUpdate, json: bool) -> Result<(), CliError> {
    if *update == ItemUpdate::default() {
        return Err(CliError::usage("nothing to update")
            .with_hint("pass at least one of --name, --qty, --unit, --category, --expires"));
    }
    let item = env.open_store()?.update_item(id, update)?;
    if json {
        return print_json(&item);
    }
    print_item(&item);
    Ok(())
}

fn cmd_pantry_delete(env: &Env, id: i64) -> Result<(), CliError> {
    env.open_store()?.delete_item(id)?;
    println!("deleted #{id}");
    Ok(())
}

// ============================================================================
// rules
// ============================================================================

fn cmd_rules_check(env: &Env, path: Option<&Path>) -> Result<(), CliError> {
    let (rules, source) = match path {
        Some(p) => (RuleSet::load(Some(p))?, p.display().to_string()),
        None => match env.rules_path() {
            Some(p) => (RuleSet::load(Some(&p))?, p.display().to_string()),
            None => (RuleSet::builtin()?, "built-in".to_string()),
        },
    };
    println!(
        "{}: version {}, {} brands, {} abbreviations, {} size units, {} size words, \
         {} descriptors, {} category rules",
        source,
        rules.version,
        rules.brands.len(),
        rules.abbreviations.len(),
        rules.size_units.len(),
        rules.size_words.len(),
        rules.descriptors.len(),
        rules.categories.len()
    );
    Ok(())
}

fn cmd_rules_test(env: &Env, names: &[String]) -> Result<(), CliError> {
    let engine = env.engine()?;
    println!("rules version {}", engine.normalizer().rules_version());
    for name in names {
        let normalized = engine.normalizer().normalize(name);
        println!(
            "{} -> {} ({})",
            name, normalized.canonical_name, normalized.category_guess
        );
    }
    Ok(())
}
