//! CLI Exit Code Registry
//!
//! Single source of truth for `larder` exit codes. Scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain      | Description                                   |
//! |---------|-------------|-----------------------------------------------|
//! | 0       | Universal   | Success                                       |
//! | 1       | Universal   | General error (unspecified)                   |
//! | 2       | Universal   | CLI usage error (bad args, missing file)      |
//! | 3-9     | receipt     | Parsing and confirm errors                    |
//! | 10-19   | inventory   | Pantry item errors                            |
//! | 20-29   | config      | Configuration and rule table errors           |
//! | 30-39   | store       | Database errors                               |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Map it in the `From<ReceiptError>` / `From<StoreError>` impls for `CliError` in main.rs

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable input file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Receipt (3-9)
// =============================================================================

/// Receipt header unusable (missing required column).
pub const EXIT_MALFORMED_INPUT: u8 = 3;

/// Rows failed to parse (strict mode only; preview reports warnings).
pub const EXIT_ROW_PARSE: u8 = 4;

/// Batch has already been confirmed.
pub const EXIT_DUPLICATE_BATCH: u8 = 5;

/// Confirm transaction failed and was rolled back. Retryable.
pub const EXIT_TRANSACTION: u8 = 6;

/// Confirm request invalid (empty batch, bad line).
pub const EXIT_INVALID_BATCH: u8 = 7;

/// Preview file is not in a state that allows the command
/// (already confirmed or discarded).
pub const EXIT_BATCH_STATE: u8 = 8;

/// Batch id not present in history.
pub const EXIT_BATCH_NOT_FOUND: u8 = 9;

// =============================================================================
// Inventory (10-19)
// =============================================================================

/// Pantry item id does not exist.
pub const EXIT_ITEM_NOT_FOUND: u8 = 10;

/// Consume asked for more than is available.
pub const EXIT_INSUFFICIENT: u8 = 11;

/// Invalid quantity or item field.
pub const EXIT_INVALID_ITEM: u8 = 12;

// =============================================================================
// Config (20-29)
// =============================================================================

/// Config file could not be parsed or failed validation.
pub const EXIT_CONFIG: u8 = 20;

/// Rule table could not be parsed or failed validation.
pub const EXIT_RULES: u8 = 21;

// =============================================================================
// Store (30-39)
// =============================================================================

/// Database could not be opened or a query failed.
pub const EXIT_DATABASE: u8 = 30;
