use larder_receipt::ReceiptError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("inventory item {0} not found")]
    ItemNotFound(i64),

    #[error("receipt batch {0} not found")]
    BatchNotFound(String),

    #[error("cannot consume {requested} from item {id}: only {available} available")]
    InsufficientQuantity {
        id: i64,
        available: f64,
        requested: f64,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid item: {0}")]
    InvalidItem(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
