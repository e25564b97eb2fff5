use crate::domain::cart::UserId;
use crate::domain::product::ProductId;
use std::fmt;
use thiserror::Error;

/// The record an operation expected to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Product(ProductId),
    CartLine {
        user_id: UserId,
        product_id: ProductId,
    },
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Product(id) => write!(f, "product {id}"),
            Missing::CartLine {
                user_id,
                product_id,
            } => write!(f, "cart line for user {user_id} and product {product_id}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(Missing),
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: u32,
    },
    #[error("Cannot remove {requested} of product {product_id}: only {reserved} in cart")]
    InsufficientCartQuantity {
        product_id: ProductId,
        requested: u32,
        reserved: u32,
    },
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Storage conflict: {0}")]
    StorageConflict(String),
    #[error("Storage failure: {0}")]
    StorageFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Authentication failed")]
    AuthFailure,
    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("Customer must be at least {minimum_age} years old")]
    Underage { minimum_age: u32 },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ShopError {
    /// Only transaction conflicts are worth retrying without new input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShopError::StorageConflict(_))
    }

    pub fn storage<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ShopError::StorageFailure(err.into())
    }
}

impl From<serde_json::Error> for ShopError {
    fn from(err: serde_json::Error) -> Self {
        ShopError::storage(err)
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for ShopError {
    fn from(err: rocksdb::Error) -> Self {
        ShopError::storage(err)
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;
