pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::error::OrderError;
use crate::order::OrderRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (code collision).
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("stored row is not valid: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// How a record is addressed when it is locked for update.
#[derive(Debug, Clone, Copy)]
pub enum RecordKey<'a> {
    OrderCode(&'a str),
    GatewayOrderRef(&'a str),
    ReturnCode(&'a str),
}

/// Side effects a mutation asks the store to apply in the same unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    /// Add the order's quantities to the catalog sales counters.
    pub record_sales: bool,
}

/// Runs against the locked record. An `Err` aborts the unit of work and nothing is written.
pub type Mutation<'a> = &'a mut (dyn FnMut(&mut OrderRecord) -> Result<Effects, OrderError> + Send);

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert order, items, payment and tracking atomically. A code collision yields
    /// `StoreError::Conflict` and writes nothing.
    async fn insert(&self, record: &OrderRecord, effects: Effects) -> Result<(), StoreError>;

    async fn find(&self, key: RecordKey<'_>) -> Result<Option<OrderRecord>, StoreError>;

    /// Orders placed by `user_id`, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderRecord>, StoreError>;

    /// Lock the record, run `mutation`, and persist the result if it changed. `Ok(None)`
    /// when no record matches `key`.
    async fn mutate(&self, key: RecordKey<'_>, mutation: Mutation<'_>) -> Result<Option<OrderRecord>, OrderError>;
}
