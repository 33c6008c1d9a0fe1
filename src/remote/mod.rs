mod memory;
mod rest;

pub use memory::{MemoryDataService, Operation};
pub use rest::RestDataService;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// A flat key/value record as stored by the remote service.
pub type Row = serde_json::Map<String, Value>;

/// Equality on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn id(id: Uuid) -> Self {
        Self::eq("id", id.to_string())
    }

    pub fn owner(owner: &str) -> Self {
        Self::eq(crate::models::OWNER_COLUMN, owner)
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

/// Row store organized into named collections.
#[async_trait]
pub trait RemoteDataService: Send + Sync {
    async fn select_all(&self, collection: &str, filter: &Filter) -> Result<Vec<Row>>;

    /// Inserts the rows and returns them as stored.
    async fn insert(&self, collection: &str, rows: Vec<Row>) -> Result<Vec<Row>>;

    async fn update(&self, collection: &str, id: Uuid, patch: Row) -> Result<()>;

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<()>;
}
