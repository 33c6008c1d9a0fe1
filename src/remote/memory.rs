use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{Filter, RemoteDataService, Row};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug)]
struct FailureRule {
    operation: Operation,
    collection: String,
    remaining: usize,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, Vec<Row>>,
    failures: Vec<FailureRule>,
    calls: Vec<(Operation, String)>,
}

/// In-process row store. Backs offline use and lets callers inject failures
/// for specific operations.
#[derive(Debug, Default)]
pub struct MemoryDataService {
    inner: Mutex<Inner>,
}

impl MemoryDataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls of `operation` on `collection` fail.
    pub fn fail_next(&self, operation: Operation, collection: &str, times: usize) {
        self.lock().failures.push(FailureRule {
            operation,
            collection: collection.to_string(),
            remaining: times,
        });
    }

    pub fn rows(&self, collection: &str) -> Vec<Row> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row(&self, collection: &str, id: Uuid) -> Option<Row> {
        let filter = Filter::id(id);
        self.rows(collection).into_iter().find(|r| filter.matches(r))
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<(Operation, String)> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, operation: Operation, collection: &str) -> Result<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        inner.calls.push((operation, collection.to_string()));

        let rule = inner
            .failures
            .iter_mut()
            .find(|r| r.operation == operation && r.collection == collection && r.remaining > 0);
        if let Some(rule) = rule {
            rule.remaining -= 1;
            inner.failures.retain(|r| r.remaining > 0);
            return Err(AppError::Remote(format!(
                "{:?} on {} failed: connection reset",
                operation, collection
            )));
        }
        Ok(inner)
    }
}

#[async_trait]
impl RemoteDataService for MemoryDataService {
    async fn select_all(&self, collection: &str, filter: &Filter) -> Result<Vec<Row>> {
        tokio::task::yield_now().await;
        let inner = self.begin(Operation::Select, collection)?;
        Ok(inner
            .collections
            .get(collection)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        tokio::task::yield_now().await;
        let mut inner = self.begin(Operation::Insert, collection)?;
        let stored = inner.collections.entry(collection.to_string()).or_default();

        for row in &rows {
            let Some(id) = row.get("id").filter(|id| !id.is_null()) else {
                return Err(AppError::Remote(format!("row in {} has no id", collection)));
            };
            if stored.iter().any(|existing| existing.get("id") == Some(id)) {
                return Err(AppError::Remote(format!(
                    "duplicate key value violates unique constraint on {}.id",
                    collection
                )));
            }
        }

        stored.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Row) -> Result<()> {
        tokio::task::yield_now().await;
        let mut inner = self.begin(Operation::Update, collection)?;
        let filter = Filter::id(id);
        if let Some(rows) = inner.collections.get_mut(collection) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<()> {
        tokio::task::yield_now().await;
        let mut inner = self.begin(Operation::Delete, collection)?;
        if let Some(rows) = inner.collections.get_mut(collection) {
            rows.retain(|r| !filter.matches(r));
        }
        Ok(())
    }
}
