//! Record store contract for alerts and holdings
//!
//! Persistence is external to the engine. The engine talks to it through
//! `RecordStore`, and `MemoryStore` is an in-process implementation.

use crate::{
    error::StoreError,
    types::{
        validate_coin_id, validate_position, validate_target_price, Alert, AlertPatch, Holding,
        HoldingPatch, NewAlert, NewHolding,
    },
};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A stored record with its creation and partial-update payloads
pub trait Record: Clone + Send + Sync + 'static {
    type Draft: Send + Sync + 'static;
    type Patch: Send + Sync + 'static;

    fn id(&self) -> &str;

    /// Builds a record from a validated draft
    fn from_draft(id: String, draft: Self::Draft) -> Result<Self, StoreError>;

    /// Applies a patch, rejecting it without changes if the result is invalid
    fn apply(&mut self, patch: Self::Patch) -> Result<(), StoreError>;
}

/// CRUD contract of an external record store
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    async fn list(&self) -> Result<Vec<R>, StoreError>;

    async fn create(&self, draft: R::Draft) -> Result<R, StoreError>;

    async fn update(&self, id: &str, patch: R::Patch) -> Result<R, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Store of price alerts
pub type AlertStore = dyn RecordStore<Alert>;

/// Store of portfolio holdings
pub type HoldingStore = dyn RecordStore<Holding>;

impl Record for Alert {
    type Draft = NewAlert;
    type Patch = AlertPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, draft: NewAlert) -> Result<Self, StoreError> {
        draft.validate().map_err(StoreError::Invalid)?;
        Ok(Alert {
            id,
            coin_id: draft.coin_id,
            coin_name: draft.coin_name,
            symbol: draft.symbol,
            target_price: draft.target_price,
            condition: draft.condition,
            is_active: draft.is_active,
            owner: draft.owner,
        })
    }

    fn apply(&mut self, patch: AlertPatch) -> Result<(), StoreError> {
        if let Some(coin_id) = &patch.coin_id {
            validate_coin_id(coin_id).map_err(StoreError::Invalid)?;
        }
        if let Some(target) = patch.target_price {
            validate_target_price(target).map_err(StoreError::Invalid)?;
            self.target_price = target;
        }
        if let Some(coin_id) = patch.coin_id {
            self.coin_id = coin_id;
        }
        if let Some(coin_name) = patch.coin_name {
            self.coin_name = coin_name;
        }
        if let Some(symbol) = patch.symbol {
            self.symbol = symbol;
        }
        if let Some(condition) = patch.condition {
            self.condition = condition;
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
        Ok(())
    }
}

impl Record for Holding {
    type Draft = NewHolding;
    type Patch = HoldingPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, draft: NewHolding) -> Result<Self, StoreError> {
        draft.validate().map_err(StoreError::Invalid)?;
        Ok(Holding {
            id,
            coin_id: draft.coin_id,
            coin_name: draft.coin_name,
            symbol: draft.symbol,
            quantity: draft.quantity,
            purchase_price: draft.purchase_price,
            purchase_date: draft.purchase_date,
        })
    }

    fn apply(&mut self, patch: HoldingPatch) -> Result<(), StoreError> {
        if let Some(coin_id) = &patch.coin_id {
            validate_coin_id(coin_id).map_err(StoreError::Invalid)?;
        }
        let quantity = patch.quantity.unwrap_or(self.quantity);
        let purchase_price = patch.purchase_price.unwrap_or(self.purchase_price);
        validate_position(quantity, purchase_price).map_err(StoreError::Invalid)?;

        self.quantity = quantity;
        self.purchase_price = purchase_price;
        if let Some(date) = patch.purchase_date {
            self.purchase_date = date;
        }
        if let Some(coin_id) = patch.coin_id {
            self.coin_id = coin_id;
        }
        if let Some(coin_name) = patch.coin_name {
            self.coin_name = coin_name;
        }
        if let Some(symbol) = patch.symbol {
            self.symbol = symbol;
        }
        Ok(())
    }
}

/// In-memory record store keeping insertion order
pub struct MemoryStore<R: Record> {
    records: RwLock<Vec<R>>,
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    /// Creates a store seeded with existing records
    pub fn with_records(records: Vec<R>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Fetches one record by id
    pub async fn get(&self, id: &str) -> Option<R> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn list(&self) -> Result<Vec<R>, StoreError> {
        Ok(self.records.read().await.clone())
    }

    async fn create(&self, draft: R::Draft) -> Result<R, StoreError> {
        let record = R::from_draft(Uuid::new_v4().to_string(), draft)?;
        self.records.write().await.push(record.clone());
        tracing::debug!(id = record.id(), "Created record");
        Ok(record)
    }

    async fn update(&self, id: &str, patch: R::Patch) -> Result<R, StoreError> {
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut updated = slot.clone();
        updated.apply(patch)?;
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Memory store with injectable failures
    pub struct FlakyStore<R: Record> {
        pub inner: MemoryStore<R>,
        failing_updates: Mutex<HashSet<String>>,
        fail_list: AtomicBool,
        updates: AtomicUsize,
    }

    impl<R: Record> FlakyStore<R> {
        pub fn new(records: Vec<R>) -> Self {
            Self {
                inner: MemoryStore::with_records(records),
                failing_updates: Mutex::new(HashSet::new()),
                fail_list: AtomicBool::new(false),
                updates: AtomicUsize::new(0),
            }
        }

        pub fn fail_updates_for(&self, id: &str) {
            self.failing_updates.lock().unwrap().insert(id.to_string());
        }

        pub fn heal_updates_for(&self, id: &str) {
            self.failing_updates.lock().unwrap().remove(id);
        }

        pub fn set_fail_list(&self, fail: bool) {
            self.fail_list.store(fail, Ordering::SeqCst);
        }

        pub fn update_calls(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<R: Record> RecordStore<R> for FlakyStore<R> {
        async fn list(&self) -> Result<Vec<R>, StoreError> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("list failed".to_string()));
            }
            self.inner.list().await
        }

        async fn create(&self, draft: R::Draft) -> Result<R, StoreError> {
            self.inner.create(draft).await
        }

        async fn update(&self, id: &str, patch: R::Patch) -> Result<R, StoreError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.failing_updates.lock().unwrap().contains(id) {
                return Err(StoreError::Unavailable(format!("update of {} failed", id)));
            }
            self.inner.update(id, patch).await
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }
    }
}
