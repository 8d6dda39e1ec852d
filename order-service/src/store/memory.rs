//! In-process adapters. A single `tokio::sync::Mutex` serialises every order mutation, which
//! gives the same read-lock-write contract as the row locks of the Postgres store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::collaborators::{Accounts, CartLine, CartSource, Catalog, CouponSource, Product};
use crate::coupon::{live_coupons, normalize_code, Coupon};
use crate::error::OrderError;
use crate::order::OrderRecord;
use crate::store::{Effects, Mutation, OrderStore, RecordKey, StoreError};

#[derive(Default)]
struct State {
    orders: HashMap<String, OrderRecord>,
    sales: HashMap<Uuid, u64>,
}

impl State {
    fn code_for(&self, key: RecordKey<'_>) -> Option<String> {
        match key {
            RecordKey::OrderCode(code) => self.orders.contains_key(code).then(|| code.to_string()),
            RecordKey::GatewayOrderRef(gref) => self
                .orders
                .values()
                .find(|r| r.payment.gateway_order_ref.as_deref() == Some(gref))
                .map(|r| r.order.code.clone()),
            RecordKey::ReturnCode(rcode) => self
                .orders
                .values()
                .find(|r| r.return_request.as_ref().is_some_and(|rr| rr.code == rcode))
                .map(|r| r.order.code.clone()),
        }
    }

    /// The constraint `candidate` would violate against every other stored record.
    fn collision(&self, candidate: &OrderRecord) -> Option<&'static str> {
        for other in self.orders.values().filter(|o| o.order.id != candidate.order.id) {
            if other.order.code == candidate.order.code {
                return Some("orders_code_key");
            }
            if other.tracking.code == candidate.tracking.code {
                return Some("order_tracking_code_key");
            }
            if other.payment.id == candidate.payment.id {
                return Some("payments_pkey");
            }
            if candidate.payment.gateway_order_ref.is_some() && other.payment.gateway_order_ref == candidate.payment.gateway_order_ref {
                return Some("payments_gateway_order_ref_key");
            }
            if let (Some(a), Some(b)) = (&other.return_request, &candidate.return_request) {
                if a.code == b.code {
                    return Some("return_requests_code_key");
                }
            }
        }
        None
    }

    fn apply(&mut self, record: &OrderRecord, effects: Effects) {
        if effects.record_sales {
            for (product_id, qty) in record.sales() {
                *self.sales.entry(product_id).or_default() += u64::from(qty);
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Units sold for `product_id` across confirmed orders.
    pub async fn sales_count(&self, product_id: Uuid) -> u64 {
        self.state.lock().await.sales.get(&product_id).copied().unwrap_or(0)
    }

    pub async fn order_count(&self) -> usize { self.state.lock().await.orders.len() }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, record: &OrderRecord, effects: Effects) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.orders.values().any(|o| o.order.id == record.order.id) {
            return Err(StoreError::Conflict("orders_pkey".into()));
        }
        if let Some(constraint) = state.collision(record) {
            return Err(StoreError::Conflict(constraint.into()));
        }
        state.apply(record, effects);
        state.orders.insert(record.order.code.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, key: RecordKey<'_>) -> Result<Option<OrderRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.code_for(key).and_then(|code| state.orders.get(&code).cloned()))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut list: Vec<OrderRecord> = state.orders.values().filter(|r| r.order.user_id == user_id).cloned().collect();
        list.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at).then_with(|| b.order.code.cmp(&a.order.code)));
        Ok(list)
    }

    async fn mutate(&self, key: RecordKey<'_>, mutation: Mutation<'_>) -> Result<Option<OrderRecord>, OrderError> {
        let mut state = self.state.lock().await;
        let Some(code) = state.code_for(key) else { return Ok(None) };
        let Some(current) = state.orders.get(&code) else { return Ok(None) };
        let mut working = current.clone();
        let effects = mutation(&mut working)?;
        if &working == current {
            return Ok(Some(working));
        }
        if let Some(constraint) = state.collision(&working) {
            return Err(StoreError::Conflict(constraint.into()).into());
        }
        state.apply(&working, effects);
        state.orders.insert(code, working.clone());
        Ok(Some(working))
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    products: RwLock<HashMap<Uuid, Product>>,
}

impl MemoryCatalog {
    pub async fn upsert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.products.read().await.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryAccounts {
    created: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl MemoryAccounts {
    pub async fn register(&self, user_id: Uuid, created_at: DateTime<Utc>) {
        self.created.write().await.insert(user_id, created_at);
    }
}

#[async_trait]
impl Accounts for MemoryAccounts {
    async fn account_age_days(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<i64>, StoreError> {
        Ok(self.created.read().await.get(&user_id).map(|created| (now - *created).num_days()))
    }
}

#[derive(Default)]
pub struct MemoryCarts {
    carts: RwLock<HashMap<Uuid, Vec<CartLine>>>,
}

impl MemoryCarts {
    /// Add to the user's cart; an existing line for the product has its quantity increased.
    pub async fn add(&self, user_id: Uuid, product_id: Uuid, quantity: i32) {
        let mut carts = self.carts.write().await;
        let lines = carts.entry(user_id).or_default();
        match lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity += quantity,
            None => lines.push(CartLine { product_id, quantity }),
        }
    }
}

#[async_trait]
impl CartSource for MemoryCarts {
    async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, StoreError> {
        Ok(self.carts.read().await.get(&user_id).cloned().unwrap_or_default())
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.carts.write().await.remove(&user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCoupons {
    coupons: RwLock<HashMap<String, Coupon>>,
}

impl MemoryCoupons {
    pub async fn upsert(&self, mut coupon: Coupon) {
        coupon.code = normalize_code(&coupon.code);
        self.coupons.write().await.insert(coupon.code.clone(), coupon);
    }
}

#[async_trait]
impl CouponSource for MemoryCoupons {
    async fn find(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self.coupons.read().await.get(&normalize_code(code)).cloned())
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>, StoreError> {
        let all: Vec<Coupon> = self.coupons.read().await.values().cloned().collect();
        Ok(live_coupons(all, now))
    }
}

/// Every in-memory adapter, shared so callers can seed data and inspect results.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub accounts: Arc<MemoryAccounts>,
    pub carts: Arc<MemoryCarts>,
    pub coupons: Arc<MemoryCoupons>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }
}
