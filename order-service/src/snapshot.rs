use common_money::{Currency, Money, MoneyError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::{CartLine, Catalog};
use crate::error::OrderError;

/// A purchased line, priced at the moment of checkout and never re-priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub return_window_days: u32,
    pub line_total: Money,
}

impl LineItem {
    pub fn new(
        product_id: Uuid,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
        return_window_days: u32,
    ) -> Result<Self, MoneyError> {
        let line_total = unit_price.times(quantity)?;
        Ok(Self { product_id, product_name: product_name.into(), unit_price, quantity, return_window_days, line_total })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    pub items: Vec<LineItem>,
    pub subtotal: Money,
}

impl CartSnapshot {
    pub fn from_items(currency: Currency, items: Vec<LineItem>) -> Result<Self, MoneyError> {
        let subtotal = Money::sum(currency, items.iter().map(|i| i.line_total))?;
        Ok(Self { items, subtotal })
    }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

/// Resolve each cart line against the catalog, in cart order. Any unresolvable product
/// aborts the whole snapshot; nothing is written.
pub async fn build_snapshot(
    lines: &[CartLine],
    catalog: &dyn Catalog,
    currency: Currency,
    default_return_window_days: u32,
) -> Result<CartSnapshot, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyCart);
    }
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let quantity = u32::try_from(line.quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or(OrderError::InvalidQuantity { product_id: line.product_id, quantity: line.quantity })?;
        let product = catalog
            .get_product(line.product_id)
            .await?
            .filter(|p| p.active)
            .ok_or(OrderError::ProductUnavailable(line.product_id))?;
        if product.price.currency() != currency {
            return Err(MoneyError::CurrencyMismatch { left: currency, right: product.price.currency() }.into());
        }
        let window = product.return_window_days.unwrap_or(default_return_window_days);
        items.push(LineItem::new(product.id, product.name, product.price, quantity, window)?);
    }
    Ok(CartSnapshot::from_items(currency, items)?)
}
