use chrono::{DateTime, Utc};
use common_money::{Money, MoneyError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coupon {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub percent: u32,
    pub min_amount: Money,
    pub max_discount: Money,
    pub valid_till: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponApplication {
    pub code: String,
    pub discount: Money,
    pub final_amount: Money,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CouponError {
    #[error("coupon is invalid or expired")]
    Invalid,
    #[error("cart total is below the minimum of {minimum}")]
    BelowMinimum { minimum: Money },
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Coupon codes are stored and compared upper-case, without surrounding whitespace.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

impl Coupon {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.valid_till >= now
    }

    /// Price the coupon against `cart_total`. Pure: the same inputs always give the same result.
    pub fn apply(&self, cart_total: Money, now: DateTime<Utc>) -> Result<CouponApplication, CouponError> {
        if !self.is_live(now) {
            return Err(CouponError::Invalid);
        }
        if cart_total.checked_sub(self.min_amount)?.is_negative() {
            return Err(CouponError::BelowMinimum { minimum: self.min_amount });
        }
        let raw = cart_total.percent_floor(self.percent)?;
        let discount = raw.min(self.max_discount)?.min(cart_total)?.clamp_non_negative();
        let final_amount = cart_total.checked_sub(discount)?;
        Ok(CouponApplication { code: self.code.clone(), discount, final_amount })
    }
}

/// Active, unexpired coupons, soonest expiry first.
pub fn live_coupons(coupons: impl IntoIterator<Item = Coupon>, now: DateTime<Utc>) -> Vec<Coupon> {
    let mut live: Vec<Coupon> = coupons.into_iter().filter(|c| c.is_live(now)).collect();
    live.sort_by(|a, b| a.valid_till.cmp(&b.valid_till).then_with(|| a.code.cmp(&b.code)));
    live
}
