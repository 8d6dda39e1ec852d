use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common_money::{Currency, Money};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::collaborators::{Accounts, CartLine, CartSource, Catalog, CouponSource, Product};
use crate::coupon::{normalize_code, Coupon};
use crate::error::OrderError;
use crate::order::{Order, OrderRecord, OrderStatus, PaymentMethod, PaymentMirror, Pricing, ShippingAddress};
use crate::payment::{Payment, PaymentStatus};
use crate::returns::{ReturnReason, ReturnRequest, ReturnStatus};
use crate::snapshot::LineItem;
use crate::store::{Effects, Mutation, OrderStore, RecordKey, StoreError};
use crate::tracking::{Tracking, TrackingEvent, TrackingStatus};

/// PostgreSQL-backed order store and collaborator adapters.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    code: String,
    user_id: Uuid,
    currency: String,
    subtotal_minor: i64,
    discount_minor: i64,
    delivery_charge_minor: i64,
    final_total_minor: i64,
    coupon_code: Option<String>,
    status: String,
    payment_method: String,
    payment_status: String,
    ship_name: String,
    ship_phone: String,
    ship_address_line: String,
    ship_locality: String,
    ship_city: String,
    ship_state: String,
    ship_postal_code: String,
    ship_landmark: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    product_id: Uuid,
    product_name: String,
    unit_price_minor: i64,
    quantity: i32,
    return_window_days: i32,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    amount_minor: i64,
    method: String,
    status: String,
    gateway_order_ref: Option<String>,
    gateway_payment_ref: Option<String>,
    gateway_signature: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TrackingRow {
    code: String,
    status: String,
    estimated_delivery: Option<DateTime<Utc>>,
    carrier: String,
    last_updated: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    history: Json<Vec<TrackingEvent>>,
}

#[derive(sqlx::FromRow)]
struct ReturnRow {
    code: String,
    reason: String,
    reason_text: String,
    refund_amount_minor: i64,
    status: String,
    pickup_date: Option<NaiveDate>,
    rejection_reason: Option<String>,
    admin_notes: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    price_minor: i64,
    currency: String,
    return_window_days: Option<i32>,
    active: bool,
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    code: String,
    title: String,
    description: Option<String>,
    percent: i32,
    min_amount_minor: i64,
    max_discount_minor: i64,
    currency: String,
    valid_till: DateTime<Utc>,
    active: bool,
}

fn field<T>(value: &str, parse: fn(&str) -> Option<T>, what: &str) -> Result<T, StoreError> {
    parse(value).ok_or_else(|| StoreError::Corrupt(format!("{what} '{value}'")))
}

fn currency(value: &str) -> Result<Currency, StoreError> {
    value.parse().map_err(|_| StoreError::Corrupt(format!("currency '{value}'")))
}

fn unsigned(value: i32, what: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{what} {value}")))
}

fn signed(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

const ORDER_COLUMNS: &str = "id, code, user_id, currency, subtotal_minor, discount_minor, delivery_charge_minor, \
    final_total_minor, coupon_code, status, payment_method, payment_status, ship_name, ship_phone, ship_address_line, \
    ship_locality, ship_city, ship_state, ship_postal_code, ship_landmark, created_at, updated_at";

async fn load(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<OrderRecord>, StoreError> {
    let Some(row) = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let cur = currency(&row.currency)?;

    let items = sqlx::query_as::<_, LineItemRow>(
        "SELECT product_id, product_name, unit_price_minor, quantity, return_window_days
           FROM order_line_items WHERE order_id = $1 ORDER BY position",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|i| {
        let quantity = unsigned(i.quantity, "quantity")?;
        let window = unsigned(i.return_window_days, "return window")?;
        LineItem::new(i.product_id, i.product_name, Money::new(i.unit_price_minor, cur), quantity, window)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    })
    .collect::<Result<Vec<_>, StoreError>>()?;

    let p = sqlx::query_as::<_, PaymentRow>(
        "SELECT id, amount_minor, method, status, gateway_order_ref, gateway_payment_ref, gateway_signature,
                failure_reason, created_at, updated_at
           FROM payments WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;
    let payment = Payment {
        id: p.id,
        amount: Money::new(p.amount_minor, cur),
        method: field(&p.method, PaymentMethod::parse, "payment method")?,
        status: field(&p.status, PaymentStatus::parse, "payment status")?,
        gateway_order_ref: p.gateway_order_ref,
        gateway_payment_ref: p.gateway_payment_ref,
        gateway_signature: p.gateway_signature,
        failure_reason: p.failure_reason,
        created_at: p.created_at,
        updated_at: p.updated_at,
    };

    let t = sqlx::query_as::<_, TrackingRow>(
        "SELECT code, status, estimated_delivery, carrier, last_updated, delivered_at, history
           FROM order_tracking WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;
    let tracking = Tracking {
        code: t.code,
        status: field(&t.status, TrackingStatus::parse, "tracking status")?,
        estimated_delivery: t.estimated_delivery,
        carrier: t.carrier,
        last_updated: t.last_updated,
        delivered_at: t.delivered_at,
        history: t.history.0,
    };

    let return_request = sqlx::query_as::<_, ReturnRow>(
        "SELECT code, reason, reason_text, refund_amount_minor, status, pickup_date, rejection_reason, admin_notes,
                approved_at, completed_at, created_at, updated_at
           FROM return_requests WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .map(|r| -> Result<ReturnRequest, StoreError> {
        Ok(ReturnRequest {
            code: r.code,
            reason: field(&r.reason, ReturnReason::parse, "return reason")?,
            reason_text: r.reason_text,
            refund_amount: Money::new(r.refund_amount_minor, cur),
            status: field(&r.status, ReturnStatus::parse, "return status")?,
            pickup_date: r.pickup_date,
            rejection_reason: r.rejection_reason,
            admin_notes: r.admin_notes,
            approved_at: r.approved_at,
            completed_at: r.completed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    })
    .transpose()?;

    let order = Order {
        id: row.id,
        code: row.code,
        user_id: row.user_id,
        address: ShippingAddress {
            name: row.ship_name,
            phone: row.ship_phone,
            address_line: row.ship_address_line,
            locality: row.ship_locality,
            city: row.ship_city,
            state: row.ship_state,
            postal_code: row.ship_postal_code,
            landmark: row.ship_landmark,
        },
        items,
        pricing: Pricing {
            subtotal: Money::new(row.subtotal_minor, cur),
            discount: Money::new(row.discount_minor, cur),
            delivery_charge: Money::new(row.delivery_charge_minor, cur),
            final_total: Money::new(row.final_total_minor, cur),
        },
        coupon_code: row.coupon_code,
        status: field(&row.status, OrderStatus::parse, "order status")?,
        payment_method: field(&row.payment_method, PaymentMethod::parse, "payment method")?,
        payment_status: field(&row.payment_status, PaymentMirror::parse, "payment status")?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    };
    Ok(Some(OrderRecord { order, payment, tracking, return_request }))
}

async fn resolve(conn: &mut PgConnection, key: RecordKey<'_>, lock: bool) -> Result<Option<Uuid>, StoreError> {
    let suffix = if lock { " FOR UPDATE OF o" } else { "" };
    let (sql, value) = match key {
        RecordKey::OrderCode(code) => ("SELECT o.id FROM orders o WHERE o.code = $1", code),
        RecordKey::GatewayOrderRef(gref) => (
            "SELECT o.id FROM orders o JOIN payments p ON p.order_id = o.id WHERE p.gateway_order_ref = $1",
            gref,
        ),
        RecordKey::ReturnCode(rcode) => (
            "SELECT o.id FROM orders o JOIN return_requests r ON r.order_id = o.id WHERE r.code = $1",
            rcode,
        ),
    };
    let id = sqlx::query_scalar::<_, Uuid>(&format!("{sql}{suffix}"))
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

async fn record_sales(conn: &mut PgConnection, record: &OrderRecord) -> Result<(), StoreError> {
    for (product_id, qty) in record.sales() {
        sqlx::query("UPDATE products SET sales_count = sales_count + $2, last_sale_at = now() WHERE id = $1")
            .bind(product_id)
            .bind(i64::from(qty))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn write_back(conn: &mut PgConnection, record: &OrderRecord) -> Result<(), StoreError> {
    let order = &record.order;
    sqlx::query("UPDATE orders SET status = $2, payment_status = $3, updated_at = $4 WHERE id = $1")
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;

    let p = &record.payment;
    sqlx::query(
        "UPDATE payments
            SET status = $2, gateway_payment_ref = $3, gateway_signature = $4, failure_reason = $5, updated_at = $6
          WHERE order_id = $1",
    )
    .bind(order.id)
    .bind(p.status.as_str())
    .bind(p.gateway_payment_ref.as_deref())
    .bind(p.gateway_signature.as_deref())
    .bind(p.failure_reason.as_deref())
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;

    let t = &record.tracking;
    sqlx::query(
        "UPDATE order_tracking
            SET status = $2, estimated_delivery = $3, carrier = $4, last_updated = $5, delivered_at = $6, history = $7
          WHERE order_id = $1",
    )
    .bind(order.id)
    .bind(t.status.as_str())
    .bind(t.estimated_delivery)
    .bind(&t.carrier)
    .bind(t.last_updated)
    .bind(t.delivered_at)
    .bind(Json(&t.history))
    .execute(&mut *conn)
    .await
    .map_err(StoreError::from_sqlx)?;

    if let Some(r) = &record.return_request {
        sqlx::query(
            "INSERT INTO return_requests
                (order_id, code, reason, reason_text, refund_amount_minor, status, pickup_date, rejection_reason,
                 admin_notes, approved_at, completed_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (order_id) DO UPDATE
                SET status = EXCLUDED.status,
                    pickup_date = EXCLUDED.pickup_date,
                    rejection_reason = EXCLUDED.rejection_reason,
                    admin_notes = EXCLUDED.admin_notes,
                    approved_at = EXCLUDED.approved_at,
                    completed_at = EXCLUDED.completed_at,
                    updated_at = EXCLUDED.updated_at",
        )
        .bind(order.id)
        .bind(&r.code)
        .bind(r.reason.as_str())
        .bind(&r.reason_text)
        .bind(r.refund_amount.minor())
        .bind(r.status.as_str())
        .bind(r.pickup_date)
        .bind(r.rejection_reason.as_deref())
        .bind(r.admin_notes.as_deref())
        .bind(r.approved_at)
        .bind(r.completed_at)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_sqlx)?;
    }
    Ok(())
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, record: &OrderRecord, effects: Effects) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let o = &record.order;
        let a = &o.address;
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)"
        ))
        .bind(o.id)
        .bind(&o.code)
        .bind(o.user_id)
        .bind(o.pricing.currency().code())
        .bind(o.pricing.subtotal.minor())
        .bind(o.pricing.discount.minor())
        .bind(o.pricing.delivery_charge.minor())
        .bind(o.pricing.final_total.minor())
        .bind(o.coupon_code.as_deref())
        .bind(o.status.as_str())
        .bind(o.payment_method.as_str())
        .bind(o.payment_status.as_str())
        .bind(&a.name)
        .bind(&a.phone)
        .bind(&a.address_line)
        .bind(&a.locality)
        .bind(&a.city)
        .bind(&a.state)
        .bind(&a.postal_code)
        .bind(a.landmark.as_deref())
        .bind(o.created_at)
        .bind(o.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        for (position, item) in o.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_line_items
                    (order_id, position, product_id, product_name, unit_price_minor, quantity, return_window_days)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(o.id)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.unit_price.minor())
            .bind(signed(item.quantity))
            .bind(signed(item.return_window_days))
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        }

        let p = &record.payment;
        sqlx::query(
            "INSERT INTO payments
                (id, order_id, amount_minor, currency, method, status, gateway_order_ref, gateway_payment_ref,
                 gateway_signature, failure_reason, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(p.id)
        .bind(o.id)
        .bind(p.amount.minor())
        .bind(p.amount.currency().code())
        .bind(p.method.as_str())
        .bind(p.status.as_str())
        .bind(p.gateway_order_ref.as_deref())
        .bind(p.gateway_payment_ref.as_deref())
        .bind(p.gateway_signature.as_deref())
        .bind(p.failure_reason.as_deref())
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        let t = &record.tracking;
        sqlx::query(
            "INSERT INTO order_tracking
                (order_id, code, status, estimated_delivery, carrier, last_updated, delivered_at, history)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(o.id)
        .bind(&t.code)
        .bind(t.status.as_str())
        .bind(t.estimated_delivery)
        .bind(&t.carrier)
        .bind(t.last_updated)
        .bind(t.delivered_at)
        .bind(Json(&t.history))
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        if effects.record_sales {
            record_sales(&mut tx, record).await?;
        }
        tx.commit().await?;
        debug!(order_code = %o.code, "order inserted");
        Ok(())
    }

    async fn find(&self, key: RecordKey<'_>) -> Result<Option<OrderRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        match resolve(&mut conn, key, false).await? {
            Some(id) => load(&mut conn, id).await,
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM orders WHERE user_id = $1 ORDER BY created_at DESC, code DESC")
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = load(&mut conn, id).await? {
                out.push(record);
            }
        }
        Ok(out)
    }

    async fn mutate(&self, key: RecordKey<'_>, mutation: Mutation<'_>) -> Result<Option<OrderRecord>, OrderError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let Some(id) = resolve(&mut tx, key, true).await? else { return Ok(None) };
        let Some(current) = load(&mut tx, id).await? else { return Ok(None) };
        let mut working = current.clone();
        // On error the transaction is dropped, which rolls it back.
        let effects = mutation(&mut working)?;
        if working != current {
            write_back(&mut tx, &working).await?;
            if effects.record_sales {
                record_sales(&mut tx, &working).await?;
            }
        }
        tx.commit().await.map_err(StoreError::from)?;
        Ok(Some(working))
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, price_minor, currency, return_window_days, active FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| -> Result<Product, StoreError> {
            Ok(Product {
                id: r.id,
                name: r.name,
                price: Money::new(r.price_minor, currency(&r.currency)?),
                return_window_days: r.return_window_days.map(|d| unsigned(d, "return window")).transpose()?,
                active: r.active,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl Accounts for PgStore {
    async fn account_age_days(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<i64>, StoreError> {
        let created = sqlx::query_scalar::<_, DateTime<Utc>>("SELECT created_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(created.map(|c| (now - c).num_days()))
    }
}

#[async_trait]
impl CartSource for PgStore {
    async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, i32)>(
            "SELECT product_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY added_at, product_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(product_id, quantity)| CartLine { product_id, quantity }).collect())
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(())
    }
}

fn coupon_from_row(r: CouponRow) -> Result<Coupon, StoreError> {
    let cur = currency(&r.currency)?;
    Ok(Coupon {
        code: r.code,
        title: r.title,
        description: r.description,
        percent: unsigned(r.percent, "coupon percent")?,
        min_amount: Money::new(r.min_amount_minor, cur),
        max_discount: Money::new(r.max_discount_minor, cur),
        valid_till: r.valid_till,
        active: r.active,
    })
}

const COUPON_COLUMNS: &str = "code, title, description, percent, min_amount_minor, max_discount_minor, currency, valid_till, active";

#[async_trait]
impl CouponSource for PgStore {
    async fn find(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE upper(code) = $1"))
            .bind(normalize_code(code))
            .fetch_optional(&self.pool)
            .await?;
        row.map(coupon_from_row).transpose()
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>, StoreError> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE active AND valid_till >= $1 ORDER BY valid_till, code"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(coupon_from_row).collect()
    }
}
