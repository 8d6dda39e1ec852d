//! Response bodies. Storage shapes never leave the service directly; every route answers
//! with one of these.

pub mod v1 {
    use chrono::{DateTime, NaiveDate, Utc};
    use common_money::{Currency, Money};
    use serde::Serialize;

    use crate::coupon::{Coupon, CouponApplication};
    use crate::delivery::{ChargeBasis, DeliveryQuote};
    use crate::invoice::{Invoice, TaxSplit};
    use crate::order::{OrderRecord, ShippingAddress};
    use crate::payment::{CallbackDisposition, Payment};
    use crate::returns::ReturnRequest;
    use crate::service::{CallbackOutcome, CheckoutReceipt, FailureOutcome, Serviceability, TrackingOutcome};
    use crate::tracking::{TimelineStep, Tracking};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct MoneyView {
        /// Decimal amount in major units, e.g. "1100.00".
        pub amount: String,
        pub minor: i64,
        pub currency: Currency,
    }

    impl From<Money> for MoneyView {
        fn from(m: Money) -> Self {
            Self { amount: m.to_decimal().to_string(), minor: m.minor(), currency: m.currency() }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct LineItemView {
        pub product_id: uuid::Uuid,
        pub product_name: String,
        pub unit_price: MoneyView,
        pub quantity: u32,
        pub line_total: MoneyView,
        pub return_window_days: u32,
    }

    #[derive(Debug, Serialize)]
    pub struct PricingView {
        pub subtotal: MoneyView,
        pub discount: MoneyView,
        pub delivery_charge: MoneyView,
        pub final_total: MoneyView,
    }

    #[derive(Debug, Serialize)]
    pub struct PaymentView {
        pub method: &'static str,
        pub status: &'static str,
        pub amount: MoneyView,
        pub gateway_order_ref: Option<String>,
        pub gateway_payment_ref: Option<String>,
        pub failure_reason: Option<String>,
        pub updated_at: DateTime<Utc>,
    }

    impl From<&Payment> for PaymentView {
        fn from(p: &Payment) -> Self {
            Self {
                method: p.method.as_str(),
                status: p.status.as_str(),
                amount: p.amount.into(),
                gateway_order_ref: p.gateway_order_ref.clone(),
                gateway_payment_ref: p.gateway_payment_ref.clone(),
                failure_reason: p.failure_reason.clone(),
                updated_at: p.updated_at,
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct TrackingView {
        pub tracking_code: String,
        pub status: &'static str,
        pub carrier: String,
        pub estimated_delivery: Option<DateTime<Utc>>,
        pub last_updated: DateTime<Utc>,
        pub delivered_at: Option<DateTime<Utc>>,
    }

    impl From<&Tracking> for TrackingView {
        fn from(t: &Tracking) -> Self {
            Self {
                tracking_code: t.code.clone(),
                status: t.status.as_str(),
                carrier: t.carrier.clone(),
                estimated_delivery: t.estimated_delivery,
                last_updated: t.last_updated,
                delivered_at: t.delivered_at,
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct ReturnView {
        pub return_code: String,
        pub order_code: String,
        pub status: &'static str,
        pub reason: &'static str,
        pub reason_text: String,
        pub refund_amount: MoneyView,
        pub pickup_date: Option<NaiveDate>,
        pub rejection_reason: Option<String>,
        pub admin_notes: Option<String>,
        pub approved_at: Option<DateTime<Utc>>,
        pub completed_at: Option<DateTime<Utc>>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl ReturnView {
        pub fn new(order_code: &str, r: &ReturnRequest) -> Self {
            Self {
                return_code: r.code.clone(),
                order_code: order_code.to_string(),
                status: r.status.as_str(),
                reason: r.reason.as_str(),
                reason_text: r.reason_text.clone(),
                refund_amount: r.refund_amount.into(),
                pickup_date: r.pickup_date,
                rejection_reason: r.rejection_reason.clone(),
                admin_notes: r.admin_notes.clone(),
                approved_at: r.approved_at,
                completed_at: r.completed_at,
                created_at: r.created_at,
                updated_at: r.updated_at,
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct OrderView {
        pub order_code: String,
        pub status: &'static str,
        pub payment_method: &'static str,
        pub payment_status: &'static str,
        pub address: ShippingAddress,
        pub items: Vec<LineItemView>,
        pub pricing: PricingView,
        pub coupon_code: Option<String>,
        pub payment: PaymentView,
        pub tracking: TrackingView,
        pub return_request: Option<ReturnView>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl From<&OrderRecord> for OrderView {
        fn from(record: &OrderRecord) -> Self {
            let o = &record.order;
            Self {
                order_code: o.code.clone(),
                status: o.status.as_str(),
                payment_method: o.payment_method.as_str(),
                payment_status: o.payment_status.as_str(),
                address: o.address.clone(),
                items: o
                    .items
                    .iter()
                    .map(|i| LineItemView {
                        product_id: i.product_id,
                        product_name: i.product_name.clone(),
                        unit_price: i.unit_price.into(),
                        quantity: i.quantity,
                        line_total: i.line_total.into(),
                        return_window_days: i.return_window_days,
                    })
                    .collect(),
                pricing: PricingView {
                    subtotal: o.pricing.subtotal.into(),
                    discount: o.pricing.discount.into(),
                    delivery_charge: o.pricing.delivery_charge.into(),
                    final_total: o.pricing.final_total.into(),
                },
                coupon_code: o.coupon_code.clone(),
                payment: (&record.payment).into(),
                tracking: (&record.tracking).into(),
                return_request: record.return_request.as_ref().map(|r| ReturnView::new(&o.code, r)),
                created_at: o.created_at,
                updated_at: o.updated_at,
            }
        }
    }

    /// One row of the order history list.
    #[derive(Debug, Serialize)]
    pub struct OrderSummary {
        pub order_code: String,
        pub status: &'static str,
        pub payment_status: &'static str,
        pub tracking_status: &'static str,
        pub item_count: usize,
        pub final_total: MoneyView,
        pub created_at: DateTime<Utc>,
    }

    impl From<&OrderRecord> for OrderSummary {
        fn from(record: &OrderRecord) -> Self {
            Self {
                order_code: record.order.code.clone(),
                status: record.order.status.as_str(),
                payment_status: record.order.payment_status.as_str(),
                tracking_status: record.tracking.status.as_str(),
                item_count: record.order.items.len(),
                final_total: record.order.pricing.final_total.into(),
                created_at: record.order.created_at,
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct GatewayView {
        pub gateway_order_ref: String,
        pub amount: MoneyView,
        pub key_id: Option<String>,
    }

    #[derive(Debug, Serialize)]
    pub struct CheckoutView {
        pub order: OrderView,
        pub gateway: Option<GatewayView>,
    }

    impl From<&CheckoutReceipt> for CheckoutView {
        fn from(receipt: &CheckoutReceipt) -> Self {
            Self {
                order: (&receipt.record).into(),
                gateway: receipt.gateway.as_ref().map(|g| GatewayView {
                    gateway_order_ref: g.gateway_order_ref.clone(),
                    amount: g.amount.into(),
                    key_id: g.key_id.clone(),
                }),
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct CallbackView {
        pub order_code: String,
        pub disposition: CallbackDisposition,
        pub applied: bool,
        pub refund_owed: Option<MoneyView>,
    }

    impl From<&CallbackOutcome> for CallbackView {
        fn from(o: &CallbackOutcome) -> Self {
            Self {
                order_code: o.order_code.clone(),
                disposition: o.disposition,
                applied: o.applied,
                refund_owed: o.refund_owed.map(Into::into),
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct FailureView {
        pub order_code: String,
        pub applied: bool,
    }

    impl From<&FailureOutcome> for FailureView {
        fn from(o: &FailureOutcome) -> Self { Self { order_code: o.order_code.clone(), applied: o.applied } }
    }

    #[derive(Debug, Serialize)]
    pub struct TrackingChangeView {
        pub order_code: String,
        pub from: &'static str,
        pub status: &'static str,
        pub order_status: &'static str,
        pub payment_status: &'static str,
        pub refund_owed: Option<MoneyView>,
        pub tracking: TrackingView,
    }

    impl From<&TrackingOutcome> for TrackingChangeView {
        fn from(o: &TrackingOutcome) -> Self {
            Self {
                order_code: o.record.order.code.clone(),
                from: o.change.from.as_str(),
                status: o.change.to.as_str(),
                order_status: o.record.order.status.as_str(),
                payment_status: o.record.payment.status.as_str(),
                refund_owed: o.change.refund_owed.map(Into::into),
                tracking: (&o.record.tracking).into(),
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct TimelineStepView {
        pub status: &'static str,
        pub description: &'static str,
        pub completed: bool,
        pub at: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Serialize)]
    pub struct TimelineView {
        pub order_code: String,
        pub cancelled: bool,
        pub tracking: TrackingView,
        pub steps: Vec<TimelineStepView>,
    }

    impl TimelineView {
        pub fn new(record: &OrderRecord, steps: &[TimelineStep]) -> Self {
            Self {
                order_code: record.order.code.clone(),
                cancelled: record.tracking.status == crate::tracking::TrackingStatus::Cancelled,
                tracking: (&record.tracking).into(),
                steps: steps
                    .iter()
                    .map(|s| TimelineStepView {
                        status: s.status.as_str(),
                        description: s.status.description(),
                        completed: s.completed,
                        at: s.at,
                    })
                    .collect(),
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct CouponView {
        pub code: String,
        pub title: String,
        pub description: Option<String>,
        pub percent: u32,
        pub min_amount: MoneyView,
        pub max_discount: MoneyView,
        pub valid_till: DateTime<Utc>,
    }

    impl From<&Coupon> for CouponView {
        fn from(c: &Coupon) -> Self {
            Self {
                code: c.code.clone(),
                title: c.title.clone(),
                description: c.description.clone(),
                percent: c.percent,
                min_amount: c.min_amount.into(),
                max_discount: c.max_discount.into(),
                valid_till: c.valid_till,
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct CouponApplicationView {
        pub code: String,
        pub discount: MoneyView,
        pub final_amount: MoneyView,
    }

    impl From<&CouponApplication> for CouponApplicationView {
        fn from(a: &CouponApplication) -> Self {
            Self { code: a.code.clone(), discount: a.discount.into(), final_amount: a.final_amount.into() }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct DeliveryQuoteView {
        pub charge: MoneyView,
        pub free: bool,
        pub estimated_days: u32,
        pub metro: bool,
        pub basis: ChargeBasis,
    }

    impl From<&DeliveryQuote> for DeliveryQuoteView {
        fn from(q: &DeliveryQuote) -> Self {
            Self { charge: q.charge.into(), free: q.charge.is_zero(), estimated_days: q.estimated_days, metro: q.metro, basis: q.basis }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct ServiceabilityView {
        pub postal_code: String,
        pub serviceable: bool,
        pub metro: bool,
        pub estimated_days: Option<u32>,
    }

    impl ServiceabilityView {
        pub fn new(postal_code: &str, s: Serviceability) -> Self {
            Self {
                postal_code: postal_code.trim().to_string(),
                serviceable: s.serviceable,
                metro: s.metro,
                estimated_days: s.estimated_days,
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct TaxView {
        pub taxable: MoneyView,
        pub cgst: MoneyView,
        pub sgst: MoneyView,
    }

    impl From<&TaxSplit> for TaxView {
        fn from(t: &TaxSplit) -> Self { Self { taxable: t.taxable.into(), cgst: t.cgst.into(), sgst: t.sgst.into() } }
    }

    #[derive(Debug, Serialize)]
    pub struct InvoiceLineView {
        pub product_name: String,
        pub quantity: u32,
        pub unit_price: MoneyView,
        pub gross: MoneyView,
        pub tax: TaxView,
    }

    #[derive(Debug, Serialize)]
    pub struct InvoiceView {
        pub invoice_number: String,
        pub order_code: String,
        pub issued_at: DateTime<Utc>,
        pub billed_to: ShippingAddress,
        pub lines: Vec<InvoiceLineView>,
        pub subtotal: MoneyView,
        pub discount: MoneyView,
        pub delivery_charge: MoneyView,
        pub tax: TaxView,
        pub total: MoneyView,
    }

    impl From<&Invoice> for InvoiceView {
        fn from(inv: &Invoice) -> Self {
            Self {
                invoice_number: inv.number.clone(),
                order_code: inv.order_code.clone(),
                issued_at: inv.issued_at,
                billed_to: inv.billed_to.clone(),
                lines: inv
                    .lines
                    .iter()
                    .map(|l| InvoiceLineView {
                        product_name: l.product_name.clone(),
                        quantity: l.quantity,
                        unit_price: l.unit_price.into(),
                        gross: l.gross.into(),
                        tax: (&l.tax).into(),
                    })
                    .collect(),
                subtotal: inv.subtotal.into(),
                discount: inv.discount.into(),
                delivery_charge: inv.delivery_charge.into(),
                tax: (&inv.tax).into(),
                total: inv.total.into(),
            }
        }
    }

}
