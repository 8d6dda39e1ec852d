use chrono::{DateTime, Utc};
use common_money::{Money, MoneyError};

use crate::order::{Order, ShippingAddress};

/// GST rate, in percent, included in every charged amount.
pub const GST_PERCENT: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxSplit {
    pub taxable: Money,
    pub cgst: Money,
    pub sgst: Money,
}

/// Split a GST-inclusive amount into its taxable value and the two equal halves of GST.
/// The parts always add back up to `gross`.
pub fn split_inclusive(gross: Money) -> Result<TaxSplit, MoneyError> {
    let taxable = gross.ratio_floor(100, 100 + GST_PERCENT)?;
    let gst = gross.checked_sub(taxable)?;
    let cgst = gst.ratio_floor(1, 2)?;
    let sgst = gst.checked_sub(cgst)?;
    Ok(TaxSplit { taxable, cgst, sgst })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLine {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub gross: Money,
    pub tax: TaxSplit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub number: String,
    pub order_code: String,
    pub issued_at: DateTime<Utc>,
    pub billed_to: ShippingAddress,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub delivery_charge: Money,
    /// Breakdown of the amount actually charged.
    pub tax: TaxSplit,
    pub total: Money,
}

pub fn build_invoice(order: &Order) -> Result<Invoice, MoneyError> {
    let lines = order
        .items
        .iter()
        .map(|item| {
            Ok(InvoiceLine {
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                gross: item.line_total,
                tax: split_inclusive(item.line_total)?,
            })
        })
        .collect::<Result<Vec<_>, MoneyError>>()?;
    let p = &order.pricing;
    Ok(Invoice {
        number: format!("INV-{}", order.code),
        order_code: order.code.clone(),
        issued_at: order.created_at,
        billed_to: order.address.clone(),
        lines,
        subtotal: p.subtotal,
        discount: p.discount,
        delivery_charge: p.delivery_charge,
        tax: split_inclusive(p.final_total)?,
        total: p.final_total,
    })
}
