use chrono::{Duration, TimeZone, Utc};
use common_money::{Currency, Money};
use order_service::coupon::Coupon;
use order_service::delivery::{ChargeBasis, DeliveryPolicy};
use order_service::order::Pricing;
use proptest::prelude::*;

fn inr(minor: i64) -> Money { Money::new(minor, Currency::Inr) }

fn coupon(percent: u32, min_minor: i64, max_minor: i64) -> Coupon {
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    Coupon {
        code: "ANY".into(),
        title: "any".into(),
        description: None,
        percent,
        min_amount: inr(min_minor),
        max_discount: inr(max_minor),
        valid_till: now + Duration::days(1),
        active: true,
    }
}

proptest! {
    #[test]
    fn coupon_discount_is_bounded_by_cap_and_total(
        percent in 0u32..=100,
        cart in 0i64..100_000_000,
        min in 0i64..100_000_000,
        cap in 0i64..100_000_000,
    ) {
        let c = coupon(percent, min, cap);
        let now = c.valid_till - Duration::hours(1);
        match c.apply(inr(cart), now) {
            Ok(applied) => {
                prop_assert!(cart >= min);
                prop_assert!(!applied.discount.is_negative());
                prop_assert!(applied.discount.minor() <= cap);
                prop_assert!(applied.discount.minor() <= cart);
                prop_assert_eq!(applied.final_amount.minor(), cart - applied.discount.minor());
            }
            Err(_) => prop_assert!(cart < min),
        }
    }

    #[test]
    fn final_total_is_subtotal_less_discount_plus_delivery(
        subtotal in 0i64..100_000_000,
        discount in 0i64..100_000_000,
        delivery in 0i64..1_000_000,
    ) {
        let p = Pricing::compute(inr(subtotal), inr(discount), inr(delivery)).unwrap();
        prop_assert!(p.discount.minor() <= subtotal);
        prop_assert!(!p.final_total.is_negative());
        prop_assert_eq!(
            p.final_total.minor(),
            p.subtotal.minor() - p.discount.minor() + p.delivery_charge.minor()
        );
    }

    #[test]
    fn delivery_is_free_above_threshold_or_for_new_accounts(
        subtotal in 0i64..10_000_000,
        age_days in 0i64..400,
        postal_code in "[0-9]{6}",
    ) {
        let policy = DeliveryPolicy::standard(Currency::Inr).unwrap();
        let q = policy.quote(inr(subtotal), &postal_code, age_days).unwrap();
        if subtotal >= policy.free_threshold.minor() || age_days <= policy.new_account_days {
            prop_assert!(q.charge.is_zero());
        } else {
            let expected = if q.metro { policy.metro_fee } else { policy.standard_fee };
            prop_assert_eq!(q.charge, expected);
            prop_assert!(matches!(q.basis, ChargeBasis::Metro | ChargeBasis::Standard));
        }
    }
}
