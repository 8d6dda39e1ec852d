use common_money::{Currency, Money};
use proptest::prelude::*;

proptest! {
    // Floor never overshoots the exact rational value and is off by less than one minor unit.
    #[test]
    fn percent_floor_is_within_one_unit(minor in 0i64..10_000_000_000, percent in 0u32..=100) {
        let got = Money::new(minor, Currency::Inr).percent_floor(percent).unwrap().minor();
        let exact_times_100 = i128::from(minor) * i128::from(percent);
        prop_assert!(i128::from(got) * 100 <= exact_times_100);
        prop_assert!(exact_times_100 - i128::from(got) * 100 < 100);
    }

    #[test]
    fn add_then_sub_restores(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
        let x = Money::new(a, Currency::Usd);
        let y = Money::new(b, Currency::Usd);
        prop_assert_eq!(x.checked_add(y).unwrap().checked_sub(y).unwrap(), x);
    }

    #[test]
    fn sum_matches_integer_sum(values in proptest::collection::vec(0i64..1_000_000, 0..50)) {
        let total = Money::sum(Currency::Inr, values.iter().map(|v| Money::new(*v, Currency::Inr))).unwrap();
        prop_assert_eq!(total.minor(), values.iter().sum::<i64>());
    }

    // Rendering then parsing a decimal is lossless at the currency's exponent.
    #[test]
    fn decimal_rendering_is_exact(minor in -1_000_000_000i64..1_000_000_000) {
        let m = Money::new(minor, Currency::Inr);
        let back = Money::parse_decimal(&m.to_decimal().to_string(), Currency::Inr).unwrap();
        prop_assert_eq!(back, m);
    }
}

#[test]
fn overflow_is_reported_not_wrapped() {
    let big = Money::new(i64::MAX, Currency::Inr);
    assert!(big.checked_add(Money::new(1, Currency::Inr)).is_err());
    assert!(big.times(2).is_err());
}
