use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use rental_api::entities::promotion::{self, PromotionType};
use rental_api::entities::rental_order::RentalOrderStatus;
use rental_api::services::pricing;

fn promo(promotion_type: PromotionType, value: Decimal, cap: Option<Decimal>) -> promotion::Model {
    let now = Utc::now();
    promotion::Model {
        id: Uuid::new_v4(),
        code: "PROP".into(),
        description: None,
        promotion_type,
        value,
        min_amount: None,
        max_discount: cap,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(1),
        usage_limit: None,
        usage_count: 0,
        is_active: true,
        created_at: now,
        updated_at: None,
    }
}

fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

proptest! {
    // total = sub - discount and every amount stays in range, whatever
    // the promotion shape.
    #[test]
    fn breakdown_amounts_are_consistent(
        rate_cents in 1i64..=100_000_000,
        days in 0i64..=120,
        pct in 0i64..=100,
        cap_cents in proptest::option::of(0i64..=50_000_000),
        fixed in any::<bool>(),
    ) {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let end = start + Duration::days(days);
        let rate = money(rate_cents);

        let p = if fixed {
            promo(PromotionType::FixedAmount, cap_cents.map(money).unwrap_or(money(pct * 1000)), None)
        } else {
            promo(PromotionType::Percentage, Decimal::from(pct), cap_cents.map(money))
        };

        let sub = pricing::sub_total(rate, pricing::total_days(start, end).unwrap()).unwrap();
        let discount = pricing::discount_for(&p, sub);
        prop_assert!(discount >= Decimal::ZERO);
        prop_assert!(discount <= sub);

        let quote = pricing::breakdown(rate, start, end, discount).unwrap();
        prop_assert_eq!(quote.sub_total, sub);
        prop_assert_eq!(quote.sub_total - quote.discount_amount, quote.total_amount);
        prop_assert!(quote.total_amount >= Decimal::ZERO);
        prop_assert!(quote.total_amount <= quote.sub_total);
        prop_assert!(quote.total_days >= 1);
        // Two-decimal money after the final rounding step.
        prop_assert_eq!(quote.total_amount, quote.total_amount.round_dp(2));
    }

    #[test]
    fn billable_days_match_calendar_distance(days in 0i64..=3650) {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 23, 30, 0).unwrap();
        let end = start + Duration::days(days);
        let billed = pricing::total_days(start, end).unwrap();
        prop_assert_eq!(i64::from(billed), days.max(1));
    }

    #[test]
    fn reversed_ranges_never_price(days in 1i64..=3650) {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
        prop_assert!(pricing::total_days(start, start - Duration::days(days)).is_err());
    }

    #[test]
    fn percentage_discount_never_exceeds_its_cap(
        sub_cents in 1i64..=1_000_000_000,
        pct in 1i64..=100,
        cap_cents in 0i64..=10_000_000,
    ) {
        let p = promo(PromotionType::Percentage, Decimal::from(pct), Some(money(cap_cents)));
        let discount = pricing::discount_for(&p, money(sub_cents));
        prop_assert!(discount <= money(cap_cents));
    }
}

const ALL_STATUSES: [RentalOrderStatus; 6] = [
    RentalOrderStatus::Draft,
    RentalOrderStatus::Confirmed,
    RentalOrderStatus::InProgress,
    RentalOrderStatus::Completed,
    RentalOrderStatus::Invoiced,
    RentalOrderStatus::Cancelled,
];

#[test]
fn terminal_states_admit_no_transitions() {
    for terminal in [RentalOrderStatus::Invoiced, RentalOrderStatus::Cancelled] {
        assert!(terminal.is_terminal());
        for target in ALL_STATUSES {
            assert!(
                !terminal.can_transition_to(target),
                "{} must not move to {}",
                terminal,
                target
            );
        }
    }
}

#[test]
fn every_non_terminal_state_can_reach_cancelled() {
    for status in ALL_STATUSES.into_iter().filter(|s| !s.is_terminal()) {
        assert!(status.can_transition_to(RentalOrderStatus::Cancelled));
    }
}
