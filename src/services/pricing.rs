//! Price computation for rental orders. Pure functions, no I/O; the
//! state machine and the quote endpoint both go through here so every
//! stored amount is derived the same way.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::promotion::{self, PromotionType};
use crate::errors::ServiceError;

/// Amounts derived for one rental. Invariant: `total_amount = sub_total -
/// discount_amount`, with the discount clamped so the total is never
/// negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceBreakdown {
    pub total_days: i32,
    pub daily_rental_price: Decimal,
    pub sub_total: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

/// Billable days between two timestamps. Same-day rentals bill one day;
/// an end date before the start date is a validation error.
pub fn total_days(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i32, ServiceError> {
    let days = (end.date_naive() - start.date_naive()).num_days();
    if days < 0 {
        return Err(ServiceError::ValidationError(
            "end date must not be before start date".into(),
        ));
    }
    Ok(days.max(1) as i32)
}

pub fn sub_total(daily_rate: Decimal, days: i32) -> Result<Decimal, ServiceError> {
    if daily_rate <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "daily rental price must be positive".into(),
        ));
    }
    Ok(daily_rate * Decimal::from(days))
}

/// Raw (unrounded) discount a promotion grants on a subtotal. Clamped to
/// `[0, sub_total]`; percentage discounts also honor `max_discount`.
pub fn discount_for(promotion: &promotion::Model, sub_total: Decimal) -> Decimal {
    let raw = match promotion.promotion_type {
        PromotionType::Percentage => {
            let pct = sub_total * promotion.value / Decimal::from(100);
            match promotion.max_discount {
                Some(cap) => pct.min(cap),
                None => pct,
            }
        }
        PromotionType::FixedAmount => promotion.value,
    };
    raw.clamp(Decimal::ZERO, sub_total)
}

/// Assembles the final breakdown. The total is rounded half-up to two
/// decimals here and nowhere earlier; the stored discount is then derived
/// from the rounded total so `total = sub_total - discount` holds exactly.
pub fn breakdown(
    daily_rate: Decimal,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    raw_discount: Decimal,
) -> Result<PriceBreakdown, ServiceError> {
    let days = total_days(start, end)?;
    let sub = sub_total(daily_rate, days)?;
    let clamped = raw_discount.clamp(Decimal::ZERO, sub);
    let total = (sub - clamped).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Ok(PriceBreakdown {
        total_days: days,
        daily_rental_price: daily_rate,
        sub_total: sub,
        discount_amount: sub - total,
        total_amount: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn percent_promo(value: Decimal, cap: Option<Decimal>) -> promotion::Model {
        promotion::Model {
            id: Uuid::new_v4(),
            code: "TEST".into(),
            description: None,
            promotion_type: PromotionType::Percentage,
            value,
            min_amount: None,
            max_discount: cap,
            start_date: at(2026, 1, 1),
            end_date: at(2026, 12, 31),
            usage_limit: None,
            usage_count: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn three_days_at_half_million_with_ten_percent() {
        let days = total_days(at(2026, 3, 1), at(2026, 3, 4)).unwrap();
        assert_eq!(days, 3);
        let sub = sub_total(dec!(500000), days).unwrap();
        assert_eq!(sub, dec!(1500000));
        let promo = percent_promo(dec!(10), None);
        let discount = discount_for(&promo, sub);
        assert_eq!(discount, dec!(150000));
        let quote = breakdown(dec!(500000), at(2026, 3, 1), at(2026, 3, 4), discount).unwrap();
        assert_eq!(quote.total_amount, dec!(1350000));
        assert_eq!(quote.sub_total - quote.discount_amount, quote.total_amount);
    }

    #[test]
    fn same_day_rental_bills_one_day() {
        assert_eq!(total_days(at(2026, 3, 1), at(2026, 3, 1)).unwrap(), 1);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = total_days(at(2026, 3, 4), at(2026, 3, 1)).unwrap_err();
        assert_matches::assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[test]
    fn non_positive_daily_rate_is_rejected() {
        assert!(sub_total(Decimal::ZERO, 3).is_err());
        assert!(sub_total(dec!(-100), 3).is_err());
    }

    #[test]
    fn percentage_discount_honors_cap() {
        let promo = percent_promo(dec!(20), Some(dec!(100000)));
        assert_eq!(discount_for(&promo, dec!(1500000)), dec!(100000));
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        let promo = promotion::Model {
            promotion_type: PromotionType::FixedAmount,
            value: dec!(2000000),
            ..percent_promo(dec!(0), None)
        };
        assert_eq!(discount_for(&promo, dec!(1500000)), dec!(1500000));
        let quote = breakdown(
            dec!(500000),
            at(2026, 3, 1),
            at(2026, 3, 4),
            discount_for(&promo, dec!(1500000)),
        )
        .unwrap();
        assert_eq!(quote.total_amount, Decimal::ZERO);
    }

    #[test]
    fn total_is_rounded_half_up_at_the_end() {
        // 3 days at 99.99 = 299.97; 15% = 44.9955 -> total 254.9745 -> 254.97
        let promo = percent_promo(dec!(15), None);
        let sub = sub_total(dec!(99.99), 3).unwrap();
        let quote = breakdown(
            dec!(99.99),
            at(2026, 3, 1),
            at(2026, 3, 4),
            discount_for(&promo, sub),
        )
        .unwrap();
        assert_eq!(quote.total_amount, dec!(254.97));
        assert_eq!(quote.discount_amount, dec!(45.00));
    }

    #[test]
    fn negative_discount_is_clamped_to_zero() {
        let quote =
            breakdown(dec!(500000), at(2026, 3, 1), at(2026, 3, 4), dec!(-50)).unwrap();
        assert_eq!(quote.discount_amount, Decimal::ZERO);
        assert_eq!(quote.total_amount, quote.sub_total);
    }
}
