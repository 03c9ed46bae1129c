//! Promotion validation and the atomic usage counter. Validation never
//! mutates state; consumption and release are conditional UPDATEs so
//! concurrent redemptions can never blow past the usage limit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::entities::promotion;
use crate::errors::ServiceError;
use crate::services::pricing;

/// Why a promotion code did not apply. These are expected outcomes, not
/// errors; whether they abort the request is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum PromotionRejection {
    NotFound,
    Expired,
    BelowMinimumAmount { minimum: Decimal },
    UsageLimitReached,
}

impl PromotionRejection {
    /// Error for callers that treat a rejection as fatal. Each variant
    /// keeps its own reason code; rejections are never collapsed into a
    /// generic validation error.
    pub fn into_error(self, code: &str) -> ServiceError {
        match self {
            PromotionRejection::NotFound => {
                ServiceError::NotFound(format!("promotion {}", code))
            }
            PromotionRejection::UsageLimitReached => {
                ServiceError::UsageLimitReached(code.to_string())
            }
            other => ServiceError::ValidationError(other.message()),
        }
    }

    pub fn message(&self) -> String {
        match self {
            PromotionRejection::NotFound => "promotion code not found".into(),
            PromotionRejection::Expired => "promotion is not active or outside its validity window".into(),
            PromotionRejection::BelowMinimumAmount { minimum } => {
                format!("order subtotal is below the promotion minimum of {}", minimum)
            }
            PromotionRejection::UsageLimitReached => "promotion usage limit reached".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PromotionQuote {
    pub code: String,
    pub discount: Decimal,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromotionOutcome {
    Applied(PromotionQuote),
    Rejected(PromotionRejection),
}

/// Validates a code against an order subtotal as of a point in time.
/// Read-only; runs on whatever connection the caller is in, so the state
/// machine can evaluate inside its transaction.
pub async fn validate_on<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    sub_total: Decimal,
    as_of: DateTime<Utc>,
) -> Result<PromotionOutcome, ServiceError> {
    let Some(promo) = promotion::Entity::find()
        .filter(promotion::Column::Code.eq(code))
        .one(conn)
        .await?
    else {
        return Ok(PromotionOutcome::Rejected(PromotionRejection::NotFound));
    };

    if !promo.is_within_window(as_of) {
        return Ok(PromotionOutcome::Rejected(PromotionRejection::Expired));
    }
    if let Some(minimum) = promo.min_amount {
        if sub_total < minimum {
            return Ok(PromotionOutcome::Rejected(
                PromotionRejection::BelowMinimumAmount { minimum },
            ));
        }
    }
    if !promo.has_remaining_uses() {
        return Ok(PromotionOutcome::Rejected(PromotionRejection::UsageLimitReached));
    }

    let discount = pricing::discount_for(&promo, sub_total);
    debug!(code, %discount, "promotion applied");
    Ok(PromotionOutcome::Applied(PromotionQuote {
        code: promo.code,
        discount,
        message: promo
            .description
            .unwrap_or_else(|| "promotion applied".into()),
    }))
}

/// Atomically claims one redemption. Zero rows affected means the limit
/// was hit by a concurrent claim (or the code vanished); the caller's
/// transaction rolls back either way.
pub async fn consume<C: ConnectionTrait>(conn: &C, code: &str) -> Result<(), ServiceError> {
    let res = promotion::Entity::update_many()
        .col_expr(
            promotion::Column::UsageCount,
            Expr::col(promotion::Column::UsageCount).add(1),
        )
        .col_expr(promotion::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(promotion::Column::Code.eq(code))
        .filter(
            Condition::any()
                .add(promotion::Column::UsageLimit.is_null())
                .add(
                    Expr::col(promotion::Column::UsageCount)
                        .lt(Expr::col(promotion::Column::UsageLimit)),
                ),
        )
        .exec(conn)
        .await?;

    if res.rows_affected == 0 {
        let exists = promotion::Entity::find()
            .filter(promotion::Column::Code.eq(code))
            .one(conn)
            .await?
            .is_some();
        if exists {
            return Err(ServiceError::UsageLimitReached(code.to_string()));
        }
        return Err(ServiceError::NotFound(format!("promotion {}", code)));
    }
    Ok(())
}

/// Returns one redemption, flooring at zero. Missing codes and
/// already-zero counters are not errors: release runs on cancellation
/// paths that must not fail.
pub async fn release<C: ConnectionTrait>(conn: &C, code: &str) -> Result<(), ServiceError> {
    promotion::Entity::update_many()
        .col_expr(
            promotion::Column::UsageCount,
            Expr::col(promotion::Column::UsageCount).sub(1),
        )
        .col_expr(promotion::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(promotion::Column::Code.eq(code))
        .filter(Expr::col(promotion::Column::UsageCount).gt(0))
        .exec(conn)
        .await?;
    Ok(())
}

/// Read-side wrapper used by the price preview endpoint.
#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DbPool>,
}

impl PromotionService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        sub_total: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<PromotionOutcome, ServiceError> {
        validate_on(self.db.as_ref(), code, sub_total, as_of).await
    }
}
