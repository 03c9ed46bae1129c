use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a promotion reduces the order subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum PromotionType {
    /// `value` is a percentage of the subtotal (0-100), capped at
    /// `max_discount` when set.
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// `value` is a fixed currency amount, never more than the subtotal.
    #[sea_orm(string_value = "fixed_amount")]
    FixedAmount,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promotions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub description: Option<String>,
    pub promotion_type: PromotionType,
    pub value: Decimal,
    pub min_amount: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// None means unlimited redemptions.
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Inside the validity window and switched on, ignoring usage limits
    /// and minimum-amount thresholds.
    pub fn is_within_window(&self, as_of: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= as_of && as_of <= self.end_date
    }

    pub fn has_remaining_uses(&self) -> bool {
        match self.usage_limit {
            Some(limit) => self.usage_count < limit,
            None => true,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
