use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a rental order. Persisted as a string column so the
/// table stays readable and the enum can grow without a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum RentalOrderStatus {
    Draft,
    Confirmed,
    InProgress,
    Completed,
    Invoiced,
    Cancelled,
}

impl RentalOrderStatus {
    /// Legal forward transitions. Everything else is rejected with a
    /// conflict, including self-transitions.
    pub fn can_transition_to(self, next: RentalOrderStatus) -> bool {
        use RentalOrderStatus::*;
        matches!(
            (self, next),
            (Draft, Confirmed)
                | (Draft, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (Completed, Invoiced)
                | (Completed, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RentalOrderStatus::Invoiced | RentalOrderStatus::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rental_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub actual_start_date: Option<DateTime<Utc>>,
    pub actual_end_date: Option<DateTime<Utc>>,
    pub pickup_location: String,
    pub return_location: String,
    pub daily_rental_price: Decimal,
    pub total_days: i32,
    pub sub_total: Decimal,
    pub discount_amount: Decimal,
    pub promotion_code: Option<String>,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl Model {
    pub fn status_enum(&self) -> Result<RentalOrderStatus, strum::ParseError> {
        self.status.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vehicle::Entity",
        from = "Column::VehicleId",
        to = "super::vehicle::Column::Id"
    )]
    Vehicle,
    #[sea_orm(has_many = "super::rental_status_history::Entity")]
    StatusHistory,
    #[sea_orm(has_many = "super::invoice::Entity")]
    Invoices,
}

impl Related<super::vehicle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vehicle.def()
    }
}

impl Related<super::rental_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::RentalOrderStatus::*;
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(Draft.can_transition_to(Confirmed));
        assert!(Draft.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(InProgress));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(Completed.can_transition_to(Invoiced));
        assert!(Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Draft.can_transition_to(InProgress));
        assert!(!Draft.can_transition_to(Draft));
        assert!(!Confirmed.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Invoiced));
        assert!(!Invoiced.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Draft));
    }

    #[test]
    fn terminal_states() {
        assert!(Invoiced.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Completed.is_terminal());
        assert!(!Draft.is_terminal());
    }

    #[test]
    fn status_round_trips_through_string() {
        for status in [Draft, Confirmed, InProgress, Completed, Invoiced, Cancelled] {
            let parsed: RentalOrderStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
