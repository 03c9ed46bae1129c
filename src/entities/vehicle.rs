use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a fleet vehicle. Stored as a string column; the
/// `version` column is the optimistic-concurrency token checked by the
/// availability guard on every status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum VehicleStatus {
    Available,
    Reserved,
    Rented,
    Maintenance,
    Repair,
    Retired,
}

impl VehicleStatus {
    /// Whether a new rental can claim the vehicle.
    pub fn is_rentable(self) -> bool {
        matches!(self, VehicleStatus::Available)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vehicles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub license_plate: String,
    pub display_name: String,
    pub daily_rental_price: Decimal,
    pub status: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn status_enum(&self) -> Result<VehicleStatus, strum::ParseError> {
        self.status.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::rental_order::Entity")]
    RentalOrders,
}

impl Related<super::rental_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RentalOrders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
