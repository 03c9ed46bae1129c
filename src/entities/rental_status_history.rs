use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit trail of rental order status changes. Rows are never
/// updated or deleted, even when the order itself is removed as a draft.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rental_status_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub rental_order_id: Uuid,
    pub old_status: Option<String>,
    pub new_status: String,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rental_order::Entity",
        from = "Column::RentalOrderId",
        to = "super::rental_order::Column::Id"
    )]
    RentalOrder,
}

impl Related<super::rental_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RentalOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
