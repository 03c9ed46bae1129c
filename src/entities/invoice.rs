use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Payment state of an invoice, derived from the sum of recorded payments
/// (Overdue is set only by the batch refresh).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum InvoiceStatus {
    Unpaid,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    /// Whether a payment may still be recorded against the invoice.
    pub fn accepts_payments(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Unpaid | InvoiceStatus::Partial | InvoiceStatus::Overdue
        )
    }

    /// TaxRate/DiscountAmount/Notes are editable only before full payment.
    pub fn is_editable(self) -> bool {
        matches!(self, InvoiceStatus::Unpaid | InvoiceStatus::Partial)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub invoice_number: String,
    #[sea_orm(unique)]
    pub rental_order_id: Uuid,
    pub customer_id: Uuid,
    pub invoice_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub sub_total: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn status_enum(&self) -> Result<InvoiceStatus, strum::ParseError> {
        self.status.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rental_order::Entity",
        from = "Column::RentalOrderId",
        to = "super::rental_order::Column::Id"
    )]
    RentalOrder,
    #[sea_orm(has_many = "super::invoice_detail::Entity")]
    Details,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::rental_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RentalOrder.def()
    }
}

impl Related<super::invoice_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Details.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
