//! Invoice generation and maintenance. One invoice per completed rental;
//! the order moves Completed -> Invoiced in the same transaction that
//! writes the invoice and its detail line.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::invoice::{self, InvoiceStatus};
use crate::entities::rental_order::RentalOrderStatus;
use crate::entities::invoice_detail;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::{document_number, rental_orders};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct GenerateInvoiceRequest {
    pub rental_order_id: Uuid,
    pub invoice_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    /// Percent of the discounted subtotal; the configured default applies
    /// when omitted.
    pub tax_rate: Option<Decimal>,
    pub notes: Option<String>,
}

/// Editable while Unpaid/Partial only; amounts are recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateInvoiceRequest {
    pub tax_rate: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub notes: Option<String>,
}

/// Tax on the discounted subtotal, rounded half-up to 2 decimals; total
/// is subtotal minus discount plus tax.
fn invoice_amounts(
    sub_total: Decimal,
    discount: Decimal,
    tax_rate: Decimal,
) -> Result<(Decimal, Decimal), ServiceError> {
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::from(100) {
        return Err(ServiceError::ValidationError(
            "tax rate must be between 0 and 100".into(),
        ));
    }
    if discount < Decimal::ZERO || discount > sub_total {
        return Err(ServiceError::ValidationError(
            "discount must be between 0 and the subtotal".into(),
        ));
    }
    let tax = ((sub_total - discount) * tax_rate / Decimal::from(100))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let total = sub_total - discount + tax;
    Ok((tax, total))
}

#[derive(Clone)]
pub struct InvoiceService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    default_tax_rate: Decimal,
    due_days: i64,
}

impl InvoiceService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        default_tax_rate: Decimal,
        due_days: i64,
    ) -> Self {
        Self {
            db,
            event_sender,
            default_tax_rate,
            due_days,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send(event).await;
        }
    }

    #[instrument(skip(self, req), fields(order_id = %req.rental_order_id))]
    pub async fn generate_from_rental(
        &self,
        req: GenerateInvoiceRequest,
    ) -> Result<invoice::Model, ServiceError> {
        req.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let order = rental_orders::load_for_update(&txn, req.rental_order_id).await?;
        let old = rental_orders::ensure_transition(&order, RentalOrderStatus::Invoiced)?;

        // The unique constraint on rental_order_id is the real guard; this
        // check just yields a clean error instead of a constraint failure.
        if invoice::Entity::find()
            .filter(invoice::Column::RentalOrderId.eq(order.id))
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(ServiceError::DuplicateInvoice(order.id));
        }

        let invoice_date = req.invoice_date.unwrap_or_else(Utc::now);
        let due_date = req
            .due_date
            .unwrap_or(invoice_date + Duration::days(self.due_days));
        if due_date < invoice_date {
            return Err(ServiceError::ValidationError(
                "due date must not be before the invoice date".into(),
            ));
        }
        let tax_rate = req.tax_rate.unwrap_or(self.default_tax_rate);
        let (tax_amount, total_amount) =
            invoice_amounts(order.sub_total, order.discount_amount, tax_rate)?;

        let inv = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(document_number("INV")),
            rental_order_id: Set(order.id),
            customer_id: Set(order.customer_id),
            invoice_date: Set(invoice_date),
            due_date: Set(due_date),
            sub_total: Set(order.sub_total),
            tax_rate: Set(tax_rate),
            tax_amount: Set(tax_amount),
            discount_amount: Set(order.discount_amount),
            total_amount: Set(total_amount),
            paid_amount: Set(Decimal::ZERO),
            remaining_amount: Set(total_amount),
            status: Set(InvoiceStatus::Unpaid.to_string()),
            notes: Set(req.notes),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        let inv = inv.insert(&txn).await?;

        invoice_detail::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(inv.id),
            description: Set(format!(
                "Vehicle rental {} ({} day(s))",
                order.order_number, order.total_days
            )),
            quantity: Set(order.total_days),
            unit_price: Set(order.daily_rental_price),
            amount: Set(order.sub_total),
            sort_order: Set(1),
        }
        .insert(&txn)
        .await?;

        rental_orders::apply_status(&txn, order.clone(), RentalOrderStatus::Invoiced, |_| {})
            .await?;
        rental_orders::record_status_change(
            &txn,
            order.id,
            Some(old),
            RentalOrderStatus::Invoiced,
            None,
            Some(format!("invoice {}", inv.invoice_number)),
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        info!(invoice_id = %inv.id, invoice_number = %inv.invoice_number, "invoice generated");
        self.emit(Event::InvoiceGenerated {
            invoice_id: inv.id,
            order_id: order.id,
        })
        .await;
        self.emit(Event::RentalOrderStatusChanged {
            order_id: order.id,
            old_status: old.to_string(),
            new_status: RentalOrderStatus::Invoiced.to_string(),
        })
        .await;
        Ok(inv)
    }

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, id: Uuid) -> Result<invoice::Model, ServiceError> {
        invoice::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("invoice {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn get_invoice_details(
        &self,
        id: Uuid,
    ) -> Result<Vec<invoice_detail::Model>, ServiceError> {
        Ok(invoice_detail::Entity::find()
            .filter(invoice_detail::Column::InvoiceId.eq(id))
            .order_by_asc(invoice_detail::Column::SortOrder)
            .all(self.db.as_ref())
            .await?)
    }

    /// Adjusts tax rate, discount or notes while the invoice is still
    /// Unpaid/Partial, recomputing the dependent amounts. The new total
    /// must still cover what has already been paid.
    #[instrument(skip(self, req), fields(invoice_id = %id))]
    pub async fn update_invoice(
        &self,
        id: Uuid,
        req: UpdateInvoiceRequest,
    ) -> Result<invoice::Model, ServiceError> {
        req.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await?;
        let inv = load_invoice_for_update(&txn, id).await?;
        let status = inv.status_enum().map_err(|_| {
            ServiceError::Other(anyhow::anyhow!("corrupt invoice status: {}", inv.status))
        })?;
        if !status.is_editable() {
            return Err(ServiceError::Conflict(format!(
                "invoice {} is {}; only Unpaid or Partial invoices can be edited",
                id, inv.status
            )));
        }

        let tax_rate = req.tax_rate.unwrap_or(inv.tax_rate);
        let discount = req.discount_amount.unwrap_or(inv.discount_amount);
        let (tax_amount, total_amount) = invoice_amounts(inv.sub_total, discount, tax_rate)?;
        if total_amount < inv.paid_amount {
            return Err(ServiceError::ValidationError(format!(
                "new total {} is below the amount already paid {}",
                total_amount, inv.paid_amount
            )));
        }

        let paid = inv.paid_amount;
        let mut active: invoice::ActiveModel = inv.into();
        active.tax_rate = Set(tax_rate);
        active.tax_amount = Set(tax_amount);
        active.discount_amount = Set(discount);
        active.total_amount = Set(total_amount);
        active.remaining_amount = Set(total_amount - paid);
        if let Some(notes) = req.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Marks every past-due Unpaid/Partial invoice Overdue. Invoked
    /// explicitly; nothing flips invoices Overdue as a side effect of
    /// reads or payments.
    #[instrument(skip(self))]
    pub async fn refresh_overdue(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let res = invoice::Entity::update_many()
            .col_expr(
                invoice::Column::Status,
                Expr::value(InvoiceStatus::Overdue.to_string()),
            )
            .col_expr(invoice::Column::UpdatedAt, Expr::value(now))
            .filter(
                Condition::all()
                    .add(invoice::Column::Status.is_in([
                        InvoiceStatus::Unpaid.to_string(),
                        InvoiceStatus::Partial.to_string(),
                    ]))
                    .add(invoice::Column::DueDate.lt(now))
                    .add(invoice::Column::RemainingAmount.gt(Decimal::ZERO)),
            )
            .exec(self.db.as_ref())
            .await?;

        if res.rows_affected > 0 {
            info!(count = res.rows_affected, "invoices marked overdue");
            self.emit(Event::InvoicesMarkedOverdue(res.rows_affected)).await;
        }
        Ok(res.rows_affected)
    }
}

/// Loads an invoice for mutation, `FOR UPDATE` on Postgres.
pub(crate) async fn load_invoice_for_update<C>(
    conn: &C,
    id: Uuid,
) -> Result<invoice::Model, ServiceError>
where
    C: sea_orm::ConnectionTrait,
{
    use sea_orm::QuerySelect;

    let mut query = invoice::Entity::find_by_id(id);
    if conn.get_database_backend() == sea_orm::DbBackend::Postgres {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("invoice {}", id)))
}
