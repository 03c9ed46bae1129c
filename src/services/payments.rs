//! Payment ledger. Applying a payment locks the invoice row, so two
//! concurrent payments can never push the remaining amount negative.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::invoice::{self, InvoiceStatus};
use crate::entities::payment::{self, PaymentMethod};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::invoicing::load_invoice_for_update;
use crate::services::document_number;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RecordPaymentRequest {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_date: Option<DateTime<Utc>>,
    pub bank_account: Option<String>,
    pub transaction_code: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send(event).await;
        }
    }

    /// Applies a payment and recomputes the invoice ledger fields in the
    /// same transaction. Rejects amounts above the remaining balance.
    #[instrument(skip(self, req), fields(invoice_id = %req.invoice_id, amount = %req.amount))]
    pub async fn record_payment(
        &self,
        req: RecordPaymentRequest,
    ) -> Result<payment::Model, ServiceError> {
        req.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if req.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "payment amount must be positive".into(),
            ));
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let inv = load_invoice_for_update(&txn, req.invoice_id).await?;
        let status = inv.status_enum().map_err(|_| {
            ServiceError::Other(anyhow::anyhow!("corrupt invoice status: {}", inv.status))
        })?;
        if !status.accepts_payments() {
            return Err(ServiceError::Conflict(format!(
                "invoice {} is {} and does not accept payments",
                inv.id, inv.status
            )));
        }
        if req.amount > inv.remaining_amount {
            return Err(ServiceError::OverpaymentNotAllowed(format!(
                "amount {} exceeds remaining balance {}",
                req.amount, inv.remaining_amount
            )));
        }

        let now = Utc::now();
        let recorded = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_number: Set(document_number("PAY")),
            invoice_id: Set(inv.id),
            payment_date: Set(req.payment_date.unwrap_or(now)),
            amount: Set(req.amount),
            payment_method: Set(req.payment_method),
            bank_account: Set(req.bank_account),
            transaction_code: Set(req.transaction_code),
            notes: Set(req.notes),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let paid = inv.paid_amount + req.amount;
        let remaining = inv.total_amount - paid;
        let new_status = if remaining == Decimal::ZERO {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Partial
        };

        let invoice_id = inv.id;
        let mut active: invoice::ActiveModel = inv.into();
        active.paid_amount = Set(paid);
        active.remaining_amount = Set(remaining);
        active.status = Set(new_status.to_string());
        active.updated_at = Set(Some(now));
        active.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        info!(
            payment_id = %recorded.id,
            payment_number = %recorded.payment_number,
            %remaining,
            "payment recorded"
        );
        self.emit(Event::PaymentRecorded {
            payment_id: recorded.id,
            invoice_id,
        })
        .await;
        if new_status == InvoiceStatus::Paid {
            self.emit(Event::InvoicePaid(invoice_id)).await;
        }
        Ok(recorded)
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, id: Uuid) -> Result<payment::Model, ServiceError> {
        payment::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<payment::Model>, ServiceError> {
        invoice::Entity::find_by_id(invoice_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("invoice {}", invoice_id)))?;
        Ok(payment::Entity::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(payment::Column::PaymentDate)
            .all(self.db.as_ref())
            .await?)
    }
}
