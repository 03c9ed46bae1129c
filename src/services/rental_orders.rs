//! Rental order lifecycle. All transitions run inside one database
//! transaction: the status row, the history append, the vehicle guard and
//! the promotion counter either all land or none do.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::rental_order::{self, RentalOrderStatus};
use crate::entities::{rental_status_history, vehicle, vehicle_history};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::promotions::PromotionOutcome;
use crate::services::{availability, document_number, pricing, promotions};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateRentalOrderRequest {
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(length(min = 1, message = "pickup location is required"))]
    pub pickup_location: String,
    #[validate(length(min = 1, message = "return location is required"))]
    pub return_location: String,
    pub deposit_amount: Option<Decimal>,
    pub promotion_code: Option<String>,
    pub notes: Option<String>,
}

/// Full replacement of the mutable fields; only Draft orders accept it.
/// A missing `promotion_code` removes any previously applied promotion.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateRentalOrderRequest {
    pub vehicle_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(length(min = 1, message = "pickup location is required"))]
    pub pickup_location: String,
    #[validate(length(min = 1, message = "return location is required"))]
    pub return_location: String,
    pub deposit_amount: Option<Decimal>,
    pub promotion_code: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CalculatePriceRequest {
    pub vehicle_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub promotion_code: Option<String>,
}

/// Price preview. A rejected promotion does not fail the preview; the
/// rejection reason comes back in `promotion_message`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceQuoteResponse {
    pub vehicle_id: Uuid,
    #[serde(flatten)]
    pub price: pricing::PriceBreakdown,
    pub promotion_code: Option<String>,
    pub promotion_applied: bool,
    pub promotion_message: Option<String>,
}

/// Completion details. `return_location` overrides the location captured
/// at booking when the vehicle comes back somewhere else.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteRentalRequest {
    pub actual_end_date: Option<DateTime<Utc>>,
    pub return_location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelRentalRequest {
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct RentalOrderService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl RentalOrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send(event).await;
        }
    }

    #[instrument(skip(self, req), fields(customer_id = %req.customer_id, vehicle_id = %req.vehicle_id))]
    pub async fn create_rental_order(
        &self,
        req: CreateRentalOrderRequest,
    ) -> Result<rental_order::Model, ServiceError> {
        req.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let vehicle = vehicle::Entity::find_by_id(req.vehicle_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("vehicle {}", req.vehicle_id)))?;

        let now = Utc::now();
        let days = pricing::total_days(req.start_date, req.end_date)?;
        let sub = pricing::sub_total(vehicle.daily_rental_price, days)?;

        let mut raw_discount = Decimal::ZERO;
        let mut applied_code: Option<String> = None;
        if let Some(code) = normalized_code(req.promotion_code.as_deref()) {
            match promotions::validate_on(&txn, code, sub, now).await? {
                PromotionOutcome::Applied(quote) => {
                    raw_discount = quote.discount;
                    applied_code = Some(quote.code);
                }
                PromotionOutcome::Rejected(rejection) => {
                    return Err(rejection.into_error(code));
                }
            }
        }

        let price = pricing::breakdown(
            vehicle.daily_rental_price,
            req.start_date,
            req.end_date,
            raw_discount,
        )?;

        if let Some(code) = &applied_code {
            promotions::consume(&txn, code).await?;
        }

        let order = rental_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(document_number("RO")),
            customer_id: Set(req.customer_id),
            vehicle_id: Set(req.vehicle_id),
            employee_id: Set(req.employee_id),
            start_date: Set(req.start_date),
            end_date: Set(req.end_date),
            actual_start_date: Set(None),
            actual_end_date: Set(None),
            pickup_location: Set(req.pickup_location),
            return_location: Set(req.return_location),
            daily_rental_price: Set(price.daily_rental_price),
            total_days: Set(price.total_days),
            sub_total: Set(price.sub_total),
            discount_amount: Set(price.discount_amount),
            promotion_code: Set(applied_code.clone()),
            total_amount: Set(price.total_amount),
            deposit_amount: Set(req.deposit_amount.unwrap_or(Decimal::ZERO)),
            status: Set(RentalOrderStatus::Draft.to_string()),
            notes: Set(req.notes),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(0),
        };
        let order = order.insert(&txn).await?;

        record_status_change(
            &txn,
            order.id,
            None,
            RentalOrderStatus::Draft,
            None,
            Some("order created".into()),
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order.id, order_number = %order.order_number, "rental order created");
        self.emit(Event::RentalOrderCreated(order.id)).await;
        if let Some(code) = applied_code {
            self.emit(Event::PromotionConsumed {
                order_id: order.id,
                code,
            })
            .await;
        }
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn get_rental_order(&self, id: Uuid) -> Result<rental_order::Model, ServiceError> {
        rental_order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("rental order {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_rental_orders(
        &self,
        status: Option<RentalOrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<rental_order::Model>, u64), ServiceError> {
        let mut query =
            rental_order::Entity::find().order_by_desc(rental_order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(rental_order::Column::Status.eq(status.to_string()));
        }
        let paginator = query.paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Re-prices and replaces the mutable fields of a Draft order,
    /// reconciling the promotion counter when the code changes.
    #[instrument(skip(self, req), fields(order_id = %id))]
    pub async fn update_rental_order(
        &self,
        id: Uuid,
        req: UpdateRentalOrderRequest,
    ) -> Result<rental_order::Model, ServiceError> {
        req.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await?;
        let order = load_for_update(&txn, id).await?;
        let status = status_of(&order)?;
        if status != RentalOrderStatus::Draft {
            return Err(ServiceError::Conflict(format!(
                "rental order {} is {}; only Draft orders can be updated",
                id, order.status
            )));
        }

        let vehicle = vehicle::Entity::find_by_id(req.vehicle_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("vehicle {}", req.vehicle_id)))?;

        let now = Utc::now();
        let days = pricing::total_days(req.start_date, req.end_date)?;
        let sub = pricing::sub_total(vehicle.daily_rental_price, days)?;

        let old_code = order.promotion_code.clone();
        let new_code = normalized_code(req.promotion_code.as_deref()).map(str::to_owned);

        let mut raw_discount = Decimal::ZERO;
        if let Some(code) = &new_code {
            match promotions::validate_on(&txn, code, sub, now).await? {
                PromotionOutcome::Applied(quote) => raw_discount = quote.discount,
                PromotionOutcome::Rejected(rejection) => {
                    return Err(rejection.into_error(code));
                }
            }
        }

        // Reconcile the usage counter only when the code actually changes.
        if old_code != new_code {
            if let Some(code) = &old_code {
                promotions::release(&txn, code).await?;
            }
            if let Some(code) = &new_code {
                promotions::consume(&txn, code).await?;
            }
        }

        let price = pricing::breakdown(
            vehicle.daily_rental_price,
            req.start_date,
            req.end_date,
            raw_discount,
        )?;

        let mut active: rental_order::ActiveModel = order.clone().into();
        active.vehicle_id = Set(req.vehicle_id);
        active.employee_id = Set(req.employee_id);
        active.start_date = Set(req.start_date);
        active.end_date = Set(req.end_date);
        active.pickup_location = Set(req.pickup_location);
        active.return_location = Set(req.return_location);
        active.daily_rental_price = Set(price.daily_rental_price);
        active.total_days = Set(price.total_days);
        active.sub_total = Set(price.sub_total);
        active.discount_amount = Set(price.discount_amount);
        active.promotion_code = Set(new_code.clone());
        active.total_amount = Set(price.total_amount);
        active.deposit_amount = Set(req.deposit_amount.unwrap_or(order.deposit_amount));
        active.notes = Set(req.notes);
        active.updated_at = Set(Some(now));
        active.version = Set(order.version + 1);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        self.emit(Event::RentalOrderUpdated(updated.id)).await;
        if old_code != new_code {
            if let Some(code) = old_code {
                self.emit(Event::PromotionReleased { order_id: id, code }).await;
            }
            if let Some(code) = new_code {
                self.emit(Event::PromotionConsumed { order_id: id, code }).await;
            }
        }
        Ok(updated)
    }

    /// Removes a Draft order. Status history rows stay behind as the audit
    /// trail; a held promotion redemption is returned.
    #[instrument(skip(self))]
    pub async fn delete_rental_order(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let order = load_for_update(&txn, id).await?;
        if status_of(&order)? != RentalOrderStatus::Draft {
            return Err(ServiceError::Conflict(format!(
                "rental order {} is {}; only Draft orders can be deleted",
                id, order.status
            )));
        }
        if let Some(code) = &order.promotion_code {
            promotions::release(&txn, code).await?;
        }
        rental_order::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        if let Some(code) = order.promotion_code {
            self.emit(Event::PromotionReleased { order_id: id, code }).await;
        }
        info!(order_id = %id, "draft rental order deleted");
        Ok(())
    }

    /// Draft -> Confirmed; reserves the vehicle.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn confirm(&self, id: Uuid) -> Result<rental_order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = load_for_update(&txn, id).await?;
        let old = ensure_transition(&order, RentalOrderStatus::Confirmed)?;

        let vehicle = vehicle::Entity::find_by_id(order.vehicle_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("vehicle {}", order.vehicle_id)))?;
        availability::reserve(&txn, vehicle.id, vehicle.version).await?;

        let updated = apply_status(&txn, order, RentalOrderStatus::Confirmed, |_| {}).await?;
        record_status_change(&txn, id, Some(old), RentalOrderStatus::Confirmed, None, None).await?;
        txn.commit().await?;

        self.emit_status_change(id, old, RentalOrderStatus::Confirmed).await;
        Ok(updated)
    }

    /// Confirmed -> InProgress; the vehicle goes out.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn start(&self, id: Uuid) -> Result<rental_order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = load_for_update(&txn, id).await?;
        let old = ensure_transition(&order, RentalOrderStatus::InProgress)?;

        let vehicle = vehicle::Entity::find_by_id(order.vehicle_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("vehicle {}", order.vehicle_id)))?;
        availability::mark_rented(&txn, vehicle.id, vehicle.version).await?;

        let now = Utc::now();
        let updated = apply_status(&txn, order, RentalOrderStatus::InProgress, |active| {
            active.actual_start_date = Set(Some(now));
        })
        .await?;
        record_status_change(&txn, id, Some(old), RentalOrderStatus::InProgress, None, None)
            .await?;
        txn.commit().await?;

        self.emit_status_change(id, old, RentalOrderStatus::InProgress).await;
        self.emit(Event::RentalStarted(id)).await;
        Ok(updated)
    }

    /// InProgress -> Completed; releases the vehicle and writes its usage
    /// history row.
    #[instrument(skip(self, req), fields(order_id = %id))]
    pub async fn complete(
        &self,
        id: Uuid,
        req: CompleteRentalRequest,
    ) -> Result<rental_order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = load_for_update(&txn, id).await?;
        let old = ensure_transition(&order, RentalOrderStatus::Completed)?;

        availability::release(&txn, order.vehicle_id).await?;

        let ended_at = req.actual_end_date.unwrap_or_else(Utc::now);
        let updated = apply_status(&txn, order.clone(), RentalOrderStatus::Completed, |active| {
            active.actual_end_date = Set(Some(ended_at));
            if let Some(location) = req.return_location.clone() {
                active.return_location = Set(location);
            }
        })
        .await?;

        vehicle_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            vehicle_id: Set(order.vehicle_id),
            rental_order_id: Set(order.id),
            customer_id: Set(order.customer_id),
            started_at: Set(order.actual_start_date.unwrap_or(order.start_date)),
            ended_at: Set(ended_at),
            notes: Set(req.notes.clone()),
        }
        .insert(&txn)
        .await?;

        record_status_change(&txn, id, Some(old), RentalOrderStatus::Completed, None, req.notes)
            .await?;
        txn.commit().await?;

        self.emit_status_change(id, old, RentalOrderStatus::Completed).await;
        self.emit(Event::RentalCompleted(id)).await;
        Ok(updated)
    }

    /// Cancels from any non-terminal state, returning the vehicle and the
    /// promotion redemption when the order held them.
    #[instrument(skip(self, req), fields(order_id = %id))]
    pub async fn cancel(
        &self,
        id: Uuid,
        req: CancelRentalRequest,
    ) -> Result<rental_order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = load_for_update(&txn, id).await?;
        let old = ensure_transition(&order, RentalOrderStatus::Cancelled)?;

        // The vehicle is held only between Confirm and Complete.
        if matches!(old, RentalOrderStatus::Confirmed | RentalOrderStatus::InProgress) {
            availability::release(&txn, order.vehicle_id).await?;
        }
        if let Some(code) = &order.promotion_code {
            promotions::release(&txn, code).await?;
        }

        let updated = apply_status(&txn, order.clone(), RentalOrderStatus::Cancelled, |_| {}).await?;
        record_status_change(
            &txn,
            id,
            Some(old),
            RentalOrderStatus::Cancelled,
            None,
            req.reason,
        )
        .await?;
        txn.commit().await?;

        self.emit_status_change(id, old, RentalOrderStatus::Cancelled).await;
        self.emit(Event::RentalCancelled(id)).await;
        if let Some(code) = order.promotion_code {
            self.emit(Event::PromotionReleased { order_id: id, code }).await;
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn status_history(
        &self,
        id: Uuid,
    ) -> Result<Vec<rental_status_history::Model>, ServiceError> {
        let rows = rental_status_history::Entity::find()
            .filter(rental_status_history::Column::RentalOrderId.eq(id))
            .order_by_asc(rental_status_history::Column::ChangedAt)
            .all(self.db.as_ref())
            .await?;
        if rows.is_empty()
            && rental_order::Entity::find_by_id(id)
                .one(self.db.as_ref())
                .await?
                .is_none()
        {
            return Err(ServiceError::NotFound(format!("rental order {}", id)));
        }
        Ok(rows)
    }

    /// Price preview without touching any state. Promotion rejections are
    /// reported, not raised: the caller decides whether to proceed.
    #[instrument(skip(self, req), fields(vehicle_id = %req.vehicle_id))]
    pub async fn calculate_price(
        &self,
        req: CalculatePriceRequest,
    ) -> Result<PriceQuoteResponse, ServiceError> {
        let vehicle = vehicle::Entity::find_by_id(req.vehicle_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("vehicle {}", req.vehicle_id)))?;

        let days = pricing::total_days(req.start_date, req.end_date)?;
        let sub = pricing::sub_total(vehicle.daily_rental_price, days)?;

        let mut raw_discount = Decimal::ZERO;
        let mut applied = false;
        let mut message = None;
        let code = normalized_code(req.promotion_code.as_deref()).map(str::to_owned);
        if let Some(code) = &code {
            match promotions::validate_on(self.db.as_ref(), code, sub, Utc::now()).await? {
                PromotionOutcome::Applied(quote) => {
                    raw_discount = quote.discount;
                    applied = true;
                    message = Some(quote.message);
                }
                PromotionOutcome::Rejected(rejection) => {
                    message = Some(rejection.message());
                }
            }
        }

        let price = pricing::breakdown(
            vehicle.daily_rental_price,
            req.start_date,
            req.end_date,
            raw_discount,
        )?;
        Ok(PriceQuoteResponse {
            vehicle_id: vehicle.id,
            price,
            promotion_code: code,
            promotion_applied: applied,
            promotion_message: message,
        })
    }

    async fn emit_status_change(&self, id: Uuid, old: RentalOrderStatus, new: RentalOrderStatus) {
        info!(order_id = %id, %old, %new, "rental order transitioned");
        self.emit(Event::RentalOrderStatusChanged {
            order_id: id,
            old_status: old.to_string(),
            new_status: new.to_string(),
        })
        .await;
    }
}

fn normalized_code(code: Option<&str>) -> Option<&str> {
    code.map(str::trim).filter(|c| !c.is_empty())
}

fn status_of(order: &rental_order::Model) -> Result<RentalOrderStatus, ServiceError> {
    order
        .status_enum()
        .map_err(|_| ServiceError::Other(anyhow::anyhow!("corrupt order status: {}", order.status)))
}

pub(crate) fn ensure_transition(
    order: &rental_order::Model,
    to: RentalOrderStatus,
) -> Result<RentalOrderStatus, ServiceError> {
    let from = status_of(order)?;
    if !from.can_transition_to(to) {
        return Err(ServiceError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(from)
}

/// Loads an order for mutation. On Postgres this takes a `FOR UPDATE` row
/// lock; SQLite serializes writers on its own.
pub(crate) async fn load_for_update<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<rental_order::Model, ServiceError> {
    let mut query = rental_order::Entity::find_by_id(id);
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("rental order {}", id)))
}

pub(crate) async fn apply_status<C, F>(
    conn: &C,
    order: rental_order::Model,
    to: RentalOrderStatus,
    mutate: F,
) -> Result<rental_order::Model, ServiceError>
where
    C: ConnectionTrait,
    F: FnOnce(&mut rental_order::ActiveModel),
{
    let version = order.version;
    let mut active: rental_order::ActiveModel = order.into();
    active.status = Set(to.to_string());
    active.updated_at = Set(Some(Utc::now()));
    active.version = Set(version + 1);
    mutate(&mut active);
    Ok(active.update(conn).await?)
}

/// Appends one immutable history row. Also used by invoicing for the
/// Completed -> Invoiced hop.
pub(crate) async fn record_status_change<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    old: Option<RentalOrderStatus>,
    new: RentalOrderStatus,
    changed_by: Option<String>,
    notes: Option<String>,
) -> Result<(), ServiceError> {
    rental_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        rental_order_id: Set(order_id),
        old_status: Set(old.map(|s| s.to_string())),
        new_status: Set(new.to_string()),
        changed_at: Set(Utc::now()),
        changed_by: Set(changed_by),
        notes: Set(notes),
    }
    .insert(conn)
    .await?;
    Ok(())
}
