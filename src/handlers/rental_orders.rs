use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::PaginationParams;
use crate::entities::{rental_order, rental_status_history};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::rental_orders::{
    CalculatePriceRequest, CancelRentalRequest, CompleteRentalRequest, CreateRentalOrderRequest,
    PriceQuoteResponse, UpdateRentalOrderRequest,
};
use crate::{ApiResponse, PaginatedResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RentalOrderResponse {
    pub id: Uuid,
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
}

pub(crate) fn model_to_response(order: rental_order::Model) -> RentalOrderResponse {
    RentalOrderResponse {
        id: order.id,
        order_number: order.order_number,
        customer_id: order.customer_id,
        vehicle_id: order.vehicle_id,
        employee_id: order.employee_id,
        start_date: order.start_date,
        end_date: order.end_date,
        actual_start_date: order.actual_start_date,
        actual_end_date: order.actual_end_date,
        pickup_location: order.pickup_location,
        return_location: order.return_location,
        daily_rental_price: order.daily_rental_price,
        total_days: order.total_days,
        sub_total: order.sub_total,
        discount_amount: order.discount_amount,
        promotion_code: order.promotion_code,
        total_amount: order.total_amount,
        deposit_amount: order.deposit_amount,
        status: order.status,
        notes: order.notes,
        created_at: order.created_at,
        updated_at: order.updated_at,
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryResponse {
    pub old_status: Option<String>,
    pub new_status: String,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<String>,
    pub notes: Option<String>,
}

fn history_to_response(row: rental_status_history::Model) -> StatusHistoryResponse {
    StatusHistoryResponse {
        old_status: row.old_status,
        new_status: row.new_status,
        changed_at: row.changed_at,
        changed_by: row.changed_by,
        notes: row.notes,
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListRentalOrdersParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Filter by lifecycle status, e.g. `Draft` or `InProgress`.
    pub status: Option<String>,
}

pub fn rental_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_rental_order).get(list_rental_orders))
        .route("/calculate-price", post(calculate_price))
        .route(
            "/:id",
            get(get_rental_order)
                .put(update_rental_order)
                .delete(delete_rental_order),
        )
        .route("/:id/confirm", post(confirm_rental_order))
        .route("/:id/start", post(start_rental_order))
        .route("/:id/complete", post(complete_rental_order))
        .route("/:id/cancel", post(cancel_rental_order))
        .route("/:id/status-history", get(get_status_history))
}

/// Create a rental order in Draft
#[utoipa::path(
    post,
    path = "/api/v1/rental-orders",
    request_body = CreateRentalOrderRequest,
    responses(
        (status = 201, description = "Rental order created", body = ApiResponse<RentalOrderResponse>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Vehicle not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn create_rental_order(
    State(state): State<AppState>,
    Json(request): Json<CreateRentalOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RentalOrderResponse>>), ServiceError> {
    let order = state.services.rental_orders.create_rental_order(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(model_to_response(order))),
    ))
}

/// List rental orders
#[utoipa::path(
    get,
    path = "/api/v1/rental-orders",
    params(ListRentalOrdersParams),
    responses(
        (status = 200, description = "Rental orders", body = ApiResponse<PaginatedResponse<RentalOrderResponse>>)
    ),
    tag = "Rental Orders"
)]
pub async fn list_rental_orders(
    State(state): State<AppState>,
    Query(params): Query<ListRentalOrdersParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<RentalOrderResponse>>>, ServiceError> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            s.parse().map_err(|_| {
                ServiceError::ValidationError(format!("unknown status filter: {}", s))
            })
        })
        .transpose()?;
    let pagination = PaginationParams::from_query(params.page, params.per_page);
    let page = pagination.page();
    let per_page = pagination.per_page();
    let (orders, total) = state
        .services
        .rental_orders
        .list_rental_orders(status, page, per_page)
        .await?;
    let items = orders.into_iter().map(model_to_response).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, per_page,
    ))))
}

/// Price preview for a prospective rental
#[utoipa::path(
    post,
    path = "/api/v1/rental-orders/calculate-price",
    request_body = CalculatePriceRequest,
    responses(
        (status = 200, description = "Price quote", body = ApiResponse<PriceQuoteResponse>),
        (status = 404, description = "Vehicle not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn calculate_price(
    State(state): State<AppState>,
    Json(request): Json<CalculatePriceRequest>,
) -> Result<Json<ApiResponse<PriceQuoteResponse>>, ServiceError> {
    let quote = state.services.rental_orders.calculate_price(request).await?;
    Ok(Json(ApiResponse::success(quote)))
}

/// Get a rental order by id
#[utoipa::path(
    get,
    path = "/api/v1/rental-orders/{id}",
    params(("id" = Uuid, Path, description = "Rental order ID")),
    responses(
        (status = 200, description = "Rental order", body = ApiResponse<RentalOrderResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn get_rental_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RentalOrderResponse>>, ServiceError> {
    let order = state.services.rental_orders.get_rental_order(id).await?;
    Ok(Json(ApiResponse::success(model_to_response(order))))
}

/// Update a Draft rental order
#[utoipa::path(
    put,
    path = "/api/v1/rental-orders/{id}",
    params(("id" = Uuid, Path, description = "Rental order ID")),
    request_body = UpdateRentalOrderRequest,
    responses(
        (status = 200, description = "Rental order updated", body = ApiResponse<RentalOrderResponse>),
        (status = 409, description = "Order is no longer Draft", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn update_rental_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRentalOrderRequest>,
) -> Result<Json<ApiResponse<RentalOrderResponse>>, ServiceError> {
    let order = state
        .services
        .rental_orders
        .update_rental_order(id, request)
        .await?;
    Ok(Json(ApiResponse::success(model_to_response(order))))
}

/// Delete a Draft rental order
#[utoipa::path(
    delete,
    path = "/api/v1/rental-orders/{id}",
    params(("id" = Uuid, Path, description = "Rental order ID")),
    responses(
        (status = 204, description = "Rental order deleted"),
        (status = 409, description = "Order is no longer Draft", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn delete_rental_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.rental_orders.delete_rental_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Confirm a Draft order and reserve its vehicle
#[utoipa::path(
    post,
    path = "/api/v1/rental-orders/{id}/confirm",
    params(("id" = Uuid, Path, description = "Rental order ID")),
    responses(
        (status = 200, description = "Order confirmed", body = ApiResponse<RentalOrderResponse>),
        (status = 409, description = "Transition or vehicle conflict", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn confirm_rental_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RentalOrderResponse>>, ServiceError> {
    let order = state.services.rental_orders.confirm(id).await?;
    Ok(Json(ApiResponse::success(model_to_response(order))))
}

/// Start a confirmed rental; the vehicle goes out
#[utoipa::path(
    post,
    path = "/api/v1/rental-orders/{id}/start",
    params(("id" = Uuid, Path, description = "Rental order ID")),
    responses(
        (status = 200, description = "Rental started", body = ApiResponse<RentalOrderResponse>),
        (status = 409, description = "Transition or vehicle conflict", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn start_rental_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RentalOrderResponse>>, ServiceError> {
    let order = state.services.rental_orders.start(id).await?;
    Ok(Json(ApiResponse::success(model_to_response(order))))
}

/// Complete an in-progress rental and release the vehicle
#[utoipa::path(
    post,
    path = "/api/v1/rental-orders/{id}/complete",
    params(("id" = Uuid, Path, description = "Rental order ID")),
    request_body = CompleteRentalRequest,
    responses(
        (status = 200, description = "Rental completed", body = ApiResponse<RentalOrderResponse>),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn complete_rental_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CompleteRentalRequest>,
) -> Result<Json<ApiResponse<RentalOrderResponse>>, ServiceError> {
    let order = state.services.rental_orders.complete(id, request).await?;
    Ok(Json(ApiResponse::success(model_to_response(order))))
}

/// Cancel an order from any non-terminal state
#[utoipa::path(
    post,
    path = "/api/v1/rental-orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Rental order ID")),
    request_body = CancelRentalRequest,
    responses(
        (status = 200, description = "Rental cancelled", body = ApiResponse<RentalOrderResponse>),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn cancel_rental_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelRentalRequest>,
) -> Result<Json<ApiResponse<RentalOrderResponse>>, ServiceError> {
    let order = state.services.rental_orders.cancel(id, request).await?;
    Ok(Json(ApiResponse::success(model_to_response(order))))
}

/// Status audit trail of an order
#[utoipa::path(
    get,
    path = "/api/v1/rental-orders/{id}/status-history",
    params(("id" = Uuid, Path, description = "Rental order ID")),
    responses(
        (status = 200, description = "Status history", body = ApiResponse<Vec<StatusHistoryResponse>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Rental Orders"
)]
pub async fn get_status_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<StatusHistoryResponse>>>, ServiceError> {
    let rows = state.services.rental_orders.status_history(id).await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(history_to_response).collect(),
    )))
}
