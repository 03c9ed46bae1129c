use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{invoice, invoice_detail};
use crate::errors::ServiceError;
use crate::handlers::payments::{payment_to_response, PaymentResponse};
use crate::handlers::AppState;
use crate::services::invoicing::{GenerateInvoiceRequest, UpdateInvoiceRequest};
use crate::ApiResponse;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceDetailResponse {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub sort_order: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
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
    pub details: Vec<InvoiceDetailResponse>,
}

fn detail_to_response(row: invoice_detail::Model) -> InvoiceDetailResponse {
    InvoiceDetailResponse {
        description: row.description,
        quantity: row.quantity,
        unit_price: row.unit_price,
        amount: row.amount,
        sort_order: row.sort_order,
    }
}

fn invoice_to_response(inv: invoice::Model, details: Vec<invoice_detail::Model>) -> InvoiceResponse {
    InvoiceResponse {
        id: inv.id,
        invoice_number: inv.invoice_number,
        rental_order_id: inv.rental_order_id,
        customer_id: inv.customer_id,
        invoice_date: inv.invoice_date,
        due_date: inv.due_date,
        sub_total: inv.sub_total,
        tax_rate: inv.tax_rate,
        tax_amount: inv.tax_amount,
        discount_amount: inv.discount_amount,
        total_amount: inv.total_amount,
        paid_amount: inv.paid_amount,
        remaining_amount: inv.remaining_amount,
        status: inv.status,
        notes: inv.notes,
        details: details.into_iter().map(detail_to_response).collect(),
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshOverdueResponse {
    pub marked_overdue: u64,
}

pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/from-rental", post(generate_invoice))
        .route("/refresh-overdue", post(refresh_overdue))
        .route("/:id", get(get_invoice).put(update_invoice))
        .route("/:id/payments", get(get_invoice_payments))
}

/// Generate the invoice for a completed rental
#[utoipa::path(
    post,
    path = "/api/v1/invoices/from-rental",
    request_body = GenerateInvoiceRequest,
    responses(
        (status = 201, description = "Invoice generated", body = ApiResponse<InvoiceResponse>),
        (status = 409, description = "Order not Completed or already invoiced", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn generate_invoice(
    State(state): State<AppState>,
    Json(request): Json<GenerateInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceResponse>>), ServiceError> {
    let inv = state.services.invoicing.generate_from_rental(request).await?;
    let details = state.services.invoicing.get_invoice_details(inv.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(invoice_to_response(inv, details))),
    ))
}

/// Get an invoice with its detail lines
#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice", body = ApiResponse<InvoiceResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, ServiceError> {
    let inv = state.services.invoicing.get_invoice(id).await?;
    let details = state.services.invoicing.get_invoice_details(id).await?;
    Ok(Json(ApiResponse::success(invoice_to_response(inv, details))))
}

/// Adjust tax rate, discount or notes while Unpaid/Partial
#[utoipa::path(
    put,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = UpdateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice updated", body = ApiResponse<InvoiceResponse>),
        (status = 409, description = "Invoice no longer editable", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, ServiceError> {
    let inv = state.services.invoicing.update_invoice(id, request).await?;
    let details = state.services.invoicing.get_invoice_details(id).await?;
    Ok(Json(ApiResponse::success(invoice_to_response(inv, details))))
}

/// Payments recorded against an invoice
#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/payments",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Payments", body = ApiResponse<Vec<PaymentResponse>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn get_invoice_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<PaymentResponse>>>, ServiceError> {
    let payments = state.services.payments.list_for_invoice(id).await?;
    Ok(Json(ApiResponse::success(
        payments.into_iter().map(payment_to_response).collect(),
    )))
}

/// Mark past-due Unpaid/Partial invoices Overdue
#[utoipa::path(
    post,
    path = "/api/v1/invoices/refresh-overdue",
    responses(
        (status = 200, description = "Batch result", body = ApiResponse<RefreshOverdueResponse>)
    ),
    tag = "Invoices"
)]
pub async fn refresh_overdue(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RefreshOverdueResponse>>, ServiceError> {
    let marked_overdue = state.services.invoicing.refresh_overdue().await?;
    Ok(Json(ApiResponse::success(RefreshOverdueResponse {
        marked_overdue,
    })))
}
