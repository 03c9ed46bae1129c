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

use crate::entities::payment::{self, PaymentMethod};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::RecordPaymentRequest;
use crate::ApiResponse;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub payment_number: String,
    pub invoice_id: Uuid,
    pub payment_date: DateTime<Utc>,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub bank_account: Option<String>,
    pub transaction_code: Option<String>,
    pub notes: Option<String>,
}

pub(crate) fn payment_to_response(row: payment::Model) -> PaymentResponse {
    PaymentResponse {
        id: row.id,
        payment_number: row.payment_number,
        invoice_id: row.invoice_id,
        payment_date: row.payment_date,
        amount: row.amount,
        payment_method: row.payment_method,
        bank_account: row.bank_account,
        transaction_code: row.transaction_code,
        notes: row.notes,
    }
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(record_payment))
        .route("/:id", get(get_payment))
}

/// Record a payment against an invoice
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment recorded", body = ApiResponse<PaymentResponse>),
        (status = 400, description = "Invalid or overpaying amount", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice does not accept payments", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), ServiceError> {
    let recorded = state.services.payments.record_payment(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(payment_to_response(recorded))),
    ))
}

/// Get a payment by id
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = ApiResponse<PaymentResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let row = state.services.payments.get_payment(id).await?;
    Ok(Json(ApiResponse::success(payment_to_response(row))))
}
