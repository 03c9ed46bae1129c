use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "rental-api",
        description = "Self-drive car rental management: rental order lifecycle, pricing, invoicing and payments"
    ),
    paths(
        handlers::rental_orders::create_rental_order,
        handlers::rental_orders::list_rental_orders,
        handlers::rental_orders::calculate_price,
        handlers::rental_orders::get_rental_order,
        handlers::rental_orders::update_rental_order,
        handlers::rental_orders::delete_rental_order,
        handlers::rental_orders::confirm_rental_order,
        handlers::rental_orders::start_rental_order,
        handlers::rental_orders::complete_rental_order,
        handlers::rental_orders::cancel_rental_order,
        handlers::rental_orders::get_status_history,
        handlers::invoices::generate_invoice,
        handlers::invoices::get_invoice,
        handlers::invoices::update_invoice,
        handlers::invoices::get_invoice_payments,
        handlers::invoices::refresh_overdue,
        handlers::payments::record_payment,
        handlers::payments::get_payment,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::pricing::PriceBreakdown,
        crate::services::rental_orders::CreateRentalOrderRequest,
        crate::services::rental_orders::UpdateRentalOrderRequest,
        crate::services::rental_orders::CalculatePriceRequest,
        crate::services::rental_orders::PriceQuoteResponse,
        crate::services::rental_orders::CompleteRentalRequest,
        crate::services::rental_orders::CancelRentalRequest,
        crate::services::invoicing::GenerateInvoiceRequest,
        crate::services::invoicing::UpdateInvoiceRequest,
        crate::services::payments::RecordPaymentRequest,
        handlers::rental_orders::RentalOrderResponse,
        handlers::rental_orders::StatusHistoryResponse,
        handlers::invoices::InvoiceResponse,
        handlers::invoices::InvoiceDetailResponse,
        handlers::invoices::RefreshOverdueResponse,
        handlers::payments::PaymentResponse,
        crate::entities::payment::PaymentMethod,
    )),
    tags(
        (name = "Rental Orders", description = "Rental order lifecycle"),
        (name = "Invoices", description = "Invoice generation and maintenance"),
        (name = "Payments", description = "Payment ledger")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
