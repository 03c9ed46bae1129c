pub mod common;
pub mod invoices;
pub mod payments;
pub mod rental_orders;

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer used by the HTTP handlers. Built once at startup and
/// cloned into the shared state.
#[derive(Clone)]
pub struct AppServices {
    pub rental_orders: Arc<crate::services::rental_orders::RentalOrderService>,
    pub promotions: Arc<crate::services::promotions::PromotionService>,
    pub invoicing: Arc<crate::services::invoicing::InvoiceService>,
    pub payments: Arc<crate::services::payments::PaymentService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        config: &AppConfig,
    ) -> Self {
        let rental_orders = Arc::new(crate::services::rental_orders::RentalOrderService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let promotions = Arc::new(crate::services::promotions::PromotionService::new(
            db_pool.clone(),
        ));
        let invoicing = Arc::new(crate::services::invoicing::InvoiceService::new(
            db_pool.clone(),
            event_sender.clone(),
            Decimal::from(config.default_tax_rate),
            i64::from(config.invoice_due_days),
        ));
        let payments = Arc::new(crate::services::payments::PaymentService::new(
            db_pool,
            event_sender,
        ));
        Self {
            rental_orders,
            promotions,
            invoicing,
            payments,
        }
    }
}
