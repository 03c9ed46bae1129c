use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Domain events emitted by the services after a transaction commits.
/// Consumers must tolerate loss; the channel is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    RentalOrderCreated(Uuid),
    RentalOrderUpdated(Uuid),
    RentalOrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    RentalStarted(Uuid),
    RentalCompleted(Uuid),
    RentalCancelled(Uuid),
    PromotionConsumed {
        order_id: Uuid,
        code: String,
    },
    PromotionReleased {
        order_id: Uuid,
        code: String,
    },
    InvoiceGenerated {
        invoice_id: Uuid,
        order_id: Uuid,
    },
    InvoicesMarkedOverdue(u64),
    PaymentRecorded {
        payment_id: Uuid,
        invoice_id: Uuid,
    },
    InvoicePaid(Uuid),
}

#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Best-effort publish. A full or closed channel is logged, never
    /// surfaced to the caller: events must not fail business operations.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.tx.send(event).await {
            warn!("event channel closed, dropping event: {}", e);
        }
    }
}

/// Drains the event channel and logs each event. Runs for the lifetime
/// of the process.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("event processor started");
    while let Some(event) = rx.recv().await {
        match &event {
            Event::RentalOrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "rental order status changed");
            }
            Event::InvoiceGenerated { invoice_id, order_id } => {
                info!(%invoice_id, %order_id, "invoice generated");
            }
            Event::InvoicePaid(invoice_id) => {
                info!(%invoice_id, "invoice fully paid");
            }
            other => debug!(?other, "event processed"),
        }
    }
    info!("event processor stopped");
}
