//! Message handlers for the order-fulfillment saga.
//!
//! Stock counters and order status are two independently-mutable resources
//! reconciled through at-least-once, out-of-order message delivery:
//! every handler is idempotency-gated, checks the current aggregate status
//! before acting, and emits its outgoing commands and events through the
//! transactional outbox. Compensation is a release command, never a
//! distributed transaction.

pub mod commands;
pub mod email;
pub mod envelope;
pub mod error;
pub mod inventory;
pub mod payment;
pub mod ports;

pub use commands::{
    ConfirmCommand, InventoryAction, RejectedItem, ReleaseCommand, ReleaseReason, ReserveCommand,
    ReserveItem, SCOPE_INVENTORY, SCOPE_PAYMENTS,
};
pub use email::{EMAIL_KINDS, EmailJob, EmailJobHandler, OutboxEmailEnqueuer};
pub use envelope::PaymentEventEnvelope;
pub use error::SagaError;
pub use inventory::{InventoryCommandHandler, InventoryQueueSubscriber};
pub use payment::PaymentReconciler;
pub use ports::{
    AuditLog, AuditRecord, Cart, CartRepository, EmailEnqueuer, EmailSender, InMemoryAudit,
    InMemoryCarts, InMemoryOrders, InMemoryReservations, InMemoryStock, InMemoryUsers,
    OrderRepository, RecordingEmailEnqueuer, RecordingEmailSender, ReservationRepository,
    StockAdjuster, User, UserDirectory,
};
