//! Worker entry point: declares the topology, wires the saga handlers onto
//! their queues and runs the outbox relay.
//!
//! Persistence adapters proper are external collaborators; this binary
//! wires the in-memory ports (or the Postgres outbox/idempotency stores
//! when `DATABASE_URL` is set) so the message flow can run end to end.

mod config;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use messaging::{
    AmqpBroker, AmqpConfig, InMemoryOutbox, InMemoryProcessedEvents, MessageBroker, OutboxRelay,
    OutboxStore, PostgresOutbox, PostgresProcessedEvents, ProcessedEventStore, RetryPolicy,
    SubscribeOptions, email_topology, inventory_topology, payments_topology,
    topology::Q_PAYMENT_HANDLER,
};
use saga::{
    EMAIL_KINDS, EmailJob, EmailJobHandler, EmailSender, InMemoryAudit, InMemoryCarts,
    InMemoryOrders, InMemoryReservations, InMemoryStock, InMemoryUsers, InventoryAction,
    InventoryCommandHandler, InventoryQueueSubscriber, OutboxEmailEnqueuer, PaymentReconciler,
    SagaError,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::Config;

/// Email sender that logs instead of calling a mail provider.
/// Stands in for the provider adapter, which lives outside this subsystem.
struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, job: &EmailJob) -> Result<(), SagaError> {
        tracing::info!(kind = job.kind(), to = job.to(), "email dispatched");
        Ok(())
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Declares the topology, subscribes every handler and spawns the relay.
async fn run<O, P>(config: Config, broker: AmqpBroker, outbox: O, processed: P)
where
    O: OutboxStore + Clone + 'static,
    P: ProcessedEventStore + Clone + 'static,
{
    let topology = inventory_topology()
        .merge(payments_topology())
        .merge(email_topology(EMAIL_KINDS));
    broker
        .declare(&topology)
        .await
        .expect("failed to declare topology");

    // Port wiring; persistence adapters are external collaborators.
    let reservations = InMemoryReservations::new();
    let stock = InMemoryStock::new();
    let orders = InMemoryOrders::new();
    let carts = InMemoryCarts::new();
    let users = InMemoryUsers::new();
    let audit = InMemoryAudit::new();

    let dead_letter = SubscribeOptions {
        prefetch: config.prefetch,
        retry: RetryPolicy::DeadLetter,
    };
    let ladder = SubscribeOptions {
        prefetch: config.prefetch,
        retry: RetryPolicy::standard_ladder(),
    };

    let inventory = Arc::new(InventoryCommandHandler::new(
        reservations,
        stock,
        outbox.clone(),
        processed.clone(),
        audit.clone(),
    ));
    for action in [
        InventoryAction::Reserve,
        InventoryAction::Confirm,
        InventoryAction::Release,
    ] {
        broker
            .subscribe(
                action.queue(),
                Arc::new(InventoryQueueSubscriber::new(inventory.clone(), action)),
                dead_letter,
            )
            .await
            .expect("failed to subscribe inventory queue");
    }

    let reconciler = Arc::new(PaymentReconciler::new(
        orders,
        carts,
        users,
        outbox.clone(),
        processed,
        audit,
        OutboxEmailEnqueuer::new(outbox.clone()),
    ));
    broker
        .subscribe(Q_PAYMENT_HANDLER, reconciler, dead_letter)
        .await
        .expect("failed to subscribe payment queue");

    let email_handler = Arc::new(EmailJobHandler::new(Arc::new(LoggingEmailSender)));
    for kind in EMAIL_KINDS {
        broker
            .subscribe(&format!("email.{kind}.q"), email_handler.clone(), ladder)
            .await
            .expect("failed to subscribe email queue");
    }

    let relay = OutboxRelay::new(
        outbox,
        broker,
        Duration::from_millis(config.outbox_poll_ms),
    );
    tokio::spawn(async move { relay.run().await });

    tracing::info!("worker started");
    shutdown_signal().await;
    tracing::info!("worker shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .expect("failed to install Prometheus recorder");

    // 3. Connect the broker
    let config = Config::from_env();
    let broker = AmqpBroker::connect(AmqpConfig::new(config.amqp_url.clone()))
        .await
        .expect("failed to connect to AMQP");

    // 4. Pick the outbox/idempotency stores and run
    match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .expect("failed to connect to Postgres");
            let outbox = PostgresOutbox::new(pool.clone());
            let processed = PostgresProcessedEvents::new(pool);
            run(config, broker, outbox, processed).await;
        }
        None => {
            run(
                config,
                broker,
                InMemoryOutbox::new(),
                InMemoryProcessedEvents::new(),
            )
            .await;
        }
    }
}
