//! Declarative broker topology.
//!
//! Exchanges, queues and bindings are described as plain data so the same
//! declarations drive both the AMQP broker and the in-memory broker used in
//! tests. Naming scheme: exchanges `<domain>.commands` / `<domain>.events`,
//! main queue `q.<domain>.<action>`, dead-letter queue `<main>.dlq`, retry
//! queue `<main>.retry.<delayMs>.q`.

/// Fixed retry-delay ladder in milliseconds: 1m, 2m, 5m, 10m, 30m, 60m.
pub const RETRY_DELAYS_MS: &[u64] = &[60_000, 120_000, 300_000, 600_000, 1_800_000, 3_600_000];

/// Shared dead-letter exchange for the inventory and payment queue families.
pub const APP_DLX: &str = "app.dlx";

/// Topic exchange carrying inventory commands.
pub const EX_INVENTORY_COMMANDS: &str = "inventory.commands";
/// Topic exchange carrying inventory lifecycle events.
pub const EX_INVENTORY_EVENTS: &str = "inventory.events";
/// Topic exchange carrying normalized payment events.
pub const EX_PAYMENTS_EVENTS: &str = "payments.events";
/// Topic exchange carrying email jobs.
pub const EX_EMAIL: &str = "email.exchange";
/// Dead-letter exchange for the email queue family.
pub const EMAIL_DLX: &str = "email.dlx";

/// Main queue for inventory reserve commands.
pub const Q_INVENTORY_RESERVE: &str = "q.inventory.reservation";
/// Main queue for inventory confirm commands.
pub const Q_INVENTORY_CONFIRM: &str = "q.inventory.confirm";
/// Main queue for inventory release commands.
pub const Q_INVENTORY_RELEASE: &str = "q.inventory.release";
/// Queue fed by the external reservation-expiry scheduler.
pub const Q_INVENTORY_SCHEDULER: &str = "q.inventory.scheduler";
/// Main queue for the payment event reconciler.
pub const Q_PAYMENT_HANDLER: &str = "q.orders.payment-handler";

/// Routing key for reserve commands.
pub const RK_INVENTORY_RESERVE: &str = "inventory.reserve.request";
/// Routing key for confirm commands.
pub const RK_INVENTORY_CONFIRM: &str = "inventory.confirm.request";
/// Routing key for release commands.
pub const RK_INVENTORY_RELEASE: &str = "inventory.release.request";
/// Binding pattern for the payment handler queue.
pub const RK_PAYMENT_EVENTS: &str = "payment.event.#";

/// The kind of exchange to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Topic,
    Direct,
}

/// An exchange declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

impl ExchangeSpec {
    /// A durable topic exchange.
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeKind::Topic,
            durable: true,
        }
    }

    /// A durable direct exchange.
    pub fn direct(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeKind::Direct,
            durable: true,
        }
    }
}

/// A queue declaration, including its dead-letter and TTL arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    /// `x-dead-letter-exchange`: where rejected or expired messages go.
    pub dead_letter_exchange: Option<String>,
    /// `x-dead-letter-routing-key`: overrides the routing key on dead-letter.
    pub dead_letter_routing_key: Option<String>,
    /// `x-message-ttl`: parking-lot delay for retry queues.
    pub message_ttl: Option<u64>,
}

impl QueueSpec {
    /// A plain durable queue with no arguments.
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            ..Default::default()
        }
    }

    /// Adds dead-letter arguments.
    pub fn dead_letter_to(
        mut self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self.dead_letter_routing_key = Some(routing_key.into());
        self
    }

    /// Adds a message TTL, turning the queue into a parking-lot queue.
    pub fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.message_ttl = Some(ttl_ms);
        self
    }
}

/// A queue-to-exchange binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

impl BindingSpec {
    pub fn new(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}

/// A complete set of declarations for one domain.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub exchanges: Vec<ExchangeSpec>,
    pub queues: Vec<QueueSpec>,
    pub bindings: Vec<BindingSpec>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges another topology into this one, skipping duplicate names.
    pub fn merge(mut self, other: Topology) -> Self {
        for exchange in other.exchanges {
            if !self.exchanges.iter().any(|e| e.name == exchange.name) {
                self.exchanges.push(exchange);
            }
        }
        for queue in other.queues {
            if !self.queues.iter().any(|q| q.name == queue.name) {
                self.queues.push(queue);
            }
        }
        for binding in other.bindings {
            if !self.bindings.contains(&binding) {
                self.bindings.push(binding);
            }
        }
        self
    }

    /// Looks up a queue declaration by name.
    pub fn queue(&self, name: &str) -> Option<&QueueSpec> {
        self.queues.iter().find(|q| q.name == name)
    }
}

/// Dead-letter queue name for a main queue.
pub fn dlq_name(main: &str) -> String {
    format!("{main}.dlq")
}

/// Routing key used on the shared `app.dlx` for a main queue's dead letters.
pub fn dlq_routing_key(main: &str) -> String {
    format!("dlq.{main}")
}

/// Parking-lot queue name for one retry rung of a main queue.
pub fn retry_queue_name(main: &str, delay_ms: u64) -> String {
    format!("{main}.retry.{delay_ms}.q")
}

/// Declares a main queue plus its DLQ on the shared `app.dlx`.
fn main_queue_with_dlq(topology: &mut Topology, queue: &str) {
    topology.queues.push(
        QueueSpec::durable(queue).dead_letter_to(APP_DLX, dlq_routing_key(queue)),
    );
    topology.queues.push(QueueSpec::durable(dlq_name(queue)));
    topology.bindings.push(BindingSpec::new(
        dlq_name(queue),
        APP_DLX,
        dlq_routing_key(queue),
    ));
}

/// Inventory command topology: reserve/confirm/release/scheduler queues with
/// DLQs. No retry ladder; handler failures dead-letter immediately.
pub fn inventory_topology() -> Topology {
    let mut topology = Topology::new();
    topology.exchanges.push(ExchangeSpec::topic(EX_INVENTORY_COMMANDS));
    topology.exchanges.push(ExchangeSpec::topic(EX_INVENTORY_EVENTS));
    topology.exchanges.push(ExchangeSpec::direct(APP_DLX));

    main_queue_with_dlq(&mut topology, Q_INVENTORY_RESERVE);
    topology.bindings.push(BindingSpec::new(
        Q_INVENTORY_RESERVE,
        EX_INVENTORY_COMMANDS,
        RK_INVENTORY_RESERVE,
    ));

    main_queue_with_dlq(&mut topology, Q_INVENTORY_CONFIRM);
    topology.bindings.push(BindingSpec::new(
        Q_INVENTORY_CONFIRM,
        EX_INVENTORY_COMMANDS,
        RK_INVENTORY_CONFIRM,
    ));

    main_queue_with_dlq(&mut topology, Q_INVENTORY_RELEASE);
    topology.bindings.push(BindingSpec::new(
        Q_INVENTORY_RELEASE,
        EX_INVENTORY_COMMANDS,
        RK_INVENTORY_RELEASE,
    ));

    // Fed by the external expiry scheduler; no binding to the command exchange.
    main_queue_with_dlq(&mut topology, Q_INVENTORY_SCHEDULER);

    topology
}

/// Payments topology: one handler queue bound to the normalized event stream.
pub fn payments_topology() -> Topology {
    let mut topology = Topology::new();
    topology.exchanges.push(ExchangeSpec::topic(EX_PAYMENTS_EVENTS));
    topology.exchanges.push(ExchangeSpec::direct(APP_DLX));

    main_queue_with_dlq(&mut topology, Q_PAYMENT_HANDLER);
    topology.bindings.push(BindingSpec::new(
        Q_PAYMENT_HANDLER,
        EX_PAYMENTS_EVENTS,
        RK_PAYMENT_EVENTS,
    ));

    topology
}

/// Email topology: per-kind main queue, DLQ, and the full retry ladder.
///
/// The main queue dead-letters to `email.dlx` with its own routing key, and
/// each ladder rung dead-letters back to the origin exchange so a TTL expiry
/// becomes a redelivery.
pub fn email_topology(kinds: &[&str]) -> Topology {
    let mut topology = Topology::new();
    topology.exchanges.push(ExchangeSpec::topic(EX_EMAIL));
    topology.exchanges.push(ExchangeSpec::direct(EMAIL_DLX));

    for kind in kinds {
        let routing_key = format!("email.{kind}");
        let main_queue = format!("{routing_key}.q");

        topology.queues.push(
            QueueSpec::durable(&main_queue).dead_letter_to(EMAIL_DLX, &routing_key),
        );
        topology.queues.push(QueueSpec::durable(dlq_name(&main_queue)));
        topology.bindings.push(BindingSpec::new(
            dlq_name(&main_queue),
            EMAIL_DLX,
            &routing_key,
        ));
        topology
            .bindings
            .push(BindingSpec::new(&main_queue, EX_EMAIL, &routing_key));

        for &delay in RETRY_DELAYS_MS {
            topology.queues.push(
                QueueSpec::durable(retry_queue_name(&main_queue, delay))
                    .dead_letter_to(EX_EMAIL, &routing_key)
                    .with_ttl(delay),
            );
        }
    }

    topology
}
