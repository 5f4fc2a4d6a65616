//! Message broker capability
//!
//! Services talk to the broker only through the [`Broker`] trait:
//! - `publish` to a queue (default exchange) or to a fanout exchange
//! - `get` a single message, acknowledged on retrieval
//! - `consume` a queue as a stream of [`Delivery`] values that the caller
//!   settles with a [`Disposition`]
//!
//! [`AmqpBroker`] is the production implementation; `MemoryBroker` (feature
//! `test-utils`) backs the service tests.

use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod amqp;
#[cfg(feature = "test-utils")]
pub mod memory;
pub mod supervisor;

pub use amqp::AmqpBroker;
#[cfg(feature = "test-utils")]
pub use memory::MemoryBroker;
pub use supervisor::spawn_supervisor;

/// Joke proposals awaiting moderation
pub const SUBMITTED_QUEUE: &str = "SUBMITTED_QUESTIONS";
/// Approved jokes awaiting persistence
pub const MODERATED_QUEUE: &str = "MODERATED_QUESTIONS";
/// Fanout exchange carrying full taxonomy snapshots
pub const TYPE_UPDATE_EXCHANGE: &str = "type_update";

/// Queues, exchanges and bindings a service declares on every connect
///
/// Every declaration is durable and idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub queues: Vec<String>,
    pub fanout_exchanges: Vec<String>,
    /// `(exchange, queue)` pairs bound with an empty routing key
    pub bindings: Vec<(String, String)>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.queues.contains(&name) {
            self.queues.push(name);
        }
        self
    }

    pub fn fanout(mut self, exchange: impl Into<String>) -> Self {
        let exchange = exchange.into();
        if !self.fanout_exchanges.contains(&exchange) {
            self.fanout_exchanges.push(exchange);
        }
        self
    }

    /// Declare `queue` and bind it to the fanout `exchange`
    pub fn bind(self, exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        let exchange = exchange.into();
        let queue = queue.into();
        let mut topology = self.fanout(exchange.clone()).queue(queue.clone());
        let binding = (exchange, queue);
        if !topology.bindings.contains(&binding) {
            topology.bindings.push(binding);
        }
        topology
    }

    /// Pipeline topology plus a private taxonomy queue for a cache subscriber
    pub fn pipeline(type_update_queue: Option<&str>) -> Self {
        let topology = Self::new()
            .queue(SUBMITTED_QUEUE)
            .queue(MODERATED_QUEUE)
            .fanout(TYPE_UPDATE_EXCHANGE);
        match type_update_queue {
            Some(queue) => topology.bind(TYPE_UPDATE_EXCHANGE, queue),
            None => topology,
        }
    }
}

/// Publish destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// Straight to a named queue through the default exchange
    Queue(&'a str),
    /// To every queue bound to a fanout exchange
    Fanout(&'a str),
}

/// How a consumed message is settled with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    NackRequeue,
    NackDrop,
}

/// Broker-specific settlement of one delivery
#[async_trait]
pub trait Settle: Send + Sync {
    async fn settle(self: Box<Self>, disposition: Disposition) -> Result<()>;
}

/// One consumed message; must be settled exactly once
pub struct Delivery {
    payload: Vec<u8>,
    redelivered: bool,
    settler: Box<dyn Settle>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, redelivered: bool, settler: Box<dyn Settle>) -> Self {
        Self {
            payload,
            redelivered,
            settler,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub async fn settle(self, disposition: Disposition) -> Result<()> {
        self.settler.settle(disposition).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("bytes", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// Stream of deliveries; ends when the underlying connection goes away
pub type Subscription = BoxStream<'static, Result<Delivery>>;

/// Broker capability used by the services
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a persistent message
    async fn publish(&self, route: Route<'_>, payload: &[u8]) -> Result<()>;

    /// Fetch at most one message and acknowledge it immediately
    ///
    /// Once this returns `Some`, the message is gone from the queue no matter
    /// what the caller does next.
    async fn get(&self, queue: &str) -> Result<Option<Vec<u8>>>;

    /// Subscribe to a queue with manual acknowledgement
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Subscription>;

    /// Whether a live channel exists right now
    async fn is_connected(&self) -> bool;
}

/// Connection lifecycle driven by the reconnect supervisor
#[async_trait]
pub trait ConnectionManager: Broker {
    /// Open a fresh link and declare the topology, replacing any old link
    async fn initialize(&self) -> Result<()>;

    /// Close the link if one is open
    async fn teardown(&self);
}
