//! In-memory broker for tests
//!
//! Mirrors the AMQP semantics the services rely on:
//! - publishing to a fanout exchange copies the message to every bound queue
//! - publishing to an undeclared queue drops the message
//! - `get` removes the message immediately
//! - a consumed message is held until settled; `NackRequeue` (or dropping an
//!   unsettled delivery) puts it back at the head of the queue
//! - `set_connected(false)` ends every open subscription and makes all
//!   operations fail with `BrokerUnavailable`
//! - `cancel_consumers` ends every open subscription but keeps the link up,
//!   like a server-side `basic.cancel`

use super::{
    Broker, ConnectionManager, Delivery, Disposition, Route, Settle, Subscription, Topology,
};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone)]
struct Message {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Message>>,
    bindings: HashMap<String, Vec<String>>,
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
    connected: AtomicBool,
    /// Bumped to end every subscription opened before it
    generation: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push_back(&self, queue: &str, payload: Vec<u8>) {
        if let Some(q) = self.lock().queues.get_mut(queue) {
            q.push_back(Message {
                payload,
                redelivered: false,
            });
        }
        self.notify.notify_waiters();
    }

    fn requeue(&self, queue: &str, payload: Vec<u8>) {
        if let Some(q) = self.lock().queues.get_mut(queue) {
            q.push_front(Message {
                payload,
                redelivered: true,
            });
        }
        self.notify.notify_waiters();
    }

    fn pop(&self, queue: &str) -> Option<Message> {
        self.lock().queues.get_mut(queue).and_then(VecDeque::pop_front)
    }

    fn end_subscriptions(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::BrokerUnavailable("memory broker disconnected".to_string()))
        }
    }
}

/// In-memory [`Broker`] implementation
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Create a connected broker with `topology` already declared
    pub fn new(topology: &Topology) -> Self {
        let broker = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                connected: AtomicBool::new(true),
                generation: AtomicU64::new(0),
            }),
        };
        broker.declare(topology);
        broker
    }

    /// Declare additional queues, exchanges and bindings
    pub fn declare(&self, topology: &Topology) {
        let mut state = self.shared.lock();
        for queue in &topology.queues {
            state.queues.entry(queue.clone()).or_default();
        }
        for exchange in &topology.fanout_exchanges {
            state.bindings.entry(exchange.clone()).or_default();
        }
        for (exchange, queue) in &topology.bindings {
            let bound = state.bindings.entry(exchange.clone()).or_default();
            if !bound.contains(queue) {
                bound.push(queue.clone());
            }
        }
    }

    /// Simulate the connection going up or down
    pub fn set_connected(&self, connected: bool) {
        self.shared.connected.store(connected, Ordering::SeqCst);
        if connected {
            self.shared.notify.notify_waiters();
        } else {
            self.shared.end_subscriptions();
        }
    }

    /// End every open subscription while the connection stays up
    pub fn cancel_consumers(&self) {
        self.shared.end_subscriptions();
    }

    /// Messages currently waiting in `queue`, oldest first
    pub fn queued(&self, queue: &str) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map(|q| q.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of messages waiting in `queue`
    pub fn depth(&self, queue: &str) -> usize {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, route: Route<'_>, payload: &[u8]) -> Result<()> {
        self.shared.ensure_connected()?;
        match route {
            Route::Queue(queue) => self.shared.push_back(queue, payload.to_vec()),
            Route::Fanout(exchange) => {
                let bound = self
                    .shared
                    .lock()
                    .bindings
                    .get(exchange)
                    .cloned()
                    .unwrap_or_default();
                for queue in bound {
                    self.shared.push_back(&queue, payload.to_vec());
                }
            }
        }
        Ok(())
    }

    async fn get(&self, queue: &str) -> Result<Option<Vec<u8>>> {
        self.shared.ensure_connected()?;
        Ok(self.shared.pop(queue).map(|m| m.payload))
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<Subscription> {
        self.shared.ensure_connected()?;
        let (tx, rx) = mpsc::channel(1);
        let shared = self.shared.clone();
        let queue = queue.to_string();
        let generation = shared.generation.load(Ordering::SeqCst);

        tokio::spawn(async move {
            loop {
                let notified = shared.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if !shared.connected.load(Ordering::SeqCst)
                    || shared.generation.load(Ordering::SeqCst) != generation
                {
                    break;
                }
                match shared.pop(&queue) {
                    Some(message) => {
                        let delivery = Delivery::new(
                            message.payload.clone(),
                            message.redelivered,
                            Box::new(MemorySettler {
                                shared: shared.clone(),
                                queue: queue.clone(),
                                payload: Some(message.payload),
                            }),
                        );
                        if tx.send(delivery).await.is_err() {
                            break;
                        }
                    }
                    None => notified.await,
                }
            }
        });

        Ok(ReceiverStream::new(rx).map(Ok).boxed())
    }

    async fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionManager for MemoryBroker {
    async fn initialize(&self) -> Result<()> {
        self.set_connected(true);
        Ok(())
    }

    async fn teardown(&self) {
        self.set_connected(false);
    }
}

struct MemorySettler {
    shared: Arc<Shared>,
    queue: String,
    /// `Some` until settled
    payload: Option<Vec<u8>>,
}

#[async_trait]
impl Settle for MemorySettler {
    async fn settle(mut self: Box<Self>, disposition: Disposition) -> Result<()> {
        let payload = self.payload.take();
        if let (Disposition::NackRequeue, Some(payload)) = (disposition, payload) {
            self.shared.requeue(&self.queue, payload);
        }
        Ok(())
    }
}

impl Drop for MemorySettler {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            self.shared.requeue(&self.queue, payload);
        }
    }
}
