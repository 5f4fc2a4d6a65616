//! AMQP connection manager
//!
//! Owns the single connection + channel a service uses, with an explicit
//! `initialize` / `teardown` lifecycle. Callers never see the raw channel:
//! every operation goes through the [`Broker`] trait and fails with
//! `BrokerUnavailable` when no live channel exists.

use super::{
    Broker, ConnectionManager, Delivery, Disposition, Route, Settle, Subscription, Topology,
};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Delivery mode 2 marks a message persistent
const PERSISTENT: u8 = 2;

struct Link {
    connection: Connection,
    channel: Channel,
}

impl Link {
    fn is_live(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}

/// AMQP 0-9-1 broker connection manager
pub struct AmqpBroker {
    url: String,
    topology: Topology,
    link: RwLock<Option<Link>>,
}

impl AmqpBroker {
    /// Create an unconnected manager; call
    /// [`initialize`](ConnectionManager::initialize) (or let the supervisor do
    /// it) before use
    pub fn new(url: impl Into<String>, topology: Topology) -> Self {
        Self {
            url: url.into(),
            topology,
            link: RwLock::new(None),
        }
    }

    async fn channel(&self) -> Result<Channel> {
        match &*self.link.read().await {
            Some(link) if link.is_live() => Ok(link.channel.clone()),
            _ => Err(Error::BrokerUnavailable("no live broker channel".to_string())),
        }
    }
}

#[async_trait]
impl ConnectionManager for AmqpBroker {
    /// Open a connection and channel, declare the topology, and install the
    /// link. Any previous link is closed first.
    async fn initialize(&self) -> Result<()> {
        self.teardown().await;

        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        declare(&channel, &self.topology).await?;

        info!(
            "Broker connected: {} queue(s), {} exchange(s) declared",
            self.topology.queues.len(),
            self.topology.fanout_exchanges.len()
        );

        *self.link.write().await = Some(Link { connection, channel });
        Ok(())
    }

    /// Close the connection if one is open
    async fn teardown(&self) {
        let link = self.link.write().await.take();
        if let Some(link) = link {
            if link.connection.status().connected() {
                if let Err(e) = link.connection.close(200, "shutdown").await {
                    debug!("Error while closing broker connection: {}", e);
                }
            }
            info!("Broker connection closed");
        }
    }
}

async fn declare(channel: &Channel, topology: &Topology) -> Result<()> {
    let durable_queue = QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    };
    for queue in &topology.queues {
        channel
            .queue_declare(queue, durable_queue, FieldTable::default())
            .await?;
    }

    let durable_exchange = ExchangeDeclareOptions {
        durable: true,
        ..ExchangeDeclareOptions::default()
    };
    for exchange in &topology.fanout_exchanges {
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Fanout,
                durable_exchange,
                FieldTable::default(),
            )
            .await?;
    }

    for (exchange, queue) in &topology.bindings {
        channel
            .queue_bind(
                queue,
                exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn publish(&self, route: Route<'_>, payload: &[u8]) -> Result<()> {
        let channel = self.channel().await?;
        let (exchange, routing_key) = match route {
            Route::Queue(queue) => ("", queue),
            Route::Fanout(exchange) => (exchange, ""),
        };
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into());

        let confirmation = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(Error::BrokerUnavailable(format!(
                "broker refused message for {:?}",
                route
            )));
        }
        Ok(())
    }

    async fn get(&self, queue: &str) -> Result<Option<Vec<u8>>> {
        let channel = self.channel().await?;
        let message = channel
            .basic_get(queue, BasicGetOptions { no_ack: false })
            .await?;

        match message {
            Some(message) => {
                let delivery = message.delivery;
                delivery.acker.ack(BasicAckOptions::default()).await?;
                Ok(Some(delivery.data))
            }
            None => Ok(None),
        }
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Subscription> {
        let channel = self.channel().await?;
        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!("Consuming '{}' as '{}'", queue, consumer_tag);

        let stream = consumer.map(|item| {
            item.map(|delivery| {
                Delivery::new(
                    delivery.data,
                    delivery.redelivered,
                    Box::new(AmqpSettler {
                        acker: delivery.acker,
                    }),
                )
            })
            .map_err(Error::from)
        });
        Ok(stream.boxed())
    }

    async fn is_connected(&self) -> bool {
        matches!(&*self.link.read().await, Some(link) if link.is_live())
    }
}

struct AmqpSettler {
    acker: Acker,
}

#[async_trait]
impl Settle for AmqpSettler {
    async fn settle(self: Box<Self>, disposition: Disposition) -> Result<()> {
        let requeue = match disposition {
            Disposition::Ack => {
                self.acker.ack(BasicAckOptions::default()).await?;
                return Ok(());
            }
            Disposition::NackRequeue => true,
            Disposition::NackDrop => {
                warn!("Dropping message without requeue");
                false
            }
        };
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await?;
        Ok(())
    }
}
