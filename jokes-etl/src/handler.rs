//! Moderated joke ingestion
//!
//! Per message from `MODERATED_QUESTIONS`:
//! 1. write the type and the joke as one unit, noting whether the type is new
//! 2. if the type is new, broadcast the full taxonomy
//! 3. ack once both steps succeeded, otherwise nack with requeue
//!
//! A redelivered message is broadcast even when its type already exists: the
//! earlier attempt may have created the type and then failed before the
//! broadcast went out. Broadcasts carry a full snapshot, so repeats are
//! harmless.
//!
//! Delivery is at least once. A crash or a failed broadcast between the
//! insert and the ack redelivers the message and stores the joke twice. Payloads that never
//! parse are requeued indefinitely; there is no dead-letter queue.

use async_trait::async_trait;
use jokes_common::broker::{Broker, Disposition, Route, MODERATED_QUEUE, TYPE_UPDATE_EXCHANGE};
use jokes_common::consumer::{run_consumer, MessageHandler};
use jokes_common::messages::{JokePayload, TypeUpdateEvent};
use jokes_common::store::JokeStore;
use jokes_common::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct ModeratedJokeHandler {
    store: Arc<dyn JokeStore>,
    broker: Arc<dyn Broker>,
}

impl ModeratedJokeHandler {
    pub fn new(store: Arc<dyn JokeStore>, broker: Arc<dyn Broker>) -> Self {
        Self { store, broker }
    }

    /// Write one approved joke; `true` when its type did not exist before
    pub async fn ingest(&self, joke: &JokePayload) -> Result<bool> {
        self.store
            .record_joke(&joke.joke_type, &joke.setup, &joke.punchline)
            .await
    }
}

#[async_trait]
impl MessageHandler for ModeratedJokeHandler {
    async fn handle(&self, payload: &[u8], redelivered: bool) -> Disposition {
        let joke = match JokePayload::from_bytes(payload) {
            Ok(joke) => joke,
            Err(e) => {
                warn!("Requeueing unreadable moderated message: {}", e);
                return Disposition::NackRequeue;
            }
        };

        let created = match self.ingest(&joke).await {
            Ok(created) => created,
            Err(e) => {
                error!(
                    "Failed to store joke of type '{}': {}; requeueing",
                    joke.joke_type, e
                );
                return Disposition::NackRequeue;
            }
        };
        info!("Stored joke of type '{}'", joke.joke_type);

        if created {
            info!("New joke type '{}'", joke.joke_type);
        } else if !redelivered {
            return Disposition::Ack;
        }

        match broadcast_taxonomy(self.store.as_ref(), self.broker.as_ref()).await {
            Ok(_) => Disposition::Ack,
            Err(e) => {
                error!(
                    "Taxonomy broadcast for '{}' failed: {}; requeueing",
                    joke.joke_type, e
                );
                Disposition::NackRequeue
            }
        }
    }
}

/// Publish the store's full type list to every cache subscriber
pub async fn broadcast_taxonomy(
    store: &dyn JokeStore,
    broker: &dyn Broker,
) -> Result<TypeUpdateEvent> {
    let event = TypeUpdateEvent::new(store.list_distinct_types().await?);
    broker
        .publish(Route::Fanout(TYPE_UPDATE_EXCHANGE), &event.to_bytes()?)
        .await?;
    info!("Broadcast taxonomy of {} type(s)", event.types.len());
    Ok(event)
}

/// Subscribe to `MODERATED_QUESTIONS` and spawn the ingest consumer
pub async fn start_ingest_consumer(
    broker: Arc<dyn Broker>,
    store: Arc<dyn JokeStore>,
    consumer_tag: &str,
) -> Result<JoinHandle<u64>> {
    let subscription = broker.consume(MODERATED_QUEUE, consumer_tag).await?;
    let handler = Arc::new(ModeratedJokeHandler::new(store, broker));
    Ok(tokio::spawn(async move {
        run_consumer("etl:moderated", subscription, handler).await
    }))
}
