//! Message handling loop
//!
//! A [`MessageHandler`] never settles deliveries itself. It inspects a
//! payload and returns the [`Disposition`] the loop settles it with. Any side
//! effect a message triggers has to finish inside `handle`, so a failure can
//! still turn into a requeue.

use crate::broker::{Disposition, Subscription};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-queue message handler
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// `redelivered` is set when the broker has handed this message out
    /// before, so an earlier attempt may have partly completed
    async fn handle(&self, payload: &[u8], redelivered: bool) -> Disposition;
}

/// Drive `subscription` until it ends, one message at a time
///
/// Returns the number of messages handled. The subscription ends when the
/// broker connection goes away or the server cancels the consumer;
/// restarting is the supervisor's job.
pub async fn run_consumer<H: MessageHandler>(
    name: &str,
    mut subscription: Subscription,
    handler: Arc<H>,
) -> u64 {
    let mut handled_count = 0;
    info!("Consumer '{}' started", name);

    while let Some(item) = subscription.next().await {
        let delivery = match item {
            Ok(delivery) => delivery,
            Err(e) => {
                warn!("Consumer '{}' stream error: {}", name, e);
                break;
            }
        };

        let redelivered = delivery.redelivered();
        if redelivered {
            debug!("Consumer '{}' received a redelivery", name);
        }

        let disposition = handler.handle(delivery.payload(), redelivered).await;
        handled_count += 1;

        match delivery.settle(disposition).await {
            Ok(()) => debug!("Consumer '{}' settled message with {:?}", name, disposition),
            Err(e) => {
                warn!("Consumer '{}' failed to settle message: {}", name, e);
                break;
            }
        }
    }

    info!("Consumer '{}' stopped after {} message(s)", name, handled_count);
    handled_count
}
