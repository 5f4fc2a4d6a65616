//! Reconnect supervisor
//!
//! A background task that checks the broker link on a fixed interval and
//! re-initializes it when it is down. After every successful (re)connect the
//! `on_connected` hook runs so the service can restart its consumer, since
//! consumers die with the connection that carried them.
//!
//! A consumer can also stop while the link stays up (a server-side cancel,
//! a stream error). The supervisor treats that like a lost link: it tears the
//! connection down and builds everything again.

use super::ConnectionManager;
use crate::config::ReconnectPolicy;
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Spawn the supervisor task
///
/// `on_connected` returns the handle of the consumer it started. The first
/// connection attempt happens immediately. The task runs until it is
/// aborted; there is no retry cap.
pub fn spawn_supervisor<B, F, Fut>(
    broker: Arc<B>,
    policy: ReconnectPolicy,
    on_connected: F,
) -> JoinHandle<()>
where
    B: ConnectionManager + 'static,
    F: Fn(Arc<B>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JoinHandle<u64>>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut attempt: u64 = 0;
        let mut consumer: Option<JoinHandle<u64>> = None;
        loop {
            if consumer.as_ref().is_some_and(JoinHandle::is_finished) {
                consumer = None;
                if broker.is_connected().await {
                    warn!("Consumer stopped while the broker link was up; reconnecting");
                    broker.teardown().await;
                }
            }

            if !broker.is_connected().await {
                if let Some(stale) = consumer.take() {
                    stale.abort();
                }
                attempt += 1;
                match broker.initialize().await {
                    Ok(()) => {
                        info!("Broker link established (attempt {})", attempt);
                        attempt = 0;
                        match on_connected(broker.clone()).await {
                            Ok(handle) => consumer = Some(handle),
                            Err(e) => {
                                error!("Post-connect setup failed: {}", e);
                                broker.teardown().await;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Broker connection attempt {} failed: {}; retrying in {:?}",
                            attempt, e, policy.interval
                        );
                    }
                }
            }
            tokio::time::sleep(policy.interval).await;
        }
    })
}
