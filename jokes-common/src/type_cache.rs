//! Locally persisted taxonomy replica
//!
//! Each subscriber service keeps its own copy of the type list on disk so it
//! can answer `/types` without the broker or the store. The cache changes only
//! when a [`TypeUpdateEvent`] arrives; every event fully replaces the list.

use crate::broker::{Broker, Disposition};
use crate::consumer::{run_consumer, MessageHandler};
use crate::messages::{normalize_type, TypeUpdateEvent};
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Taxonomy used before the first broadcast ever arrives
pub const DEFAULT_TYPES: &[&str] = &["general", "programming", "knock-knock", "dad"];

/// Disk-backed type list
#[derive(Debug)]
pub struct TypeCache {
    path: PathBuf,
    types: RwLock<Vec<String>>,
}

impl TypeCache {
    /// Load the cache file, or bootstrap it with [`DEFAULT_TYPES`]
    ///
    /// A file that cannot be parsed is replaced with the defaults.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let types = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(types) => {
                    info!("Loaded {} cached type(s) from {}", types.len(), path.display());
                    Some(types)
                }
                Err(e) => {
                    warn!(
                        "Type cache {} is corrupt ({}); resetting to defaults",
                        path.display(),
                        e
                    );
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let types = match types {
            Some(types) => types,
            None => {
                let defaults: Vec<String> = DEFAULT_TYPES.iter().map(|t| t.to_string()).collect();
                persist(&path, &defaults).await?;
                info!("Bootstrapped type cache at {}", path.display());
                defaults
            }
        };

        Ok(Self {
            path,
            types: RwLock::new(types),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current type list
    pub async fn snapshot(&self) -> Vec<String> {
        self.types.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.types.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.types.read().await.is_empty()
    }

    /// Replace the whole list, on disk first and then in memory
    ///
    /// Names are lower-cased and de-duplicated, keeping first occurrence
    /// order. If the disk write fails the in-memory list is left unchanged.
    pub async fn replace(&self, types: Vec<String>) -> Result<()> {
        let mut normalized: Vec<String> = Vec::with_capacity(types.len());
        for name in types {
            let name = normalize_type(&name);
            if !name.is_empty() && !normalized.contains(&name) {
                normalized.push(name);
            }
        }

        let mut current = self.types.write().await;
        persist(&self.path, &normalized).await?;
        *current = normalized;
        Ok(())
    }
}

/// Write through a temp file and rename so readers never see a partial file
async fn persist(path: &Path, types: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(types)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Applies taxonomy broadcasts to a [`TypeCache`]
pub struct TypeCacheUpdater {
    cache: Arc<TypeCache>,
}

impl TypeCacheUpdater {
    pub fn new(cache: Arc<TypeCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl MessageHandler for TypeCacheUpdater {
    async fn handle(&self, payload: &[u8], _redelivered: bool) -> Disposition {
        let event = match TypeUpdateEvent::from_bytes(payload) {
            Ok(event) => event,
            Err(e) => {
                // Acknowledge and drop; never fatal
                warn!("Discarding type update: {}", e);
                return Disposition::Ack;
            }
        };

        let count = event.types.len();
        match self.cache.replace(event.types).await {
            Ok(()) => {
                info!(
                    "Type cache replaced with {} type(s) (event at {})",
                    count, event.timestamp
                );
                Disposition::Ack
            }
            Err(e) => {
                error!("Failed to persist type cache: {}", e);
                Disposition::NackRequeue
            }
        }
    }
}

/// Subscribe `cache` to a private taxonomy queue and spawn the consumer
pub async fn start_cache_subscriber(
    broker: &dyn Broker,
    queue: &str,
    consumer_tag: &str,
    cache: Arc<TypeCache>,
) -> Result<JoinHandle<u64>> {
    let subscription = broker.consume(queue, consumer_tag).await?;
    let handler = Arc::new(TypeCacheUpdater::new(cache));
    let name = format!("type-cache:{}", queue);
    Ok(tokio::spawn(async move {
        run_consumer(&name, subscription, handler).await
    }))
}
