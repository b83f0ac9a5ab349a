use redis::AsyncCommands;
use redis::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Display;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::error::AppResult;
use crate::models::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Final recommendation list of one user
    Recommendations(UserId),
}

impl CacheKey {
    /// Counter bumped on every invalidation of this key
    fn generation_key(&self) -> String {
        format!("gen:{}", self)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendations(user_id) => write!(f, "recs:{}", user_id),
        }
    }
}

/// Invalidation count of a key at the time its value was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(pub u64);

/// Outcome of [`Cache::lookup`]
#[derive(Debug, PartialEq)]
pub enum Lookup<T> {
    /// Value stored under the key's current generation
    Hit(T),
    /// No usable value. A fresh one may be stored under the carried
    /// generation; `None` means Redis could not be read and nothing is written.
    Miss(Option<Generation>),
}

/// Stored form of a cached value
#[derive(Serialize, Deserialize)]
struct Stamped<T> {
    generation: u64,
    value: T,
}

/// Decodes a stored entry, keeping it only if it was written under `current`
fn unstamp<T: DeserializeOwned>(raw: Option<&str>, current: Generation) -> Option<T> {
    let stamped: Stamped<T> = match serde_json::from_str(raw?) {
        Ok(stamped) => stamped,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding undecodable cache entry");
            return None;
        }
    };

    if stamped.generation == current.0 {
        Some(stamped.value)
    } else {
        tracing::debug!(
            stored = stamped.generation,
            current = current.0,
            "Discarding cache entry from an older generation"
        );
        None
    }
}

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Work items for the cache writer task. Processed strictly in send order.
enum CacheCommand {
    Set {
        key: String,
        value: String,
        ttl: u64,
    },
    Invalidate {
        key: String,
        generation_key: String,
        done: oneshot::Sender<AppResult<()>>,
    },
}

/// Redis-backed result cache with a write-behind worker
///
/// Reads go straight to Redis; writes and invalidations are funnelled through
/// a single background task. Every value is stamped with the generation read
/// before it was computed, and invalidation bumps the generation, so a value
/// computed before an invalidation is never served after it.
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    command_tx: mpsc::UnboundedSender<CacheCommand>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    /// Signals the writer to flush queued commands and waits for it to stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");

        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task failed");
        }
    }
}

impl Cache {
    /// Creates a cache and spawns its writer task
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        let task = tokio::spawn(async move {
            Self::cache_writer_task(client, command_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            command_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx, task })
    }

    async fn cache_writer_task(
        client: Client,
        mut command_rx: mpsc::UnboundedReceiver<CacheCommand>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(command) = command_rx.recv() => {
                    Self::apply(&client, command).await;
                }
                Some(()) = shutdown_rx.recv() => {
                    tracing::info!("Cache writer shutting down, flushing queued commands");
                    command_rx.close();
                    while let Some(command) = command_rx.recv().await {
                        Self::apply(&client, command).await;
                    }
                    tracing::info!("Cache writer task stopped");
                    break;
                }
                else => break,
            }
        }
    }

    async fn apply(client: &Client, command: CacheCommand) {
        match command {
            CacheCommand::Set { key, value, ttl } => {
                if let Err(e) = Self::write_to_redis(client, &key, value, ttl).await {
                    tracing::error!(error = %e, key = %key, "Failed to write to Redis cache");
                }
            }
            CacheCommand::Invalidate {
                key,
                generation_key,
                done,
            } => {
                let result = Self::invalidate_in_redis(client, &key, &generation_key).await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, key = %key, "Failed to invalidate Redis cache key");
                }
                let _ = done.send(result);
            }
        }
    }

    async fn write_to_redis(client: &Client, key: &str, value: String, ttl: u64) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl).await?;
        Ok(())
    }

    async fn invalidate_in_redis(
        client: &Client,
        key: &str,
        generation_key: &str,
    ) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .incr(generation_key, 1)
            .ignore()
            .del(key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Reads a key together with its current generation.
    ///
    /// Connection failures are logged and reported as a miss, so a degraded
    /// cache never fails the request it sits in front of. Entries that do not
    /// decode or belong to an older generation are misses too.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Lookup<T> {
        let (generation, raw) = match self.read_stamped(key).await {
            Ok(read) => read,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Redis read failed, treating as miss");
                return Lookup::Miss(None);
            }
        };

        match unstamp(raw.as_deref(), generation) {
            Some(value) => Lookup::Hit(value),
            None => Lookup::Miss(Some(generation)),
        }
    }

    async fn read_stamped(&self, key: &CacheKey) -> AppResult<(Generation, Option<String>)> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let (generation, raw): (Option<u64>, Option<String>) = redis::pipe()
            .atomic()
            .get(key.generation_key())
            .get(key.to_string())
            .query_async(&mut conn)
            .await?;
        Ok((Generation(generation.unwrap_or(0)), raw))
    }

    /// Queues a value computed under `generation` without waiting for Redis
    pub fn set_in_background<T: Serialize>(
        &self,
        key: &CacheKey,
        generation: Generation,
        value: &T,
        ttl: u64,
    ) {
        let stamped = Stamped {
            generation: generation.0,
            value,
        };
        let json = match serde_json::to_string(&stamped) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let command = CacheCommand::Set {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if self.command_tx.send(command).is_err() {
            tracing::error!(key = %key, "Cache writer is gone, dropping write");
        }
    }

    /// Bumps the key's generation and deletes its value, once every write
    /// queued before this call has landed
    pub async fn invalidate(&self, key: &CacheKey) -> AppResult<()> {
        let (done, wait) = oneshot::channel();
        let command = CacheCommand::Invalidate {
            key: key.to_string(),
            generation_key: key.generation_key(),
            done,
        };

        self.command_tx
            .send(command)
            .map_err(|_| AppError::Internal("Cache writer is not running".to_string()))?;

        wait.await
            .map_err(|_| AppError::Internal("Cache writer dropped invalidation".to_string()))?
    }
}
