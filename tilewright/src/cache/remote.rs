//! Remote blob cache stored in Redis.
//!
//! Each tile is a hash at `{prefix}:{namespace}:{tile_key}` with two fields:
//! `data` (raw payload) and `headers` (JSON object). Hashes carry an
//! `EXPIRE` when a TTL is configured. Namespace resets walk the keyspace with
//! `SCAN MATCH` so the server is never blocked by `KEYS`.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::cache::blob::BlobCache;
use crate::error::{TileError, TileResult};
use crate::tile::{Tile, TileHeaders};

const DATA_FIELD: &str = "data";
const HEADERS_FIELD: &str = "headers";
const SCAN_BATCH: usize = 500;

/// [`BlobCache`] backed by a shared Redis server.
#[derive(Clone)]
pub struct RedisBlobCache {
    conn: ConnectionManager,
    key_prefix: String,
    ttl: Option<Duration>,
}

impl RedisBlobCache {
    /// Connects to `url`, e.g. `redis://127.0.0.1/`.
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        ttl: Option<Duration>,
    ) -> TileResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let key_prefix = key_prefix.into();
        info!(url, prefix = %key_prefix, "Connected to Redis blob cache");

        Ok(Self {
            conn,
            key_prefix,
            ttl,
        })
    }

    fn key(&self, namespace: &str, tile_key: &str) -> String {
        redis_key(&self.key_prefix, namespace, tile_key)
    }

    async fn delete_matching(&self, pattern: &str) -> TileResult<usize> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let _: () = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                deleted += keys.len();
            }

            if next == 0 {
                return Ok(deleted);
            }
            cursor = next;
        }
    }
}

impl BlobCache for RedisBlobCache {
    fn get<'a>(
        &'a self,
        namespace: &'a str,
        tile_key: &'a str,
    ) -> BoxFuture<'a, TileResult<Option<Tile>>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let fields: HashMap<String, Vec<u8>> = redis::cmd("HGETALL")
                .arg(self.key(namespace, tile_key))
                .query_async(&mut conn)
                .await?;
            decode_tile(fields)
        })
    }

    fn set<'a>(
        &'a self,
        namespace: &'a str,
        tile_key: &'a str,
        tile: &'a Tile,
    ) -> BoxFuture<'a, TileResult<()>> {
        Box::pin(async move {
            let key = self.key(namespace, tile_key);
            let headers = serde_json::to_vec(&tile.headers)
                .map_err(|e| TileError::CacheBackend(format!("encoding headers: {}", e)))?;

            let mut pipe = redis::pipe();
            pipe.atomic()
                .cmd("HSET")
                .arg(&key)
                .arg(DATA_FIELD)
                .arg(tile.data.as_ref())
                .arg(HEADERS_FIELD)
                .arg(headers)
                .ignore();
            if let Some(ttl) = self.ttl {
                pipe.cmd("EXPIRE").arg(&key).arg(ttl.as_secs().max(1)).ignore();
            }

            let mut conn = self.conn.clone();
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
    }

    fn reset<'a>(
        &'a self,
        namespace: &'a str,
        tile_key: Option<&'a str>,
    ) -> BoxFuture<'a, TileResult<()>> {
        Box::pin(async move {
            match tile_key {
                Some(tile_key) => {
                    let mut conn = self.conn.clone();
                    let _: () = redis::cmd("DEL")
                        .arg(self.key(namespace, tile_key))
                        .query_async(&mut conn)
                        .await?;
                }
                None => {
                    let pattern = namespace_pattern(&self.key_prefix, namespace);
                    let deleted = self.delete_matching(&pattern).await?;
                    debug!(namespace, deleted, "Reset Redis blob namespace");
                }
            }
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "redis"
    }
}

fn redis_key(prefix: &str, namespace: &str, tile_key: &str) -> String {
    format!("{}:{}:{}", prefix, namespace, tile_key)
}

/// `SCAN MATCH` pattern for every key of `namespace`, with glob
/// metacharacters in the literal parts escaped.
fn namespace_pattern(prefix: &str, namespace: &str) -> String {
    format!("{}:{}:*", escape_glob(prefix), escape_glob(namespace))
}

fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn decode_tile(mut fields: HashMap<String, Vec<u8>>) -> TileResult<Option<Tile>> {
    let Some(data) = fields.remove(DATA_FIELD) else {
        return Ok(None);
    };
    let headers: TileHeaders = match fields.remove(HEADERS_FIELD) {
        Some(raw) => serde_json::from_slice(&raw)
            .map_err(|e| TileError::CacheBackend(format!("decoding headers: {}", e)))?,
        None => TileHeaders::new(),
    };

    Ok(Some(Tile {
        data: Bytes::from(data),
        headers,
    }))
}
