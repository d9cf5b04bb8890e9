//! Token history used for duplicate detection.
//!
//! Valkey data model:
//!   token:{mint}        → JSON HistoryRecord
//!   name:{name}         → SET of mints created under that name
//!   creator:{creator}   → SET of mints created by that creator

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info};

/// One evaluated token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    /// Unix milliseconds.
    pub time: i64,
    pub mint: String,
    pub name: String,
    pub creator: String,
}

impl HistoryRecord {
    pub fn now(mint: &str, name: &str, creator: &str) -> Self {
        Self {
            time: chrono::Utc::now().timestamp_millis(),
            mint: mint.to_string(),
            name: name.to_string(),
            creator: creator.to_string(),
        }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Records whose name equals `name` or whose creator equals `creator`.
    async fn find(&self, name: &str, creator: &str) -> anyhow::Result<Vec<HistoryRecord>>;

    async fn insert(&self, record: &HistoryRecord) -> anyhow::Result<()>;
}

/// Process-local history, lost on restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn find(&self, name: &str, creator: &str) -> anyhow::Result<Vec<HistoryRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?;
        Ok(records
            .iter()
            .filter(|r| r.name == name || r.creator == creator)
            .cloned()
            .collect())
    }

    async fn insert(&self, record: &HistoryRecord) -> anyhow::Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

/// Valkey-backed history.
///
/// Keys are namespaced under a configurable prefix so several bots can share
/// one Valkey. Default prefix: "poolsnipe" → keys like "poolsnipe:token:{mint}".
#[derive(Clone)]
pub struct ValkeyHistoryStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl ValkeyHistoryStore {
    pub async fn connect(url: &str, prefix: &str) -> anyhow::Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(prefix = prefix, "connected to Valkey");
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    /// Build a namespaced key: "{prefix}:{suffix}"
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(response = %pong, "Valkey ping");
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for ValkeyHistoryStore {
    async fn find(&self, name: &str, creator: &str) -> anyhow::Result<Vec<HistoryRecord>> {
        let mut conn = self.conn.clone();
        let index_keys = vec![
            self.key(&format!("name:{}", name)),
            self.key(&format!("creator:{}", creator)),
        ];
        let mints: Vec<String> = conn.sunion(index_keys).await?;

        let mut records = Vec::with_capacity(mints.len());
        for mint in mints {
            let json: Option<String> = conn.get(self.key(&format!("token:{}", mint))).await?;
            if let Some(j) = json {
                if let Ok(record) = serde_json::from_str::<HistoryRecord>(&j) {
                    records.push(record);
                }
            }
        }
        debug!(name = %name, creator = %creator, matches = records.len(), "history lookup");
        Ok(records)
    }

    async fn insert(&self, record: &HistoryRecord) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;
        let _: () = redis::pipe()
            .atomic()
            .set(self.key(&format!("token:{}", record.mint)), &json)
            .ignore()
            .sadd(self.key(&format!("name:{}", record.name)), &record.mint)
            .ignore()
            .sadd(self.key(&format!("creator:{}", record.creator)), &record.mint)
            .ignore()
            .query_async(&mut conn)
            .await?;
        debug!(mint = %record.mint, name = %record.name, "history recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(mint: &str, name: &str, creator: &str) -> HistoryRecord {
        HistoryRecord {
            time: 0,
            mint: mint.to_string(),
            name: name.to_string(),
            creator: creator.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_find_matches_name_or_creator() {
        let store = MemoryHistoryStore::new();
        store.insert(&rec("M1", "Dog", "C1")).await.unwrap();
        store.insert(&rec("M2", "Cat", "C2")).await.unwrap();
        store.insert(&rec("M3", "Fox", "C1")).await.unwrap();

        let by_name = store.find("Cat", "nobody").await.unwrap();
        assert_eq!(by_name, vec![rec("M2", "Cat", "C2")]);

        let by_creator = store.find("nothing", "C1").await.unwrap();
        assert_eq!(by_creator.len(), 2);

        assert!(store.find("Emu", "C9").await.unwrap().is_empty());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_record_now_stamps_time() {
        let before = chrono::Utc::now().timestamp_millis();
        let r = HistoryRecord::now("M", "N", "C");
        assert!(r.time >= before);
        assert_eq!((r.mint.as_str(), r.name.as_str(), r.creator.as_str()), ("M", "N", "C"));
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(rec("M", "N", "C")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"time": 0, "mint": "M", "name": "N", "creator": "C"})
        );
    }
}
