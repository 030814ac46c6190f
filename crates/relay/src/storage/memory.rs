use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{PersistentState, StateEntries, merge_entries, select_entries};
use crate::error::Result;

/// 进程内存储，进程退出后状态丢失。
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: RwLock<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用预置数据创建存储。
    pub fn with_entries(entries: StateEntries) -> Self {
        let mut document = Map::new();
        merge_entries(&mut document, entries);
        Self {
            document: RwLock::new(document),
        }
    }
}

#[async_trait]
impl PersistentState for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StateEntries> {
        let document = self.document.read().await;
        Ok(select_entries(&document, keys))
    }

    async fn set(&self, entries: StateEntries) -> Result<()> {
        let mut document = self.document.write().await;
        merge_entries(&mut document, entries);
        Ok(())
    }
}
