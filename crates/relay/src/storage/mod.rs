//! 持久化状态存储。
//!
//! 中继只持久化两个键：`userId` 与 `extensionEnabled`。键名属于持久化契约，
//! 修改后将导致重启后无法恢复之前的状态。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// 用户 ID 的持久化键名。
pub const USER_ID_KEY: &str = "userId";
/// 启用开关的持久化键名。
pub const ENABLED_KEY: &str = "extensionEnabled";

/// 键值映射。写入时 `Value::Null` 表示删除该键。
pub type StateEntries = HashMap<String, Value>;

/// 持久化键值存储接口。
#[async_trait]
pub trait PersistentState: Send + Sync {
    /// 读取指定键，不存在的键不会出现在返回结果中。
    async fn get(&self, keys: &[&str]) -> Result<StateEntries>;

    /// 写入键值，只有在底层存储确认后才返回。
    async fn set(&self, entries: StateEntries) -> Result<()>;
}

fn merge_entries(document: &mut serde_json::Map<String, Value>, entries: StateEntries) {
    for (key, value) in entries {
        if value.is_null() {
            document.remove(&key);
        } else {
            document.insert(key, value);
        }
    }
}

fn select_entries(document: &serde_json::Map<String, Value>, keys: &[&str]) -> StateEntries {
    keys.iter()
        .filter_map(|key| {
            document
                .get(*key)
                .map(|value| ((*key).to_string(), value.clone()))
        })
        .collect()
}
