use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{PersistentState, StateEntries, merge_entries, select_entries};
use crate::error::{RelayError, Result};

/// 以单个 JSON 对象文件保存状态。
///
/// 每次写入都会先写临时文件再重命名覆盖，避免进程中断时留下半个文件。
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(document) => Ok(document),
            other => Err(RelayError::Storage(format!(
                "{} does not contain a JSON object (found {})",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// 将无法解析的状态文件移到 `*.corrupt`，后续写入从空文档开始。
    async fn quarantine(&self, err: &RelayError) {
        let corrupt_path = self.sibling(".corrupt");
        warn!(
            path = %self.path.display(),
            corrupt_path = %corrupt_path.display(),
            error = %err,
            "state file is unreadable, starting from an empty document"
        );
        if let Err(rename_err) = tokio::fs::rename(&self.path, &corrupt_path).await {
            warn!(error = %rename_err, "failed to move unreadable state file aside");
        }
    }

    async fn store(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.sibling(".tmp");

        let bytes = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(path = %self.path.display(), keys = document.len(), "state file written");
        Ok(())
    }
}

#[async_trait]
impl PersistentState for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<StateEntries> {
        let document = self.load().await?;
        Ok(select_entries(&document, keys))
    }

    async fn set(&self, entries: StateEntries) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = match self.load().await {
            Ok(document) => document,
            Err(err @ (RelayError::Json(_) | RelayError::Storage(_))) => {
                self.quarantine(&err).await;
                Map::new()
            }
            Err(err) => return Err(err),
        };
        merge_entries(&mut document, entries);
        self.store(&document).await
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::{ENABLED_KEY, USER_ID_KEY};

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = JsonFileStore::new(dir.path().join("state.json"));

        let entries = store
            .get(&[USER_ID_KEY, ENABLED_KEY])
            .await
            .expect("missing file should read as empty");
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested").join("state.json");

        let store = JsonFileStore::new(&path);
        store
            .set(StateEntries::from([
                (USER_ID_KEY.to_string(), json!("u2")),
                (ENABLED_KEY.to_string(), json!(false)),
            ]))
            .await
            .expect("set should succeed");
        drop(store);

        let reopened = JsonFileStore::new(&path);
        let entries = reopened
            .get(&[USER_ID_KEY, ENABLED_KEY])
            .await
            .expect("get should succeed");
        assert_eq!(entries.get(USER_ID_KEY), Some(&json!("u2")));
        assert_eq!(entries.get(ENABLED_KEY), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_set_merges_and_removes_null() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = JsonFileStore::new(dir.path().join("state.json"));

        store
            .set(StateEntries::from([(USER_ID_KEY.to_string(), json!("u1"))]))
            .await
            .expect("first set should succeed");
        store
            .set(StateEntries::from([(ENABLED_KEY.to_string(), json!(true))]))
            .await
            .expect("second set should succeed");
        store
            .set(StateEntries::from([(USER_ID_KEY.to_string(), Value::Null)]))
            .await
            .expect("third set should succeed");

        let entries = store
            .get(&[USER_ID_KEY, ENABLED_KEY])
            .await
            .expect("get should succeed");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get(ENABLED_KEY), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_set_recovers_from_truncated_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"userId": "u1""#).expect("write fixture");

        let store = JsonFileStore::new(&path);
        assert!(store.get(&[USER_ID_KEY]).await.is_err());

        store
            .set(StateEntries::from([(USER_ID_KEY.to_string(), json!("u2"))]))
            .await
            .expect("set should replace the unreadable document");

        let reopened = JsonFileStore::new(&path);
        let entries = reopened
            .get(&[USER_ID_KEY, ENABLED_KEY])
            .await
            .expect("get should succeed after recovery");
        assert_eq!(entries.get(USER_ID_KEY), Some(&json!("u2")));
        assert_eq!(entries.get(ENABLED_KEY), None);

        let corrupt = std::fs::read_to_string(dir.path().join("state.json.corrupt"))
            .expect("unreadable file should be kept aside");
        assert_eq!(corrupt, r#"{"userId": "u1""#);
    }

    #[tokio::test]
    async fn test_set_replaces_non_object_document() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "true").expect("write fixture");

        let store = JsonFileStore::new(&path);
        store
            .set(StateEntries::from([(ENABLED_KEY.to_string(), json!(false))]))
            .await
            .expect("set should replace the non-object document");

        let entries = store.get(&[ENABLED_KEY]).await.expect("get should succeed");
        assert_eq!(entries.get(ENABLED_KEY), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_non_object_document_is_an_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "[1, 2, 3]").expect("write fixture");

        let store = JsonFileStore::new(&path);
        let err = store
            .get(&[USER_ID_KEY])
            .await
            .expect_err("array document should be rejected");

        match err {
            RelayError::Storage(message) => assert!(message.contains("array")),
            other => panic!("expected Storage error, got: {other:?}"),
        }
    }
}
