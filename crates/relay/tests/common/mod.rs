#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use codetrack_core::domain::{
    DeliveryResult, Difficulty, IngestionClient, Platform, Submission, SubmissionStatus, UserId,
};
use submission_relay::{
    EventBroadcaster, MemoryStore, PersistentState, RelayController, RelayError, Result,
    StateEntries,
};

#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub submission: Submission,
    pub user_id: UserId,
}

#[derive(Clone)]
pub struct MockIngestionClient {
    calls: Arc<Mutex<Vec<CapturedCall>>>,
    result: DeliveryResult,
}

impl MockIngestionClient {
    pub fn new() -> Self {
        Self::returning(DeliveryResult::delivered(Some("srv-1".to_string())))
    }

    pub fn returning(result: DeliveryResult) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            result,
        }
    }

    pub fn calls(&self) -> Vec<CapturedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl IngestionClient for MockIngestionClient {
    async fn send(&self, submission: &Submission, user_id: &UserId) -> DeliveryResult {
        self.calls.lock().expect("calls lock").push(CapturedCall {
            submission: submission.clone(),
            user_id: user_id.clone(),
        });
        self.result.clone()
    }
}

/// Reads succeed from the wrapped store, every write is rejected.
pub struct ReadOnlyStore {
    inner: MemoryStore,
}

impl ReadOnlyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PersistentState for ReadOnlyStore {
    async fn get(&self, keys: &[&str]) -> Result<StateEntries> {
        self.inner.get(keys).await
    }

    async fn set(&self, _entries: StateEntries) -> Result<()> {
        Err(RelayError::Storage("disk is read-only".to_string()))
    }
}

/// Every read fails, writes land in the wrapped store.
pub struct UnreadableStore {
    inner: MemoryStore,
}

impl UnreadableStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PersistentState for UnreadableStore {
    async fn get(&self, _keys: &[&str]) -> Result<StateEntries> {
        Err(RelayError::Storage("state file is locked".to_string()))
    }

    async fn set(&self, entries: StateEntries) -> Result<()> {
        self.inner.set(entries).await
    }
}

pub fn two_sum() -> Submission {
    Submission::new(
        "Two Sum",
        Platform::LeetCode,
        "python",
        Difficulty::Easy,
        SubmissionStatus::Accepted,
    )
}

pub fn problem(title: &str) -> Submission {
    Submission::new(
        title,
        Platform::Codeforces,
        "cpp",
        Difficulty::Medium,
        SubmissionStatus::WrongAnswer,
    )
}

pub async fn controller_with(
    store: Arc<dyn PersistentState>,
    client: &MockIngestionClient,
) -> RelayController {
    RelayController::hydrate(
        store,
        Arc::new(client.clone()),
        Arc::new(EventBroadcaster::new(64)),
    )
    .await
}
