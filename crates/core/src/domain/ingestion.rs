use async_trait::async_trait;

use super::{Submission, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered { server_id: Option<String> },
    Failed { reason: String },
}

impl DeliveryResult {
    pub fn delivered(server_id: Option<String>) -> Self {
        Self::Delivered { server_id }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

#[async_trait]
pub trait IngestionClient: Send + Sync {
    async fn send(&self, submission: &Submission, user_id: &UserId) -> DeliveryResult;
}
