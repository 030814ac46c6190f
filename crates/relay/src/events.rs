use anyhow::Result;
use codetrack_core::domain::{DeliveryId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// 提交被丢弃的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// 扩展已被用户关闭。
    Disabled,
    /// 尚未设置用户 ID。
    Unidentified,
    /// 去重窗口内的重复上报。
    Duplicate,
}

/// 中继对外广播的事件类型。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// 本地状态发生变更。
    StateChanged {
        /// 当前用户 ID。
        user_id: Option<UserId>,
        /// 是否启用中继。
        enabled: bool,
    },
    /// 状态持久化失败，内存状态仍然生效。
    PersistenceFailed {
        /// 错误描述。
        error: String,
    },
    /// 提交因门控或去重被丢弃。
    SubmissionDropped {
        /// 题目标识。
        problem: String,
        /// 丢弃原因。
        reason: DropReason,
    },
    /// 提交已交给后台任务投递。
    DeliveryDispatched {
        /// 投递 ID。
        delivery_id: DeliveryId,
        /// 题目标识。
        problem: String,
    },
    /// 投递成功。
    DeliverySucceeded {
        /// 投递 ID。
        delivery_id: DeliveryId,
        /// 服务端返回的记录 ID。
        server_id: Option<String>,
    },
    /// 投递失败，提交不会重试。
    DeliveryFailed {
        /// 投递 ID。
        delivery_id: DeliveryId,
        /// 失败原因。
        reason: String,
    },
}

/// 基于 `tokio::broadcast` 的事件广播器。
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<RelayEvent>,
}

impl EventBroadcaster {
    /// 创建事件广播器。
    ///
    /// `capacity` 表示内部广播队列容量。
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 广播一个事件，没有订阅者时直接丢弃。
    pub fn emit(&self, event: RelayEvent) {
        let _ = self.sender.send(event);
    }

    /// 订阅事件流。
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }
}

/// 事件接收流包装器。
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<RelayEvent>,
}

impl EventStream {
    /// 异步接收下一条事件。
    pub async fn recv(&mut self) -> Result<RelayEvent> {
        Ok(self.receiver.recv().await?)
    }

    /// 接收下一条事件，落后时跳过丢失的事件继续接收。
    ///
    /// 仅在广播器全部关闭后返回 `None`。
    pub async fn next_event(&mut self) -> Option<RelayEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, skipping events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞尝试接收一条事件。
    pub fn try_recv(&mut self) -> Result<RelayEvent> {
        Ok(self.receiver.try_recv()?)
    }
}
