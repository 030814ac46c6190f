//! 观察层与中继之间的消息协议。

use codetrack_core::domain::{Submission, UserId};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// 未知消息类型的固定错误描述。
pub const UNKNOWN_MESSAGE_TYPE: &str = "Unknown message type";

/// 观察层发送给中继的消息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    /// 检测到一次提交。
    SubmissionDetected { data: Submission },
    /// 查询当前用户 ID。
    GetUserId,
    /// 设置用户 ID。
    SetUserId {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// 启用或关闭中继。
    ToggleExtension { enabled: bool },
    /// 无法识别的 `type`。
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// 用于日志的消息类型名。
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubmissionDetected { .. } => "SUBMISSION_DETECTED",
            Self::GetUserId => "GET_USER_ID",
            Self::SetUserId { .. } => "SET_USER_ID",
            Self::ToggleExtension { .. } => "TOGGLE_EXTENSION",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// 中继对每条消息给出的唯一响应。
///
/// 序列化形式：
/// - `Ok` → `{"success":true}`
/// - `UserId` → `{"success":true,"userId":<string|null>}`
/// - `Error` → `{"success":false,"error":<string>}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundResponse {
    Ok,
    UserId(Option<UserId>),
    Error(String),
}

impl OutboundResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error(_))
    }
}

impl Serialize for OutboundResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ok => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("success", &true)?;
                map.end()
            }
            Self::UserId(user_id) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry("userId", user_id)?;
                map.end()
            }
            Self::Error(error) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}
