//! 提交上报客户端。
//!
//! 每次调用只发起一次 `POST {api_base}/submissions`，所有失败都以
//! [`DeliveryResult::Failed`] 返回，不做重试。

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use codetrack_api_types::{ErrorResponse, SubmissionRecord, server_id_from_body};
use codetrack_core::domain::{DeliveryResult, IngestionClient, Submission, UserId};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::RelayConfig;
use crate::error::Result;

/// 基于 reqwest 的上报客户端。
#[derive(Debug, Clone)]
pub struct HttpIngestionClient {
    client: Client,
    endpoint: String,
}

impl HttpIngestionClient {
    /// 创建客户端，`timeout` 覆盖连接、发送与读取响应的全过程。
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/submissions", api_base.trim_end_matches('/')),
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        Self::new(&config.api_base, config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, record: &SubmissionRecord) -> DeliveryResult {
        let response = match self.client.post(&self.endpoint).json(record).send().await {
            Ok(response) => response,
            Err(err) => return DeliveryResult::failed(describe_transport_error(&err)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return DeliveryResult::failed(describe_transport_error(&err)),
        };

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|error| error.message)
                .unwrap_or_default();
            return if detail.is_empty() {
                DeliveryResult::failed(format!("http status {}", status.as_u16()))
            } else {
                DeliveryResult::failed(format!("http status {}: {detail}", status.as_u16()))
            };
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => DeliveryResult::delivered(server_id_from_body(&value)),
            Err(err) => DeliveryResult::failed(format!("invalid response body: {err}")),
        }
    }
}

#[async_trait]
impl IngestionClient for HttpIngestionClient {
    async fn send(&self, submission: &Submission, user_id: &UserId) -> DeliveryResult {
        let record = SubmissionRecord::new(
            submission.clone(),
            user_id.clone(),
            Utc::now().timestamp_millis(),
        );

        debug!(
            endpoint = %self.endpoint,
            problem = submission.problem_key(),
            platform = %submission.platform,
            "posting submission"
        );

        let result = self.post(&record).await;
        if let DeliveryResult::Failed { reason } = &result {
            warn!(endpoint = %self.endpoint, reason = %reason, "submission delivery failed");
        }
        result
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    }
}
