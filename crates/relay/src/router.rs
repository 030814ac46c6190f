//! 消息路由。
//!
//! 路由器是业务错误转换为类型化响应的唯一位置：处理器返回的错误和
//! panic 都会被捕获并转换为 `{"success":false,"error":...}`，每条消息
//! 恰好产生一次响应。

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::controller::RelayController;
use crate::error::{RelayError, Result};
use crate::protocol::{InboundMessage, OutboundResponse};

/// 一次性响应回调，`respond` 消耗自身，因此最多只能调用一次。
pub struct Responder {
    callback: Box<dyn FnOnce(OutboundResponse) + Send>,
}

impl Responder {
    pub fn new(callback: impl FnOnce(OutboundResponse) + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// 创建一个通过 oneshot 通道交付响应的回调。
    pub fn channel() -> (Self, oneshot::Receiver<OutboundResponse>) {
        let (tx, rx) = oneshot::channel();
        let responder = Self::new(move |response| {
            let _ = tx.send(response);
        });
        (responder, rx)
    }

    pub fn respond(self, response: OutboundResponse) {
        (self.callback)(response);
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder").finish_non_exhaustive()
    }
}

/// 消息处理器抽象。
#[async_trait]
pub trait MessageHandler: Send {
    /// 处理一条消息。返回的错误由路由器转换为失败响应。
    async fn handle(&mut self, message: InboundMessage) -> Result<OutboundResponse>;

    /// 路由器停止时调用，用于等待未完成的后台任务。
    async fn shutdown(&mut self) {}
}

#[async_trait]
impl MessageHandler for RelayController {
    async fn handle(&mut self, message: InboundMessage) -> Result<OutboundResponse> {
        RelayController::handle(self, message).await
    }

    async fn shutdown(&mut self) {
        let pending = self.in_flight();
        if pending > 0 {
            info!(pending, "waiting for in-flight deliveries");
        }
        self.drain().await;
    }
}

/// 按到达顺序逐条分发消息的路由器。
pub struct MessageRouter<H> {
    handler: H,
}

impl<H: MessageHandler> MessageRouter<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_inner(self) -> H {
        self.handler
    }

    /// 分发消息并恰好调用一次 `responder`。
    pub async fn dispatch(&mut self, message: InboundMessage, responder: Responder) {
        let kind = message.kind();
        let outcome = AssertUnwindSafe(self.handler.handle(message))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(kind, error = %err, "message handler failed");
                OutboundResponse::error(err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(kind, panic = %message, "message handler panicked");
                OutboundResponse::error(format!("handler panicked: {message}"))
            }
        };

        debug!(kind, success = response.is_success(), "responding");
        responder.respond(response);
    }

    /// 先解码 JSON 再分发，解码失败同样产生一次失败响应。
    pub async fn dispatch_json(&mut self, raw: &str, responder: Responder) {
        match serde_json::from_str::<InboundMessage>(raw) {
            Ok(message) => self.dispatch(message, responder).await,
            Err(err) => {
                warn!(error = %err, "failed to decode inbound message");
                responder.respond(OutboundResponse::error(format!("invalid message: {err}")));
            }
        }
    }

    /// 分发消息并直接返回响应。
    pub async fn request(&mut self, message: InboundMessage) -> OutboundResponse {
        let (responder, rx) = Responder::channel();
        self.dispatch(message, responder).await;
        rx.await
            .unwrap_or_else(|_| OutboundResponse::error("responder dropped"))
    }

    /// 将路由器移入后台任务。
    ///
    /// 所有 [`RouterHandle`] 被丢弃后，任务调用处理器的 `shutdown` 并返回处理器。
    pub fn spawn(self, capacity: usize) -> (RouterHandle, JoinHandle<H>)
    where
        H: 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<Envelope>(capacity);
        let mut router = self;

        let task = tokio::spawn(async move {
            while let Some(Envelope { request, responder }) = receiver.recv().await {
                match request {
                    Request::Message(message) => router.dispatch(message, responder).await,
                    Request::Raw(raw) => router.dispatch_json(&raw, responder).await,
                }
            }

            info!("router queue closed, shutting down handler");
            router.handler.shutdown().await;
            router.handler
        });

        (RouterHandle { sender }, task)
    }
}

enum Request {
    Message(InboundMessage),
    Raw(String),
}

struct Envelope {
    request: Request,
    responder: Responder,
}

/// 向后台路由任务提交消息的句柄。
#[derive(Clone)]
pub struct RouterHandle {
    sender: mpsc::Sender<Envelope>,
}

impl RouterHandle {
    pub async fn request(&self, message: InboundMessage) -> Result<OutboundResponse> {
        self.submit(Request::Message(message)).await
    }

    pub async fn request_json(&self, raw: impl Into<String>) -> Result<OutboundResponse> {
        self.submit(Request::Raw(raw.into())).await
    }

    async fn submit(&self, request: Request) -> Result<OutboundResponse> {
        let (responder, rx) = Responder::channel();
        self.sender
            .send(Envelope { request, responder })
            .await
            .map_err(|_| RelayError::RouterClosed)?;
        rx.await.map_err(|_| RelayError::RouterClosed)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
