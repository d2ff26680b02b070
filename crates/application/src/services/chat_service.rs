use std::sync::Arc;
use std::time::Duration;

use domain::{ChatMessage, MessageId, UserId};
use serde::Deserialize;

use crate::{
    clock::Clock,
    error::ApplicationError,
    registry::{ConnectionRegistry, Outbox, Registration},
    repository::MessageRepository,
};

use super::bounded;

/// 客户端发来的聊天帧：`{"receiver_id": "<hex id>", "message": "..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub receiver_id: String,
    pub message: String,
}

/// 解析入站帧，返回接收者和正文
pub fn decode_frame(payload: &[u8]) -> Result<(UserId, String), ApplicationError> {
    let frame: InboundFrame = serde_json::from_slice(payload)
        .map_err(|err| ApplicationError::malformed_frame(format!("invalid payload: {err}")))?;
    let receiver_id = UserId::parse(&frame.receiver_id)
        .map_err(|_| ApplicationError::malformed_frame("invalid receiver_id"))?;
    Ok((receiver_id, frame.message))
}

/// 一次实时投递的结果，仅用于日志和测试，不回传给发送方
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    RecipientOffline,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Dispatched {
    pub message: ChatMessage,
    pub persisted: bool,
    pub delivery: Delivery,
}

pub struct ChatServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub registry: Arc<ConnectionRegistry>,
    pub clock: Arc<dyn Clock>,
    /// 每个连接出站队列的容量
    pub outbound_buffer: usize,
    pub store_timeout: Duration,
    pub delivery_timeout: Duration,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.deps.registry
    }

    /// 为已认证用户登记一条实时连接
    pub fn open_session(&self, user_id: UserId) -> (Registration, Outbox) {
        self.deps
            .registry
            .open_session(user_id, self.deps.outbound_buffer)
    }

    /// 处理一条入站帧：先存储，再尝试实时投递。
    ///
    /// 只有帧无法解析时返回错误；存储和投递的失败各自记录日志，互不影响。
    pub async fn dispatch(
        &self,
        sender_id: UserId,
        payload: &[u8],
    ) -> Result<Dispatched, ApplicationError> {
        let (receiver_id, body) = decode_frame(payload)?;

        let message = ChatMessage::new(
            MessageId::generate(),
            sender_id,
            receiver_id,
            body,
            self.deps.clock.now().timestamp(),
        );

        let persisted = self.persist(&message).await;
        let delivery = self.deliver(&message).await;

        Ok(Dispatched {
            message,
            persisted,
            delivery,
        })
    }

    async fn persist(&self, message: &ChatMessage) -> bool {
        let result = bounded(
            "message append",
            self.deps.store_timeout,
            self.deps.message_repository.append(message.clone()),
        )
        .await;

        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    message_id = %message.id,
                    sender_id = %message.sender_id,
                    error = %err,
                    "failed to store chat message"
                );
                false
            }
        }
    }

    async fn deliver(&self, message: &ChatMessage) -> Delivery {
        // 锁只在 lookup 内持有，入队发生在锁外
        let Some(handle) = self.deps.registry.lookup(message.receiver_id) else {
            tracing::debug!(receiver_id = %message.receiver_id, "recipient offline");
            return Delivery::RecipientOffline;
        };

        match handle
            .deliver(message.clone(), self.deps.delivery_timeout)
            .await
        {
            Ok(()) => Delivery::Delivered,
            Err(err) => {
                tracing::warn!(
                    message_id = %message.id,
                    receiver_id = %message.receiver_id,
                    error = %err,
                    "failed to deliver chat message"
                );
                Delivery::Failed(err.to_string())
            }
        }
    }

    /// 查询两名用户之间的全部消息，最新在前
    pub async fn history(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<Vec<ChatMessage>, ApplicationError> {
        bounded(
            "message history",
            self.deps.store_timeout,
            self.deps.message_repository.find_between(requester, target),
        )
        .await
        .inspect_err(|err| {
            tracing::error!(
                requester = %requester,
                target = %target,
                error = %err,
                "failed to fetch messages"
            );
        })
    }
}
