//! 在线连接表
//!
//! 记录当前持有实时连接的用户，是“用户此刻是否可达”的唯一依据。
//! 每个用户最多一条记录；所有读写都在同一把互斥锁内完成，
//! 锁只覆盖 map 操作本身，向连接写数据发生在锁外。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use domain::{ChatMessage, UserId};
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::SendTimeoutError},
    Notify,
};
use uuid::Uuid;

pub type ConnectionId = Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("recipient outbound queue still full after {0:?}")]
    Timeout(Duration),
    #[error("recipient connection already closed")]
    Closed,
}

/// 指向某个会话出站队列的句柄。
///
/// 只有会话自己的写任务消费这个队列，因此跨会话投递只需入队，
/// 不会出现多个写者同时写同一条连接。
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<ChatMessage>,
    shutdown: Arc<Notify>,
}

impl ConnectionHandle {
    /// 创建一对句柄和出站队列
    pub fn channel(buffer: usize) -> (Self, Outbox) {
        let (sender, receiver) = mpsc::channel(buffer);
        let shutdown = Arc::new(Notify::new());
        let handle = Self {
            id: Uuid::new_v4(),
            sender,
            shutdown: shutdown.clone(),
        };
        (handle, Outbox { receiver, shutdown })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 入队一条消息，最多等待 `wait`
    pub async fn deliver(&self, message: ChatMessage, wait: Duration) -> Result<(), DeliveryError> {
        self.sender
            .send_timeout(message, wait)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => DeliveryError::Timeout(wait),
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
            })
    }

    /// 通知会话关闭连接（例如被同一用户的新连接取代）
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

}

/// 出站队列里取出的下一项
#[derive(Debug, PartialEq, Eq)]
pub enum Outgoing {
    Message(ChatMessage),
    Shutdown,
}

/// 会话写任务独占的出站队列
#[derive(Debug)]
pub struct Outbox {
    receiver: mpsc::Receiver<ChatMessage>,
    shutdown: Arc<Notify>,
}

impl Outbox {
    /// 关闭请求优先于排队中的消息；所有句柄都被丢弃时也返回 `Shutdown`
    pub async fn recv(&mut self) -> Outgoing {
        tokio::select! {
            biased;
            _ = self.shutdown.notified() => Outgoing::Shutdown,
            message = self.receiver.recv() => match message {
                Some(message) => Outgoing::Message(message),
                None => Outgoing::Shutdown,
            },
        }
    }
}

/// 进程级在线连接表，在启动时创建一次并注入到各个会话
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<UserId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<UserId, ConnectionHandle>> {
        // map 操作不会在中途 panic，毒化后数据依然一致
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 插入或替换用户的连接，返回被替换的旧句柄（不会主动关闭它）
    pub fn register(&self, user_id: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.entries().insert(user_id, handle)
    }

    /// 移除用户的连接；不存在时什么也不做
    pub fn unregister(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.entries().remove(&user_id)
    }

    /// 只有当前记录仍是 `connection_id` 时才移除，避免误删更新的连接
    pub fn unregister_connection(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut entries = self.entries();
        match entries.get(&user_id) {
            Some(current) if current.id() == connection_id => {
                entries.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// 返回的句柄可能随时失效，调用方需把投递失败当作“不在线”处理
    pub fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.entries().get(&user_id).cloned()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.entries().contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// 为新会话登记连接。
    ///
    /// 同一用户已有连接时，旧连接会被通知关闭。返回的 [`Registration`]
    /// 在析构时移除本会话的记录，保证每个会话恰好移除一次。
    pub fn open_session(self: &Arc<Self>, user_id: UserId, buffer: usize) -> (Registration, Outbox) {
        let (handle, outbox) = ConnectionHandle::channel(buffer);
        let connection_id = handle.id();

        if let Some(previous) = self.register(user_id, handle) {
            tracing::info!(
                user_id = %user_id,
                previous_connection = %previous.id(),
                "closing superseded connection"
            );
            previous.close();
        }

        let registration = Registration {
            registry: Arc::clone(self),
            user_id,
            connection_id,
        };
        (registration, outbox)
    }
}

/// 会话在连接表中的登记，析构即注销
#[derive(Debug)]
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl Registration {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let removed = self
            .registry
            .unregister_connection(self.user_id, self.connection_id);
        tracing::debug!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            removed,
            "connection unregistered"
        );
    }
}
