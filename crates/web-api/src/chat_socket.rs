//! 单条聊天连接的生命周期
//!
//! 读循环在当前任务里逐帧处理入站消息；写任务独占 socket 的发送端，
//! 只从本会话的出站队列取数据，其他会话的投递只会入队。

use std::sync::Arc;

use application::{ChatService, Delivery, Outbox, Outgoing};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use domain::UserId;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::task::JoinHandle;

use crate::{auth::CurrentUser, state::AppState};

/// `GET /chat/ws`：身份在升级之前解析，缺失时直接 401
pub async fn chat_socket(
    current: CurrentUser,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let chat = Arc::clone(&state.chat_service);
    ws.on_upgrade(move |socket| run_session(socket, chat, current.id))
}

async fn run_session(socket: WebSocket, chat: Arc<ChatService>, user_id: UserId) {
    let (registration, outbox) = chat.open_session(user_id);
    let connection_id = registration.connection_id();
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "chat session opened");

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, outbox, user_id));

    read_loop(stream, &chat, user_id, &mut writer).await;

    writer.abort();
    // 析构即从连接表移除，且只移除本连接自己的记录
    drop(registration);
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "chat session closed");
}

/// 逐帧读取；写任务结束只在两帧之间生效，正在处理的帧总会完成存储和投递
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    chat: &ChatService,
    user_id: UserId,
    writer: &mut JoinHandle<()>,
) {
    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = &mut *writer => {
                tracing::debug!(user_id = %user_id, "writer finished first");
                break;
            }
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => handle_frame(chat, user_id, text.as_str().as_bytes()).await,
            Some(Ok(WsMessage::Binary(bytes))) => handle_frame(chat, user_id, &bytes).await,
            Some(Ok(WsMessage::Close(_))) | None => break,
            // ping/pong 由 axum 自动应答
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                tracing::debug!(user_id = %user_id, error = %err, "read error");
                break;
            }
        }
    }
}

async fn handle_frame(chat: &ChatService, user_id: UserId, payload: &[u8]) {
    match chat.dispatch(user_id, payload).await {
        Ok(dispatched) => {
            let delivered = dispatched.delivery == Delivery::Delivered;
            tracing::debug!(
                message_id = %dispatched.message.id,
                sender_id = %user_id,
                receiver_id = %dispatched.message.receiver_id,
                persisted = dispatched.persisted,
                delivered,
                "chat message dispatched"
            );
        }
        Err(err) => {
            tracing::warn!(user_id = %user_id, error = %err, "skipping inbound frame");
        }
    }
}

async fn write_loop(mut sink: SplitSink<WebSocket, WsMessage>, mut outbox: Outbox, user_id: UserId) {
    loop {
        match outbox.recv().await {
            Outgoing::Message(message) => {
                let payload = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(message_id = %message.id, error = %err, "failed to serialize chat message");
                        continue;
                    }
                };
                if let Err(err) = sink.send(WsMessage::Text(payload.into())).await {
                    tracing::warn!(user_id = %user_id, error = %err, "failed to write to socket");
                    break;
                }
            }
            Outgoing::Shutdown => {
                tracing::info!(user_id = %user_id, "connection superseded, closing");
                if let Err(err) = sink.send(WsMessage::Close(None)).await {
                    tracing::debug!(user_id = %user_id, error = %err, "close frame not sent");
                }
                break;
            }
        }
    }
}
