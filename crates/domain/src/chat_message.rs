use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageId, UserId};

/// 一条私聊消息。
///
/// 创建后不可变；由会话处理器在收到合法入站帧时创建，并且只持久化一次。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(rename = "message")]
    pub body: String,
    /// Unix 时间戳（秒）
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        receiver_id: UserId,
        body: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            body: body.into(),
            timestamp,
        }
    }

    /// 消息是否属于 `a` 和 `b` 之间的对话（不区分方向）
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn wire_format_uses_message_key() {
        let sender = UserId::from(Uuid::new_v4());
        let receiver = UserId::from(Uuid::new_v4());
        let message = ChatMessage::new(MessageId::generate(), sender, receiver, "hi", 1_700_000_000);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["message"], "hi");
        assert_eq!(json["sender_id"], sender.to_string());
        assert_eq!(json["receiver_id"], receiver.to_string());
        assert_eq!(json["timestamp"], 1_700_000_000);
        assert!(json.get("body").is_none());
    }

    #[test]
    fn conversation_membership_ignores_direction() {
        let a = UserId::from(Uuid::new_v4());
        let b = UserId::from(Uuid::new_v4());
        let c = UserId::from(Uuid::new_v4());
        let message = ChatMessage::new(MessageId::generate(), a, b, "yo", 0);

        assert!(message.is_between(a, b));
        assert!(message.is_between(b, a));
        assert!(!message.is_between(a, c));
    }
}
