//! 聊天服务单元测试
//!
//! 覆盖入站帧解析、存储与实时投递的组合结果、历史查询以及存储超时。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use domain::{ChatMessage, RepositoryError, Timestamp, UserId};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::registry::{ConnectionRegistry, Outgoing};
use crate::repository::memory::InMemoryMessageRepository;
use crate::repository::{MessageRepository, MockMessageRepository};
use crate::services::chat_service::*;

const NOW: i64 = 1_700_000_000;

struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Utc.timestamp_opt(NOW, 0).single().unwrap_or_default()
    }
}

/// 永远不返回的存储，用来触发超时
struct StalledMessageRepository;

#[async_trait]
impl MessageRepository for StalledMessageRepository {
    async fn append(&self, _message: ChatMessage) -> Result<(), RepositoryError> {
        std::future::pending().await
    }

    async fn find_between(
        &self,
        _a: UserId,
        _b: UserId,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        std::future::pending().await
    }
}

fn user() -> UserId {
    UserId::from(Uuid::new_v4())
}

fn frame(receiver: UserId, body: &str) -> Vec<u8> {
    serde_json::json!({ "receiver_id": receiver.to_string(), "message": body })
        .to_string()
        .into_bytes()
}

fn create_chat_service(repository: Arc<dyn MessageRepository>) -> ChatService {
    ChatService::new(ChatServiceDependencies {
        message_repository: repository,
        registry: Arc::new(ConnectionRegistry::new()),
        clock: Arc::new(FixedClock),
        outbound_buffer: 8,
        store_timeout: Duration::from_secs(5),
        delivery_timeout: Duration::from_millis(100),
    })
}

#[test]
fn decode_frame_accepts_simple_hex_id() {
    let (receiver, body) =
        decode_frame(br#"{"receiver_id":"bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2","message":"hi"}"#)
            .unwrap();
    assert_eq!(receiver, UserId::parse("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2").unwrap());
    assert_eq!(body, "hi");
}

#[test]
fn decode_frame_rejects_bad_input() {
    for payload in [
        &b"not json"[..],
        br#"{"message":"hi"}"#,
        br#"{"receiver_id":"zzz","message":"hi"}"#,
    ] {
        let err = decode_frame(payload).unwrap_err();
        assert!(matches!(err, ApplicationError::MalformedFrame(_)));
    }
}

#[tokio::test]
async fn dispatch_to_online_recipient_stores_and_delivers() {
    let repository = Arc::new(InMemoryMessageRepository::new());
    let service = create_chat_service(repository.clone());
    let (alice, bob) = (user(), user());
    let (_bob_session, mut bob_outbox) = service.open_session(bob);

    let dispatched = service.dispatch(alice, &frame(bob, "hello")).await.unwrap();

    assert!(dispatched.persisted);
    assert_eq!(dispatched.delivery, Delivery::Delivered);
    assert_eq!(dispatched.message.sender_id, alice);
    assert_eq!(dispatched.message.receiver_id, bob);
    assert_eq!(dispatched.message.timestamp, NOW);

    let Outgoing::Message(received) = bob_outbox.recv().await else {
        panic!("expected a message for bob");
    };
    assert_eq!(received, dispatched.message);
    assert_eq!(repository.snapshot().await, vec![dispatched.message]);
}

#[tokio::test]
async fn dispatch_to_offline_recipient_only_stores() {
    let repository = Arc::new(InMemoryMessageRepository::new());
    let service = create_chat_service(repository.clone());
    let (alice, bob) = (user(), user());

    let dispatched = service.dispatch(alice, &frame(bob, "later")).await.unwrap();

    assert!(dispatched.persisted);
    assert_eq!(dispatched.delivery, Delivery::RecipientOffline);
    assert_eq!(repository.snapshot().await.len(), 1);
}

#[tokio::test]
async fn storage_failure_still_delivers_live() {
    let mut repository = MockMessageRepository::new();
    repository
        .expect_append()
        .times(1)
        .returning(|_| Err(RepositoryError::storage("disk full")));
    let service = create_chat_service(Arc::new(repository));
    let (alice, bob) = (user(), user());
    let (_bob_session, mut bob_outbox) = service.open_session(bob);

    let dispatched = service.dispatch(alice, &frame(bob, "still here")).await.unwrap();

    assert!(!dispatched.persisted);
    assert_eq!(dispatched.delivery, Delivery::Delivered);
    assert!(matches!(bob_outbox.recv().await, Outgoing::Message(_)));
}

#[tokio::test]
async fn malformed_frame_is_not_stored() {
    let mut repository = MockMessageRepository::new();
    repository.expect_append().never();
    let service = create_chat_service(Arc::new(repository));

    let err = service
        .dispatch(user(), br#"{"receiver_id":"nope","message":"x"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::MalformedFrame(_)));
}

#[tokio::test]
async fn delivery_to_closed_session_is_reported_as_failure() {
    let service = create_chat_service(Arc::new(InMemoryMessageRepository::new()));
    let (alice, bob) = (user(), user());
    let (bob_session, bob_outbox) = service.open_session(bob);

    // 写任务已结束但登记还在：句柄指向已关闭的队列
    drop(bob_outbox);
    let dispatched = service.dispatch(alice, &frame(bob, "gone")).await.unwrap();

    assert!(dispatched.persisted);
    assert!(matches!(dispatched.delivery, Delivery::Failed(_)));
    drop(bob_session);
    assert!(!service.registry().is_online(bob));
}

#[tokio::test]
async fn self_addressed_message_is_delivered_to_sender() {
    let service = create_chat_service(Arc::new(InMemoryMessageRepository::new()));
    let alice = user();
    let (_session, mut outbox) = service.open_session(alice);

    let dispatched = service.dispatch(alice, &frame(alice, "note to self")).await.unwrap();

    assert_eq!(dispatched.delivery, Delivery::Delivered);
    assert!(matches!(outbox.recv().await, Outgoing::Message(m) if m.body == "note to self"));
}

#[tokio::test]
async fn history_is_symmetric_and_newest_first() {
    let service = create_chat_service(Arc::new(InMemoryMessageRepository::new()));
    let (alice, bob, carol) = (user(), user(), user());

    service.dispatch(alice, &frame(bob, "first")).await.unwrap();
    service.dispatch(bob, &frame(alice, "second")).await.unwrap();
    service.dispatch(alice, &frame(carol, "elsewhere")).await.unwrap();

    let from_alice = service.history(alice, bob).await.unwrap();
    let from_bob = service.history(bob, alice).await.unwrap();

    // 同一秒内按 UUIDv7 排序
    let bodies: Vec<&str> = from_alice.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["second", "first"]);
    assert_eq!(from_alice, from_bob);
}

#[tokio::test]
async fn history_without_messages_is_empty() {
    let service = create_chat_service(Arc::new(InMemoryMessageRepository::new()));
    assert!(service.history(user(), user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn history_propagates_storage_errors() {
    let mut repository = MockMessageRepository::new();
    repository
        .expect_find_between()
        .returning(|_, _| Err(RepositoryError::storage("connection reset")));
    let service = create_chat_service(Arc::new(repository));

    let err = service.history(user(), user()).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Repository(_)));
}

#[tokio::test(start_paused = true)]
async fn stalled_store_times_out() {
    let service = create_chat_service(Arc::new(StalledMessageRepository));
    let (alice, bob) = (user(), user());
    let (_bob_session, mut bob_outbox) = service.open_session(bob);

    let dispatched = service.dispatch(alice, &frame(bob, "slow")).await.unwrap();
    assert!(!dispatched.persisted);
    assert_eq!(dispatched.delivery, Delivery::Delivered);
    assert!(matches!(bob_outbox.recv().await, Outgoing::Message(_)));

    let err = service.history(alice, bob).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Timeout { .. }));
}
