#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use application::{
    repository::memory::{
        InMemoryCartRepository, InMemoryMessageRepository, InMemoryProductRepository,
        InMemoryUserRepository,
    },
    ChatService, ChatServiceDependencies, Clock, ConnectionRegistry, MessageRepository,
    PasswordHasher, ProductService, ProductServiceDependencies, SystemClock, UserService,
    UserServiceDependencies,
};
use async_trait::async_trait;
use axum::Router;
use domain::{ChatMessage, RepositoryError, UserId};
use futures_util::StreamExt;
use infrastructure::BcryptPasswordHasher;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// 记录历史查询次数的消息仓储，可让写入变慢
#[derive(Default)]
pub struct CountingMessageRepository {
    inner: InMemoryMessageRepository,
    queries: AtomicUsize,
    append_delay: Duration,
}

impl CountingMessageRepository {
    pub fn with_append_delay(append_delay: Duration) -> Self {
        Self {
            append_delay,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Vec<ChatMessage> {
        self.inner.snapshot().await
    }
}

#[async_trait]
impl MessageRepository for CountingMessageRepository {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        if !self.append_delay.is_zero() {
            sleep(self.append_delay).await;
        }
        self.inner.append(message).await
    }

    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.find_between(a, b).await
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub http: Client,
    pub messages: Arc<CountingMessageRepository>,
    pub registry: Arc<ConnectionRegistry>,
    pub jwt: Arc<JwtService>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// 全内存存储的路由
pub fn build_router() -> (Router, Arc<CountingMessageRepository>, Arc<ConnectionRegistry>, Arc<JwtService>) {
    build_router_with(Arc::new(CountingMessageRepository::default()))
}

pub fn build_router_with(
    messages: Arc<CountingMessageRepository>,
) -> (Router, Arc<CountingMessageRepository>, Arc<ConnectionRegistry>, Arc<JwtService>) {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let password_hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptPasswordHasher::new(Some(4)));
    let registry = Arc::new(ConnectionRegistry::new());
    let store_timeout = Duration::from_secs(5);

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: Arc::new(InMemoryUserRepository::new()),
        cart_repository: Arc::new(InMemoryCartRepository::new()),
        password_hasher,
        clock: clock.clone(),
        store_timeout,
    });

    let product_service = ProductService::new(ProductServiceDependencies {
        product_repository: Arc::new(InMemoryProductRepository::new()),
        clock: clock.clone(),
        store_timeout,
    });

    let chat_service = ChatService::new(ChatServiceDependencies {
        message_repository: messages.clone(),
        registry: registry.clone(),
        clock,
        outbound_buffer: 16,
        store_timeout,
        delivery_timeout: Duration::from_secs(1),
    });

    let jwt = Arc::new(JwtService::new(JwtConfig {
        secret: TEST_SECRET.to_string(),
        expiration_hours: 1,
    }));

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(product_service),
        Arc::new(chat_service),
        jwt.clone(),
    );

    (router(state), messages, registry, jwt)
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(CountingMessageRepository::default())).await
}

pub async fn spawn_app_with(messages: Arc<CountingMessageRepository>) -> TestApp {
    let (router, messages, registry, jwt) = build_router_with(messages);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestApp {
        addr,
        http: Client::new(),
        messages,
        registry,
        jwt,
        shutdown: Some(shutdown_tx),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// 注册用户，返回令牌和用户ID
    pub async fn register(&self, name: &str) -> (String, UserId) {
        let response = self
            .http
            .post(self.url("/auth/register"))
            .json(&json!({
                "name": name,
                "email": format!("{name}@example.com"),
                "password": "secret-password",
                "image": ""
            }))
            .send()
            .await
            .expect("register");
        assert_eq!(response.status(), 201, "register {name}");

        let body: Value = response.json().await.expect("register json");
        let token = body["token"].as_str().expect("token").to_string();
        let user_id = self.jwt.verify(&token).expect("valid token").id;
        (token, user_id)
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let url = format!("ws://{}/chat/ws?token={}", self.addr, token);
        let (ws, _) = connect_async(url).await.expect("ws connect");
        ws
    }

    /// 等待会话在连接表中登记完成
    pub async fn wait_online(&self, user_id: UserId, online: bool) {
        for _ in 0..100 {
            if self.registry.is_online(user_id) == online {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("user {user_id} never became online={online}");
    }

    pub async fn history(&self, token: &str, other: &str) -> reqwest::Response {
        self.http
            .get(self.url("/chat/messages"))
            .query(&[("receiver_id", other)])
            .bearer_auth(token)
            .send()
            .await
            .expect("history request")
    }
}

pub fn frame(receiver: UserId, body: &str) -> TungsteniteMessage {
    TungsteniteMessage::text(
        json!({ "receiver_id": receiver.to_string(), "message": body }).to_string(),
    )
}

/// 读取下一条文本帧并解析为 JSON
pub async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("frame ok");
        if let TungsteniteMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

/// 在给定时间内没有收到任何文本帧
pub async fn assert_silent(ws: &mut WsClient, wait: Duration) {
    match timeout(wait, ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(TungsteniteMessage::Text(text)))) => panic!("unexpected frame {text}"),
        Ok(other) => panic!("unexpected event {other:?}"),
    }
}
