//! 主应用程序入口
//!
//! 加载配置，选择存储后端，组装服务并启动 Axum Web API。

use std::sync::Arc;

use anyhow::Context;
use application::{
    repository::memory::{
        InMemoryCartRepository, InMemoryMessageRepository, InMemoryProductRepository,
        InMemoryUserRepository,
    },
    CartRepository, ChatService, ChatServiceDependencies, Clock, ConnectionRegistry,
    MessageRepository, PasswordHasher, ProductRepository, ProductService,
    ProductServiceDependencies, SystemClock, UserRepository, UserService, UserServiceDependencies,
};
use config::{AppConfig, StorageBackend};
use infrastructure::{create_pg_pool, BcryptPasswordHasher, PgStorage, MIGRATOR};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

struct Repositories {
    users: Arc<dyn UserRepository>,
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
    messages: Arc<dyn MessageRepository>,
}

async fn build_repositories(config: &AppConfig) -> anyhow::Result<Repositories> {
    match config.storage {
        StorageBackend::Postgres => {
            let pool = create_pg_pool(&config.database.url, config.database.max_connections)
                .await
                .context("failed to connect to postgres")?;
            MIGRATOR
                .run(&pool)
                .await
                .context("failed to run migrations")?;

            let storage = PgStorage::new(pool);
            Ok(Repositories {
                users: storage.user_repository,
                carts: storage.cart_repository,
                products: storage.product_repository,
                messages: storage.message_repository,
            })
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage, data is lost on restart");
            Ok(Repositories {
                users: Arc::new(InMemoryUserRepository::new()),
                carts: Arc::new(InMemoryCartRepository::new()),
                products: Arc::new(InMemoryProductRepository::new()),
                messages: Arc::new(InMemoryMessageRepository::new()),
            })
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("invalid configuration")?;
    tracing::info!(storage = ?config.storage, "configuration loaded");

    let repositories = build_repositories(&config).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let password_hasher: Arc<dyn PasswordHasher> =
        Arc::new(BcryptPasswordHasher::new(config.server.bcrypt_cost));
    // 进程内唯一的在线连接表
    let registry = Arc::new(ConnectionRegistry::new());
    let store_timeout = config.chat.store_timeout();

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: repositories.users,
        cart_repository: repositories.carts,
        password_hasher,
        clock: clock.clone(),
        store_timeout,
    });

    let product_service = ProductService::new(ProductServiceDependencies {
        product_repository: repositories.products,
        clock: clock.clone(),
        store_timeout,
    });

    let chat_service = ChatService::new(ChatServiceDependencies {
        message_repository: repositories.messages,
        registry,
        clock,
        outbound_buffer: config.chat.outbound_buffer,
        store_timeout,
        delivery_timeout: config.chat.delivery_timeout(),
    });

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(product_service),
        Arc::new(chat_service),
        jwt_service,
    );

    let app = router(state);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(address = %address, "marketplace server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
