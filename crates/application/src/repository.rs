use async_trait::async_trait;
use domain::{ChatMessage, Product, ProductId, RepositoryError, User, UserEmail, UserId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: UserEmail) -> Result<Option<User>, RepositoryError>;
}

/// 购物车按列表语义存储：允许重复加入，移除时删除全部同名条目
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn add_item(&self, user_id: UserId, product_id: ProductId)
        -> Result<(), RepositoryError>;

    /// 返回被移除的条目数
    async fn remove_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<u64, RepositoryError>;

    /// 按加入顺序返回
    async fn list_items(&self, user_id: UserId) -> Result<Vec<ProductId>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create(&self, product: Product) -> Result<Product, RepositoryError>;
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError>;
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Product>, RepositoryError>;
    /// 删除成功返回 true，记录不存在返回 false
    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError>;
}

/// 聊天消息的持久化日志：只追加，按参与者对查询
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError>;

    /// 返回 `a` 与 `b` 之间双向的全部消息，按时间倒序（最新在前）
    async fn find_between(&self, a: UserId, b: UserId)
        -> Result<Vec<ChatMessage>, RepositoryError>;
}

/// 内存实现的仓储（用于测试和 `memory` 存储模式）
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct InMemoryUserRepository {
        users: RwLock<HashMap<UserId, User>>,
    }

    impl InMemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl UserRepository for InMemoryUserRepository {
        async fn create(&self, user: User) -> Result<User, RepositoryError> {
            let mut users = self.users.write().await;
            if users.values().any(|existing| existing.email == user.email) {
                return Err(RepositoryError::Conflict);
            }
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
            Ok(self.users.read().await.get(&id).cloned())
        }

        async fn find_by_email(&self, email: UserEmail) -> Result<Option<User>, RepositoryError> {
            let users = self.users.read().await;
            Ok(users.values().find(|user| user.email == email).cloned())
        }
    }

    #[derive(Default)]
    pub struct InMemoryCartRepository {
        carts: RwLock<HashMap<UserId, Vec<ProductId>>>,
    }

    impl InMemoryCartRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CartRepository for InMemoryCartRepository {
        async fn add_item(
            &self,
            user_id: UserId,
            product_id: ProductId,
        ) -> Result<(), RepositoryError> {
            self.carts
                .write()
                .await
                .entry(user_id)
                .or_default()
                .push(product_id);
            Ok(())
        }

        async fn remove_item(
            &self,
            user_id: UserId,
            product_id: ProductId,
        ) -> Result<u64, RepositoryError> {
            let mut carts = self.carts.write().await;
            let Some(items) = carts.get_mut(&user_id) else {
                return Ok(0);
            };
            let before = items.len();
            items.retain(|item| *item != product_id);
            Ok((before - items.len()) as u64)
        }

        async fn list_items(&self, user_id: UserId) -> Result<Vec<ProductId>, RepositoryError> {
            Ok(self
                .carts
                .read()
                .await
                .get(&user_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    /// 商品按插入顺序保存，列表时最新在前
    #[derive(Default)]
    pub struct InMemoryProductRepository {
        products: RwLock<Vec<Product>>,
    }

    impl InMemoryProductRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ProductRepository for InMemoryProductRepository {
        async fn create(&self, product: Product) -> Result<Product, RepositoryError> {
            let mut products = self.products.write().await;
            if products.iter().any(|existing| existing.id == product.id) {
                return Err(RepositoryError::Conflict);
            }
            products.push(product.clone());
            Ok(product)
        }

        async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
            let products = self.products.read().await;
            Ok(products.iter().find(|product| product.id == id).cloned())
        }

        async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
            Ok(self.products.read().await.iter().rev().cloned().collect())
        }

        async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Product>, RepositoryError> {
            let products = self.products.read().await;
            Ok(products
                .iter()
                .rev()
                .filter(|product| product.created_by == owner)
                .cloned()
                .collect())
        }

        async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
            let mut products = self.products.write().await;
            let before = products.len();
            products.retain(|product| product.id != id);
            Ok(products.len() != before)
        }
    }

    #[derive(Default)]
    pub struct InMemoryMessageRepository {
        messages: RwLock<Vec<ChatMessage>>,
    }

    impl InMemoryMessageRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// 全部已存储消息，按追加顺序
        pub async fn snapshot(&self) -> Vec<ChatMessage> {
            self.messages.read().await.clone()
        }
    }

    #[async_trait]
    impl MessageRepository for InMemoryMessageRepository {
        async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError> {
            let mut messages = self.messages.write().await;
            if messages.iter().any(|existing| existing.id == message.id) {
                return Err(RepositoryError::Conflict);
            }
            messages.push(message);
            Ok(())
        }

        async fn find_between(
            &self,
            a: UserId,
            b: UserId,
        ) -> Result<Vec<ChatMessage>, RepositoryError> {
            let mut found: Vec<ChatMessage> = self
                .messages
                .read()
                .await
                .iter()
                .filter(|message| message.is_between(a, b))
                .cloned()
                .collect();
            found.sort_by(|x, y| y.timestamp.cmp(&x.timestamp).then(y.id.cmp(&x.id)));
            Ok(found)
        }
    }

}
