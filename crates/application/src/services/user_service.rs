use std::sync::Arc;
use std::time::Duration;

use domain::{DomainError, ProductId, RepositoryError, User, UserEmail, UserId, Username};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::ApplicationError,
    password::PasswordHasher,
    repository::{CartRepository, UserRepository},
};

use super::bounded;

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub image: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticateUserRequest {
    pub email: String,
    pub password: String,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub cart_repository: Arc<dyn CartRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
    pub store_timeout: Duration,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let username = Username::parse(request.name)?;
        let email = UserEmail::parse(request.email)?;
        if request.password.is_empty() {
            return Err(DomainError::invalid_argument("password", "cannot be empty").into());
        }

        let existing = bounded(
            "user lookup",
            self.deps.store_timeout,
            self.deps.user_repository.find_by_email(email.clone()),
        )
        .await?;
        if existing.is_some() {
            return Err(DomainError::UserAlreadyExists.into());
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let user = User::register(
            UserId::from(Uuid::new_v4()),
            username,
            email,
            password_hash,
            request.image,
            self.deps.clock.now(),
        );

        // 并发注册同一邮箱时由存储层的唯一约束兜底
        let stored = bounded(
            "user create",
            self.deps.store_timeout,
            self.deps.user_repository.create(user),
        )
        .await
        .map_err(|err| match err {
            ApplicationError::Repository(RepositoryError::Conflict) => {
                DomainError::UserAlreadyExists.into()
            }
            other => other,
        })?;

        tracing::info!(user_id = %stored.id, "user registered");
        Ok(stored)
    }

    /// 邮箱不存在和密码错误返回同一个错误
    pub async fn authenticate(
        &self,
        request: AuthenticateUserRequest,
    ) -> Result<User, ApplicationError> {
        let email = UserEmail::parse(request.email).map_err(|_| ApplicationError::Authentication)?;
        let user = bounded(
            "user lookup",
            self.deps.store_timeout,
            self.deps.user_repository.find_by_email(email),
        )
        .await?
        .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            return Err(ApplicationError::Authentication);
        }

        Ok(user)
    }

    pub async fn find_user(&self, user_id: UserId) -> Result<User, ApplicationError> {
        bounded(
            "user lookup",
            self.deps.store_timeout,
            self.deps.user_repository.find_by_id(user_id),
        )
        .await?
        .ok_or_else(|| DomainError::UserNotFound.into())
    }

    pub async fn cart_items(&self, user_id: UserId) -> Result<Vec<ProductId>, ApplicationError> {
        bounded(
            "cart list",
            self.deps.store_timeout,
            self.deps.cart_repository.list_items(user_id),
        )
        .await
    }

    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<(), ApplicationError> {
        bounded(
            "cart add",
            self.deps.store_timeout,
            self.deps.cart_repository.add_item(user_id, product_id),
        )
        .await?;
        tracing::debug!(user_id = %user_id, product_id = %product_id, "added to cart");
        Ok(())
    }

    /// 返回被移除的条目数；商品不在购物车中时为 0
    pub async fn remove_from_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<u64, ApplicationError> {
        bounded(
            "cart remove",
            self.deps.store_timeout,
            self.deps.cart_repository.remove_item(user_id, product_id),
        )
        .await
    }
}
