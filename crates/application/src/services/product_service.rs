use std::sync::Arc;
use std::time::Duration;

use domain::{DomainError, NewProduct, Product, ProductId, UserId};
use uuid::Uuid;

use crate::{clock::Clock, error::ApplicationError, repository::ProductRepository};

use super::bounded;

pub type CreateProductRequest = NewProduct;

pub struct ProductServiceDependencies {
    pub product_repository: Arc<dyn ProductRepository>,
    pub clock: Arc<dyn Clock>,
    pub store_timeout: Duration,
}

pub struct ProductService {
    deps: ProductServiceDependencies,
}

impl ProductService {
    pub fn new(deps: ProductServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn create(
        &self,
        owner: UserId,
        request: CreateProductRequest,
    ) -> Result<Product, ApplicationError> {
        let product = Product::list(
            ProductId::from(Uuid::new_v4()),
            request,
            owner,
            self.deps.clock.now(),
        )?;

        let stored = bounded(
            "product create",
            self.deps.store_timeout,
            self.deps.product_repository.create(product),
        )
        .await?;

        tracing::info!(product_id = %stored.id, user_id = %owner, "product listed");
        Ok(stored)
    }

    pub async fn get(&self, id: ProductId) -> Result<Product, ApplicationError> {
        bounded(
            "product lookup",
            self.deps.store_timeout,
            self.deps.product_repository.find_by_id(id),
        )
        .await?
        .ok_or_else(|| DomainError::ProductNotFound.into())
    }

    /// 最新上架的在前
    pub async fn list_all(&self) -> Result<Vec<Product>, ApplicationError> {
        bounded(
            "product list",
            self.deps.store_timeout,
            self.deps.product_repository.list_all(),
        )
        .await
    }

    pub async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Product>, ApplicationError> {
        bounded(
            "product list",
            self.deps.store_timeout,
            self.deps.product_repository.list_by_owner(owner),
        )
        .await
    }

    pub async fn remove(&self, id: ProductId) -> Result<(), ApplicationError> {
        let removed = bounded(
            "product delete",
            self.deps.store_timeout,
            self.deps.product_repository.delete(id),
        )
        .await?;
        if !removed {
            return Err(DomainError::ProductNotFound.into());
        }

        tracing::info!(product_id = %id, "product removed");
        Ok(())
    }
}
