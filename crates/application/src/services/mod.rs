mod chat_service;
mod product_service;
mod user_service;

#[cfg(test)]
mod chat_service_tests;

use std::future::Future;
use std::time::Duration;

use domain::RepositoryError;

use crate::error::ApplicationError;

pub use chat_service::{
    decode_frame, ChatService, ChatServiceDependencies, Delivery, Dispatched, InboundFrame,
};
pub use product_service::{CreateProductRequest, ProductService, ProductServiceDependencies};
pub use user_service::{
    AuthenticateUserRequest, RegisterUserRequest, UserService, UserServiceDependencies,
};

/// 给存储调用加上超时，超时按失败处理，不重试
pub(crate) async fn bounded<T, F>(
    operation: &'static str,
    after: Duration,
    future: F,
) -> Result<T, ApplicationError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    match tokio::time::timeout(after, future).await {
        Ok(result) => result.map_err(ApplicationError::from),
        Err(_) => Err(ApplicationError::Timeout { operation, after }),
    }
}
