//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、超时边界、
//! 以及对外部适配器（例如密码哈希、消息存储、在线连接表）的抽象。

pub mod clock;
pub mod error;
pub mod password;
pub mod registry;
pub mod repository;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use password::{PasswordHasher, PasswordHasherError};
pub use registry::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, DeliveryError, Outbox, Outgoing,
    Registration,
};
pub use repository::{CartRepository, MessageRepository, ProductRepository, UserRepository};
pub use services::{
    decode_frame, AuthenticateUserRequest, ChatService, ChatServiceDependencies,
    CreateProductRequest, Delivery, Dispatched, InboundFrame, ProductService,
    ProductServiceDependencies, RegisterUserRequest, UserService, UserServiceDependencies,
};
