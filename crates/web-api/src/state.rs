use std::sync::Arc;

use application::{ChatService, ProductService, UserService};
use axum::extract::FromRef;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub product_service: Arc<ProductService>,
    pub chat_service: Arc<ChatService>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        user_service: Arc<UserService>,
        product_service: Arc<ProductService>,
        chat_service: Arc<ChatService>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            user_service,
            product_service,
            chat_service,
            jwt_service,
        }
    }
}

impl FromRef<AppState> for Arc<JwtService> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.jwt_service)
    }
}
