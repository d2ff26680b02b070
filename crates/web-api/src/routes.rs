use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use application::{AuthenticateUserRequest, CreateProductRequest, RegisterUserRequest};
use domain::{ChatMessage, Product, ProductId, UserId};

use crate::{
    auth::{authenticate, CurrentUser},
    chat_socket::chat_socket,
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
struct RegisterPayload {
    #[validate(length(min = 1, max = 50))]
    name: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 1, max = 128))]
    password: String,
    #[serde(default)]
    image: String,
}

#[derive(Debug, Deserialize, Validate)]
struct LoginPayload {
    #[validate(length(min = 1))]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateProductPayload {
    #[validate(length(min = 1, max = 200))]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    category: String,
    #[validate(range(min = 0.0))]
    price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartPayload {
    product_id: String,
}

#[derive(Debug, Deserialize)]
struct ProductIdQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    receiver_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    message: &'static str,
    token: String,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ProductResponse {
    message: &'static str,
    product: Product,
}

pub fn router(state: AppState) -> Router {
    // 这些路由统一经过认证中间件；商品的写操作由 CurrentUser 提取器单独认证
    let protected = Router::new()
        .route("/chat/ws", get(chat_socket))
        .route("/chat/messages", get(get_messages))
        .route(
            "/cart",
            get(get_cart).post(add_to_cart).delete(remove_from_cart),
        )
        .route_layer(middleware::from_fn_with_state(
            state.jwt_service.clone(),
            authenticate,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route(
            "/products",
            get(list_products).post(create_product).delete(delete_product),
        )
        .route("/products/get", get(get_product))
        .route("/products/user", get(list_user_products))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn validate<T: Validate>(payload: &T) -> Result<(), ApiError> {
    payload
        .validate()
        .map_err(|err| ApiError::bad_request(err.to_string()))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))
}

async fn health() -> &'static str {
    "ok"
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    validate(&payload)?;

    let user = state
        .user_service
        .register(RegisterUserRequest {
            name: payload.name,
            email: payload.email,
            password: payload.password,
            image: payload.image,
        })
        .await?;
    let token = state.jwt_service.issue(&user)?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            message: "User registered successfully",
            token,
        }),
    ))
}

async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<TokenResponse>, ApiError> {
    validate(&payload)?;

    let user = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            email: payload.email,
            password: payload.password,
        })
        .await?;
    let token = state.jwt_service.issue(&user)?;

    Ok(Json(TokenResponse {
        message: "Login successful",
        token,
    }))
}

/// `GET /chat/messages?receiver_id=`：参数非法时不查询存储
async fn get_messages(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let raw = required(&query.receiver_id, "receiver_id")?;
    let target = UserId::parse(raw).map_err(|_| ApiError::bad_request("Invalid receiver_id"))?;

    let messages = state.chat_service.history(current.id, target).await?;
    Ok(Json(messages))
}

async fn get_cart(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<ProductId>>, ApiError> {
    let items = state.user_service.cart_items(current.id).await?;
    Ok(Json(items))
}

async fn add_to_cart(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CartPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let product_id = ProductId::parse(&payload.product_id)?;
    state
        .user_service
        .add_to_cart(current.id, product_id)
        .await?;

    Ok(Json(MessageResponse {
        message: "Product added to cart",
    }))
}

async fn remove_from_cart(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CartPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let product_id = ProductId::parse(&payload.product_id)?;
    state
        .user_service
        .remove_from_cart(current.id, product_id)
        .await?;

    Ok(Json(MessageResponse {
        message: "Product removed from cart",
    }))
}

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.product_service.list_all().await?))
}

async fn create_product(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CreateProductPayload>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    validate(&payload)?;

    let product = state
        .product_service
        .create(
            current.id,
            CreateProductRequest {
                name: payload.name,
                description: payload.description,
                image: payload.image,
                category: payload.category,
                price: payload.price,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProductResponse {
            message: "Product created successfully",
            product,
        }),
    ))
}

async fn get_product(
    State(state): State<AppState>,
    Query(query): Query<ProductIdQuery>,
) -> Result<Json<Product>, ApiError> {
    let id = ProductId::parse(required(&query.id, "id")?)?;
    Ok(Json(state.product_service.get(id).await?))
}

async fn list_user_products(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let owner = UserId::parse(required(&query.user_id, "userId")?)?;
    Ok(Json(state.product_service.list_by_owner(owner).await?))
}

async fn delete_product(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ProductIdQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = ProductId::parse(required(&query.id, "id")?)?;
    state.product_service.remove(id).await?;
    tracing::info!(user_id = %current.id, product_id = %id, "product deleted");

    Ok(Json(MessageResponse {
        message: "Product deleted successfully",
    }))
}
