//! JWT 认证模块
//!
//! 令牌在边界处一次性解码为强类型的 [`Claims`]，之后只传递 [`CurrentUser`]。

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Query, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use config::JwtConfig;
use domain::{User, UserId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: UserId,
    pub name: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("token generation failed: {0}")]
    Generation(#[source] jsonwebtoken::errors::Error),
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Generation(_) => ApiError::internal_server_error(err.to_string()),
            _ => ApiError::unauthorized(err.to_string()),
        }
    }
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// 为已验证的用户签发令牌
    pub fn issue(&self, user: &User) -> Result<String, IdentityError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            id: user.id,
            name: user.username.to_string(),
            exp: exp.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(IdentityError::Generation)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, IdentityError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(IdentityError::InvalidToken)
    }

    /// 依次尝试 `Authorization: Bearer` 和 `?token=`（浏览器发起 WebSocket 时无法设置请求头）
    pub fn resolve(&self, headers: &HeaderMap, uri: &Uri) -> Result<CurrentUser, IdentityError> {
        let token = bearer_token(headers)
            .or_else(|| query_token(uri))
            .ok_or(IdentityError::MissingToken)?;
        self.verify(&token).map(CurrentUser::from)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn query_token(uri: &Uri) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
}

/// 当前请求的已认证身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub name: String,
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            name: claims.name,
        }
    }
}

/// 优先使用中间件放入的身份，否则自行解析令牌
impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<JwtService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentUser>() {
            return Ok(current.clone());
        }

        let jwt = Arc::<JwtService>::from_ref(state);
        Ok(jwt.resolve(&parts.headers, &parts.uri)?)
    }
}

/// 认证中间件：解析身份并放入请求扩展，失败直接返回 401
pub async fn authenticate(
    State(jwt): State<Arc<JwtService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let current = jwt
        .resolve(request.headers(), request.uri())
        .inspect_err(|err| tracing::debug!(error = %err, path = %request.uri().path(), "rejected request"))?;

    request.extensions_mut().insert(current);
    Ok(next.run(request).await)
}
