//! JWT 认证模块
//!
//! 提供 token 生成、验证，以及从请求中提取当前用户的 `AuthUser` 提取器。
//! HTTP 请求使用 `Authorization: Bearer` 头；WebSocket 握手也可以用 `token` 查询参数。

use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::ApiError, state::AppState};

/// 依次尝试的用户ID声明
pub const USER_ID_CLAIMS: [&str; 2] = ["sub", "user_id"];

/// 签发 token 使用的声明
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// 按 [`USER_ID_CLAIMS`] 的顺序取第一个存在的声明，必须是 UUID 字符串
pub fn extract_user_id(claims: &Map<String, Value>) -> Option<UserId> {
    let value = USER_ID_CLAIMS.iter().find_map(|name| claims.get(*name))?;
    value.as_str()?.parse().ok()
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn generate_token(&self, user_id: UserId) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::internal_server_error(format!("token generation failed: {err}")))
    }

    /// 验证签名和过期时间，并提取用户ID
    pub fn verify_token(&self, token: &str) -> Result<UserId, ApiError> {
        let claims = decode::<Map<String, Value>>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| ApiError::unauthorized(format!("invalid token: {err}")))?;

        extract_user_id(&claims).ok_or_else(|| ApiError::unauthorized("token carries no user id"))
    }

    pub fn extract_user_from_headers(&self, headers: &HeaderMap) -> Result<UserId, ApiError> {
        let token = bearer_token(headers)?
            .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;
        self.verify_token(token)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("invalid authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or_else(|| ApiError::unauthorized("invalid authorization header format"))
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// 已认证的当前用户
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(&parts.headers)? {
            return state.jwt_service.verify_token(token).map(AuthUser);
        }

        let query = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        match query.token {
            Some(token) => state.jwt_service.verify_token(&token).map(AuthUser),
            None => Err(ApiError::unauthorized("missing credentials")),
        }
    }
}
