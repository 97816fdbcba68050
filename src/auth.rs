//! Bearer-token boundary: JWT claims, the `Authentication` middleware and
//! resolution of the calling [`Actor`].

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http, web, Error, HttpMessage, HttpRequest, ResponseError,
};
use chrono::{Duration, Utc};
use futures::future::{ok, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::Role;
use crate::store::Store;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// Identity of the caller, as placed in request extensions by the
/// middleware and confirmed against the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Actor { user_id: user_id.into(), role }
    }
}

pub fn issue_token(user_id: &str, role: Role, secret: &str, ttl: Duration) -> AppResult<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: (Utc::now() + ttl).timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Resolves the caller. The stored user is authoritative for role and
/// suspension, the token only names the user.
pub async fn current_actor(req: &HttpRequest, store: &dyn Store) -> AppResult<Actor> {
    let claimed = req
        .extensions()
        .get::<Actor>()
        .cloned()
        .ok_or_else(|| AppError::Unauthenticated("missing bearer token".to_string()))?;
    let user = store
        .user(&claimed.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("unknown user".to_string()))?;
    if user.is_suspended {
        return Err(AppError::Permission("account is suspended".to_string()));
    }
    Ok(Actor::new(user.id, user.role))
}

/// Validates `Authorization: Bearer <jwt>` when present and stores the
/// claimed [`Actor`] in request extensions. Requests without a token pass
/// through; handlers that need a caller reject them.
#[derive(Debug, Clone)]
pub struct Authentication {
    secret: Rc<str>,
}

impl Authentication {
    pub fn new(secret: &str) -> Self {
        Authentication { secret: Rc::from(secret) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: Rc<str>,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get(http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    value.strip_prefix("Bearer ").map(|t| t.trim().to_string())
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Browsers cannot set headers on websocket upgrades.
        let token = bearer_token(&req).or_else(|| {
            web::Query::<TokenQuery>::from_query(req.query_string())
                .ok()
                .and_then(|q| q.into_inner().token)
        });

        if let Some(token) = token {
            match validate_jwt(&token, &self.secret) {
                Ok(claims) => {
                    req.extensions_mut().insert(Actor::new(claims.sub, claims.role));
                }
                Err(e) => {
                    debug!("Rejected bearer token: {}", e);
                    let (req_parts, _payload) = req.into_parts();
                    let resp = AppError::Unauthenticated(format!("invalid token: {}", e))
                        .error_response()
                        .map_into_boxed_body();
                    let srv_resp = ServiceResponse::new(req_parts, resp);
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}
