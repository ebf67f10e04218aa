//! Authentication layer for everything under `/api/v1`.
//!
//! [`auth_middleware`] resolves the API key to an [`AuthContext`] and stores
//! it in the request extensions, where [`AuthExtractor`] picks it up.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::auth::{AuthConfig, AuthContext};
use crate::error::ApiError;

/// State handed to [`auth_middleware`] through `from_fn_with_state`.
#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub auth_config: Arc<AuthConfig>,
}

impl AuthMiddlewareState {
    pub fn new(auth_config: AuthConfig) -> Self {
        Self {
            auth_config: Arc::new(auth_config),
        }
    }
}

pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = match state.auth_config.authenticate(request.headers()) {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::debug!(
                method = %request.method(),
                path = %request.uri().path(),
                "no usable API key"
            );
            return Err(err);
        }
    };

    tracing::trace!(tenant_id = %ctx.tenant_id, environment = %ctx.environment, "caller identified");
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Caller identity for handlers behind [`auth_middleware`].
///
/// Outside the middleware the extension is absent and extraction fails with 500.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthContext>() {
            Some(ctx) => Ok(Self(ctx.clone())),
            None => Err(ApiError::internal_error(
                "route is missing the authentication layer",
            )),
        }
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &AuthContext {
        &self.0
    }
}
