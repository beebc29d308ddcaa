use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use thiserror::Error;

use storefront_core::UserId;
use storefront_infra::Caller;

use crate::app::errors::json_error;
use crate::context::CallerContext;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("missing {0} header")]
    Missing(&'static str),
    #[error("invalid {0} header")]
    Invalid(&'static str),
}

/// Resolves the caller of a request. Authentication itself happens upstream.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, headers: &HeaderMap) -> Result<Caller, IdentityError>;
}

/// Trusts identity headers set by the gateway in front of this service.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderIdentityProvider;

impl IdentityProvider for HeaderIdentityProvider {
    fn identify(&self, headers: &HeaderMap) -> Result<Caller, IdentityError> {
        let user_id: UserId = headers
            .get(USER_ID_HEADER)
            .ok_or(IdentityError::Missing(USER_ID_HEADER))?
            .to_str()
            .map_err(|_| IdentityError::Invalid(USER_ID_HEADER))?
            .trim()
            .parse()
            .map_err(|_| IdentityError::Invalid(USER_ID_HEADER))?;

        let is_privileged = match headers.get(USER_ROLE_HEADER) {
            None => false,
            Some(role) => role
                .to_str()
                .map_err(|_| IdentityError::Invalid(USER_ROLE_HEADER))?
                .trim()
                .eq_ignore_ascii_case("admin"),
        };

        Ok(Caller {
            user_id,
            is_privileged,
        })
    }
}

#[derive(Clone)]
pub struct IdentityState {
    pub provider: Arc<dyn IdentityProvider>,
}

pub async fn identity_middleware(
    State(state): State<IdentityState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let caller = match state.provider.identify(req.headers()) {
        Ok(caller) => caller,
        Err(e) => return json_error(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string()),
    };

    req.extensions_mut().insert(CallerContext::new(caller));
    next.run(req).await
}
