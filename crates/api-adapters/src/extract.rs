//! Request extractors.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

use domains::Actor;

use crate::state::AppState;

/// The verified requester, if any.
///
/// A missing or unverifiable bearer token yields `None`; the service decides
/// whether the operation needs an actor.
#[derive(Debug, Clone, Copy)]
pub struct MaybeActor(pub Option<Actor>);

impl MaybeActor {
    pub fn as_ref(&self) -> Option<&Actor> {
        self.0.as_ref()
    }
}

pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for MaybeActor {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeActor(None));
        };
        match state.identity.verify(token) {
            Ok(actor) => Ok(MaybeActor(Some(actor))),
            Err(e) => {
                debug!(error = %e, "ignoring unverifiable bearer token");
                Ok(MaybeActor(None))
            }
        }
    }
}
