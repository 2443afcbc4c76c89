// src/server/auth.rs

//! Authenticated-principal accessor
//!
//! Identity issuance (OAuth/OIDC, sessions) lives outside this service;
//! the fronting layer forwards the authenticated user id in the
//! `x-auth-user` header. Absence of the header is an anonymous caller.
//! Resolved principal closures are memoized in the TTL cache.

use crate::acl::{self, PrincipalSet};
use crate::cache;
use crate::error::Result;
use crate::server::ServerState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::json;
use std::convert::Infallible;

/// Header carrying the authenticated user id
pub const AUTH_HEADER: &str = "x-auth-user";

/// The (optional) authenticated user id of a request
#[derive(Debug, Clone)]
pub struct AuthUser(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Infallible> {
        let user = parts
            .headers
            .get(AUTH_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        Ok(AuthUser(user))
    }
}

/// Resolve the caller to its principal closure, memoized per user
///
/// Opens its own connection on a cache miss rather than taking one from
/// the caller: a `Connection` is `!Sync`, so a borrowed `&Connection`
/// held across the cache lookup's `.await` would make this future (and
/// every handler future awaiting it) non-`Send`.
pub async fn resolve_actor(state: &ServerState, auth: &AuthUser) -> Result<PrincipalSet> {
    let Some(user_id) = &auth.0 else {
        return Ok(PrincipalSet::anonymous());
    };

    let key = cache::principals_key(user_id);
    if let Some(cached) = state.cache.get(&key).await {
        if let Ok(groups) = serde_json::from_value::<Vec<String>>(cached) {
            return Ok(PrincipalSet {
                user_id: Some(user_id.clone()),
                groups,
            });
        }
    }

    let conn = crate::db::open(&state.config.db_path)?;
    let principals = acl::resolve_principals(&conn, user_id)?;
    state
        .cache
        .put(&key, json!(principals.groups), state.config.principals_cache_ttl)
        .await;
    Ok(principals)
}
