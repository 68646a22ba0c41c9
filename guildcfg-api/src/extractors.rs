//! Request extractors for the acting user and the tenant path segment.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use guildcfg_core::{ActorId, TenantId};

use crate::error::ApiError;

/// Header set by the authentication layer in front of this service.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The authenticated user performing the request.
#[derive(Debug, Clone)]
pub struct Actor(pub ActorId);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

        let actor = ActorId::new(actor);
        // The sentinel is reserved for writes made by the engine itself.
        if actor.is_system() {
            return Err(ApiError::unauthorized("Reserved actor id"));
        }
        Ok(Actor(actor))
    }
}

/// `:tenant_id` path segment, validated.
#[derive(Debug, Clone)]
pub struct GuildPath(pub TenantId);

#[async_trait]
impl<S> FromRequestParts<S> for GuildPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_input(format!("Invalid path: {}", e)))?;
        let tenant_id = TenantId::parse(raw)?;
        Ok(GuildPath(tenant_id))
    }
}
