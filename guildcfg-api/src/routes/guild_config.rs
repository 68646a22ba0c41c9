//! Guild configuration endpoints.
//!
//! `GET` returns the current configuration with its version as an `ETag`.
//! `PUT` replaces the configuration and requires the version the client last
//! saw in `If-Match`. The write budget is charged before the precondition or
//! body is looked at. Both body fields are required.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use guildcfg_core::{ConfigUpdate, GuildConfig};
use guildcfg_engine::UpdateRequest;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extractors::{Actor, GuildPath};
use crate::precondition::{etag, expected_version};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub tenant_id: String,
    pub allow_all_channels: bool,
    pub whitelisted_channel_ids: Vec<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<GuildConfig> for ConfigResponse {
    fn from(config: GuildConfig) -> Self {
        Self {
            tenant_id: config.tenant_id.to_string(),
            allow_all_channels: config.allow_all_channels,
            whitelisted_channel_ids: config.whitelist,
            version: config.version,
            updated_at: config.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigBody {
    pub allow_all_channels: bool,
    pub whitelisted_channel_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfigResponse {
    pub success: bool,
    pub config: ConfigResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/guilds/:tenant_id/config
pub async fn get_config(
    State(state): State<AppState>,
    Actor(actor): Actor,
    GuildPath(tenant_id): GuildPath,
) -> ApiResult<Response> {
    let config = state.service.get_config(&actor, &tenant_id).await?;
    let version = config.version;
    versioned(StatusCode::OK, version, Json(ConfigResponse::from(config)))
}

/// PUT /api/guilds/:tenant_id/config
pub async fn update_config(
    State(state): State<AppState>,
    Actor(actor): Actor,
    GuildPath(tenant_id): GuildPath,
    headers: HeaderMap,
    body: Result<Json<UpdateConfigBody>, JsonRejection>,
) -> ApiResult<Response> {
    state.service.admit_write(&actor).await?;
    let expected_version = expected_version(&headers)?;
    let Json(body) = body.map_err(|e| ApiError::invalid_input(e.body_text()))?;

    let receipt = state
        .service
        .apply_update(UpdateRequest {
            tenant_id,
            actor,
            expected_version,
            update: ConfigUpdate::new(body.allow_all_channels, body.whitelisted_channel_ids),
        })
        .await?;

    let warning = receipt.warning().map(str::to_string);
    let version = receipt.config.version;
    versioned(
        StatusCode::OK,
        version,
        Json(UpdateConfigResponse {
            success: true,
            config: receipt.config.into(),
            warning,
        }),
    )
}

/// Attach `ETag` and `Cache-Control: no-store` to a response.
fn versioned(status: StatusCode, version: i64, body: impl IntoResponse) -> ApiResult<Response> {
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::ETAG, etag(version)?);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
