//! `If-Match` / `ETag` handling.
//!
//! Versions travel as quoted decimal integers: `"3"`.

use axum::http::{header, HeaderMap, HeaderValue};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ApiError, ApiResult};

static VERSION_TAG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"^"(\d{1,18})"$"#).ok());

/// Expected version carried by the `If-Match` header.
pub fn expected_version(headers: &HeaderMap) -> ApiResult<i64> {
    let raw = headers
        .get(header::IF_MATCH)
        .ok_or_else(|| ApiError::precondition_failed("If-Match header is required"))?
        .to_str()
        .map_err(|_| ApiError::precondition_failed("If-Match header is not valid ASCII"))?;

    parse_version_tag(raw.trim()).ok_or_else(|| {
        ApiError::precondition_failed(format!(
            "If-Match must be a quoted version number, got {}",
            raw
        ))
    })
}

pub fn parse_version_tag(raw: &str) -> Option<i64> {
    let regex = VERSION_TAG.as_ref()?;
    let captures = regex.captures(raw)?;
    captures.get(1)?.as_str().parse().ok()
}

pub fn version_tag(version: i64) -> String {
    format!("\"{}\"", version)
}

/// `ETag` header value for `version`.
pub fn etag(version: i64) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&version_tag(version))
        .map_err(|e| ApiError::internal_error(format!("Invalid ETag value: {}", e)))
}
