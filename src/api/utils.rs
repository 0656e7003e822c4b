//! Stateless helpers for HTTP request processing

use axum::http::HeaderMap;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;

/// Header carrying the caller's user id, set by the authenticating gateway
pub const USER_HEADER: &str = "X-Gradebox-User";

/// Parses and validates Content-Type header for application/json
///
/// Accepts `application/json`, optionally with a charset parameter. Rejects
/// look-alikes such as `application/jsonp` or `text/json`.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// The caller's user id from [`USER_HEADER`]
pub fn user_id(headers: &HeaderMap) -> Result<u64, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or(ApiError::Unauthenticated)
}

/// Check the content type, read at most `max_bytes` and decode JSON
pub async fn read_json<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: axum::body::Body,
    max_bytes: usize,
) -> Result<T, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    let data = Limited::new(body, max_bytes)
        .collect()
        .await
        .map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::PayloadTooLarge(max_bytes)
            } else {
                ApiError::InvalidPayload(err.to_string())
            }
        })?
        .to_bytes();

    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::Value;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers
    }

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
        assert!(parse_content_type("application/json; charset=UTF-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("application/json-patch+json").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("invalid").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_user_id_header() {
        let mut headers = HeaderMap::new();
        assert!(matches!(user_id(&headers), Err(ApiError::Unauthenticated)));

        headers.insert(USER_HEADER, HeaderValue::from_static("abc"));
        assert!(matches!(user_id(&headers), Err(ApiError::Unauthenticated)));

        headers.insert(USER_HEADER, HeaderValue::from_static(" 42 "));
        assert_eq!(user_id(&headers).unwrap(), 42);
    }

    #[tokio::test]
    async fn test_read_json_within_limit() {
        let body = axum::body::Body::from(r#"{"code":"ABC123"}"#);
        let value: Value = read_json(&json_headers(), body, 1024).await.unwrap();
        assert_eq!(value["code"], "ABC123");
    }

    #[tokio::test]
    async fn test_read_json_too_large() {
        let body = axum::body::Body::from(vec![b' '; 2048]);
        let result: Result<Value, _> = read_json(&json_headers(), body, 1024).await;
        assert!(matches!(result, Err(ApiError::PayloadTooLarge(1024))));
    }

    #[tokio::test]
    async fn test_read_json_requires_content_type() {
        let body = axum::body::Body::from("{}");
        let result: Result<Value, _> = read_json(&HeaderMap::new(), body, 1024).await;
        assert!(matches!(result, Err(ApiError::InvalidPayload(_))));
    }
}
