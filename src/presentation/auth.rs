//! Inbound API-key authentication.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::application::errors::GatewayError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Check the `X-API-Key` header against the configured allow-list.
///
/// Every configured key is compared, each in constant time, so neither the
/// match position nor an early exit leaks timing information. Key length is
/// not secret.
pub fn authenticate(headers: &HeaderMap, allowed_keys: &[String]) -> Result<(), GatewayError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(GatewayError::Unauthenticated)?;

    let mut matched = subtle::Choice::from(0u8);
    for key in allowed_keys {
        matched |= provided.as_bytes().ct_eq(key.as_bytes());
    }

    if bool::from(matched) {
        Ok(())
    } else {
        Err(GatewayError::Unauthenticated)
    }
}
