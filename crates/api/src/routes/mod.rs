//! HTTP handlers grouped by resource.

pub mod drivers;
pub mod orders;
pub mod payouts;
pub mod system;
pub mod wallets;

use std::fmt::Display;
use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path segment, reporting the field name on failure.
pub(crate) fn parse_id<T>(raw: &str, field: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
