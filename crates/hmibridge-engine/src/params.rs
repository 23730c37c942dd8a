//! Typed access to envelope parameters for `init`-time validation.

use serde_json::{Map, Value};

use crate::envelope::Payload;
use crate::error::ValidationError;

/// Returns a mandatory object parameter.
///
/// # Errors
///
/// Returns [`ValidationError`] when the parameter is absent or not an object.
pub fn required_object<'a>(
    payload: &'a Payload,
    name: &str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    payload
        .get(name)
        .ok_or_else(|| ValidationError::missing(name))?
        .as_object()
        .ok_or_else(|| ValidationError::invalid(name, "an object"))
}

/// Returns a mandatory non-empty string parameter.
///
/// # Errors
///
/// Returns [`ValidationError`] when the parameter is absent, not a string or
/// empty.
pub fn required_str<'a>(payload: &'a Payload, name: &str) -> Result<&'a str, ValidationError> {
    let value = payload
        .get(name)
        .ok_or_else(|| ValidationError::missing(name))?
        .as_str()
        .ok_or_else(|| ValidationError::invalid(name, "a string"))?;
    if value.is_empty() {
        return Err(ValidationError::invalid(name, "a non-empty string"));
    }
    Ok(value)
}

/// Returns an optional boolean parameter.
///
/// # Errors
///
/// Returns [`ValidationError`] when the parameter is present but not a boolean.
pub fn optional_bool(payload: &Payload, name: &str) -> Result<Option<bool>, ValidationError> {
    payload
        .get(name)
        .map(|value| {
            value
                .as_bool()
                .ok_or_else(|| ValidationError::invalid(name, "a boolean"))
        })
        .transpose()
}

/// Returns an optional unsigned 32-bit parameter.
///
/// # Errors
///
/// Returns [`ValidationError`] when the parameter is present but not an
/// integer in `0..=u32::MAX`.
pub fn optional_u32(payload: &Payload, name: &str) -> Result<Option<u32>, ValidationError> {
    payload
        .get(name)
        .map(|value| {
            value
                .as_u64()
                .and_then(|raw| u32::try_from(raw).ok())
                .ok_or_else(|| ValidationError::invalid(name, "an unsigned 32-bit integer"))
        })
        .transpose()
}
