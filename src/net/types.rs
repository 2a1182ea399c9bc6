//! Wire schema for the identity API.
//!
//! Every reply is a JSON object carrying a boolean-like `ok` field. Failed
//! replies put a human-readable reason in `error`. Request bodies borrow
//! their fields so callers never clone credentials just to serialize them.

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message shown when a failed reply carries no reason of its own.
pub const FALLBACK_ERROR: &str = "Request failed.";

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by identity API calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server answered with `ok == false`.
    #[error("{0}")]
    Application(String),

    /// The request never produced a usable reply (offline, bad body, ...).
    #[error("transport failed: {0}")]
    Transport(String),

    /// A header name or value could not be encoded.
    #[error("invalid header: {header}")]
    InvalidHeader { header: String },

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ApiError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Application(_) => "E_APPLICATION",
            Self::Transport(_) => "E_TRANSPORT",
            Self::InvalidHeader { .. } => "E_INVALID_HEADER",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }
}

// =============================================================================
// REQUEST BODIES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct LoginBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RegistrationBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

/// Partial profile update; absent fields are left untouched by the server.
#[derive(Debug, Default, Serialize)]
pub struct ProfileUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_user_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct PasswordBody<'a> {
    pub password: &'a str,
    pub confirm_password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct FlagBody<'a> {
    pub flag: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DeleteAccountBody<'a> {
    pub password: &'a str,
    pub delete_confirmed: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetRequestBody<'a> {
    pub id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordBody<'a> {
    pub token_forgotten_pwd: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

// =============================================================================
// REPLIES
// =============================================================================

/// Profile record returned by `GET /user/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Person {
    pub email: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenReply {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileReply {
    pub person: Person,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageReply {
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Judge a reply by its `ok` field and decode the success shape.
///
/// # Errors
///
/// `Application` when the server reported failure, `Transport` when the
/// reply is not an object, has no `ok` field, or lacks the fields `T`
/// requires.
pub fn parse_reply<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    let Value::Object(fields) = &body else {
        return Err(ApiError::Transport("reply is not a JSON object".to_owned()));
    };

    let Some(ok) = fields.get("ok") else {
        return Err(ApiError::Transport("reply has no `ok` field".to_owned()));
    };
    if !is_truthy(ok) {
        let reason = fields
            .get("error")
            .or_else(|| fields.get("message"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .unwrap_or(FALLBACK_ERROR);
        return Err(ApiError::Application(reason.to_owned()));
    }

    serde_json::from_value(body).map_err(|e| ApiError::Transport(format!("malformed reply: {e}")))
}

/// Boolean-like interpretation of the `ok` field.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0) || n.as_u64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "ok" | "yes" | "1"),
        _ => false,
    }
}
