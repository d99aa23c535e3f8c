//! Account credential exchange against the Logitech web service.
//!
//! A Harmony account's email and password buy a user auth token. The token is
//! not needed by the local guest pairing handshake; it is kept for hubs and
//! tools that still authenticate against the cloud.

use serde_json::Value as JsonValue;

use crate::error::AuthTokenError;

pub const USER_AUTH_TOKEN_URL: &str =
    "https://svcs.myharmony.com/CompositeSecurityServices/Security.svc/json/GetUserAuthToken";

/// Posts `{email, password}` and returns the user auth token.
#[cfg(feature = "cloud")]
pub async fn get_user_auth_token(
    http: &reqwest::Client,
    email: &str,
    password: &str,
) -> Result<String, AuthTokenError> {
    log::info!("retrieve user auth token for {email}");
    let response = http
        .post(USER_AUTH_TOKEN_URL)
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await
        .map_err(http_error)?;
    let body: JsonValue = response.json().await.map_err(http_error)?;
    let token = parse_user_auth_token(&body);
    match &token {
        Ok(_) => log::info!("user auth token retrieved"),
        Err(err) => log::warn!("failed to retrieve user auth token: {err}"),
    }
    token
}

#[cfg(feature = "cloud")]
fn http_error(err: reqwest::Error) -> AuthTokenError {
    AuthTokenError::Http {
        message: err.to_string(),
    }
}

/// Extracts the token from a `GetUserAuthToken` response body.
///
/// A present, non-empty `ErrorCode` means the exchange was rejected.
pub fn parse_user_auth_token(body: &JsonValue) -> Result<String, AuthTokenError> {
    if let Some(code) = body.get("ErrorCode").filter(|code| is_set(code)) {
        let code = match code {
            JsonValue::String(text) => text.clone(),
            other => other.to_string(),
        };
        let message = body
            .get("Message")
            .and_then(JsonValue::as_str)
            .unwrap_or("check email and password")
            .to_owned();
        return Err(AuthTokenError::Rejected { code, message });
    }

    body.pointer("/GetUserAuthTokenResult/UserAuthToken")
        .and_then(JsonValue::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .ok_or(AuthTokenError::MissingToken)
}

fn is_set(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(flag) => *flag,
        JsonValue::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(text) => !text.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}
