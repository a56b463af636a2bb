use aieditor_core::AiError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

/// `Mon, 01 Jan 2024 00:00:00 GMT`
pub fn rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn hmac_sha256_base64(secret: &str, message: &str) -> Result<String, AiError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| AiError::Sign(format!("invalid api secret: {e}")))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn signature(secret: &str, host: &str, path: &str, date: &str) -> Result<String, AiError> {
    let origin = format!("host: {host}\ndate: {date}\nGET {path} HTTP/1.1");
    hmac_sha256_base64(secret, &origin)
}

/// Base64 of the `authorization` header value the gateway expects.
pub fn authorization(api_key: &str, signature: &str) -> String {
    let header = format!(
        r#"api_key="{api_key}", algorithm="hmac-sha256", headers="host date request-line", signature="{signature}""#
    );
    STANDARD.encode(header)
}

/// `base` with `authorization`, `date` and `host` appended as query
/// parameters.
pub fn signed_url(
    base: &str,
    api_key: &str,
    api_secret: &str,
    at: DateTime<Utc>,
) -> Result<String, AiError> {
    let parsed = Url::parse(base).map_err(|e| AiError::Config(format!("spark url `{base}`: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AiError::Config(format!("spark url `{base}` has no host")))?;
    let date = rfc1123(at);
    let sig = signature(api_secret, host, parsed.path(), &date)?;
    let auth = authorization(api_key, &sig);
    let url = Url::parse_with_params(
        base,
        &[("authorization", auth.as_str()), ("date", date.as_str()), ("host", host)],
    )
    .map_err(|e| AiError::Sign(e.to_string()))?;
    Ok(url.into())
}
