//! Credential masking for log output.
//!
//! Provider adapters log every outbound request with its headers. Header
//! values that carry credentials go through [`mask_headers`] first; all other
//! headers are logged unchanged.

/// Marker that replaces the hidden part of a secret.
const MASK: &str = "***";

/// Secrets up to this many chars are hidden entirely.
const MIN_REVEAL_LEN: usize = 8;

const BEARER: &str = "Bearer ";

/// Header names (lowercase) whose values are credentials.
const SECRET_HEADERS: &[&str] = &["authorization", "x-api-key"];

/// Mask a secret, revealing only the first 3 and last 2 characters.
///
/// # Example
/// ```
/// use dst_ai_gateway::utils::sanitize::mask_secret;
///
/// assert_eq!(mask_secret("sk-abcdefghijklmnop"), "sk-***op");
/// assert_eq!(mask_secret("short"), "***");
/// assert_eq!(mask_secret(""), "");
/// ```
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= MIN_REVEAL_LEN {
        return MASK.to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, MASK, tail)
}

fn is_secret_header(name: &str) -> bool {
    SECRET_HEADERS
        .iter()
        .any(|secret| secret.eq_ignore_ascii_case(name))
}

/// Split a `Bearer ` scheme prefix (any case) from its token.
fn split_bearer(value: &str) -> Option<(&str, &str)> {
    let scheme = value.get(..BEARER.len())?;
    if scheme.eq_ignore_ascii_case(BEARER) {
        Some((scheme, &value[BEARER.len()..]))
    } else {
        None
    }
}

/// Mask credential-bearing header values.
///
/// A `Bearer ` scheme prefix is kept so the log still shows the auth type.
pub fn mask_headers(headers: &[(&str, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if !is_secret_header(name) {
                value.clone()
            } else if let Some((scheme, token)) = split_bearer(value) {
                format!("{}{}", scheme, mask_secret(token))
            } else {
                mask_secret(value)
            };
            (name.to_string(), shown)
        })
        .collect()
}
