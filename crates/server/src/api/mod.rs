//! HTTP handlers, split by concern:
//! - `doc`: OpenAPI aggregation served at `/docs`
//! - `health`: readiness and scheduler metrics
//! - `jobs`: submission, observation, cancellation
//! - `providers`: registry listing

pub mod doc;
pub mod health;
pub mod jobs;
pub mod providers;

use axum::http::HeaderMap;

use scriptorium_core::{Credentials, Rights};

/// Resolve the caller from gateway headers.
///
/// `x-user` names the acting user; `x-rights` is a comma-separated
/// subset of `read,write,execute,special`. Requests without `x-rights`
/// get operator rights. Values are trusted as-is since authentication
/// happens upstream of this service.
pub(crate) fn credentials(headers: &HeaderMap) -> Credentials {
    let user = headers
        .get("x-user")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let rights = match headers.get("x-rights").and_then(|v| v.to_str().ok()) {
        Some(spec) => {
            let mut rights = Rights::default();
            for token in spec.split(',') {
                match token.trim() {
                    "read" => rights.read = true,
                    "write" => rights.write = true,
                    "execute" => rights.execute = true,
                    "special" => rights.special = true,
                    _ => {}
                }
            }
            rights
        }
        None => Rights::operator(),
    };

    Credentials { user, rights }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::HeaderValue;

    #[test]
    fn headers_resolve_to_user_and_rights() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user", HeaderValue::from_static("alice"));
        headers.insert("x-rights", HeaderValue::from_static("read, execute"));

        let creds = credentials(&headers);
        assert_eq!(creds.user.as_deref(), Some("alice"));
        assert!(creds.rights.read);
        assert!(creds.rights.execute);
        assert!(!creds.rights.write);
        assert!(!creds.rights.special);
    }

    #[test]
    fn missing_rights_header_defaults_to_operator() {
        let headers = HeaderMap::new();
        let creds = credentials(&headers);
        assert!(creds.user.is_none());
        assert_eq!(creds.rights, Rights::operator());
    }

    #[test]
    fn unknown_right_tokens_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-rights", HeaderValue::from_static("execute,sudo"));
        let creds = credentials(&headers);
        assert!(creds.rights.execute);
        assert!(!creds.rights.special);
    }
}
