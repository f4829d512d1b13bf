//! Pure validation and normalization helpers applied at registration.

use url::Url;

use crate::error::ClientFactoryError;

/// Check that `name` is usable as the host of a load-balanced URL.
///
/// # Errors
/// Returns `InvalidClientName` if `name` is blank or does not parse as a host
/// once prefixed with `http://`.
pub fn validate_name(name: &str) -> Result<&str, ClientFactoryError> {
    if name.trim().is_empty() {
        return Err(ClientFactoryError::InvalidClientName {
            name: name.to_owned(),
            reason: "name must not be blank".to_owned(),
        });
    }
    let candidate = if has_http_scheme(name) {
        name.to_owned()
    } else {
        format!("http://{name}")
    };
    match Url::parse(&candidate) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(name),
        Ok(_) => Err(ClientFactoryError::InvalidClientName {
            name: name.to_owned(),
            reason: "service id is not a legal hostname".to_owned(),
        }),
        Err(e) => Err(ClientFactoryError::InvalidClientName {
            name: name.to_owned(),
            reason: format!("service id is not a legal hostname: {e}"),
        }),
    }
}

/// Whether `name` already carries an `http://` or `https://` scheme.
pub(crate) fn has_http_scheme(name: &str) -> bool {
    name.starts_with("http://") || name.starts_with("https://")
}

/// Normalize a fixed client URL.
///
/// Blank stays blank and unresolved `#{...}` expressions pass through; otherwise
/// `http://` is prefixed when no scheme is present, the result must parse, and
/// trailing slashes are removed.
///
/// # Errors
/// Returns `MalformedUrl` if the URL cannot be parsed.
pub fn normalize_url(url: &str) -> Result<String, ClientFactoryError> {
    let url = url.trim();
    if url.is_empty() || (url.starts_with("#{") && url.contains('}')) {
        return Ok(url.to_owned());
    }
    let url = if url.contains("://") {
        url.to_owned()
    } else {
        format!("http://{url}")
    };
    if let Err(source) = Url::parse(&url) {
        return Err(ClientFactoryError::MalformedUrl { url, source });
    }
    Ok(url.trim_end_matches('/').to_owned())
}

/// Normalize a path prefix: trimmed, one leading slash, no trailing slash.
/// Blank stays blank.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        return String::new();
    }
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("/{trimmed}")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(validate_name("my-service").unwrap(), "my-service");
        assert!(validate_name("users.internal:8080").is_ok());
        assert!(validate_name("https://users").is_ok());
        assert!(validate_name("httpbin").is_ok());
        for bad in ["my service", "", "   "] {
            assert!(
                matches!(validate_name(bad), Err(ClientFactoryError::InvalidClientName { .. })),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn scheme_detection_needs_the_separator() {
        assert!(has_http_scheme("http://users"));
        assert!(has_http_scheme("https://users"));
        assert!(!has_http_scheme("httpbin"));
        assert!(!has_http_scheme("http-gateway"));
    }

    #[test]
    fn urls() {
        assert_eq!(normalize_url("my-service").unwrap(), "http://my-service");
        assert_eq!(normalize_url("https://x.com/").unwrap(), "https://x.com");
        assert_eq!(normalize_url("https://x.com/api//").unwrap(), "https://x.com/api");
        assert_eq!(normalize_url("localhost:8080").unwrap(), "http://localhost:8080");
        assert_eq!(normalize_url("").unwrap(), "");
        assert_eq!(normalize_url("#{users.url}").unwrap(), "#{users.url}");
        assert!(matches!(
            normalize_url("not a url"),
            Err(ClientFactoryError::MalformedUrl { .. })
        ));
    }

    #[test]
    fn paths() {
        assert_eq!(normalize_path(" api/v1/ "), "/api/v1");
        assert_eq!(normalize_path("/api"), "/api");
        assert_eq!(normalize_path("//api//"), "/api");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path(""), "");
    }
}
