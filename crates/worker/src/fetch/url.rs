//! URL canonicalization so cache keys stay consistent.

/// Error type for URL handling failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an absolute URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Lowercase the host
/// 3. Remove fragment (#...)
/// 4. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            parsed
                .set_host(Some(lowered.as_str()))
                .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
        }
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Resolve a possibly-relative target against an origin and canonicalize it.
///
/// Absolute `http(s)` targets are taken as-is; anything else is joined onto
/// the base the way a path in an install manifest is.
pub fn resolve(base: &url::Url, target: &str) -> Result<url::Url, UrlError> {
    let trimmed = target.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    if trimmed.contains("://") {
        return canonicalize(trimmed);
    }

    let joined = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    canonicalize(joined.as_str())
}
