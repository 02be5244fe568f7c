//! Canonical URL forms used for classification and deduplication

use url::Url;

/// Why a string could not be treated as a URL
#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("URL has no host: {0}")]
    NoHost(String),

    #[error("invalid URL: {0}")]
    Parse(#[from] url::ParseError),
}

/// Parse a URL, assuming `http://` when no scheme is given
pub fn parse_url(raw: &str) -> Result<Url, UrlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::Empty);
    }

    let url = if raw.contains("://") {
        Url::parse(raw)?
    } else {
        Url::parse(&format!("http://{}", raw.trim_start_matches("//")))?
    };

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::NoHost(raw.to_string()));
    }
    Ok(url)
}

/// Rewrites URLs into a canonical string.
///
/// Scheme and host are lowercased, default ports dropped, dot segments
/// resolved and trailing slashes removed. Query parameters are sorted by
/// name (stable, so repeated names keep their relative order) and
/// fragments are dropped unless configured otherwise.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    pub sort_params: bool,
    pub remove_fragments: bool,
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self {
            sort_params: true,
            remove_fragments: true,
        }
    }
}

impl UrlNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&self, raw: &str) -> Result<String, UrlError> {
        let url = parse_url(raw)?;

        let mut out = self.base_of(&url);
        if let Some(query) = self.query_of(&url) {
            out.push('?');
            out.push_str(&query);
        }
        if !self.remove_fragments {
            if let Some(fragment) = url.fragment() {
                out.push('#');
                out.push_str(fragment);
            }
        }
        Ok(out)
    }

    /// Normalize many URLs, skipping the ones that fail to parse
    pub fn normalize_batch(&self, urls: &[String]) -> Vec<String> {
        urls.iter()
            .filter_map(|url| match self.normalize(url) {
                Ok(normalized) => Some(normalized),
                Err(e) => {
                    tracing::debug!("Skipping URL {:?}: {}", url, e);
                    None
                }
            })
            .collect()
    }

    /// `scheme://host[:port]/path` without query or fragment
    pub fn get_base_url(&self, raw: &str) -> Result<String, UrlError> {
        Ok(self.base_of(&parse_url(raw)?))
    }

    /// Lowercased host without port
    pub fn get_domain(&self, raw: &str) -> Option<String> {
        parse_url(raw)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.to_lowercase()))
    }

    /// Decoded query parameters in canonical order
    pub fn query_params(&self, url: &Url) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        if self.sort_params {
            params.sort_by(|a, b| a.0.cmp(&b.0));
        }
        params
    }

    fn base_of(&self, url: &Url) -> String {
        let mut out = format!("{}://", url.scheme());
        if !url.username().is_empty() {
            out.push_str(url.username());
            if let Some(password) = url.password() {
                out.push(':');
                out.push_str(password);
            }
            out.push('@');
        }
        out.push_str(&url.host_str().unwrap_or_default().to_lowercase());
        // `port()` is None when the port is the scheme default
        if let Some(port) = url.port() {
            out.push_str(&format!(":{}", port));
        }
        out.push_str(normalize_path(url.path()));
        out
    }

    fn query_of(&self, url: &Url) -> Option<String> {
        let params = self.query_params(url);
        if params.is_empty() {
            return None;
        }
        Some(
            params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&"),
        )
    }
}

fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}
