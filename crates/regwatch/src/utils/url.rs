//! URL helpers.

use url::Url;

use crate::error::{Error, Result};

/// Appends path segments to `base`, keeping any path the base already has.
///
/// `endpoint(https://host/api, ["notifications", "stream"])` yields
/// `https://host/api/notifications/stream`.
pub fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| Error::config(format!("base URL cannot carry a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Renders a URL without its query string so credentials passed as query
/// parameters never reach the logs.
pub fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
