use actix_web::http::Uri;
use reqwest::{StatusCode, Url};

use crate::proxy_service::proxy_config::ProxyConfig;

/// Builds `https://{host}{path and query}` for the inbound request URI.
///
/// URL parsing resolves `.` and `..` segments of the path.
pub fn build(config: &ProxyConfig, uri: &Uri) -> Result<Url, url::ParseError> {
  let path_and_query = uri.path_and_query().map_or("/", |value| value.as_str());

  Url::parse(&format!("https://{}{}", config.upstream_host(), path_and_query))
}

/// Returns the URL to retry when the primary attempt was not found and an
/// index filename is configured.
pub fn index_fallback(config: &ProxyConfig, url: &Url, status: StatusCode) -> Option<Url> {
  let index_filename = config.index_filename()?;

  if status != StatusCode::NOT_FOUND || url.path().ends_with(&format!("/{}", index_filename)) {
    return None;
  }

  let mut path = url.path().to_string();
  if !path.ends_with('/') {
    path.push('/');
  }
  path.push_str(index_filename);

  let mut fallback = url.clone();
  fallback.set_path(&path);
  Some(fallback)
}
