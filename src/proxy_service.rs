use std::time::Duration;

use thiserror::Error;

use crate::upstream::UpstreamError;

pub mod deadline;
pub mod proxy_config;
pub mod proxy_factory;
pub mod proxy_route_service;
pub mod request_log;
pub mod status_recorder;
pub mod upstream_url;

/// Failures that end a request with a 500 response.
#[derive(Error, Debug)]
pub enum ProxyError {
  #[error("invalid upstream url: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error(transparent)]
  Upstream(#[from] UpstreamError),
  #[error("upstream request exceeded the {0:?} deadline")]
  DeadlineExceeded(Duration),
}
