use bytes::Bytes;
use futures_core::future::LocalBoxFuture;
use futures_core::stream::LocalBoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HOST};
use reqwest::{Client, Method, StatusCode, Url};
use thiserror::Error;

pub type UpstreamBody = LocalBoxStream<'static, Result<Bytes, UpstreamError>>;

#[derive(Error, Debug)]
pub enum UpstreamError {
  #[error("unable to build upstream request: {0}")]
  Build(String),
  #[error("{0}")]
  Send(String),
  #[error("reading upstream body failed: {0}")]
  Body(String),
  #[error("deadline exceeded while reading upstream body")]
  Deadline,
}

/// Outbound request to the object storage. Never carries a body.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
}

impl UpstreamRequest {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: HeaderMap::new(),
    }
  }

  pub fn with_headers<'a, I>(mut self, headers: I) -> Self
  where
    I: IntoIterator<Item = (&'a reqwest::header::HeaderName, &'a reqwest::header::HeaderValue)>,
  {
    for (name, value) in headers {
      // the storage host is taken from the url
      if name == HOST {
        continue;
      }
      self.headers.append(name.clone(), value.clone());
    }
    self
  }
}

pub struct UpstreamResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: UpstreamBody,
}

impl std::fmt::Debug for UpstreamResponse {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("UpstreamResponse")
      .field("status", &self.status)
      .field("headers", &self.headers)
      .finish_non_exhaustive()
  }
}

/// Executes requests against the object storage.
///
/// Dropping the returned future aborts the call; dropping the response
/// releases its body.
pub trait UpstreamClient {
  fn execute(&self, request: UpstreamRequest) -> LocalBoxFuture<'static, Result<UpstreamResponse, UpstreamError>>;
}

impl UpstreamClient for Client {
  fn execute(&self, request: UpstreamRequest) -> LocalBoxFuture<'static, Result<UpstreamResponse, UpstreamError>> {
    let UpstreamRequest { method, url, headers } = request;
    let built = self
      .request(method, url)
      .headers(headers)
      .build()
      .map_err(|err| UpstreamError::Build(err.to_string()));
    let client = self.clone();

    Box::pin(async move {
      let response = client
        .execute(built?)
        .await
        .map_err(|err| UpstreamError::Send(err.to_string()))?;

      let status = response.status();
      let headers = response.headers().clone();
      let body = response
        .bytes_stream()
        .map_err(|err| UpstreamError::Body(err.to_string()))
        .boxed_local();

      Ok(UpstreamResponse { status, headers, body })
    })
  }
}
