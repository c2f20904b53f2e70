use std::sync::Arc;
use std::time::Instant;

use actix_web::body::{BodyStream, SizedStream};
use actix_web::dev::{self, Service, ServiceRequest, ServiceResponse};
use actix_web::http::{header, Method, StatusCode};
use actix_web::{HttpRequest, HttpResponse};
use futures_core::future::LocalBoxFuture;
use reqwest::header::HeaderMap;

use crate::proxy_service::deadline::Deadline;
use crate::proxy_service::proxy_config::ProxyConfig;
use crate::proxy_service::request_log::{self, RequestLog};
use crate::proxy_service::status_recorder::StatusRecorder;
use crate::proxy_service::{upstream_url, ProxyError};
use crate::upstream::{UpstreamClient, UpstreamRequest};

pub struct ProxyRouteService<C> {
  pub(super) config: Arc<ProxyConfig>,
  pub(super) http_client: Arc<C>,
}

impl<C: UpstreamClient + 'static> Service<ServiceRequest> for ProxyRouteService<C> {
  type Response = ServiceResponse;
  type Error = actix_web::Error;
  type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

  dev::always_ready!();

  fn call(&self, req: ServiceRequest) -> Self::Future {
    let config = self.config.clone();
    let http_client = self.http_client.clone();

    Box::pin(async move { Ok(ProxyRouteService::exec(config, http_client, req).await) })
  }
}

impl<C: UpstreamClient> ProxyRouteService<C> {
  async fn exec(config: Arc<ProxyConfig>, http_client: Arc<C>, req: ServiceRequest) -> ServiceResponse {
    let start = Instant::now();
    // the inbound payload is released when this call returns
    let (http, _payload) = req.into_parts();
    let mut recorder = StatusRecorder::new();

    let outcome = Self::forward(&config, http_client.as_ref(), &http, &mut recorder).await;
    let (response, error) = match outcome {
      Ok(response) => (response, None),
      Err(err) => {
        let response = recorder
          .write_status(StatusCode::INTERNAL_SERVER_ERROR)
          .content_type("text/plain; charset=utf-8")
          .body(err.to_string());
        (response, Some(err))
      }
    };

    // emitted once the body has been sent, so elapsed covers the copy
    let response =
      RequestLog::new(&config, &http, start, recorder.code(), error.as_ref()).attach(response, config.logger);

    ServiceResponse::new(http, response)
  }

  async fn forward(
    config: &ProxyConfig,
    http_client: &C,
    http: &HttpRequest,
    recorder: &mut StatusRecorder,
  ) -> Result<HttpResponse, ProxyError> {
    let method = http.method();
    if method != Method::GET && method != Method::HEAD {
      return Ok(
        recorder
          .write_status(StatusCode::METHOD_NOT_ALLOWED)
          .content_type("text/plain; charset=utf-8")
          .body("method not allowed"),
      );
    }

    if http.path() == "/" {
      return Ok(recorder.write_status(StatusCode::OK).finish());
    }

    let deadline = Deadline::after(config.timeout);
    let url = upstream_url::build(config, http.uri())?;

    let request = UpstreamRequest::new(method.clone(), url.clone()).with_headers(http.headers().iter());
    let mut response = deadline.run(http_client.execute(request)).await?;

    if let Some(index_url) = upstream_url::index_fallback(config, &url, response.status) {
      request_log::debug(config.logger, format_args!("File not found; trying {}", index_url));
      // the fallback only carries method and url, not the inbound headers
      let request = UpstreamRequest::new(method.clone(), index_url);
      response = deadline.run(http_client.execute(request)).await?;
    }

    for (name, value) in response.headers.iter() {
      recorder.append_header((name.clone(), value.clone()));
    }
    recorder.write_status(response.status);

    let body = deadline.bound(response.body);
    let http_response = match content_length(&response.headers) {
      Some(length) => recorder.body(SizedStream::new(length, body)),
      None => recorder.body(BodyStream::new(body)),
    };

    Ok(http_response)
  }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
  headers.get(header::CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}
