use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::body::{BodySize, BoxBody, MessageBody};
use actix_web::{HttpRequest, HttpResponse};
use bytes::Bytes;
use log::kv::{self, Key, Source, Value, VisitSource};
use log::{Level, Log, Metadata, Record};

use crate::proxy_service::proxy_config::ProxyConfig;
use crate::proxy_service::ProxyError;

pub(crate) const TARGET: &str = "bucket_proxy::access";

/// Debug line sent through the configured logger rather than the global one.
pub fn debug(logger: &dyn Log, args: fmt::Arguments<'_>) {
  let metadata = Metadata::builder().level(Level::Debug).target(TARGET).build();
  if logger.enabled(&metadata) {
    logger.log(
      &Record::builder()
        .metadata(metadata)
        .args(args)
        .module_path_static(Some(module_path!()))
        .file_static(Some(file!()))
        .line(Some(line!()))
        .build(),
    );
  }
}

/// Outcome of one handled request, emitted as key-value pairs.
#[derive(Debug)]
pub struct RequestLog {
  method: String,
  start: Instant,
  elapsed: String,
  path: String,
  endpoint: String,
  response: u16,
  headers: Vec<(String, String)>,
  error: Option<String>,
}

impl RequestLog {
  pub fn new(config: &ProxyConfig, http: &HttpRequest, start: Instant, response: u16, error: Option<&ProxyError>) -> Self {
    let path = http
      .uri()
      .path_and_query()
      .map_or_else(|| http.path().to_string(), |value| value.to_string());

    let headers = config
      .log_headers
      .iter()
      .filter_map(|name| {
        let value = String::from_utf8_lossy(http.headers().get(&**name)?.as_bytes()).into_owned();
        if value.is_empty() {
          None
        } else {
          Some((format!("ReqHeader/{}", name), value))
        }
      })
      .collect();

    Self {
      method: http.method().to_string(),
      start,
      elapsed: String::new(),
      path,
      endpoint: config.endpoint.to_string(),
      response,
      headers,
      error: error.map(|err| err.to_string()),
    }
  }

  pub fn level(&self) -> Level {
    if self.error.is_some() {
      Level::Error
    } else {
      Level::Debug
    }
  }

  /// Emits the record once the response body has been fully sent or dropped.
  pub fn attach(self, response: HttpResponse, logger: &'static dyn Log) -> HttpResponse {
    response
      .map_body(|_, body| LoggedBody {
        inner: body,
        log: Some(self),
        logger,
      })
      .map_into_boxed_body()
  }

  /// Failures always go out; successes only when the logger accepts debug.
  pub fn emit(&mut self, logger: &dyn Log) {
    self.elapsed = format!("{:?}", self.start.elapsed());

    let metadata = Metadata::builder().level(self.level()).target(TARGET).build();
    if !logger.enabled(&metadata) {
      return;
    }

    let message = if self.error.is_some() {
      "failed to handle request"
    } else {
      "finished handling request"
    };

    logger.log(
      &Record::builder()
        .metadata(metadata)
        .args(format_args!("{}", message))
        .module_path_static(Some(module_path!()))
        .file_static(Some(file!()))
        .line(Some(line!()))
        .key_values(&*self)
        .build(),
    );
  }
}

impl Source for RequestLog {
  fn visit<'kvs>(&'kvs self, visitor: &mut dyn VisitSource<'kvs>) -> Result<(), kv::Error> {
    visitor.visit_pair(Key::from_str("method"), Value::from(self.method.as_str()))?;
    visitor.visit_pair(Key::from_str("elapsed"), Value::from(self.elapsed.as_str()))?;
    visitor.visit_pair(Key::from_str("path"), Value::from(self.path.as_str()))?;
    visitor.visit_pair(Key::from_str("proxyEndpoint"), Value::from(self.endpoint.as_str()))?;
    visitor.visit_pair(Key::from_str("response"), Value::from(self.response))?;

    for (name, value) in &self.headers {
      visitor.visit_pair(Key::from_str(name), Value::from(value.as_str()))?;
    }

    if let Some(error) = &self.error {
      visitor.visit_pair(Key::from_str("error"), Value::from(error.as_str()))?;
    }

    Ok(())
  }
}

/// Response body carrying the pending request record.
pub struct LoggedBody {
  inner: BoxBody,
  log: Option<RequestLog>,
  logger: &'static dyn Log,
}

impl LoggedBody {
  fn finish(&mut self) {
    if let Some(mut log) = self.log.take() {
      log.emit(self.logger);
    }
  }
}

impl MessageBody for LoggedBody {
  type Error = <BoxBody as MessageBody>::Error;

  fn size(&self) -> BodySize {
    self.inner.size()
  }

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, Self::Error>>> {
    let this = self.get_mut();
    let polled = Pin::new(&mut this.inner).poll_next(cx);

    match &polled {
      Poll::Ready(Some(Err(err))) => {
        if let Some(log) = this.log.as_mut() {
          log.error.get_or_insert_with(|| err.to_string());
        }
      }
      Poll::Ready(None) => this.finish(),
      _ => {}
    }

    polled
  }
}

impl Drop for LoggedBody {
  fn drop(&mut self) {
    self.finish();
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::sync::Mutex;
  use std::time::Duration;

  use actix_web::body;
  use actix_web::http::header::HeaderValue;
  use actix_web::test::TestRequest;
  use log::LevelFilter;

  use super::*;
  use crate::upstream::UpstreamError;

  /// Logger keeping every accepted record as `LEVEL message key=value ...`.
  pub(crate) struct CapturingLogger {
    pub(crate) level: LevelFilter,
    pub(crate) lines: Mutex<Vec<String>>,
  }

  impl CapturingLogger {
    pub(crate) fn leak(level: LevelFilter) -> &'static CapturingLogger {
      Box::leak(Box::new(CapturingLogger {
        level,
        lines: Mutex::new(Vec::new()),
      }))
    }

    pub(crate) fn lines(&self) -> Vec<String> {
      self.lines.lock().unwrap().clone()
    }
  }

  struct LineVisitor<'a>(&'a mut String);

  impl<'kvs> VisitSource<'kvs> for LineVisitor<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
      self.0.push_str(&format!(" {}={}", key, value));
      Ok(())
    }
  }

  impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
      metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
      let mut line = format!("{} {}", record.level(), record.args());
      record.key_values().visit(&mut LineVisitor(&mut line)).unwrap();
      self.lines.lock().unwrap().push(line);
    }

    fn flush(&self) {}
  }

  fn config(log_headers: &[&str]) -> ProxyConfig {
    ProxyConfig {
      bucket_name: Box::from("my-bucket"),
      bucket_on_path: false,
      timeout: Duration::from_secs(1),
      index_filename: Box::from(""),
      log_headers: log_headers.iter().map(|name| Box::from(*name)).collect(),
      endpoint: Box::from("0.0.0.0:8080"),
      logger: log::logger(),
    }
  }

  #[actix_web::test]
  async fn collects_configured_headers_that_are_set() {
    let http = TestRequest::get()
      .uri("/a.txt?x=1")
      .insert_header(("user-agent", "curl/8"))
      .insert_header(("x-request-id", ""))
      .to_http_request();
    let config = config(&["User-Agent", "X-Request-Id", "Referer"]);

    let log = RequestLog::new(&config, &http, Instant::now(), 200, None);

    assert_eq!(log.path, "/a.txt?x=1");
    assert_eq!(log.method, "GET");
    assert_eq!(log.headers, vec![("ReqHeader/User-Agent".to_string(), "curl/8".to_string())]);
    assert_eq!(log.level(), Level::Debug);
  }

  #[actix_web::test]
  async fn successful_requests_need_debug() {
    let http = TestRequest::get().uri("/a.txt").to_http_request();
    let mut log = RequestLog::new(&config(&[]), &http, Instant::now(), 200, None);

    let info = CapturingLogger::leak(LevelFilter::Info);
    log.emit(info);
    assert!(info.lines().is_empty());

    let debug = CapturingLogger::leak(LevelFilter::Debug);
    log.emit(debug);
    let lines = debug.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("DEBUG finished handling request"));
    assert!(lines[0].contains(" response=200"));
    assert!(lines[0].contains(" proxyEndpoint=0.0.0.0:8080"));
  }

  #[actix_web::test]
  async fn failures_log_at_error_with_cause() {
    let http = TestRequest::get().uri("/a.txt").to_http_request();
    let error = ProxyError::Upstream(UpstreamError::Send("connection refused".to_string()));
    let mut log = RequestLog::new(&config(&[]), &http, Instant::now(), 500, Some(&error));

    let logger = CapturingLogger::leak(LevelFilter::Error);
    log.emit(logger);

    let lines = logger.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("ERROR failed to handle request"));
    assert!(lines[0].contains(" error=connection refused"));
    assert!(lines[0].contains(" response=500"));
  }

  #[actix_web::test]
  async fn keeps_non_ascii_header_values() {
    let http = TestRequest::get()
      .uri("/a.txt")
      .insert_header(("x-client", HeaderValue::from_bytes("café".as_bytes()).unwrap()))
      .to_http_request();

    let log = RequestLog::new(&config(&["X-Client"]), &http, Instant::now(), 200, None);

    assert_eq!(log.headers, vec![("ReqHeader/X-Client".to_string(), "café".to_string())]);
  }

  #[actix_web::test]
  async fn debug_lines_use_the_given_logger() {
    let info = CapturingLogger::leak(LevelFilter::Info);
    debug(info, format_args!("File not found; trying {}", "/dir/index.html"));
    assert!(info.lines().is_empty());

    let logger = CapturingLogger::leak(LevelFilter::Debug);
    debug(logger, format_args!("File not found; trying {}", "/dir/index.html"));
    assert_eq!(logger.lines(), vec!["DEBUG File not found; trying /dir/index.html".to_string()]);
  }

  #[actix_web::test]
  async fn attached_record_waits_for_the_body() {
    let http = TestRequest::get().uri("/a.txt").to_http_request();
    let logger = CapturingLogger::leak(LevelFilter::Debug);
    let log = RequestLog::new(&config(&[]), &http, Instant::now(), 200, None);

    let response = log.attach(HttpResponse::Ok().body("content"), logger);
    assert!(logger.lines().is_empty());

    let bytes = body::to_bytes(response.into_body()).await.unwrap();
    assert_eq!(bytes, "content");
    assert_eq!(logger.lines().len(), 1);
  }

  #[actix_web::test]
  async fn attached_record_is_emitted_once_when_dropped() {
    let http = TestRequest::get().uri("/a.txt").to_http_request();
    let logger = CapturingLogger::leak(LevelFilter::Debug);
    let log = RequestLog::new(&config(&[]), &http, Instant::now(), 200, None);

    drop(log.attach(HttpResponse::Ok().body("content"), logger));

    assert_eq!(logger.lines().len(), 1);
  }
}
