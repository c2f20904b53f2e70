use actix_web::body::MessageBody;
use actix_web::http::header::TryIntoHeaderPair;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, HttpResponseBuilder};

/// Response builder that remembers the last status code written through it.
pub struct StatusRecorder {
  inner: HttpResponseBuilder,
  code: Option<StatusCode>,
}

impl StatusRecorder {
  pub fn new() -> Self {
    Self {
      inner: HttpResponse::Ok(),
      code: None,
    }
  }

  pub fn write_status(&mut self, code: StatusCode) -> &mut Self {
    self.code = Some(code);
    self.inner.status(code);
    self
  }

  pub fn append_header(&mut self, header: impl TryIntoHeaderPair) -> &mut Self {
    self.inner.append_header(header);
    self
  }

  pub fn content_type(&mut self, value: &'static str) -> &mut Self {
    self.inner.content_type(value);
    self
  }

  pub fn body<B: MessageBody + 'static>(&mut self, body: B) -> HttpResponse {
    self.inner.body(body)
  }

  pub fn finish(&mut self) -> HttpResponse {
    self.inner.finish()
  }

  /// Last status written, 0 when none was.
  pub fn code(&self) -> u16 {
    self.code.map_or(0, |code| code.as_u16())
  }
}
