use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use tokio::time::{sleep_until, timeout_at, Instant, Sleep};

use crate::proxy_service::ProxyError;
use crate::upstream::{UpstreamBody, UpstreamError};

/// Point in time bounding every upstream interaction of one request.
///
/// Owned by the request future, so it goes away with it on every exit path.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
  at: Instant,
  timeout: Duration,
}

impl Deadline {
  pub fn after(timeout: Duration) -> Self {
    Self {
      at: Instant::now() + timeout,
      timeout,
    }
  }

  pub async fn run<F, T>(&self, call: F) -> Result<T, ProxyError>
  where
    F: Future<Output = Result<T, UpstreamError>>,
  {
    match timeout_at(self.at, call).await {
      Ok(result) => result.map_err(ProxyError::Upstream),
      Err(_) => Err(ProxyError::DeadlineExceeded(self.timeout)),
    }
  }

  pub fn bound(&self, body: UpstreamBody) -> DeadlineStream {
    DeadlineStream {
      inner: body,
      sleep: Box::pin(sleep_until(self.at)),
      done: false,
    }
  }
}

/// Upstream body that yields one error and ends once the deadline passes.
pub struct DeadlineStream {
  inner: UpstreamBody,
  sleep: Pin<Box<Sleep>>,
  done: bool,
}

impl Stream for DeadlineStream {
  type Item = Result<Bytes, UpstreamError>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    if self.done {
      return Poll::Ready(None);
    }

    if let Poll::Ready(item) = self.inner.as_mut().poll_next(cx) {
      if item.is_none() {
        self.done = true;
      }
      return Poll::Ready(item);
    }

    match self.sleep.as_mut().poll(cx) {
      Poll::Ready(()) => {
        self.done = true;
        Poll::Ready(Some(Err(UpstreamError::Deadline)))
      }
      Poll::Pending => Poll::Pending,
    }
  }
}

#[cfg(test)]
mod tests {
  use futures_util::stream::{self, StreamExt};

  use super::*;

  #[actix_web::test]
  async fn run_passes_through_completed_calls() {
    let deadline = Deadline::after(Duration::from_secs(5));
    let result = deadline.run(async { Ok::<_, UpstreamError>(7) }).await;

    assert_eq!(result.unwrap(), 7);
  }

  #[actix_web::test]
  async fn run_maps_upstream_errors() {
    let deadline = Deadline::after(Duration::from_secs(5));
    let result = deadline
      .run(async { Err::<(), _>(UpstreamError::Send("connection reset".to_string())) })
      .await;

    assert_eq!(result.unwrap_err().to_string(), "connection reset");
  }

  #[actix_web::test]
  async fn run_gives_up_at_deadline() {
    let deadline = Deadline::after(Duration::from_millis(20));
    let result = deadline
      .run(async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok::<_, UpstreamError>(())
      })
      .await;

    assert!(matches!(result, Err(ProxyError::DeadlineExceeded(_))));
  }

  #[actix_web::test]
  async fn bound_body_ends_with_error_after_deadline() {
    let deadline = Deadline::after(Duration::from_millis(20));
    let body: UpstreamBody = stream::once(async { Ok(Bytes::from_static(b"partial")) })
      .chain(stream::pending())
      .boxed_local();

    let items: Vec<_> = deadline.bound(body).collect().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), &Bytes::from_static(b"partial"));
    assert!(matches!(items[1], Err(UpstreamError::Deadline)));
  }
}
