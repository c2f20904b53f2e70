use std::time::Duration;

use log::Log;

pub const STORAGE_HOST: &str = "storage.googleapis.com";

/// Resolved settings shared by every request handled by the proxy.
pub struct ProxyConfig {
  pub bucket_name: Box<str>,
  /// The bucket is already part of the request path, so it must not be
  /// prefixed onto the storage host.
  pub bucket_on_path: bool,
  pub timeout: Duration,
  /// Empty disables the index fallback.
  pub index_filename: Box<str>,
  pub log_headers: Box<[Box<str>]>,
  pub endpoint: Box<str>,
  pub logger: &'static dyn Log,
}

impl ProxyConfig {
  pub fn upstream_host(&self) -> String {
    if self.bucket_on_path {
      STORAGE_HOST.to_string()
    } else {
      format!("{}.{}", self.bucket_name, STORAGE_HOST)
    }
  }

  pub fn index_filename(&self) -> Option<&str> {
    if self.index_filename.is_empty() {
      None
    } else {
      Some(&self.index_filename)
    }
  }
}

impl std::fmt::Debug for ProxyConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProxyConfig")
      .field("bucket_name", &self.bucket_name)
      .field("bucket_on_path", &self.bucket_on_path)
      .field("timeout", &self.timeout)
      .field("index_filename", &self.index_filename)
      .field("log_headers", &self.log_headers)
      .field("endpoint", &self.endpoint)
      .finish_non_exhaustive()
  }
}
