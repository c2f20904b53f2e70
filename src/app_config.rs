use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("unable to read config file {}: {source}", .path.display())]
  Io { path: PathBuf, source: std::io::Error },
  #[error("invalid config file {}: {source}", .path.display())]
  Yaml { path: PathBuf, source: serde_yaml::Error },
  #[error("bucket name is required")]
  MissingBucket,
  #[error("invalid timeout '{0}': {1}")]
  Timeout(String, String),
  #[error("invalid log level '{0}'")]
  LogLevel(String),
}

/// Serves a storage bucket as a static site.
#[derive(Parser, Debug, Default)]
#[command(version, about)]
pub struct Args {
  /// YAML file supplying any option not given on the command line
  #[arg(long = "config", env = "PROXY_CONF_LOCATION")]
  pub config_file: Option<PathBuf>,
  #[arg(long, env = "HTTP_BIND")]
  pub bind: Option<String>,
  #[arg(long, env = "HTTP_PORT")]
  pub port: Option<u16>,
  #[arg(long, env = "HTTP_WORKER_COUNT")]
  pub workers: Option<usize>,
  #[arg(long, env = "BUCKET_NAME")]
  pub bucket_name: Option<String>,
  /// The bucket name is part of the request path instead of the host
  #[arg(long, env = "BUCKET_ON_PATH")]
  pub bucket_on_path: Option<bool>,
  /// Deadline for upstream calls, e.g. `10s`, `500ms`, `1m`
  #[arg(long, env = "PROXY_TIMEOUT")]
  pub timeout: Option<String>,
  /// File served for directory paths that are not found, e.g. `index.html`
  #[arg(long, env = "INDEX_FILENAME")]
  pub index_filename: Option<String>,
  /// Request headers copied into the request log
  #[arg(long = "log-header", env = "LOG_HEADERS", value_delimiter = ',')]
  pub log_headers: Vec<String>,
  /// Label for this proxy in the request log
  #[arg(long, env = "PROXY_ENDPOINT")]
  pub endpoint: Option<String>,
  #[arg(long, env = "LOG_LEVEL")]
  pub log_level: Option<String>,
  #[arg(long, env = "HTTP_PROXY_URL")]
  pub http_proxy_url: Option<String>,
  #[arg(long, env = "HTTP_PROXY_USER")]
  pub http_proxy_user: Option<String>,
  #[arg(long, env = "HTTP_PROXY_PASS")]
  pub http_proxy_pass: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(default, rename_all = "snake_case")]
pub struct ConfigFile {
  pub bind: Option<String>,
  pub port: Option<u16>,
  pub workers: Option<usize>,
  pub bucket_name: Option<String>,
  pub bucket_on_path: Option<bool>,
  pub timeout: Option<String>,
  pub index_filename: Option<String>,
  pub log_headers: Option<Vec<String>>,
  pub endpoint: Option<String>,
  pub log_level: Option<String>,
  pub http_proxy_url: Option<String>,
  pub http_proxy_user: Option<String>,
  pub http_proxy_pass: Option<String>,
}

impl ConfigFile {
  pub fn load_from_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    serde_yaml::from_reader(file).map_err(|source| ConfigError::Yaml {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// Fully resolved process settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
  pub bind: String,
  pub port: u16,
  pub workers: usize,
  pub bucket_name: String,
  pub bucket_on_path: bool,
  pub timeout: Duration,
  pub index_filename: String,
  pub log_headers: Vec<String>,
  pub endpoint: String,
  pub log_level: LevelFilter,
  pub http_proxy_url: Option<String>,
  pub http_proxy_user: Option<String>,
  pub http_proxy_pass: Option<String>,
}

impl AppConfig {
  pub fn load(args: Args) -> Result<AppConfig, ConfigError> {
    let file = match &args.config_file {
      Some(path) => ConfigFile::load_from_file(path)?,
      None => ConfigFile::default(),
    };

    AppConfig::resolve(args, file)
  }

  /// Command line values win over the file, the file over defaults.
  pub fn resolve(args: Args, file: ConfigFile) -> Result<AppConfig, ConfigError> {
    let bind = args.bind.or(file.bind).unwrap_or_else(|| DEFAULT_BIND.to_string());
    let port = args.port.or(file.port).unwrap_or(DEFAULT_PORT);

    let timeout = match args.timeout.or(file.timeout) {
      Some(value) => parse_duration(&value).map_err(|err| ConfigError::Timeout(value, err))?,
      None => DEFAULT_TIMEOUT,
    };

    let log_level = match args.log_level.or(file.log_level) {
      Some(value) => LevelFilter::from_str(&value).map_err(|_| ConfigError::LogLevel(value))?,
      None => LevelFilter::Info,
    };

    let log_headers = if args.log_headers.is_empty() {
      file.log_headers.unwrap_or_default()
    } else {
      args.log_headers
    };

    let endpoint = args
      .endpoint
      .or(file.endpoint)
      .unwrap_or_else(|| format!("{}:{}", bind, port));

    Ok(AppConfig {
      workers: args.workers.or(file.workers).unwrap_or(DEFAULT_WORKER_COUNT),
      bucket_name: args
        .bucket_name
        .or(file.bucket_name)
        .filter(|name| !name.is_empty())
        .ok_or(ConfigError::MissingBucket)?,
      bucket_on_path: args.bucket_on_path.or(file.bucket_on_path).unwrap_or(false),
      index_filename: args.index_filename.or(file.index_filename).unwrap_or_default(),
      http_proxy_url: args.http_proxy_url.or(file.http_proxy_url),
      http_proxy_user: args.http_proxy_user.or(file.http_proxy_user),
      http_proxy_pass: args.http_proxy_pass.or(file.http_proxy_pass),
      bind,
      port,
      timeout,
      log_level,
      log_headers,
      endpoint,
    })
  }
}

/// Parses `<number><unit>` with units ms, s, m and h; a bare number is seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
  let value = value.trim();
  let unit_start = value
    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
    .unwrap_or(value.len());
  let (number, unit) = value.split_at(unit_start);

  let number: f64 = number
    .parse()
    .map_err(|_| format!("no number found in '{}'", value))?;

  let seconds = match unit.trim() {
    "ms" => number / 1000.0,
    "" | "s" => number,
    "m" => number * 60.0,
    "h" => number * 3600.0,
    other => return Err(format!("unknown unit '{}'", other)),
  };

  Duration::try_from_secs_f64(seconds).map_err(|err| err.to_string())
}
