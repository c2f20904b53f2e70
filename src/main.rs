mod app_config;
mod http_client;
mod proxy_service;
mod std_logger;
mod upstream;

use std::io::{Error, ErrorKind, Result};
use std::sync::Arc;

use actix_web::{App, HttpServer};
use clap::Parser;
use log::info;

use crate::app_config::{AppConfig, Args};
use crate::http_client::HttpClientConfig;
use crate::proxy_service::proxy_config::ProxyConfig;
use crate::proxy_service::proxy_factory::ProxyRouteServiceFactory;
use crate::std_logger::StdLogger;

#[actix_web::main]
async fn main() -> Result<()> {
  let config = AppConfig::load(Args::parse()).map_err(|err| Error::new(ErrorKind::InvalidInput, err))?;
  let logger = StdLogger::init(config.log_level).map_err(|err| Error::new(ErrorKind::Other, err))?;

  let http_client = HttpClientConfig {
    http_proxy: config.http_proxy_url.clone(),
    user: config.http_proxy_user.clone(),
    pass: config.http_proxy_pass.clone(),
  }
  .to_client()
  .map_err(|err| Error::new(ErrorKind::Other, err))?;

  let proxy_config = Arc::new(ProxyConfig {
    bucket_name: Box::from(config.bucket_name.as_str()),
    bucket_on_path: config.bucket_on_path,
    timeout: config.timeout,
    index_filename: Box::from(config.index_filename.as_str()),
    log_headers: config.log_headers.iter().map(|name| Box::from(name.as_str())).collect(),
    endpoint: Box::from(config.endpoint.as_str()),
    logger,
  });

  info!(
    "Proxying bucket '{}' on {}:{} with {} workers.",
    config.bucket_name, config.bind, config.port, config.workers
  );

  let factory = ProxyRouteServiceFactory::create(Arc::new(http_client), proxy_config);

  HttpServer::new(move || App::new().default_service(factory.clone()))
    .workers(config.workers)
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await
}
