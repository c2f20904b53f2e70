use std::sync::Arc;

use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use futures_core::future::LocalBoxFuture;

use crate::proxy_service::proxy_config::ProxyConfig;
use crate::proxy_service::proxy_route_service::ProxyRouteService;
use crate::upstream::UpstreamClient;

pub struct ProxyRouteServiceFactory<C> {
  pub config: Arc<ProxyConfig>,
  pub http_client: Arc<C>,
}

impl<C> Clone for ProxyRouteServiceFactory<C> {
  fn clone(&self) -> Self {
    Self {
      config: self.config.clone(),
      http_client: self.http_client.clone(),
    }
  }
}

impl<C: UpstreamClient + 'static> ServiceFactory<ServiceRequest> for ProxyRouteServiceFactory<C> {
  type Response = ServiceResponse;
  type Error = actix_web::Error;
  type Config = ();
  type Service = ProxyRouteService<C>;
  type InitError = ();
  type Future = LocalBoxFuture<'static, Result<Self::Service, Self::InitError>>;

  fn new_service(&self, _: Self::Config) -> Self::Future {
    let service = ProxyRouteService {
      config: self.config.clone(),
      http_client: self.http_client.clone(),
    };

    Box::pin(async move { Ok(service) })
  }
}

impl<C> ProxyRouteServiceFactory<C> {
  pub fn create(http_client: Arc<C>, proxy_config: Arc<ProxyConfig>) -> Self {
    Self {
      config: proxy_config,
      http_client,
    }
  }
}
