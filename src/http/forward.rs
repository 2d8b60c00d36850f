//! Upstream forwarding.
//!
//! The pipeline hands fully decorated requests to a `Forwarder`. The default
//! implementation proxies to a single upstream over a pooled hyper client.

use std::str::FromStr;
use std::time::Duration;

use axum::body::Body;
use axum::http::uri::{Authority, InvalidUri, PathAndQuery, Scheme};
use axum::http::{Request, Uri};
use axum::response::Response;
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] axum::http::uri::InvalidUriParts),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

/// Sends a request to wherever the gateway routes it.
pub trait Forwarder: Send + Sync {
    fn forward(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response, ForwardError>>;
}

/// Forwards every request to one upstream address over plain HTTP.
#[derive(Clone)]
pub struct UpstreamForwarder {
    client: Client<HttpConnector, Body>,
    authority: Authority,
}

impl UpstreamForwarder {
    pub fn new(address: &str, connect_timeout: Duration) -> Result<Self, InvalidUri> {
        let authority = Authority::from_str(address)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self { client, authority })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, ForwardError> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Ok(Uri::from_parts(parts)?)
    }
}

impl Forwarder for UpstreamForwarder {
    fn forward(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response, ForwardError>> {
        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            parts.uri = self.rewrite_uri(&parts.uri)?;

            tracing::debug!(upstream = %self.authority, uri = %parts.uri, "Forwarding request");

            let response = self
                .client
                .request(Request::from_parts(parts, body))
                .await?;
            let (parts, body) = response.into_parts();
            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rewrite_uri_keeps_path_and_query() {
        let forwarder = UpstreamForwarder::new("127.0.0.1:3000", Duration::from_secs(1)).unwrap();
        let uri: Uri = "/api/orders?page=2".parse().unwrap();
        assert_eq!(
            forwarder.rewrite_uri(&uri).unwrap(),
            "http://127.0.0.1:3000/api/orders?page=2"
        );
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        assert!(UpstreamForwarder::new("not a host", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = UpstreamForwarder::new(&addr.to_string(), Duration::from_secs(1)).unwrap();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let result = forwarder.forward(request).await;
        assert!(matches!(result, Err(ForwardError::Upstream(_))));
    }
}
