use crate::errors::RunnerError;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, Version};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use shared::http::{prepare_caller_response, prepare_internal_request};
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_RUNNER_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for the runner service.
///
/// Without an address the gateway runs outside of a cluster and no runner
/// is available.
#[derive(Clone)]
pub struct RunnerClient {
    addr: Option<String>,
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl RunnerClient {
    pub fn new(addr: Option<String>, timeout: Duration) -> Self {
        let addr = addr.filter(|a| !a.is_empty());
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        RunnerClient {
            addr,
            client,
            timeout,
        }
    }

    pub fn addr(&self) -> Option<&str> {
        self.addr.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends a request to the runner and returns its response with the body
    /// still streaming.
    ///
    /// The timeout covers the time until the response headers arrive.
    pub async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        mut headers: HeaderMap,
        version: Version,
        body: Bytes,
        token: &str,
    ) -> Result<Response<Incoming>, RunnerError> {
        let addr = self.addr.as_deref().ok_or(RunnerError::NotConfigured)?;
        let host = addr.split(':').next().unwrap_or(addr);

        prepare_internal_request(&mut headers, version, host, token)
            .map_err(|e| RunnerError::UpstreamRequestFailed(e.to_string()))?;

        let mut request = Request::builder()
            .method(method)
            .uri(format!("http://{addr}{path_and_query}"))
            .body(Full::new(body))?;
        *request.headers_mut() = headers;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| RunnerError::UpstreamTimeout(self.timeout.as_secs()))?
            .map_err(|e| RunnerError::UpstreamRequestFailed(e.to_string()))?;

        let (mut parts, body) = response.into_parts();
        prepare_caller_response(&mut parts.headers, parts.version);

        Ok(Response::from_parts(parts, body))
    }
}
