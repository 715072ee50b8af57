use http::Version;
use http::header::{
    AUTHORIZATION, CONNECTION, COOKIE, HOST, HeaderMap, HeaderName, HeaderValue,
    InvalidHeaderValue, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING,
    UPGRADE, VIA,
};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Name this service reports in `Via` headers.
pub const PROXY_NAME: &str = "gateway";

/// Header carrying the id used to correlate log lines of one request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Connection-scoped headers of HTTP/1 messages.
const HOP_BY_HOP: [HeaderName; 7] = [
    CONNECTION,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Caller credentials. Internal services only ever see the gateway's token.
const CALLER_CREDENTIALS: [HeaderName; 3] = [AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION];

/// Serves `service` on `host:port` until the listener fails.
///
/// Every accepted connection is handed to hyper on its own task; h1 and h2
/// are auto-detected on the socket.
pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    let service_arc = Arc::new(service);
    tracing::info!(host, port, "listening");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        tokio::spawn(async move {
            if let Err(err) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(peer = %peer_addr, error = %err, "connection closed with error");
            }
        });
    }
}

pub fn make_error_response<E>(status_code: StatusCode) -> Response<BoxBody<Bytes, E>> {
    let message = status_code
        .canonical_reason()
        .unwrap_or("an error occurred");

    let mut response = Response::new(Full::new(message.into()).map_err(|e| match e {}).boxed());
    *response.status_mut() = status_code;
    response
}

pub fn is_http1(v: Version) -> bool {
    matches!(v, Version::HTTP_09 | Version::HTTP_10 | Version::HTTP_11)
}

fn via_protocol(version: Version) -> Option<&'static str> {
    match version {
        Version::HTTP_09 => Some("0.9"),
        Version::HTTP_10 => Some("1.0"),
        Version::HTTP_11 => Some("1.1"),
        Version::HTTP_2 => Some("2"),
        Version::HTTP_3 => Some("3"),
        _ => None,
    }
}

/// Records the gateway as a hop in `Via`, after any hops already listed.
pub fn append_via(headers: &mut HeaderMap, version: Version) {
    let Some(protocol) = via_protocol(version) else {
        tracing::warn!(?version, "unknown HTTP version, skipping Via header");
        return;
    };

    let hop = format!("{protocol} {PROXY_NAME}");
    let value = match headers.get(VIA) {
        None => hop,
        Some(existing) => match existing.to_str() {
            Ok(existing) => format!("{existing}, {hop}"),
            Err(_) => return,
        },
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(VIA, value);
    }
}

/// Removes the headers of an HTTP/1 message that only apply to the current
/// connection, along with every header named by its `Connection` headers.
///
/// HTTP/2 and HTTP/3 carry no such headers and are left untouched.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, version: Version) {
    if !is_http1(version) {
        return;
    }

    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(&listed) {
        headers.remove(name);
    }

    // Pre-1.1 peers send keep-alive without listing it in Connection.
    if version != Version::HTTP_11 {
        headers.remove("keep-alive");
    }
}

/// Rewrites a caller's request headers before the gateway sends the request
/// to an internal service.
///
/// The caller's credentials are dropped and the internal `token` takes their
/// place, so a user token never reaches the service. `Host` is set to the
/// service's host.
pub fn prepare_internal_request(
    headers: &mut HeaderMap,
    version: Version,
    host: &str,
    token: &str,
) -> Result<(), InvalidHeaderValue> {
    strip_hop_by_hop(headers, version);
    for name in &CALLER_CREDENTIALS {
        headers.remove(name);
    }
    append_via(headers, version);

    headers.insert(HOST, HeaderValue::from_str(host)?);
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    Ok(())
}

/// Rewrites an internal service's response headers before they are relayed
/// to the caller.
pub fn prepare_caller_response(headers: &mut HeaderMap, version: Version) {
    strip_hop_by_hop(headers, version);
    append_via(headers, version);
}

/// Returns the bearer token of the `Authorization` header, if any.
///
/// The scheme is matched case-insensitively; a header without a token is
/// treated as absent.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Returns the caller-supplied request id or generates a fresh one.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
