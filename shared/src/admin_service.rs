use crate::http::make_error_response;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// Liveness and readiness endpoints served on the admin listener.
///
/// `/health` answers as long as the process is serving, `/ready` asks the
/// readiness check on every call.
pub struct AdminService<E> {
    is_ready: Arc<dyn Fn() -> bool + Send + Sync>,
    _error: PhantomData<fn() -> E>,
}

impl<E> AdminService<E> {
    pub fn new<F>(is_ready: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            is_ready: Arc::new(is_ready),
            _error: PhantomData,
        }
    }
}

impl<E> Service<Request<Incoming>> for AdminService<E>
where
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let res = route(req.uri().path(), &*self.is_ready);
        Box::pin(async move { Ok(res) })
    }
}

fn route<E>(path: &str, is_ready: &dyn Fn() -> bool) -> Response<BoxBody<Bytes, E>> {
    let ok_body = || {
        Full::new(Bytes::from_static(b"ok\n"))
            .map_err(|e| match e {})
            .boxed()
    };

    match path {
        "/health" => Response::new(ok_body()),
        "/ready" if is_ready() => Response::new(ok_body()),
        "/ready" => make_error_response(StatusCode::SERVICE_UNAVAILABLE),
        _ => make_error_response(StatusCode::NOT_FOUND),
    }
}
