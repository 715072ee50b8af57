use crate::cluster::cluster_type;
use crate::errors::RunnerError;
use crate::forward::RunnerClient;
use crate::logs::line_stream;
use crate::metrics_defs::{LOG_LINES_STREAMED, RUNNER_REQUEST_DURATION, RUNNER_REQUESTS};
use crate::routes::{EndpointKind, RunnerEndpoint, runner_routes};
use auth::AdminManager;
use axum::{
    Router,
    body::Body,
    extract::{Query, Request, State},
    http::{HeaderValue, Method, StatusCode, header::CONTENT_LENGTH, header::HeaderName},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use bytes::Bytes;
use futures::StreamExt;
use http::request::Parts;
use http_body_util::BodyExt;
use integrations::IntegrationManager;
use serde_json::Value;
use shared::http::{request_id, token_from_headers};
use shared::model::RequestParams;
use shared::response::send_response;
use shared::routing::RouteTable;
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const NOSNIFF_HEADER: HeaderName = HeaderName::from_static("x-content-type-options");

enum Upstream {
    Runner(http::Response<hyper::body::Incoming>),
    /// An integration hook answered in place of the runner.
    Hijacked(Response),
}

#[derive(Clone)]
pub struct RunnerApi {
    admin: Arc<AdminManager>,
    integrations: Arc<IntegrationManager>,
    runner: RunnerClient,
    http: reqwest::Client,
    routes: Arc<RouteTable<RunnerEndpoint>>,
}

impl RunnerApi {
    /// Requests to the runner, cluster type included, share the client's
    /// timeout.
    pub fn new(
        admin: Arc<AdminManager>,
        integrations: Arc<IntegrationManager>,
        runner: RunnerClient,
    ) -> Result<Self, RunnerError> {
        let http = reqwest::Client::builder()
            .timeout(runner.timeout())
            .build()
            .map_err(RunnerError::HttpClient)?;

        Ok(RunnerApi {
            admin,
            integrations,
            runner,
            http,
            routes: Arc::new(runner_routes()),
        })
    }

    /// Checks the caller's token for the endpoint and builds the request
    /// params handed to integration hooks.
    fn authorize(
        &self,
        parts: &Parts,
        endpoint: &RunnerEndpoint,
        attributes: &HashMap<String, String>,
    ) -> Result<RequestParams, RunnerError> {
        let token = token_from_headers(&parts.headers).unwrap_or_default();
        let request_id = request_id(&parts.headers);

        let mut params = self
            .admin
            .is_token_valid(token, endpoint.resource, endpoint.op, attributes)
            .map_err(|e| {
                tracing::error!(
                    request_id = %request_id,
                    resource = endpoint.resource,
                    error = %e,
                    "Unable to forward runner request, failed to validate token"
                );
                RunnerError::Unauthorized(e)
            })?;

        params.request_id = request_id;
        Ok(params.with_http(&parts.method, parts.uri.path(), &parts.headers))
    }

    /// Answers requests that cannot reach the runner because none is
    /// configured. Reads see an empty list.
    fn without_runner(&self, method: &Method) -> Result<Response, RunnerError> {
        tracing::warn!("Cannot forward request to runner, as runner address not provided to gateway during setup");
        if method == Method::GET {
            return Ok(send_response(StatusCode::OK, Vec::<Value>::new()));
        }
        Err(RunnerError::NotConfigured)
    }

    /// Sends the request to the runner unless an integration hook takes
    /// it over first.
    async fn send(
        &self,
        parts: Parts,
        body: Bytes,
        params: &RequestParams,
    ) -> Result<Upstream, RunnerError> {
        let hook = self.integrations.invoke_hook(params).await;
        if hook.check_response() {
            if let Some(error) = hook.error() {
                tracing::error!(request_id = %params.request_id, error, "Integration hook responded with an error");
            }
            return Ok(Upstream::Hijacked(hook.into_response()));
        }

        let token = self
            .admin
            .internal_access_token()
            .map_err(RunnerError::InternalToken)?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());

        let start = Instant::now();
        let response = self
            .runner
            .send(
                parts.method.clone(),
                path_and_query,
                parts.headers,
                parts.version,
                body,
                &token,
            )
            .await?;
        histogram!(RUNNER_REQUEST_DURATION).record(start.elapsed().as_secs_f64());

        Ok(Upstream::Runner(response))
    }

    async fn forward(
        &self,
        parts: Parts,
        body: Body,
        params: RequestParams,
    ) -> Result<Response, RunnerError> {
        if self.runner.addr().is_none() {
            return self.without_runner(&parts.method);
        }

        let body = body
            .collect()
            .await
            .map_err(|e| RunnerError::RequestBody(e.to_string()))?
            .to_bytes();

        let mut payload = None;
        if parts.method == Method::POST {
            let value: Value = serde_json::from_slice(&body).inspect_err(|e| {
                tracing::error!(request_id = %params.request_id, error = %e, "Unable to unmarshal request body");
            })?;
            payload = Some(value);
        }
        let params = params.with_payload(payload);

        let upstream = match self.send(parts, body, &params).await? {
            Upstream::Runner(upstream) => upstream,
            Upstream::Hijacked(response) => return Ok(response),
        };

        tracing::debug!(
            request_id = %params.request_id,
            status = upstream.status().as_u16(),
            "forwarded request to runner"
        );
        Ok(upstream.map(Body::new))
    }

    async fn stream_logs(
        &self,
        parts: Parts,
        params: RequestParams,
    ) -> Result<Response, RunnerError> {
        let request_id = params.request_id.clone();
        let upstream = match self.send(parts, Bytes::new(), &params).await? {
            Upstream::Runner(upstream) => upstream,
            Upstream::Hijacked(response) => return Ok(response),
        };

        let (upstream_parts, upstream_body) = upstream.into_parts();

        if upstream_parts.status != StatusCode::OK {
            let bytes = upstream_body
                .collect()
                .await
                .map_err(|e| RunnerError::UpstreamBody(e.to_string()))?
                .to_bytes();
            let body: Value = serde_json::from_slice(&bytes)
                .map_err(|e| RunnerError::UpstreamBody(e.to_string()))?;
            let error = match body.get("error") {
                Some(Value::String(error)) => error.clone(),
                Some(other) => other.to_string(),
                None => "unknown error".to_string(),
            };
            return Err(RunnerError::InvalidStatus {
                status: upstream_parts.status.as_u16(),
                error,
            });
        }

        let streaming = upstream_parts
            .headers
            .get(&NOSNIFF_HEADER)
            .is_some_and(|v| v == "nosniff");
        if !streaming {
            return Err(RunnerError::MissingNosniff);
        }

        let lines = line_stream(upstream_body).inspect(move |line| match line {
            Ok(_) => counter!(LOG_LINES_STREAMED).increment(1),
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "log stream from runner ended with error")
            }
        });

        let mut response = Response::new(Body::from_stream(lines));
        *response.headers_mut() = upstream_parts.headers;
        // Blank lines are dropped, so the upstream length no longer holds.
        response.headers_mut().remove(CONTENT_LENGTH);
        response
            .headers_mut()
            .insert(NOSNIFF_HEADER, HeaderValue::from_static("nosniff"));
        Ok(response)
    }

    async fn handle(&self, query: HashMap<String, String>, request: Request) -> Result<Response, RunnerError> {
        let (parts, body) = request.into_parts();

        let Some(matched) = self.routes.resolve(&parts.method, parts.uri.path()) else {
            return Ok(StatusCode::NOT_FOUND.into_response());
        };
        let endpoint = matched.action.clone();
        let attributes = endpoint.attributes(&matched.params, &query);

        match endpoint.kind {
            EndpointKind::Forward => {
                let params = self.authorize(&parts, &endpoint, &attributes)?;
                self.forward(parts, body, params).await
            }
            EndpointKind::Logs => {
                if self.runner.addr().is_none() {
                    return self.without_runner(&parts.method);
                }
                let params = self.authorize(&parts, &endpoint, &attributes)?;
                self.stream_logs(parts, params).await
            }
        }
    }
}

pub fn router(api: RunnerApi) -> Router {
    Router::new()
        .route("/v1/runner", any(handle_runner_request))
        .route("/v1/runner/{*rest}", any(handle_runner_request))
        .route("/v1/config/cluster-type", get(get_cluster_type))
        .with_state(api)
}

async fn handle_runner_request(
    State(api): State<RunnerApi>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> Response {
    let resource = api
        .routes
        .resolve(request.method(), request.uri().path())
        .map(|m| m.action.resource)
        .unwrap_or("unknown");

    let response = match api.handle(query, request).await {
        Ok(response) => response,
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(error = %e, "runner request failed");
            }
            e.into_response()
        }
    };

    counter!(RUNNER_REQUESTS, "resource" => resource, "status" => response.status().as_str().to_string())
        .increment(1);
    response
}

async fn get_cluster_type(State(api): State<RunnerApi>, request: Request) -> Response {
    let (parts, _) = request.into_parts();
    let endpoint = RunnerEndpoint {
        resource: "cluster",
        op: "read",
        attributes: vec![],
        kind: EndpointKind::Forward,
    };

    let result = async {
        api.authorize(&parts, &endpoint, &HashMap::new())?;
        let token = api
            .admin
            .internal_access_token()
            .map_err(RunnerError::InternalToken)?;
        cluster_type(&api.http, api.runner.addr(), &token).await
    }
    .await;

    match result {
        Ok(cluster) => send_response(StatusCode::OK, cluster),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::DEFAULT_RUNNER_TIMEOUT;
    use crate::forward::tests::start_echo_server;
    use auth::AuthSecret;
    use axum::Json;
    use integrations::store::MemoryStore;
    use integrations::{IntegrationConfig, IntegrationHook};
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr.to_string()
    }

    struct TestGateway {
        app: Router,
        token: String,
        integrations: Arc<IntegrationManager>,
    }

    async fn gateway(runner_addr: Option<String>) -> TestGateway {
        gateway_with_timeout(runner_addr, DEFAULT_RUNNER_TIMEOUT).await
    }

    async fn gateway_with_timeout(runner_addr: Option<String>, timeout: Duration) -> TestGateway {
        let admin = Arc::new(AdminManager::new(vec![AuthSecret::hs256("k", "secret")]));
        let integrations = IntegrationManager::load(Arc::new(MemoryStore::default()), admin.clone())
            .await
            .unwrap();
        let runner = RunnerClient::new(runner_addr, timeout);
        let token = admin.internal_access_token().unwrap();
        let app = router(RunnerApi::new(admin, integrations.clone(), runner).unwrap());
        TestGateway {
            app,
            token,
            integrations,
        }
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn call(app: &Router, req: Request) -> (StatusCode, http::HeaderMap, Bytes) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes)
    }

    fn json_body(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let gw = gateway(None).await;
        let (status, _, body) = call(&gw.app, request("GET", "/v1/runner/p1/secrets", None, "")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(json_body(&body)["error"].is_string());
    }

    #[tokio::test]
    async fn test_without_runner() {
        let gw = gateway(None).await;

        let (status, _, body) =
            call(&gw.app, request("GET", "/v1/runner/p1/secrets", Some(&gw.token), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({"result": []}));

        let (status, _, body) = call(
            &gw.app,
            request("POST", "/v1/runner/p1/secrets/db", Some(&gw.token), "{}"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(&body)["error"],
            "Space cloud cannot process this request, as you haven't started space cloud in kubernetes"
        );

        // Logs answer before the token is checked.
        let (status, _, _) = call(&gw.app, request("GET", "/v1/runner/p1/services/logs", None, "")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) =
            call(&gw.app, request("GET", "/v1/config/cluster-type", Some(&gw.token), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({"result": "none"}));
    }

    #[tokio::test]
    async fn test_forward() {
        let port = start_echo_server().await;
        let gw = gateway(Some(format!("127.0.0.1:{port}"))).await;

        let (status, _, body) = call(
            &gw.app,
            request("POST", "/v1/runner/p1/services/api/v1?dry=1", Some(&gw.token), "{\"x\":1}"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let echo = json_body(&body);
        assert_eq!(echo["uri"], "/v1/runner/p1/services/api/v1?dry=1");
        assert_eq!(echo["body"], "{\"x\":1}");
        assert_eq!(echo["headers"]["host"], "127.0.0.1");
        let forwarded = echo["headers"]["authorization"].as_str().unwrap();
        assert!(forwarded.starts_with("Bearer "));

        let (status, _, _) = call(
            &gw.app,
            request("POST", "/v1/runner/p1/services/api/v1", Some(&gw.token), "not json"),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        // Bodies of other methods are passed along untouched.
        let (status, _, body) = call(
            &gw.app,
            request("DELETE", "/v1/runner/p1/services/api/v1", Some(&gw.token), "raw"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["body"], "raw");
    }

    #[tokio::test]
    async fn test_hook_hijacks_request() {
        let port = start_echo_server().await;
        let gw = gateway(Some(format!("127.0.0.1:{port}"))).await;

        let hook_base = spawn(Router::new().route(
            "/hook",
            axum::routing::post(|Json(params): Json<Value>| async move {
                assert_eq!(params["resource"], "secret");
                assert_eq!(params["payload"], json!({"value": "s3cret"}));
                (StatusCode::CONFLICT, Json(json!({"error": "secrets are frozen"})))
            }),
        ))
        .await;

        let mut cfg = IntegrationConfig {
            id: "guard".into(),
            key: "guard-key".into(),
            ..Default::default()
        };
        cfg.hooks.insert(
            "h1".into(),
            IntegrationHook {
                id: "h1".into(),
                resources: vec!["secret".into()],
                verbs: vec!["modify".into()],
                url: format!("http://{hook_base}/hook"),
                ..Default::default()
            },
        );
        gw.integrations
            .enable_integration(cfg, &RequestParams::default())
            .await
            .unwrap();

        let (status, _, body) = call(
            &gw.app,
            request("POST", "/v1/runner/p1/secrets/db", Some(&gw.token), "{\"value\":\"s3cret\"}"),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json_body(&body), json!({"error": "secrets are frozen"}));

        // Reads are not hooked and reach the runner.
        let (status, _, body) =
            call(&gw.app, request("GET", "/v1/runner/p1/secrets", Some(&gw.token), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["method"], "GET");
    }

    #[tokio::test]
    async fn test_stream_logs() {
        let runner = spawn(
            Router::new()
                .route(
                    "/v1/runner/good/services/logs",
                    get(|| async {
                        (
                            [("x-content-type-options", "nosniff")],
                            "line one\n\nline two\n\n",
                        )
                    }),
                )
                .route(
                    "/v1/runner/plain/services/logs",
                    get(|| async { "line one\n" }),
                )
                .route(
                    "/v1/runner/broken/services/logs",
                    get(|| async {
                        (
                            StatusCode::NOT_FOUND,
                            Json(json!({"error": "service not found"})),
                        )
                    }),
                ),
        )
        .await;
        let gw = gateway(Some(runner)).await;

        let (status, headers, body) = call(
            &gw.app,
            request("GET", "/v1/runner/good/services/logs", Some(&gw.token), ""),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(&body[..], b"line one\nline two\n");

        let (status, _, body) = call(
            &gw.app,
            request("GET", "/v1/runner/plain/services/logs", Some(&gw.token), ""),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(&body)["error"],
            "Missing headers X-Content-Type-Options & nosniff"
        );

        let (status, _, body) = call(
            &gw.app,
            request("GET", "/v1/runner/broken/services/logs", Some(&gw.token), ""),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(&body)["error"],
            "received invalid status code (404) got error - service not found"
        );
    }

    #[tokio::test]
    async fn test_stream_logs_stops_when_client_leaves() {
        let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<()>();
        let runner = spawn(Router::new().route(
            "/v1/runner/p1/services/logs",
            get(move || {
                let closed_tx = closed_tx.clone();
                async move {
                    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(1);
                    tokio::spawn(async move {
                        for n in 1.. {
                            let line = Bytes::from(format!("line {n}\n"));
                            if tx.send(Ok(line)).await.is_err() {
                                let _ = closed_tx.send(());
                                return;
                            }
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    });
                    let lines = futures::stream::unfold(rx, |mut rx| async move {
                        rx.recv().await.map(|line| (line, rx))
                    });
                    (
                        [("x-content-type-options", "nosniff")],
                        Body::from_stream(lines),
                    )
                }
            }),
        ))
        .await;
        let gw = gateway(Some(runner)).await;

        let res = gw
            .app
            .clone()
            .oneshot(request("GET", "/v1/runner/p1/services/logs", Some(&gw.token), ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let mut body = res.into_body();
        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(&first[..], b"line 1\n");
        drop(body);

        // The runner's writes start failing once the gateway hangs up.
        let closed = tokio::time::timeout(Duration::from_secs(5), closed_rx.recv()).await;
        assert_eq!(closed.unwrap(), Some(()));
    }

    #[tokio::test]
    async fn test_cluster_type_times_out() {
        let runner = spawn(Router::new().route(
            "/v1/runner/cluster-type",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Json(json!({"result": "kubernetes"}))
            }),
        ))
        .await;
        let gw = gateway_with_timeout(Some(runner), Duration::from_millis(200)).await;

        let (status, _, body) = tokio::time::timeout(
            Duration::from_secs(5),
            call(&gw.app, request("GET", "/v1/config/cluster-type", Some(&gw.token), "")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            json_body(&body)["error"]
                .as_str()
                .unwrap()
                .starts_with("unable to fetch cluster type from runner")
        );
    }
}
