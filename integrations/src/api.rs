use crate::config::{IntegrationConfig, IntegrationHook};
use crate::errors::IntegrationError;
use crate::manager::IntegrationManager;
use auth::AdminManager;
use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{delete, post},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shared::http::{request_id, token_from_headers};
use shared::model::RequestParams;
use shared::response::{send_error_response, send_okay_response, send_response};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const INTEGRATION_TIMEOUT: Duration = Duration::from_secs(30);
const HOOK_MODIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct IntegrationsApi {
    pub admin: Arc<AdminManager>,
    pub manager: Arc<IntegrationManager>,
}

pub fn router(state: IntegrationsApi) -> Router {
    Router::new()
        .route(
            "/v1/config/integrations",
            post(post_integration).get(get_integrations),
        )
        .route("/v1/config/integrations/tokens", post(get_integration_tokens))
        .route("/v1/config/integrations/{name}", delete(delete_integration))
        .route(
            "/v1/config/integrations/{name}/hooks",
            post(post_integration_hook).get(get_integration_hooks),
        )
        .route(
            "/v1/config/integrations/{name}/hooks/{id}",
            delete(delete_integration_hook),
        )
        .with_state(state)
}

/// The request parts every handler needs for the token check.
struct RequestInfo {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl IntegrationsApi {
    /// Any failure of the token check is answered with 403.
    fn authorize(
        &self,
        info: &RequestInfo,
        resource: &str,
        op: &str,
        attributes: HashMap<String, String>,
    ) -> Result<RequestParams, Response> {
        let token = token_from_headers(&info.headers).unwrap_or_default();
        let mut params = self
            .admin
            .is_token_valid(token, resource, op, &attributes)
            .map_err(|e| {
                tracing::warn!(resource, op, error = %e, "integration request not authorized");
                send_error_response(StatusCode::FORBIDDEN, e)
            })?;

        params.request_id = request_id(&info.headers);
        Ok(params.with_http(&info.method, info.uri.path(), &info.headers))
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| send_error_response(StatusCode::BAD_REQUEST, e))
}

async fn bounded<F>(timeout: Duration, op: F) -> Response
where
    F: Future<Output = Result<StatusCode, IntegrationError>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(Ok(status)) => send_okay_response(status),
        Ok(Err(e)) => e.into_response(),
        Err(_) => IntegrationError::Timeout.into_response(),
    }
}

fn attrs<const N: usize>(pairs: [(&str, &str); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Deserialize, Debug)]
struct IdQuery {
    id: Option<String>,
}

impl IdQuery {
    fn id_or_all(&self) -> &str {
        self.id.as_deref().filter(|id| !id.is_empty()).unwrap_or("*")
    }
}

async fn post_integration(
    State(api): State<IntegrationsApi>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let info = RequestInfo { method, uri, headers };
    let cfg: IntegrationConfig = match parse_body(&body) {
        Ok(cfg) => cfg,
        Err(res) => return res,
    };

    let params = match api.authorize(
        &info,
        "integration",
        "modify",
        attrs([("integration", cfg.id.as_str())]),
    ) {
        Ok(params) => params,
        Err(res) => return res,
    };
    let params = params.with_payload(serde_json::to_value(&cfg).ok());

    bounded(
        INTEGRATION_TIMEOUT,
        api.manager.enable_integration(cfg, &params),
    )
    .await
}

async fn delete_integration(
    State(api): State<IntegrationsApi>,
    Path(name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let info = RequestInfo { method, uri, headers };
    let params = match api.authorize(
        &info,
        "integration",
        "modify",
        attrs([("integration", name.as_str())]),
    ) {
        Ok(params) => params,
        Err(res) => return res,
    };

    bounded(
        INTEGRATION_TIMEOUT,
        api.manager.remove_integration(&name, &params),
    )
    .await
}

async fn get_integrations(
    State(api): State<IntegrationsApi>,
    Query(query): Query<IdQuery>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let info = RequestInfo { method, uri, headers };
    let id = query.id_or_all();
    if let Err(res) = api.authorize(&info, "integration", "read", attrs([("integration", id)])) {
        return res;
    }

    match api.manager.get_integrations(id) {
        Ok(integrations) => send_response(StatusCode::OK, integrations),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct TokenRequest {
    #[serde(default)]
    id: String,
    #[serde(default)]
    key: String,
}

/// Integrations authenticate with their key here, so no token is required.
async fn get_integration_tokens(State(api): State<IntegrationsApi>, body: Bytes) -> Response {
    let req: TokenRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(res) => return res,
    };

    match api.manager.get_integration_tokens(&req.id, &req.key) {
        Ok(tokens) => send_response(StatusCode::OK, tokens),
        Err(e) => {
            tracing::warn!(integration = %req.id, error = %e, "integration token request rejected");
            e.into_response()
        }
    }
}

async fn post_integration_hook(
    State(api): State<IntegrationsApi>,
    Path(name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let info = RequestInfo { method, uri, headers };
    let hook: IntegrationHook = match parse_body(&body) {
        Ok(hook) => hook,
        Err(res) => return res,
    };

    let params = match api.authorize(
        &info,
        "integration-hook",
        "modify",
        attrs([("integration", name.as_str()), ("hook", hook.id.as_str())]),
    ) {
        Ok(params) => params,
        Err(res) => return res,
    };
    let params = params.with_payload(serde_json::to_value(&hook).ok());

    bounded(
        HOOK_MODIFY_TIMEOUT,
        api.manager.add_integration_hook(&name, hook, &params),
    )
    .await
}

async fn delete_integration_hook(
    State(api): State<IntegrationsApi>,
    Path((name, hook_id)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let info = RequestInfo { method, uri, headers };
    let params = match api.authorize(
        &info,
        "integration-hook",
        "modify",
        attrs([("integration", name.as_str()), ("hook", hook_id.as_str())]),
    ) {
        Ok(params) => params,
        Err(res) => return res,
    };

    bounded(
        HOOK_MODIFY_TIMEOUT,
        api.manager.remove_integration_hook(&name, &hook_id, &params),
    )
    .await
}

async fn get_integration_hooks(
    State(api): State<IntegrationsApi>,
    Path(name): Path<String>,
    Query(query): Query<IdQuery>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let info = RequestInfo { method, uri, headers };
    let hook_id = query.id_or_all();
    if let Err(res) = api.authorize(
        &info,
        "integration-hook",
        "read",
        attrs([("integration", name.as_str()), ("hook", hook_id)]),
    ) {
        return res;
    }

    match api.manager.get_integration_hooks(&name, hook_id) {
        Ok(hooks) => send_response(StatusCode::OK, hooks),
        Err(e) => e.into_response(),
    }
}
