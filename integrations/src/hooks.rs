use crate::config::IntegrationHook;
use crate::errors::IntegrationError;
use crate::metrics_defs::{HOOK_CALLS, HOOK_DURATION};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::Value;
use shared::model::RequestParams;
use shared::response::{send_error_response, send_okay_response, send_response};
use shared::{counter, histogram};
use std::time::{Duration, Instant};

pub const HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of running the hooks registered for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum HookResponse {
    /// No hook took over; the gateway handles the request.
    Continue,
    /// A hook answered the request.
    Hijacked {
        status: StatusCode,
        result: Option<Value>,
        error: Option<String>,
    },
}

impl HookResponse {
    /// True when a hook took over and the caller must not proceed.
    pub fn check_response(&self) -> bool {
        matches!(self, HookResponse::Hijacked { .. })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HookResponse::Continue => StatusCode::OK,
            HookResponse::Hijacked { status, .. } => *status,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            HookResponse::Hijacked { result, .. } => result.as_ref(),
            HookResponse::Continue => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            HookResponse::Hijacked { error, .. } => error.as_deref(),
            HookResponse::Continue => None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        HookResponse::Hijacked {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// Renders a hijacked answer in the usual response envelope.
impl IntoResponse for HookResponse {
    fn into_response(self) -> Response {
        match self {
            HookResponse::Hijacked {
                status,
                error: Some(error),
                ..
            } => send_error_response(status, error),
            HookResponse::Hijacked {
                status,
                result: Some(result),
                ..
            } if !result.is_null() => send_response(status, result),
            HookResponse::Hijacked { status, .. } => send_okay_response(status),
            HookResponse::Continue => send_response(StatusCode::OK, Value::Null),
        }
    }
}

/// Calls hook endpoints over HTTP.
#[derive(Clone)]
pub struct HookInvoker {
    client: reqwest::Client,
}

impl HookInvoker {
    pub fn new(timeout: Duration) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(IntegrationError::HttpClient)?;
        Ok(HookInvoker { client })
    }

    /// Runs the hooks in order until one answers.
    ///
    /// A hook replying `204 No Content` lets the request through to the next
    /// hook. Any other reply ends the chain with that reply. A hook that
    /// cannot be reached blocks the request with a 500.
    pub async fn invoke(&self, hooks: &[IntegrationHook], params: &RequestParams) -> HookResponse {
        for hook in hooks {
            let start = Instant::now();
            let response = self.call(hook, params).await;
            histogram!(HOOK_DURATION).record(start.elapsed().as_secs_f64());

            let outcome = match &response {
                HookResponse::Continue => "continue",
                HookResponse::Hijacked { error: None, .. } => "hijacked",
                HookResponse::Hijacked { .. } => "rejected",
            };
            counter!(HOOK_CALLS, "integration" => hook.integration_id.clone(), "outcome" => outcome)
                .increment(1);

            if response.check_response() {
                tracing::debug!(
                    request_id = %params.request_id,
                    hook = %hook.id,
                    integration = %hook.integration_id,
                    status = response.status().as_u16(),
                    "request taken over by integration hook"
                );
                return response;
            }
        }

        HookResponse::Continue
    }

    async fn call(&self, hook: &IntegrationHook, params: &RequestParams) -> HookResponse {
        let response = match self.client.post(&hook.url).json(params).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(hook = %hook.id, url = %hook.url, error = %e, "unable to invoke integration hook");
                return HookResponse::failed(format!("unable to invoke integration hook: {e}"));
            }
        };

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return HookResponse::Continue;
        }

        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return HookResponse::failed(format!("invalid response from integration hook: {e}"));
            }
            Err(_) => Value::Null,
        };

        if status.is_success() {
            let result = match body {
                Value::Object(mut map) if map.contains_key("result") => map.remove("result"),
                other => Some(other),
            };
            return HookResponse::Hijacked {
                status,
                result,
                error: None,
            };
        }

        let error = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("integration hook responded with status {status}"));
        HookResponse::Hijacked {
            status,
            result: None,
            error: Some(error),
        }
    }
}
