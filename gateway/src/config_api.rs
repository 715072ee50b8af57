//! Config API for projects: `/v1/config/projects/<type>[/<name>]`.
//!
//! `project` addresses whole project configs by id. `remote-service` and
//! `ingress-route` address parts of the project named by the `project`
//! query parameter. A remote service read with an `endpoint` query parameter
//! answers with that endpoint's timeout in seconds.

use crate::projects::{IngressRoute, ProjectAction, ProjectError, ProjectStore};
use auth::{AdminManager, AuthError};
use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
};
use serde::Deserialize;
use serde_json::json;
use shared::http::token_from_headers;
use shared::response::{send_error_response, send_okay_response, send_response};
use shared::routing::{InvalidConfigPath, extract_config_path};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
enum ConfigApiError {
    #[error(transparent)]
    InvalidPath(#[from] InvalidConfigPath),

    #[error(transparent)]
    Unauthorized(AuthError),

    #[error("query parameter project is required")]
    MissingProject,

    #[error("a resource name is required")]
    MissingName,

    #[error("unknown config type {0}")]
    UnknownType(String),

    #[error("method {0} is not allowed here")]
    MethodNotAllowed(Method),

    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error(transparent)]
    Project(#[from] ProjectError),
}

impl IntoResponse for ConfigApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ConfigApiError::InvalidPath(_)
            | ConfigApiError::MissingProject
            | ConfigApiError::MissingName
            | ConfigApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ConfigApiError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ConfigApiError::UnknownType(_) => StatusCode::NOT_FOUND,
            ConfigApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ConfigApiError::Project(e) => e.status(),
        };
        send_error_response(status, self)
    }
}

#[derive(Clone)]
pub struct ConfigApi {
    pub admin: Arc<AdminManager>,
    pub projects: Arc<ProjectStore>,
}

#[derive(Deserialize, Default)]
struct ProjectQuery {
    project: Option<String>,
    endpoint: Option<String>,
}

pub fn router(api: ConfigApi) -> Router {
    Router::new()
        .route("/v1/config/projects/{*rest}", any(handle_config))
        .with_state(api)
}

async fn handle_config(
    State(api): State<ConfigApi>,
    method: Method,
    uri: Uri,
    Query(query): Query<ProjectQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match api.handle(&method, &uri, query, &headers, &body) {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(path = uri.path(), %method, error = %e, "config request failed");
            e.into_response()
        }
    }
}

impl ConfigApi {
    fn handle(
        &self,
        method: &Method,
        uri: &Uri,
        query: ProjectQuery,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<Response, ConfigApiError> {
        let path = extract_config_path(uri.path(), method)?;
        let name = path.resource_name.as_deref();
        let endpoint = query.endpoint;

        let project = match path.type_name.as_str() {
            "project" => name.unwrap_or("*").to_string(),
            _ => query.project.ok_or(ConfigApiError::MissingProject)?,
        };

        let op = if method == Method::GET { "read" } else { "modify" };
        let token = token_from_headers(headers).unwrap_or_default();
        let attributes = HashMap::from([("project".to_string(), project.clone())]);
        self.admin
            .is_token_valid(token, &path.type_name, op, &attributes)
            .map_err(ConfigApiError::Unauthorized)?;

        match (path.type_name.as_str(), method.as_str(), path.op) {
            ("project", "GET", "list") => {
                Ok(send_response(StatusCode::OK, self.projects.project_ids()))
            }
            ("project", "GET", _) => {
                Ok(send_response(StatusCode::OK, self.projects.project(&project)?))
            }
            ("project", "POST", _) => {
                let name = name.ok_or(ConfigApiError::MissingName)?;
                let action = if self.projects.project(name).is_ok() {
                    ProjectAction::Update
                } else {
                    ProjectAction::Insert
                };
                self.projects.apply(action, name, &String::from_utf8_lossy(body))?;
                Ok(send_okay_response(StatusCode::OK))
            }
            ("project", "DELETE", _) => {
                let name = name.ok_or(ConfigApiError::MissingName)?;
                self.projects.apply(ProjectAction::Delete, name, "")?;
                Ok(send_okay_response(StatusCode::OK))
            }
            ("remote-service", "GET", op) => {
                let config = self.projects.project(&project)?;
                if op == "list" {
                    return Ok(send_response(StatusCode::OK, config.remote_services));
                }
                let name = name.ok_or(ConfigApiError::MissingName)?;
                if let Some(endpoint) = endpoint {
                    let timeout = self.projects.endpoint_timeout(&project, name, &endpoint)?;
                    return Ok(send_response(StatusCode::OK, json!({ "timeout": timeout })));
                }
                let service = config.remote_services.get(name).ok_or_else(|| {
                    ConfigApiError::UnknownType(format!("remote-service/{name}"))
                })?;
                Ok(send_response(StatusCode::OK, service))
            }
            ("ingress-route", "GET", op) => {
                let routes = self.projects.routes(&project)?;
                if op == "list" {
                    return Ok(send_response(StatusCode::OK, routes));
                }
                let name = name.ok_or(ConfigApiError::MissingName)?;
                let route = routes.iter().find(|r| r.route.id == name).ok_or_else(|| {
                    ConfigApiError::UnknownType(format!("ingress-route/{name}"))
                })?;
                Ok(send_response(StatusCode::OK, route))
            }
            ("ingress-route", "POST", _) => {
                let routes: Vec<IngressRoute> = serde_json::from_slice(body)?;
                self.projects.set_project_routes(&project, routes)?;
                Ok(send_okay_response(StatusCode::OK))
            }
            ("project" | "remote-service" | "ingress-route", _, _) => {
                Err(ConfigApiError::MethodNotAllowed(method.clone()))
            }
            (other, _, _) => Err(ConfigApiError::UnknownType(other.to_string())),
        }
    }
}
