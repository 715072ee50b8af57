//! Project configs known to this gateway.
//!
//! Remote services are indexed by resource id
//! (`<cluster>--<project>--<resource>--<id>`) and ingress routes are kept
//! per project with their path parameters already turned into wildcards.

use crate::metrics_defs::PROJECTS_LOADED;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared::gauge;
use shared::response::send_error_response;
use shared::routing::sanitize_path;
use std::collections::HashMap;

pub const RESOURCE_REMOTE_SERVICE: &str = "remote-service";

fn default_method() -> String {
    "POST".into()
}

fn default_timeout() -> u64 {
    5
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Endpoint {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    /// Seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RemoteService {
    pub url: String,
    #[serde(default)]
    pub endpoints: IndexMap<String, Endpoint>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteSource {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    pub url: String,
    /// Names of the `{param}` segments in `url`
    #[serde(default)]
    pub path_params: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RouteTarget {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub weight: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct IngressRoute {
    pub id: String,
    pub source: RouteSource,
    #[serde(default)]
    pub targets: Vec<RouteTarget>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub remote_services: IndexMap<String, RemoteService>,
    #[serde(default)]
    pub ingress_routes: Vec<IngressRoute>,
}

/// An ingress route as served, with its source path sanitized.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRoute {
    pub project: String,
    #[serde(flatten)]
    pub route: IngressRoute,
    /// `source.url` with every declared path parameter replaced by `*`
    pub pattern: String,
    /// Wildcard position to parameter name
    pub param_indexes: HashMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectAction {
    Insert,
    Update,
    Delete,
}

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("could not parse config of project {project}: {source}")]
    InvalidConfig {
        project: String,
        source: serde_json::Error,
    },

    #[error("project ({0}) not found")]
    ProjectNotFound(String),

    #[error("Could not find endpoint ({endpoint}) for service ({service})")]
    EndpointNotFound { service: String, endpoint: String },
}

impl ProjectError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProjectError::InvalidConfig { .. } => StatusCode::BAD_REQUEST,
            ProjectError::ProjectNotFound(_) | ProjectError::EndpointNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
        }
    }
}

impl IntoResponse for ProjectError {
    fn into_response(self) -> Response {
        send_error_response(self.status(), self)
    }
}

pub fn resource_id(cluster: &str, project: &str, resource: &str, id: &str) -> String {
    format!("{cluster}--{project}--{resource}--{id}")
}

#[derive(Default)]
struct Projects {
    configs: IndexMap<String, ProjectConfig>,
    services: HashMap<String, RemoteService>,
    routes: IndexMap<String, Vec<ProjectRoute>>,
}

pub struct ProjectStore {
    cluster_id: String,
    inner: RwLock<Projects>,
}

impl ProjectStore {
    pub fn new(cluster_id: &str) -> Self {
        ProjectStore {
            cluster_id: cluster_id.to_string(),
            inner: RwLock::new(Projects::default()),
        }
    }

    /// Applies a change to a project. Inserts and updates carry the full
    /// project config as JSON.
    pub fn apply(&self, action: ProjectAction, project: &str, raw: &str) -> Result<(), ProjectError> {
        if action == ProjectAction::Delete {
            self.delete_project(project);
            return Ok(());
        }

        let mut config: ProjectConfig =
            serde_json::from_str(raw).map_err(|source| ProjectError::InvalidConfig {
                project: project.to_string(),
                source,
            })?;
        config.id = project.to_string();
        self.store_project(config);
        Ok(())
    }

    fn store_project(&self, config: ProjectConfig) {
        let project = config.id.clone();
        let prefix = resource_id(&self.cluster_id, &project, RESOURCE_REMOTE_SERVICE, "");

        let mut inner = self.inner.write();
        inner.services.retain(|id, _| !id.starts_with(&prefix));
        for (name, service) in &config.remote_services {
            let id = resource_id(&self.cluster_id, &project, RESOURCE_REMOTE_SERVICE, name);
            inner.services.insert(id, service.clone());
        }
        inner.routes.insert(project.clone(), build_routes(&project, &config.ingress_routes));
        inner.configs.insert(project.clone(), config);

        gauge!(PROJECTS_LOADED).set(inner.configs.len() as f64);
        tracing::info!(project, "stored project config");
    }

    fn delete_project(&self, project: &str) {
        let prefix = format!("{}--{}--", self.cluster_id, project);

        let mut inner = self.inner.write();
        inner.configs.shift_remove(project);
        inner.routes.shift_remove(project);
        inner.services.retain(|id, _| !id.starts_with(&prefix));

        gauge!(PROJECTS_LOADED).set(inner.configs.len() as f64);
        tracing::info!(project, "deleted project config");
    }

    /// Replaces every ingress route of a project.
    pub fn set_project_routes(&self, project: &str, routes: Vec<IngressRoute>) -> Result<(), ProjectError> {
        let mut inner = self.inner.write();
        let Some(config) = inner.configs.get_mut(project) else {
            return Err(ProjectError::ProjectNotFound(project.to_string()));
        };
        config.ingress_routes = routes;
        let built = build_routes(project, &config.ingress_routes);
        inner.routes.insert(project.to_string(), built);
        Ok(())
    }

    /// Timeout in seconds of a remote service endpoint.
    pub fn endpoint_timeout(&self, project: &str, service: &str, endpoint: &str) -> Result<u64, ProjectError> {
        let id = resource_id(&self.cluster_id, project, RESOURCE_REMOTE_SERVICE, service);
        self.inner
            .read()
            .services
            .get(&id)
            .and_then(|s| s.endpoints.get(endpoint))
            .map(|e| e.timeout)
            .ok_or_else(|| ProjectError::EndpointNotFound {
                service: service.to_string(),
                endpoint: endpoint.to_string(),
            })
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.inner.read().configs.keys().cloned().collect()
    }

    pub fn project(&self, project: &str) -> Result<ProjectConfig, ProjectError> {
        self.inner
            .read()
            .configs
            .get(project)
            .cloned()
            .ok_or_else(|| ProjectError::ProjectNotFound(project.to_string()))
    }

    pub fn routes(&self, project: &str) -> Result<Vec<ProjectRoute>, ProjectError> {
        self.inner
            .read()
            .routes
            .get(project)
            .cloned()
            .ok_or_else(|| ProjectError::ProjectNotFound(project.to_string()))
    }
}

fn build_routes(project: &str, routes: &[IngressRoute]) -> Vec<ProjectRoute> {
    routes
        .iter()
        .map(|route| {
            let (pattern, param_indexes) = sanitize_path(
                &route.source.url,
                route.source.path_params.iter().map(String::as_str),
            );
            ProjectRoute {
                project: project.to_string(),
                route: route.clone(),
                pattern,
                param_indexes,
            }
        })
        .collect()
}
