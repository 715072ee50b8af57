use crate::config::{Config, ProjectSource};
use crate::config_api::{self, ConfigApi};
use crate::projects::{ProjectAction, ProjectError, ProjectStore};
use auth::AdminManager;
use axum::Router;
use integrations::api::IntegrationsApi;
use integrations::{ConfigStore, FileStore, IntegrationError, IntegrationManager, MemoryStore};
use runner::{RunnerApi, RunnerClient, RunnerError};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not load integrations: {0}")]
    Integrations(#[from] IntegrationError),

    #[error("could not set up runner forwarding: {0}")]
    Runner(#[from] RunnerError),

    #[error("could not read project file {path}: {source}")]
    ProjectFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Builds the public API: integrations, runner and project config.
pub fn build_router(
    admin: Arc<AdminManager>,
    integrations: Arc<IntegrationManager>,
    projects: Arc<ProjectStore>,
    runner: RunnerClient,
) -> Result<Router, GatewayError> {
    let router = Router::new()
        .merge(integrations::api::router(IntegrationsApi {
            admin: admin.clone(),
            manager: integrations.clone(),
        }))
        .merge(runner::router(RunnerApi::new(
            admin.clone(),
            integrations,
            runner,
        )?))
        .merge(config_api::router(ConfigApi { admin, projects }));
    Ok(router)
}

async fn load_projects(store: &ProjectStore, sources: &[ProjectSource]) -> Result<(), GatewayError> {
    for source in sources {
        let raw = tokio::fs::read_to_string(&source.path)
            .await
            .map_err(|e| GatewayError::ProjectFile {
                path: source.path.clone(),
                source: e,
            })?;
        store.apply(ProjectAction::Insert, &source.id, &raw)?;
    }
    Ok(())
}

pub async fn run(config: Config) -> Result<(), GatewayError> {
    let ready = Arc::new(AtomicBool::new(false));

    let admin = Arc::new(AdminManager::new(config.admin.secrets.clone()));
    let store: Arc<dyn ConfigStore> = match &config.integrations.store_path {
        Some(path) => Arc::new(FileStore::new(path)),
        None => Arc::new(MemoryStore::default()),
    };
    let integrations = IntegrationManager::load(store, admin.clone()).await?;
    admin.set_permission_source(integrations.clone());

    let projects = Arc::new(ProjectStore::new(&config.cluster_id));
    load_projects(&projects, &config.projects).await?;

    let runner_addr = config.runner.addr();
    if runner_addr.is_none() {
        tracing::warn!("no runner configured, runner requests will be rejected");
    }
    let runner = RunnerClient::new(runner_addr, config.runner.timeout());

    let app = build_router(admin, integrations, projects, runner)?;

    let is_ready = ready.clone();
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<GatewayError>::new(move || is_ready.load(Ordering::Relaxed)),
    );

    let api_task = async {
        let listener =
            TcpListener::bind(format!("{}:{}", config.listener.host, config.listener.port)).await?;
        tracing::info!(
            host = %config.listener.host,
            port = config.listener.port,
            "listening"
        );
        ready.store(true, Ordering::Relaxed);
        axum::serve(listener, app).await?;
        Ok::<(), GatewayError>(())
    };

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::AuthSecret;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::io::Write;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_app() -> (Router, Arc<AdminManager>) {
        let mut secret = AuthSecret::hs256("", "gateway-secret");
        secret.is_primary = true;
        let admin = Arc::new(AdminManager::new(vec![secret]));
        let integrations = IntegrationManager::load(Arc::new(MemoryStore::default()), admin.clone())
            .await
            .unwrap();
        admin.set_permission_source(integrations.clone());
        let app = build_router(
            admin.clone(),
            integrations,
            Arc::new(ProjectStore::new("test")),
            RunnerClient::new(None, Duration::from_secs(1)),
        )
        .unwrap();
        (app, admin)
    }

    async fn get(app: &Router, uri: &str, token: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_merged_routes() {
        let (app, admin) = test_app().await;
        let token = admin.internal_access_token().unwrap();

        let (status, body) = get(&app, "/v1/config/cluster-type", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": "none"}));

        let (status, body) = get(&app, "/v1/config/integrations", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": []}));

        let (status, body) = get(&app, "/v1/config/projects/project", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": []}));

        let (status, body) = get(&app, "/v1/runner/todo/services", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": []}));
    }

    #[tokio::test]
    async fn test_load_projects() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "todo"}}"#).unwrap();

        let store = ProjectStore::new("test");
        let sources = vec![ProjectSource {
            id: "todo".into(),
            path: file.path().to_path_buf(),
        }];
        load_projects(&store, &sources).await.unwrap();
        assert_eq!(store.project("todo").unwrap().name, "todo");

        let missing = vec![ProjectSource {
            id: "gone".into(),
            path: "/nonexistent/gone.json".into(),
        }];
        assert!(matches!(
            load_projects(&store, &missing).await,
            Err(GatewayError::ProjectFile { .. })
        ));
    }
}
