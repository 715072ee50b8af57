use axum::response::{IntoResponse, Response};
use http::StatusCode;
use shared::response::send_error_response;

#[derive(thiserror::Error, Debug)]
pub enum IntegrationError {
    #[error("{0} not provided in request")]
    MissingField(&'static str),

    #[error("integration ({0}) does not exist")]
    IntegrationNotFound(String),

    #[error("integration hook ({hook}) does not exist in integration ({integration})")]
    HookNotFound { integration: String, hook: String },

    #[error("invalid key provided for integration ({0})")]
    InvalidKey(String),

    #[error("operation timed out")]
    Timeout,

    #[error("unable to issue token: {0}")]
    Token(#[from] auth::AuthError),

    #[error("unable to persist integrations: {0}")]
    Store(#[from] StoreError),

    #[error("unable to build hook client: {0}")]
    HttpClient(reqwest::Error),
}

impl IntegrationError {
    pub fn status(&self) -> StatusCode {
        match self {
            IntegrationError::MissingField(_) => StatusCode::BAD_REQUEST,
            IntegrationError::IntegrationNotFound(_) | IntegrationError::HookNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            IntegrationError::InvalidKey(_) => StatusCode::UNAUTHORIZED,
            IntegrationError::Timeout
            | IntegrationError::Token(_)
            | IntegrationError::Store(_)
            | IntegrationError::HttpClient(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IntegrationError {
    fn into_response(self) -> Response {
        send_error_response(self.status(), self)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
