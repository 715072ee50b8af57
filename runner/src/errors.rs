use axum::response::{IntoResponse, Response};
use http::StatusCode;
use shared::response::send_error_response;

#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("Space cloud cannot process this request, as you haven't started space cloud in kubernetes")]
    NotConfigured,

    #[error(transparent)]
    Unauthorized(auth::AuthError),

    #[error("unable to generate internal access token: {0}")]
    InternalToken(auth::AuthError),

    #[error("unable to read request body: {0}")]
    RequestBody(String),

    #[error("invalid request body: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("unable to build upstream request: {0}")]
    BuildRequest(#[from] http::Error),

    #[error("request to runner failed: {0}")]
    UpstreamRequestFailed(String),

    #[error("runner did not respond within {0} seconds")]
    UpstreamTimeout(u64),

    #[error("unable to read runner response: {0}")]
    UpstreamBody(String),

    #[error("received invalid status code ({status}) got error - {error}")]
    InvalidStatus { status: u16, error: String },

    #[error("Missing headers X-Content-Type-Options & nosniff")]
    MissingNosniff,

    #[error("unable to fetch cluster type from runner: {0}")]
    ClusterType(String),

    #[error("unable to build runner client: {0}")]
    HttpClient(reqwest::Error),
}

impl RunnerError {
    pub fn status(&self) -> StatusCode {
        match self {
            RunnerError::NotConfigured | RunnerError::MissingNosniff => StatusCode::BAD_REQUEST,
            RunnerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RunnerError {
    fn into_response(self) -> Response {
        send_error_response(self.status(), self)
    }
}
