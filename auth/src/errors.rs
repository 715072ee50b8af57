use axum::response::{IntoResponse, Response};
use http::StatusCode;
use shared::response::send_error_response;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("no auth secrets configured")]
    NoSecrets,

    #[error("token not provided")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("no secret found for kid {0}")]
    UnknownKid(String),

    #[error("secret not found: {0}")]
    SecretNotFound(String),

    #[error("secret source not supported by the gateway: {0}")]
    UnsupportedSecretSource(String),

    #[error("algorithm {0:?} cannot be used for this operation")]
    UnsupportedAlgorithm(crate::types::JwtAlg),

    #[error("invalid type provided for claim in jwt token")]
    InvalidClaimType,

    #[error("unable to verify claim of jwt token")]
    ClaimMismatch,

    #[error("you are not authorized to {op} {resource}")]
    Forbidden { resource: String, op: String },

    #[error("unknown role {0} in token")]
    UnknownRole(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Forbidden { .. } | AuthError::UnknownRole(_) => StatusCode::FORBIDDEN,
            AuthError::NoSecrets
            | AuthError::SecretNotFound(_)
            | AuthError::UnsupportedSecretSource(_)
            | AuthError::UnsupportedAlgorithm(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        send_error_response(self.status(), self)
    }
}
