//! JSON envelope shared by every API handler.
//!
//! Successful responses wrap their payload as `{"result": ...}`, failures as
//! `{"error": "..."}`.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse<T> {
    pub result: T,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    pub error: String,
}

pub fn send_response<T: Serialize>(status: StatusCode, result: T) -> Response {
    (status, Json(ApiResponse { result })).into_response()
}

pub fn send_okay_response(status: StatusCode) -> Response {
    (status, Json(Value::Object(Default::default()))).into_response()
}

pub fn send_error_response(status: StatusCode, error: impl ToString) -> Response {
    let body = ApiError {
        error: error.to_string(),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_envelopes() {
        let res = send_response(StatusCode::OK, vec![1, 2]);
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, serde_json::json!({"result": [1, 2]}));

        let res = send_error_response(StatusCode::FORBIDDEN, "denied");
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(res).await, serde_json::json!({"error": "denied"}));

        let res = send_okay_response(StatusCode::OK);
        assert_eq!(body_json(res).await, serde_json::json!({}));
    }
}
