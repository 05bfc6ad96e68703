use crate::line::signature::SignatureError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct SuccessfulResponse<T> {
    pub success: bool,
    pub response: T,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

pub struct HttpSuccess<T>(pub T);
impl<T: Serialize> IntoResponse for HttpSuccess<T> {
    fn into_response(self) -> Response {
        Json(SuccessfulResponse {
            success: true,
            response: self.0,
        })
        .into_response()
    }
}

#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}
impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                success: false,
                error: self.message,
            }),
        )
            .into_response()
    }
}
impl From<SignatureError> for HttpError {
    fn from(e: SignatureError) -> Self {
        HttpError {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        }
    }
}

pub type HttpResult<T> = Result<HttpSuccess<T>, HttpError>;

#[derive(Deserialize)]
pub struct SetLogLevelRequest {
    pub level: String,
}
